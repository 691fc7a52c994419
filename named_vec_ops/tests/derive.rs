use named_vec_ops::NamedVecOps;
use named_vec_ops_derive::NamedVecOps;
use nalgebra::SVector;

#[derive(Debug, Copy, Clone, PartialEq, NamedVecOps)]
struct Pose<T> {
    x: T,
    y: T,
    angle: T,
}

#[test]
fn field_order_matches_vector_order() {
    let p = Pose { x: 1.0, y: 2.0, angle: 3.0 };
    assert_eq!(p.to_svector(), SVector::<f64, 3>::new(1.0, 2.0, 3.0));
    assert_eq!(Pose::<f64>::SIZE, 3);
    assert_eq!(Pose::from_slice(&[4.0, 5.0, 6.0]), Pose { x: 4.0, y: 5.0, angle: 6.0 });
}

#[test]
fn arithmetic_is_fieldwise() {
    let a = Pose { x: 1.0, y: 2.0, angle: 3.0 };
    let b = Pose { x: 0.5, y: -1.0, angle: 1.0 };

    assert_eq!(a + b, Pose { x: 1.5, y: 1.0, angle: 4.0 });
    assert_eq!(a - b, Pose { x: 0.5, y: 3.0, angle: 2.0 });
    assert_eq!(a * 2.0, Pose { x: 2.0, y: 4.0, angle: 6.0 });

    let mut c = a;
    c += b;
    c -= b;
    assert_eq!(c, a);
}

#[test]
fn write_to_fills_slice() {
    let mut out = [0.0; 3];
    Pose { x: 7.0, y: 8.0, angle: 9.0 }.write_to(&mut out);
    assert_eq!(out, [7.0, 8.0, 9.0]);
}
