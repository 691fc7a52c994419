
use nalgebra::{SVector, Scalar};

/// A struct of `N` named scalar fields that behaves like a small fixed-size vector.
pub trait NamedVecOps<T: Scalar, const N: usize>:
    Copy
  + Clone
  + std::ops::Add<Self, Output = Self>
  + std::ops::Sub<Self, Output = Self>
  + std::ops::Mul<T, Output = Self>
  + std::ops::AddAssign<Self>
  + std::ops::SubAssign<Self>
{
    const SIZE: usize = N;

    fn to_svector(&self) -> SVector<T, N>;
    fn from_svector(v: &SVector<T, N>) -> Self;

    /// Panics if `s.len() != N`.
    fn from_slice(s: &[T]) -> Self {
        Self::from_svector(&SVector::from_column_slice(s))
    }

    /// Panics if `out.len() != N`.
    fn write_to(&self, out: &mut [T]) {
        out.clone_from_slice(self.to_svector().as_slice());
    }
}
