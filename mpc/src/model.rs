//! Kinematic unicycle model and its discretisation.
//!
//! The model is generic over the scalar type so the same code produces plain
//! predictions (`f64`) and exact Jacobians (`Dual64`).

use named_vec_ops::NamedVecOps;
use named_vec_ops_derive::NamedVecOps;
use nalgebra::{SMatrix, SVector};
use num_dual::{Dual64, DualNum};
use serde::{Deserialize, Serialize};

pub const NS: usize = 3;
pub const NU: usize = 2;

/// Scalars the model can be evaluated on: `f64` and `Dual64`.
pub trait ModelScalar:
    DualNum<f64> + From<f64> + Copy + nalgebra::Scalar + std::ops::AddAssign + std::ops::SubAssign
{
}

impl<T> ModelScalar for T where
    T: DualNum<f64> + From<f64> + Copy + nalgebra::Scalar + std::ops::AddAssign + std::ops::SubAssign
{
}

#[derive(Debug, Copy, Clone, PartialEq, Default, NamedVecOps)]
pub struct State<T> {
    pub x: T,
    pub y: T,
    pub theta: T,
}

pub type State64 = State<f64>;
pub type StateDual = State<Dual64>;

#[derive(Debug, Copy, Clone, PartialEq, Default, NamedVecOps)]
pub struct Control<T> {
    pub v: T, // linear speed
    pub w: T, // angular speed
}

pub type Control64 = Control<f64>;
pub type ControlDual = Control<Dual64>;

impl State64 {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }
}

impl Control64 {
    pub fn new(v: f64, w: f64) -> Self {
        Self { v, w }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Integrator {
    #[default]
    Rk4,
    Euler,
}

/// Continuous-time unicycle kinematics.
pub fn unicycle<T: ModelScalar>(state: &State<T>, control: &Control<T>) -> State<T> {
    State {
        x: control.v * state.theta.cos(),
        y: control.v * state.theta.sin(),
        theta: control.w,
    }
}

/// One explicit Euler step of length `ts`.
pub fn euler_step<T: ModelScalar>(state: &State<T>, control: &Control<T>, ts: f64) -> State<T> {
    *state + unicycle(state, control) * T::from(ts)
}

/// One classic fourth-order Runge-Kutta step of length `ts`. Heading is not wrapped.
pub fn rk4_step<T: ModelScalar>(state: &State<T>, control: &Control<T>, ts: f64) -> State<T> {
    let h = T::from(ts);
    let half = T::from(0.5);
    let two = T::from(2.0);

    let k1 = unicycle(state, control) * h;
    let k2 = unicycle(&(*state + k1 * half), control) * h;
    let k3 = unicycle(&(*state + k2 * half), control) * h;
    let k4 = unicycle(&(*state + k3), control) * h;

    *state + (k1 + k2 * two + k3 * two + k4) * T::from(1.0 / 6.0)
}

/// Discrete one-step transition of the robot.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DynamicsModel {
    pub ts: f64,
    pub integrator: Integrator,
}

impl DynamicsModel {
    pub fn new(ts: f64, integrator: Integrator) -> Self {
        Self { ts, integrator }
    }

    pub fn step<T: ModelScalar>(&self, state: &State<T>, control: &Control<T>) -> State<T> {
        match self.integrator {
            Integrator::Rk4 => rk4_step(state, control, self.ts),
            Integrator::Euler => euler_step(state, control, self.ts),
        }
    }

    /// Jacobians `(A, B)` of the discrete step with respect to the state and the control,
    /// evaluated with forward-mode dual numbers.
    pub fn linearize(
        &self,
        state: &State64,
        control: &Control64,
    ) -> (SMatrix<f64, NS, NS>, SMatrix<f64, NS, NU>) {
        let mut a = SMatrix::<f64, NS, NS>::zeros();
        let mut b = SMatrix::<f64, NS, NU>::zeros();

        let state_dual_svec = state.to_svector().map(Dual64::from);
        let control_dual_svec = control.to_svector().map(Dual64::from);

        let state_dual = StateDual::from_svector(&state_dual_svec);
        let control_dual = ControlDual::from_svector(&control_dual_svec);

        for i in 0..NS {
            let mut perturbed = state_dual_svec;
            perturbed[i].eps = 1.0;
            let dfds = self.step(&StateDual::from_svector(&perturbed), &control_dual).to_svector();
            for j in 0..NS {
                a[(j, i)] = dfds[j].eps;
            }
        }

        for i in 0..NU {
            let mut perturbed: SVector<Dual64, NU> = control_dual_svec;
            perturbed[i].eps = 1.0;
            let dfdc = self.step(&state_dual, &ControlDual::from_svector(&perturbed)).to_svector();
            for j in 0..NS {
                b[(j, i)] = dfdc[j].eps;
            }
        }

        (a, b)
    }
}
