//! Multiple-shooting transcription of one horizon.
//!
//! States and controls are all decision variables and everything else is a box on `z`,
//! except the constraint mapping `F1(z)`. Its first `N * ns` rows are the dynamics
//! defects between neighbouring nodes, which must be zero. The remaining rows are the
//! signed depths of every node in every obstacle, which must be non-positive.

use named_vec_ops::NamedVecOps;

use crate::config::MpcConfig;
use crate::error::MpcError;
use crate::layout::VariableLayout;
use crate::map::Workspace;
use crate::model::{DynamicsModel, NS, NU, State64};
use crate::obstacle::Obstacle;

/// Added to the reachable radius of every node when closing an open position bound.
const REACH_SLACK: f64 = 1.0;

/// Half-width of the position box around `x0` when the speed is unbounded too.
const FALLBACK_REACH: f64 = 1e3;

pub struct TranscriptionBuilder {
    layout: VariableLayout,
    model: DynamicsModel,
    x0: State64,
    control_lb: Vec<f64>,
    control_ub: Vec<f64>,
    state_lb: Vec<Vec<f64>>, // one entry per node
    state_ub: Vec<Vec<f64>>,
    obstacles: Vec<Obstacle>,
    margin: f64,
}

/// Immutable NLP description of one horizon.
#[derive(Debug, Clone)]
pub struct Transcription {
    layout: VariableLayout,
    model: DynamicsModel,
    lower: Vec<f64>,
    upper: Vec<f64>,
    obstacles: Vec<Obstacle>,
    margin: f64,
    constraint_lower: Vec<f64>, // box on F1(z)
    constraint_upper: Vec<f64>,
}

impl TranscriptionBuilder {
    pub fn new(config: &MpcConfig, x0: &[f64]) -> Result<Self, MpcError> {
        MpcError::check_len("configured state dimension", NS, config.ns)?;
        MpcError::check_len("configured control dimension", NU, config.nu)?;
        MpcError::check_len("initial state", config.ns, x0.len())?;
        if !(config.ts.is_finite() && config.ts > 0.0) {
            return Err(MpcError::InvalidSampleTime(config.ts));
        }
        let layout = VariableLayout::new(config.ns, config.nu, config.n_hor)?;

        let heading = config.heading_bound;
        Ok(Self {
            layout,
            model: DynamicsModel::new(config.ts, config.integrator),
            x0: State64::from_slice(x0),
            control_lb: vec![f64::NEG_INFINITY; NU],
            control_ub: vec![f64::INFINITY; NU],
            state_lb: vec![vec![f64::NEG_INFINITY, f64::NEG_INFINITY, -heading]; config.n_hor + 1],
            state_ub: vec![vec![f64::INFINITY, f64::INFINITY, heading]; config.n_hor + 1],
            obstacles: Vec::new(),
            margin: 0.0,
        })
    }

    pub fn layout(&self) -> &VariableLayout {
        &self.layout
    }

    /// Same box on every control interval.
    pub fn set_control_bound(&mut self, lb: &[f64], ub: &[f64]) -> Result<&mut Self, MpcError> {
        MpcError::check_len("control lower bound", NU, lb.len())?;
        MpcError::check_len("control upper bound", NU, ub.len())?;
        check_ordered("control", lb, ub)?;
        self.control_lb = lb.to_vec();
        self.control_ub = ub.to_vec();
        Ok(self)
    }

    /// One box per node, `N+1` entries, allowing time-varying bounds.
    pub fn set_state_bound(&mut self, lb: &[Vec<f64>], ub: &[Vec<f64>]) -> Result<&mut Self, MpcError> {
        let nodes = self.layout.n_hor() + 1;
        MpcError::check_len("state lower bound nodes", nodes, lb.len())?;
        MpcError::check_len("state upper bound nodes", nodes, ub.len())?;
        for (l, u) in lb.iter().zip(ub) {
            MpcError::check_len("state lower bound", NS, l.len())?;
            MpcError::check_len("state upper bound", NS, u.len())?;
            check_ordered("state", l, u)?;
        }
        self.state_lb = lb.to_vec();
        self.state_ub = ub.to_vec();
        Ok(self)
    }

    /// Same box on every node.
    pub fn set_uniform_state_bound(&mut self, lb: &[f64], ub: &[f64]) -> Result<&mut Self, MpcError> {
        let nodes = self.layout.n_hor() + 1;
        self.set_state_bound(&vec![lb.to_vec(); nodes], &vec![ub.to_vec(); nodes])
    }

    /// Position box from the workspace, heading within `[-heading_bound, heading_bound]`.
    pub fn set_workspace(&mut self, workspace: &Workspace, heading_bound: f64) -> Result<&mut Self, MpcError> {
        self.set_uniform_state_bound(
            &[workspace.x_min, workspace.y_min, -heading_bound],
            &[workspace.x_max, workspace.y_max, heading_bound],
        )
    }

    /// Every node of the horizon is kept `margin` away from each obstacle.
    pub fn set_obstacles(&mut self, obstacles: &[Obstacle], margin: f64) -> Result<&mut Self, MpcError> {
        obstacles.iter().try_for_each(Obstacle::validate)?;
        if !(margin >= 0.0) {
            return Err(MpcError::InvalidBounds { what: "obstacle margin", lower: 0.0, upper: margin });
        }
        self.obstacles = obstacles.to_vec();
        self.margin = margin;
        Ok(self)
    }

    /// Upper bound on the distance node `i` can be from `x0`.
    fn reach(&self, i: usize) -> f64 {
        let speed = self.control_lb[0].abs().max(self.control_ub[0].abs());
        if speed.is_finite() {
            i as f64 * self.model.ts * speed + REACH_SLACK
        } else {
            FALLBACK_REACH
        }
    }

    pub fn build(&self) -> Transcription {
        let layout = self.layout;
        let mut lower = vec![0.0; layout.len()];
        let mut upper = vec![0.0; layout.len()];

        for i in 0..=layout.n_hor() {
            layout.state_mut(&mut lower, i).copy_from_slice(&self.state_lb[i]);
            layout.state_mut(&mut upper, i).copy_from_slice(&self.state_ub[i]);

            // The backend needs a finite position box
            let reach = self.reach(i);
            let lo = layout.state_mut(&mut lower, i);
            let hi = layout.state_mut(&mut upper, i);
            for (k, origin) in [self.x0.x, self.x0.y].into_iter().enumerate() {
                if lo[k] == f64::NEG_INFINITY {
                    lo[k] = (origin - reach).min(hi[k]);
                }
                if hi[k] == f64::INFINITY {
                    hi[k] = (origin + reach).max(lo[k]);
                }
            }
        }
        for i in 0..layout.n_hor() {
            layout.control_mut(&mut lower, i).copy_from_slice(&self.control_lb);
            layout.control_mut(&mut upper, i).copy_from_slice(&self.control_ub);
        }

        // Initial condition: node 0 is pinned, not optimized
        self.x0.write_to(layout.state_mut(&mut lower, 0));
        self.x0.write_to(layout.state_mut(&mut upper, 0));

        let n_dynamics = layout.n_hor() * NS;
        let n_obstacle = (layout.n_hor() + 1) * self.obstacles.len();
        let mut constraint_lower = vec![0.0; n_dynamics];
        constraint_lower.resize(n_dynamics + n_obstacle, f64::NEG_INFINITY);

        Transcription {
            layout,
            model: self.model,
            lower,
            upper,
            obstacles: self.obstacles.clone(),
            margin: self.margin,
            constraint_lower,
            constraint_upper: vec![0.0; n_dynamics + n_obstacle],
        }
    }
}

impl Transcription {
    pub fn layout(&self) -> &VariableLayout {
        &self.layout
    }

    pub fn model(&self) -> &DynamicsModel {
        &self.model
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    /// Number of dynamics equality constraints.
    pub fn n_dynamics(&self) -> usize {
        self.layout.n_hor() * NS
    }

    /// Number of obstacle inequality constraints, one per node and obstacle.
    pub fn n_obstacle(&self) -> usize {
        (self.layout.n_hor() + 1) * self.obstacles.len()
    }

    /// Length of `F1(z)`.
    pub fn n1(&self) -> usize {
        self.n_dynamics() + self.n_obstacle()
    }

    /// Lower corner of the set `F1(z)` must lie in.
    pub fn constraint_lower(&self) -> &[f64] {
        &self.constraint_lower
    }

    pub fn constraint_upper(&self) -> &[f64] {
        &self.constraint_upper
    }

    /// Clamps `z` into the variable box.
    pub fn project(&self, z: &mut [f64]) {
        for ((zi, lo), hi) in z.iter_mut().zip(&self.lower).zip(&self.upper) {
            *zi = zi.max(*lo).min(*hi);
        }
    }

    /// `F1(z)`: block `i` is `step(s_i, c_i) - s_{i+1}`.
    pub fn dynamics_residual(&self, z: &[f64], out: &mut [f64]) {
        let layout = &self.layout;
        for i in 0..layout.n_hor() {
            let predicted = self.model.step(&layout.typed_state(z, i), &layout.typed_control(z, i));
            let residual = predicted - layout.typed_state(z, i + 1);
            residual.write_to(&mut out[i * NS..(i + 1) * NS]);
        }
    }

    /// `J_F1(z)^T d`.
    pub fn dynamics_jacobian_t(&self, z: &[f64], d: &[f64], out: &mut [f64]) {
        let layout = &self.layout;
        out.iter_mut().for_each(|o| *o = 0.0);
        for i in 0..layout.n_hor() {
            let (a, b) = self.model.linearize(&layout.typed_state(z, i), &layout.typed_control(z, i));
            let di = nalgebra::SVector::<f64, NS>::from_column_slice(&d[i * NS..(i + 1) * NS]);

            let gs = a.transpose() * di;
            let gu = b.transpose() * di;
            for (o, g) in layout.state_mut(out, i).iter_mut().zip(gs.iter()) {
                *o += g;
            }
            for (o, g) in layout.control_mut(out, i).iter_mut().zip(gu.iter()) {
                *o += g;
            }
            for (o, g) in layout.state_mut(out, i + 1).iter_mut().zip(di.iter()) {
                *o -= g;
            }
        }
    }

    /// Signed depth of node `i` in obstacle `k` at index `i * n_obstacles + k`.
    pub fn obstacle_residual(&self, z: &[f64], out: &mut [f64]) {
        let n_obs = self.obstacles.len();
        for i in 0..=self.layout.n_hor() {
            let p = self.position(z, i);
            for (k, obstacle) in self.obstacles.iter().enumerate() {
                out[i * n_obs + k] = obstacle.signed_depth(p, self.margin).0;
            }
        }
    }

    /// Transposed obstacle Jacobian times `d`.
    pub fn obstacle_jacobian_t(&self, z: &[f64], d: &[f64], out: &mut [f64]) {
        let n_obs = self.obstacles.len();
        out.iter_mut().for_each(|o| *o = 0.0);
        for i in 0..=self.layout.n_hor() {
            let p = self.position(z, i);
            let node = self.layout.state_mut(out, i);
            for (k, obstacle) in self.obstacles.iter().enumerate() {
                let (_, grad) = obstacle.signed_depth(p, self.margin);
                node[0] += grad[0] * d[i * n_obs + k];
                node[1] += grad[1] * d[i * n_obs + k];
            }
        }
    }

    /// `F1(z)`: dynamics defects followed by obstacle depths.
    pub fn constraint_residual(&self, z: &[f64], out: &mut [f64]) {
        let (dynamics, obstacles) = out.split_at_mut(self.n_dynamics());
        self.dynamics_residual(z, dynamics);
        self.obstacle_residual(z, obstacles);
    }

    /// `J_F1(z)^T d`.
    pub fn constraint_jacobian_t(&self, z: &[f64], d: &[f64], out: &mut [f64]) {
        let (d_dynamics, d_obstacles) = d.split_at(self.n_dynamics());
        self.dynamics_jacobian_t(z, d_dynamics, out);
        if self.obstacles.is_empty() {
            return;
        }
        let mut obstacle_part = vec![0.0; out.len()];
        self.obstacle_jacobian_t(z, d_obstacles, &mut obstacle_part);
        for (o, g) in out.iter_mut().zip(&obstacle_part) {
            *o += g;
        }
    }

    /// Whether the pinned initial position lies inside an obstacle, which no choice of the
    /// free variables can fix.
    pub fn initial_state_blocked(&self) -> bool {
        let p = self.position(&self.lower, 0);
        self.obstacles.iter().any(|o| o.contains(p, self.margin))
    }

    /// Largest absolute dynamics residual.
    pub fn dynamics_violation(&self, z: &[f64]) -> f64 {
        let mut residual = vec![0.0; self.n_dynamics()];
        self.dynamics_residual(z, &mut residual);
        residual.iter().fold(0.0, |m, r| m.max(r.abs()))
    }

    /// Largest penetration of any node into any obstacle.
    pub fn obstacle_violation(&self, z: &[f64]) -> f64 {
        let mut residual = vec![0.0; self.n_obstacle()];
        self.obstacle_residual(z, &mut residual);
        residual.iter().fold(0.0, |m, r| m.max(*r))
    }

    fn position(&self, z: &[f64], i: usize) -> [f64; 2] {
        let s = self.layout.state(z, i);
        [s[0], s[1]]
    }
}

fn check_ordered(what: &'static str, lb: &[f64], ub: &[f64]) -> Result<(), MpcError> {
    match lb.iter().zip(ub).find(|(l, u)| !(l <= u)) {
        Some((&lower, &upper)) => Err(MpcError::InvalidBounds { what, lower, upper }),
        None => Ok(()),
    }
}
