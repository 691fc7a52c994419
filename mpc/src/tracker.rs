//! Receding-horizon orchestrator.
//!
//! Every call to [`MpcTracker::run`] builds the horizon problem from scratch for the
//! current state, solves it once, and shifts the prediction into the warm start of the
//! next call. The warm start is the only thing carried between cycles.

use std::time::Duration;

use log::{debug, trace, warn};
use named_vec_ops::NamedVecOps;

use crate::config::{MpcConfig, RobotSpec};
use crate::cost::{CostAssembler, Reference};
use crate::error::MpcError;
use crate::layout::VariableLayout;
use crate::map::Workspace;
use crate::model::{Control64, State64};
use crate::obstacle::Obstacle;
use crate::solver::{ExitStatus, NlpProblem, NlpSolver, Solution};
use crate::transcription::TranscriptionBuilder;

/// Per-cycle inputs besides the obstacle list.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleParams {
    pub last_control: Control64, // control applied during the previous cycle
    pub x0: State64,             // current measured state
    pub reference: Reference,
}

impl CycleParams {
    pub fn new(x0: State64, reference: Reference) -> Self {
        Self { last_control: Control64::default(), x0, reference }
    }

    /// Decodes `[u_last (nu), x0 (ns), x_ref (ns), ...]`. Any further whole state-sized
    /// chunks extend the reference into a trajectory.
    pub fn from_slice(config: &MpcConfig, p: &[f64]) -> Result<Self, MpcError> {
        let (ns, nu) = (config.ns, config.nu);
        MpcError::check_len("configured state dimension", State64::SIZE, ns)?;
        MpcError::check_len("configured control dimension", Control64::SIZE, nu)?;
        let minimum = nu + 2 * ns;
        if p.len() < minimum || (p.len() - nu) % ns != 0 {
            let expected = if p.len() < minimum {
                minimum
            } else {
                p.len() - (p.len() - nu) % ns
            };
            return Err(MpcError::DimensionMismatch { what: "parameter vector", expected, found: p.len() });
        }

        let mut refs: Vec<State64> = p[nu + ns..].chunks_exact(ns).map(State64::from_slice).collect();
        let reference = if refs.len() == 1 {
            Reference::State(refs.remove(0))
        } else {
            Reference::Trajectory(refs)
        };

        Ok(Self {
            last_control: Control64::from_slice(&p[..nu]),
            x0: State64::from_slice(&p[nu..nu + ns]),
            reference,
        })
    }
}

/// What one cycle hands back to the caller.
#[derive(Debug, Clone)]
pub struct CycleOutput {
    pub controls: Vec<Control64>, // N optimal controls, the first one is applied
    pub states: Vec<State64>,     // N+1 predicted states, starting at x0
    pub cost: f64,
    pub status: ExitStatus,
    pub solve_time: Duration,
    pub next_warm_start: Vec<f64>,
}

impl CycleOutput {
    /// Per-axis control sequences: `[v_0..v_{N-1}]` and `[w_0..w_{N-1}]`.
    pub fn control_axes(&self) -> (Vec<f64>, Vec<f64>) {
        self.controls.iter().map(|c| (c.v, c.w)).unzip()
    }

    /// Controls flattened step by step: `v0, w0, v1, w1, ...`.
    pub fn flat_controls(&self) -> Vec<f64> {
        self.controls.iter().flat_map(|c| [c.v, c.w]).collect()
    }

    pub fn first_control(&self) -> Control64 {
        self.controls[0]
    }
}

/// Drops the leading node+interval stride of `z` and repeats the final stride, so the
/// seed keeps its length and layout.
pub fn shift_warm_start(layout: &VariableLayout, z: &[f64]) -> Result<Vec<f64>, MpcError> {
    MpcError::check_len("warm start", layout.len(), z.len())?;
    let stride = layout.stride();
    let mut next = Vec::with_capacity(z.len());
    next.extend_from_slice(&z[stride..]);
    next.extend_from_slice(&z[z.len() - stride..]);
    Ok(next)
}

pub struct MpcTracker<S: NlpSolver> {
    config: MpcConfig,     // dimensions, sample time and tuning
    robot: RobotSpec,      // actuation limits
    workspace: Workspace,  // position bounds
    solver: S,             // NLP backend
    layout: VariableLayout,
    warm_start: Vec<f64>,  // seed of the next solve
}

impl<S: NlpSolver> MpcTracker<S> {
    pub fn new(config: MpcConfig, robot: RobotSpec, workspace: Workspace, solver: S) -> Result<Self, MpcError> {
        config.validate()?;
        robot.validate()?;
        MpcError::check_len("configured state dimension", State64::SIZE, config.ns)?;
        MpcError::check_len("configured control dimension", Control64::SIZE, config.nu)?;
        let layout = VariableLayout::new(config.ns, config.nu, config.n_hor)?;
        Ok(Self {
            warm_start: vec![0.0; layout.len()],
            config,
            robot,
            workspace,
            solver,
            layout,
        })
    }

    /// Replaces the zero seed with a user supplied one.
    pub fn with_warm_start(mut self, seed: Vec<f64>) -> Result<Self, MpcError> {
        MpcError::check_len("warm start", self.layout.len(), seed.len())?;
        self.warm_start = seed;
        Ok(self)
    }

    pub fn warm_start(&self) -> &[f64] {
        &self.warm_start
    }

    pub fn reset_warm_start(&mut self) {
        self.warm_start = vec![0.0; self.layout.len()];
    }

    pub fn config(&self) -> &MpcConfig {
        &self.config
    }

    pub fn layout(&self) -> &VariableLayout {
        &self.layout
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// Runs one control cycle. Construction problems are errors; anything the solver
    /// reports, including infeasibility, comes back as the status of the output.
    pub fn run(&mut self, params: &CycleParams, obstacles: &[Obstacle]) -> Result<CycleOutput, MpcError> {
        let config = &self.config;

        let mut x0 = [0.0; 3];
        params.x0.write_to(&mut x0);
        let mut builder = TranscriptionBuilder::new(config, &x0)?;
        builder
            .set_control_bound(&self.robot.control_lower(), &self.robot.control_upper())?
            .set_workspace(&self.workspace, config.heading_bound)?
            .set_obstacles(obstacles, config.obstacle_margin)?;
        let transcription = builder.build();

        let cost = CostAssembler::new(self.layout, &config.weights, &params.reference, params.last_control)?;
        let problem = NlpProblem::new(&transcription, &cost)?;

        let Solution { variables, cost: total_cost, status, solve_time } =
            self.solver.solve(&problem, &self.warm_start);
        MpcError::check_len("solution", self.layout.len(), variables.len())?;

        let states = self.layout.states(&variables);
        let controls = self.layout.controls(&variables);

        let next_warm_start = shift_warm_start(&self.layout, &variables)?;
        self.warm_start.clone_from(&next_warm_start);

        debug!("MPC cycle: cost {total_cost:.6}, status {status:?}, solve time {solve_time:?}");
        if status != ExitStatus::Success {
            warn!("MPC cycle ended with status {status:?}");
        }
        if log::log_enabled!(log::Level::Trace) {
            for (name, value) in cost.breakdown(&variables) {
                trace!("    {name}: {value:.6}");
            }
        }

        Ok(CycleOutput {
            controls,
            states,
            cost: total_cost,
            status,
            solve_time,
            next_warm_start,
        })
    }

    /// Evaluates every named cost term on a realized trajectory without solving.
    pub fn individual_costs(
        &self,
        params: &CycleParams,
        output: &CycleOutput,
    ) -> Result<Vec<(&'static str, f64)>, MpcError> {
        let cost = CostAssembler::new(self.layout, &self.config.weights, &params.reference, params.last_control)?;
        let flat_states: Vec<f64> = output.states.iter().flat_map(|s| [s.x, s.y, s.theta]).collect();
        let z = self.layout.interleave(&flat_states, &output.flat_controls())?;
        Ok(cost.breakdown(&z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_drops_first_stride_and_repeats_last() {
        // N = 2, ns = 3, nu = 2: [s0, c0, s1, c1, s2]
        let layout = VariableLayout::new(3, 2, 2).unwrap();
        let z: Vec<f64> = (0..13).map(|k| k as f64).collect();
        let next = shift_warm_start(&layout, &z).unwrap();

        assert_eq!(next.len(), z.len());
        assert_eq!(&next[..8], &z[5..]);
        assert_eq!(&next[8..], &z[8..]);
    }

    #[test]
    fn shift_keeps_length_for_every_horizon() {
        for n_hor in 1..=12 {
            let layout = VariableLayout::new(3, 2, n_hor).unwrap();
            let z: Vec<f64> = (0..layout.len()).map(|k| k as f64).collect();
            let next = shift_warm_start(&layout, &z).unwrap();
            assert_eq!(next.len(), z.len());
            // The last node of the shifted seed is still the terminal state
            assert_eq!(layout.state(&next, n_hor), layout.state(&z, n_hor));
        }
    }

    #[test]
    fn shift_with_single_interval() {
        let layout = VariableLayout::new(3, 2, 1).unwrap();
        let z = [1.0, 2.0, 3.0, 0.5, 0.6, 4.0, 5.0, 6.0];
        assert_eq!(
            shift_warm_start(&layout, &z).unwrap(),
            vec![4.0, 5.0, 6.0, 0.5, 0.6, 4.0, 5.0, 6.0]
        );
    }

    #[test]
    fn shift_rejects_wrong_length() {
        let layout = VariableLayout::new(3, 2, 4).unwrap();
        assert!(shift_warm_start(&layout, &[0.0; 10]).is_err());
    }

    #[test]
    fn parameter_vector_decoding() {
        let config = MpcConfig::new(10, 0.1);
        let p = [0.3, -0.1, 1.0, 2.0, 0.5, 5.0, 0.0, 0.0];
        let params = CycleParams::from_slice(&config, &p).unwrap();
        assert_eq!(params.last_control, Control64::new(0.3, -0.1));
        assert_eq!(params.x0, State64::new(1.0, 2.0, 0.5));
        assert_eq!(params.reference, Reference::State(State64::new(5.0, 0.0, 0.0)));

        let traj = [0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0];
        let params = CycleParams::from_slice(&config, &traj).unwrap();
        assert_eq!(
            params.reference,
            Reference::Trajectory(vec![State64::new(1.0, 0.0, 0.0), State64::new(2.0, 0.0, 0.0)])
        );

        assert!(matches!(
            CycleParams::from_slice(&config, &p[..6]),
            Err(MpcError::DimensionMismatch { what: "parameter vector", expected: 8, found: 6 })
        ));
        assert!(matches!(
            CycleParams::from_slice(&config, &[0.0; 9]),
            Err(MpcError::DimensionMismatch { what: "parameter vector", expected: 8, found: 9 })
        ));
    }

    #[test]
    fn control_views() {
        let output = CycleOutput {
            controls: vec![Control64::new(1.0, 0.1), Control64::new(0.9, 0.2)],
            states: vec![State64::default(); 3],
            cost: 0.0,
            status: ExitStatus::Success,
            solve_time: Duration::ZERO,
            next_warm_start: vec![],
        };
        assert_eq!(output.control_axes(), (vec![1.0, 0.9], vec![0.1, 0.2]));
        assert_eq!(output.flat_controls(), vec![1.0, 0.1, 0.9, 0.2]);
        assert_eq!(output.first_control(), Control64::new(1.0, 0.1));
    }
}
