//! Solver adapter: hands a transcribed problem to an NLP backend.

use std::time::{Duration, Instant};

use log::{debug, warn};
use optimization_engine::{
    alm::{AlmCache, AlmFactory, AlmOptimizer, AlmProblem},
    constraints::{BallInf, Rectangle},
    core::ExitStatus as AlmExitStatus,
    panoc::PANOCCache,
    SolverError,
};

use crate::config::SolverSettings;
use crate::cost::CostAssembler;
use crate::error::MpcError;
use crate::transcription::Transcription;

/// Radius of the box the Lagrange multipliers are kept in.
const LAGRANGE_BOUND: f64 = 1e12;

// Types of the unused penalty mapping
type Mapping = fn(&[f64], &mut [f64]) -> Result<(), SolverError>;
type JacobianMapping = fn(&[f64], &[f64], &mut [f64]) -> Result<(), SolverError>;

/// Categorical outcome of one solve.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Infeasible,
    MaxIterations,
    Other,
}

/// Result of one solve attempt.
#[derive(Debug, Clone)]
pub struct Solution {
    pub variables: Vec<f64>, // decision vector, in layout order
    pub cost: f64,           // objective at `variables`
    pub status: ExitStatus,
    pub solve_time: Duration,
}

/// Everything a backend needs: the variable box, the constraint mappings and the objective.
#[derive(Debug, Copy, Clone)]
pub struct NlpProblem<'a> {
    pub transcription: &'a Transcription,
    pub cost: &'a CostAssembler,
}

impl<'a> NlpProblem<'a> {
    pub fn new(transcription: &'a Transcription, cost: &'a CostAssembler) -> Result<Self, MpcError> {
        let (t, c) = (transcription.layout(), cost.layout());
        MpcError::check_len("cost horizon", t.n_hor(), c.n_hor())?;
        MpcError::check_len("cost variable count", t.len(), c.len())?;
        Ok(Self { transcription, cost })
    }
}

/// A generic NLP backend. One call is exactly one solve attempt; the status is reported,
/// never turned into an error.
pub trait NlpSolver {
    fn solve(&mut self, problem: &NlpProblem<'_>, warm_start: &[f64]) -> Solution;
}

/// Augmented Lagrangian method with PANOC inner solves, from `optimization_engine`.
///
/// The variable box is a `Rectangle`. The constraint mapping is kept in a second
/// `Rectangle` by the ALM multipliers: dynamics rows pinned to zero, obstacle rows
/// bounded above by zero. The penalty mapping is unused.
#[derive(Debug, Clone, Default)]
pub struct AlmSolver {
    settings: SolverSettings,
}

impl AlmSolver {
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    /// The backend's verdict is kept, except that a converged run still violating the
    /// constraints is infeasible.
    fn classify(&self, transcription: &Transcription, z: &[f64], exit: AlmExitStatus) -> ExitStatus {
        if z.iter().any(|v| !v.is_finite()) {
            return ExitStatus::Other;
        }
        match exit {
            AlmExitStatus::Converged => {
                let violation = transcription.dynamics_violation(z).max(transcription.obstacle_violation(z));
                if violation > self.settings.feasibility_tolerance {
                    debug!("Constraint violation {violation:.3e} after convergence");
                    ExitStatus::Infeasible
                } else {
                    ExitStatus::Success
                }
            }
            AlmExitStatus::NotConvergedIterations => ExitStatus::MaxIterations,
            AlmExitStatus::NotConvergedOutOfTime => ExitStatus::Other,
        }
    }

    /// The projected seed, returned whenever no solve result is available.
    fn fallback(transcription: &Transcription, cost: &CostAssembler, seed: Vec<f64>, status: ExitStatus) -> Solution {
        let mut z = seed;
        transcription.project(&mut z);
        Solution {
            cost: cost.total(&z),
            variables: z,
            status,
            solve_time: Duration::ZERO,
        }
    }
}

impl NlpSolver for AlmSolver {
    fn solve(&mut self, problem: &NlpProblem<'_>, warm_start: &[f64]) -> Solution {
        let transcription = problem.transcription;
        let cost = problem.cost;
        let s = &self.settings;
        let n = transcription.layout().len();
        let n1 = transcription.n1();

        if warm_start.len() != n {
            warn!("Warm start has {} entries, problem has {n}, not solving", warm_start.len());
            return Self::fallback(transcription, cost, vec![0.0; n], ExitStatus::Other);
        }
        if transcription.initial_state_blocked() {
            warn!("Initial state lies inside an obstacle, not solving");
            return Self::fallback(transcription, cost, warm_start.to_vec(), ExitStatus::Infeasible);
        }
        let mut z = warm_start.to_vec();

        let f = |u: &[f64], c: &mut f64| -> Result<(), SolverError> {
            *c = cost.total(u);
            Ok(())
        };
        let df = |u: &[f64], grad: &mut [f64]| -> Result<(), SolverError> {
            cost.gradient(u, grad);
            Ok(())
        };
        let f1 = |u: &[f64], res: &mut [f64]| -> Result<(), SolverError> {
            transcription.constraint_residual(u, res);
            Ok(())
        };
        let jf1t = |u: &[f64], d: &[f64], res: &mut [f64]| -> Result<(), SolverError> {
            transcription.constraint_jacobian_t(u, d, res);
            Ok(())
        };
        let set_c = || Rectangle::new(Some(transcription.constraint_lower()), Some(transcription.constraint_upper()));

        let factory = AlmFactory::new(
            f,
            df,
            Some(f1),
            Some(jf1t),
            None::<Mapping>,
            None::<JacobianMapping>,
            Some(set_c()),
            0,
        );
        let psi = |u: &[f64], xi: &[f64], c: &mut f64| -> Result<(), SolverError> { factory.psi(u, xi, c) };
        let d_psi = |u: &[f64], xi: &[f64], grad: &mut [f64]| -> Result<(), SolverError> {
            factory.d_psi(u, xi, grad)
        };

        let bounds = Rectangle::new(Some(transcription.lower()), Some(transcription.upper()));
        let alm_problem = AlmProblem::new(
            bounds,
            Some(set_c()),
            Some(BallInf::new(None, LAGRANGE_BOUND)),
            psi,
            d_psi,
            Some(f1),
            None::<Mapping>,
            n1,
            0,
        );

        let panoc_cache = PANOCCache::new(n, s.epsilon_tolerance, s.lbfgs_memory);
        let mut alm_cache = AlmCache::new(panoc_cache, n1, 0);
        let mut optimizer = AlmOptimizer::new(&mut alm_cache, alm_problem)
            .with_delta_tolerance(s.delta_tolerance)
            .with_epsilon_tolerance(s.epsilon_tolerance)
            .with_initial_inner_tolerance(s.initial_inner_tolerance)
            .with_inner_tolerance_update_factor(s.inner_tolerance_update_factor)
            .with_max_outer_iterations(s.max_outer_iterations)
            .with_max_inner_iterations(s.max_inner_iterations)
            .with_initial_penalty(s.initial_penalty)
            .with_penalty_update_factor(s.penalty_update_factor);
        if let Some(max_duration) = s.max_duration().filter(|d| !d.is_zero()) {
            optimizer = optimizer.with_max_duration(max_duration);
        }

        // Start from a point inside the box, node 0 in particular is pinned to x0
        transcription.project(&mut z);

        let started = Instant::now();
        let outcome = optimizer.solve(&mut z);
        let solve_time = started.elapsed();

        let status = match outcome {
            Ok(report) => {
                debug!(
                    "ALM finished: {:?} after {} outer / {} inner iterations",
                    report.exit_status(),
                    report.num_outer_iterations(),
                    report.num_inner_iterations()
                );
                self.classify(transcription, &z, report.exit_status())
            }
            Err(e) => {
                warn!("NLP backend failed: {e:?}");
                return Solution {
                    solve_time,
                    ..Self::fallback(transcription, cost, warm_start.to_vec(), ExitStatus::Other)
                };
            }
        };

        Solution {
            cost: cost.total(&z),
            variables: z,
            status,
            solve_time,
        }
    }
}
