//! Receding-horizon trajectory tracking for a unicycle robot.
//!
//! Each cycle the horizon is transcribed by multiple shooting into an NLP with
//! decision vector `[s0, c0, s1, c1, ..., s_N]`, solved once by a pluggable backend,
//! and the prediction is shifted into the warm start of the next cycle.

pub mod config;
pub mod cost;
pub mod error;
pub mod layout;
pub mod map;
pub mod model;
pub mod obstacle;
pub mod solver;
pub mod tracker;
pub mod transcription;

pub use config::{CostWeights, MpcConfig, RobotSpec, SolverSettings, TrackerParams};
pub use cost::{CostAssembler, CostTerm, Reference};
pub use error::MpcError;
pub use layout::VariableLayout;
pub use map::{MapData, Workspace};
pub use model::{Control64, DynamicsModel, Integrator, State64};
pub use obstacle::Obstacle;
pub use solver::{AlmSolver, ExitStatus, NlpProblem, NlpSolver, Solution};
pub use tracker::{CycleOutput, CycleParams, MpcTracker, shift_warm_start};
pub use transcription::{Transcription, TranscriptionBuilder};
