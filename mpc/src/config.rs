//! Controller configuration
//!
//! All configuration is plain immutable data, deserialized from a TOML parameter
//! file and passed explicitly into each component.

use std::f64::consts::PI;
use std::fs::read_to_string;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Integrator;

/// An error that occurs while loading or validating a parameter file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot load the parameter file: {0}")]
    FileLoadError(std::io::Error),

    #[error("Cannot read the parameter file: {0}")]
    DeserialiseError(toml::de::Error),

    #[error("Invalid parameter `{param}`: {reason}")]
    Invalid {
        param: &'static str,
        reason: String,
    },
}

/// Complete parameter set of the tracker, as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerParams {
    pub mpc: MpcConfig,
    pub robot: RobotSpec,
}

/// Problem dimensions and tuning of the receding-horizon controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpcConfig {
    pub ns: usize,    // number of states
    pub nu: usize,    // number of controls
    pub n_hor: usize, // horizon length (control intervals)
    pub ts: f64,      // sample time [s]

    #[serde(default)]
    pub integrator: Integrator,

    /// Symmetric bound on the heading state [rad].
    #[serde(default = "default_heading_bound")]
    pub heading_bound: f64,

    /// Clearance kept from every obstacle [m].
    #[serde(default)]
    pub obstacle_margin: f64,

    #[serde(default)]
    pub weights: CostWeights,

    #[serde(default)]
    pub solver: SolverSettings,
}

/// Actuation limits of the robot. The angular limit is symmetric.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RobotSpec {
    pub lin_vel_min: f64,
    pub lin_vel_max: f64,
    pub ang_vel_max: f64,
}

/// Diagonal weights of each cost term. Lengths are checked against `ns`/`nu` when
/// the cost is assembled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostWeights {
    pub q: Vec<f64>,  // stage state tracking
    pub qn: Vec<f64>, // terminal state tracking
    pub r: Vec<f64>,  // control effort
    pub rd: Vec<f64>, // control rate
}

/// Tuning of the augmented Lagrangian / PANOC backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub epsilon_tolerance: f64,     // inner (PANOC) fixed-point residual tolerance
    pub delta_tolerance: f64,       // outer (ALM) constraint tolerance
    pub feasibility_tolerance: f64, // max violation still reported as feasible
    pub lbfgs_memory: usize,
    pub max_outer_iterations: usize,
    pub max_inner_iterations: usize,
    pub initial_penalty: f64,
    pub penalty_update_factor: f64,
    pub initial_inner_tolerance: f64,
    pub inner_tolerance_update_factor: f64,
    pub max_duration_ms: Option<u64>,
}

fn default_heading_bound() -> f64 {
    2.0 * PI
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            q: vec![1.0, 1.0, 0.1],
            qn: vec![10.0, 10.0, 1.0],
            r: vec![0.1, 0.1],
            rd: vec![0.1, 0.1],
        }
    }
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            epsilon_tolerance: 1e-5,
            delta_tolerance: 1e-4,
            feasibility_tolerance: 1e-3,
            lbfgs_memory: 10,
            max_outer_iterations: 20,
            max_inner_iterations: 500,
            initial_penalty: 10.0,
            penalty_update_factor: 5.0,
            initial_inner_tolerance: 1e-2,
            inner_tolerance_update_factor: 0.1,
            max_duration_ms: None,
        }
    }
}

impl SolverSettings {
    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_ms.map(Duration::from_millis)
    }
}

impl MpcConfig {
    /// Unicycle defaults: 3 states, 2 controls.
    pub fn new(n_hor: usize, ts: f64) -> Self {
        Self {
            ns: 3,
            nu: 2,
            n_hor,
            ts,
            integrator: Integrator::default(),
            heading_bound: default_heading_bound(),
            obstacle_margin: 0.0,
            weights: CostWeights::default(),
            solver: SolverSettings::default(),
        }
    }

    /// Checks the values that are not dimensions. Dimensions are checked against the
    /// model when a problem is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.ts.is_finite() && self.ts > 0.0) {
            return Err(invalid("mpc.ts", format!("must be positive, found {}", self.ts)));
        }
        if !(self.heading_bound > 0.0) {
            return Err(invalid(
                "mpc.heading_bound",
                format!("must be positive, found {}", self.heading_bound),
            ));
        }
        if !(self.obstacle_margin >= 0.0) {
            return Err(invalid(
                "mpc.obstacle_margin",
                format!("must be non-negative, found {}", self.obstacle_margin),
            ));
        }
        let s = &self.solver;
        if s.epsilon_tolerance <= 0.0 || s.delta_tolerance <= 0.0 || s.feasibility_tolerance <= 0.0 {
            return Err(invalid("mpc.solver", "tolerances must be positive".to_string()));
        }
        if s.initial_inner_tolerance < s.epsilon_tolerance {
            return Err(invalid(
                "mpc.solver.initial_inner_tolerance",
                "must not be smaller than epsilon_tolerance".to_string(),
            ));
        }
        if s.lbfgs_memory == 0 || s.max_outer_iterations == 0 || s.max_inner_iterations == 0 {
            return Err(invalid(
                "mpc.solver",
                "memory and iteration limits must be at least 1".to_string(),
            ));
        }
        if s.max_duration_ms == Some(0) {
            return Err(invalid(
                "mpc.solver.max_duration_ms",
                "must be at least 1 when set".to_string(),
            ));
        }
        if s.penalty_update_factor <= 1.0 {
            return Err(invalid(
                "mpc.solver.penalty_update_factor",
                format!("must be greater than 1, found {}", s.penalty_update_factor),
            ));
        }
        Ok(())
    }
}

impl RobotSpec {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.lin_vel_min <= self.lin_vel_max) {
            return Err(invalid(
                "robot.lin_vel_min",
                format!("{} exceeds lin_vel_max {}", self.lin_vel_min, self.lin_vel_max),
            ));
        }
        if !(self.ang_vel_max >= 0.0) {
            return Err(invalid(
                "robot.ang_vel_max",
                format!("must be non-negative, found {}", self.ang_vel_max),
            ));
        }
        Ok(())
    }

    pub fn control_lower(&self) -> [f64; 2] {
        [self.lin_vel_min, -self.ang_vel_max]
    }

    pub fn control_upper(&self) -> [f64; 2] {
        [self.lin_vel_max, self.ang_vel_max]
    }
}

fn invalid(param: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { param, reason }
}

/// Parses and validates a TOML parameter string.
pub fn from_toml_str(params_str: &str) -> Result<TrackerParams, ConfigError> {
    let params: TrackerParams = toml::from_str(params_str).map_err(ConfigError::DeserialiseError)?;
    params.mpc.validate()?;
    params.robot.validate()?;
    Ok(params)
}

/// Loads and validates a TOML parameter file.
pub fn load<P: AsRef<Path>>(path: P) -> Result<TrackerParams, ConfigError> {
    let params_str = read_to_string(path).map_err(ConfigError::FileLoadError)?;
    from_toml_str(&params_str)
}
