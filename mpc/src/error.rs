use thiserror::Error;

use crate::config::ConfigError;
use crate::map::MapError;

/// Errors raised while building a control cycle, before any solver is invoked.
#[derive(Debug, Error)]
pub enum MpcError {
    #[error("Dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Horizon length must be at least 1, found {0}")]
    InvalidHorizon(usize),

    #[error("Sample time must be positive and finite, found {0}")]
    InvalidSampleTime(f64),

    #[error("Invalid bounds for {what}: lower bound {lower} exceeds upper bound {upper}")]
    InvalidBounds {
        what: &'static str,
        lower: f64,
        upper: f64,
    },

    #[error("The reference trajectory is empty")]
    EmptyReference,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Map(#[from] MapError),
}

impl MpcError {
    pub(crate) fn check_len(what: &'static str, expected: usize, found: usize) -> Result<(), Self> {
        if expected == found {
            Ok(())
        } else {
            Err(MpcError::DimensionMismatch { what, expected, found })
        }
    }
}
