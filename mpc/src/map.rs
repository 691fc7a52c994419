//! Map data: workspace boundary and static obstacles.

use std::fs::read_to_string;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::obstacle::Obstacle;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("Cannot load the map file: {0}")]
    FileLoadError(std::io::Error),

    #[error("Cannot parse the map file: {0}")]
    DeserialiseError(serde_json::Error),

    #[error("Map boundary needs at least 2 corners, found {0}")]
    InvalidBoundary(usize),

    #[error("Invalid obstacle: {0}")]
    InvalidObstacle(String),
}

/// Map contents as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapData {
    pub boundary_coords: Vec<[f64; 2]>,
    #[serde(default)]
    pub obstacle_list: Vec<Obstacle>,
}

/// Rectangular region the robot position must stay in.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Workspace {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Workspace {
    pub fn unbounded() -> Self {
        Self {
            x_min: f64::NEG_INFINITY,
            x_max: f64::INFINITY,
            y_min: f64::NEG_INFINITY,
            y_max: f64::INFINITY,
        }
    }

    /// Box spanned by two opposite corners, in any order.
    pub fn from_corners(a: [f64; 2], b: [f64; 2]) -> Self {
        Self {
            x_min: a[0].min(b[0]),
            x_max: a[0].max(b[0]),
            y_min: a[1].min(b[1]),
            y_max: a[1].max(b[1]),
        }
    }

    pub fn contains(&self, p: [f64; 2]) -> bool {
        (self.x_min..=self.x_max).contains(&p[0]) && (self.y_min..=self.y_max).contains(&p[1])
    }
}

impl MapData {
    pub fn from_json_str(json: &str) -> Result<Self, MapError> {
        let map: MapData = serde_json::from_str(json).map_err(MapError::DeserialiseError)?;
        map.validate()?;
        Ok(map)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MapError> {
        let json = read_to_string(path).map_err(MapError::FileLoadError)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), MapError> {
        self.workspace()?;
        self.obstacle_list.iter().try_for_each(Obstacle::validate)
    }

    /// Workspace rectangle. With four or more corners listed around the boundary, entries
    /// 0 and 2 are opposite; with exactly two, they are the corners themselves.
    pub fn workspace(&self) -> Result<Workspace, MapError> {
        let corners = &self.boundary_coords;
        match corners.len() {
            0 | 1 => Err(MapError::InvalidBoundary(corners.len())),
            2 => Ok(Workspace::from_corners(corners[0], corners[1])),
            _ => Ok(Workspace::from_corners(corners[0], corners[2])),
        }
    }
}
