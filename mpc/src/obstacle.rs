//! Static obstacle geometry.

use serde::{Deserialize, Serialize};

use crate::map::MapError;

/// A static obstacle in the map frame.
///
/// Deserialized untagged: a list of `[x, y]` vertices is a polygon, an object with
/// `center` and `radius` is a circle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Obstacle {
    /// Convex polygon, vertices in either winding order.
    Polygon(Vec<[f64; 2]>),
    Circle { center: [f64; 2], radius: f64 },
}

impl Obstacle {
    /// Axis-aligned rectangle.
    pub fn rectangle(min: [f64; 2], max: [f64; 2]) -> Self {
        Obstacle::Polygon(vec![
            [min[0], min[1]],
            [max[0], min[1]],
            [max[0], max[1]],
            [min[0], max[1]],
        ])
    }

    pub fn validate(&self) -> Result<(), MapError> {
        match self {
            Obstacle::Polygon(vertices) => {
                if vertices.len() < 3 {
                    return Err(MapError::InvalidObstacle(format!(
                        "polygon needs at least 3 vertices, found {}",
                        vertices.len()
                    )));
                }
                if vertices.iter().flatten().any(|c| !c.is_finite()) {
                    return Err(MapError::InvalidObstacle("polygon has non-finite vertices".into()));
                }
                let area = signed_area(vertices);
                if area.abs() < f64::EPSILON {
                    return Err(MapError::InvalidObstacle("polygon is degenerate".into()));
                }
                let n = vertices.len();
                for j in 0..n {
                    let cross = cross(vertices[j], vertices[(j + 1) % n], vertices[(j + 2) % n]);
                    if cross * area < 0.0 {
                        return Err(MapError::InvalidObstacle("polygon is not convex".into()));
                    }
                }
                Ok(())
            }
            Obstacle::Circle { center, radius } => {
                if !(center[0].is_finite() && center[1].is_finite()) {
                    return Err(MapError::InvalidObstacle("circle has a non-finite center".into()));
                }
                if !(radius.is_finite() && *radius > 0.0) {
                    return Err(MapError::InvalidObstacle(format!(
                        "circle radius must be positive, found {radius}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Signed depth of `p` in the obstacle grown by `margin`, and its gradient with respect
    /// to `p`. Positive inside, where it is the distance `p` must travel to get out;
    /// non-positive outside. Smooth except where two edges tie and at a circle's center.
    pub fn signed_depth(&self, p: [f64; 2], margin: f64) -> (f64, [f64; 2]) {
        match self {
            Obstacle::Polygon(vertices) => {
                let orientation = signed_area(vertices).signum();
                let n = vertices.len();
                let mut depth = f64::INFINITY;
                let mut normal = [0.0, 0.0];
                for j in 0..n {
                    let a = vertices[j];
                    let b = vertices[(j + 1) % n];
                    let (ex, ey) = (b[0] - a[0], b[1] - a[1]);
                    let len = ex.hypot(ey);
                    if len == 0.0 {
                        continue;
                    }
                    // Outward unit normal
                    let nj = [orientation * ey / len, -orientation * ex / len];
                    let s = margin - (nj[0] * (p[0] - a[0]) + nj[1] * (p[1] - a[1]));
                    // Ties go to the lexicographically largest normal, whatever the edge order
                    if s < depth || (s == depth && (nj[0], nj[1]) > (normal[0], normal[1])) {
                        depth = s;
                        normal = nj;
                    }
                }
                (depth, [-normal[0], -normal[1]])
            }
            Obstacle::Circle { center, radius } => {
                let (dx, dy) = (p[0] - center[0], p[1] - center[1]);
                let dist = dx.hypot(dy);
                let depth = radius + margin - dist;
                if dist == 0.0 {
                    (depth, [-1.0, 0.0])
                } else {
                    (depth, [-dx / dist, -dy / dist])
                }
            }
        }
    }

    /// Positive part of [`signed_depth`](Self::signed_depth): zero outside the obstacle.
    pub fn penetration(&self, p: [f64; 2], margin: f64) -> f64 {
        self.signed_depth(p, margin).0.max(0.0)
    }

    pub fn contains(&self, p: [f64; 2], margin: f64) -> bool {
        self.signed_depth(p, margin).0 > 0.0
    }
}

fn signed_area(vertices: &[[f64; 2]]) -> f64 {
    let n = vertices.len();
    0.5 * (0..n)
        .map(|j| {
            let a = vertices[j];
            let b = vertices[(j + 1) % n];
            a[0] * b[1] - b[0] * a[1]
        })
        .sum::<f64>()
}

fn cross(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - b[1]) - (b[1] - a[1]) * (c[0] - b[0])
}
