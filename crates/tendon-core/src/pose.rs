//! Pose parsing for URDF `<origin>` elements

use serde::{Deserialize, Serialize};

/// Pose in 3D space: translation (meters) and roll/pitch/yaw (radians)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub xyz: [f64; 3],
    pub rpy: [f64; 3],
}

impl Pose {
    pub fn new(xyz: [f64; 3], rpy: [f64; 3]) -> Self {
        Self { xyz, rpy }
    }

    /// Build a pose from the optional `xyz` and `rpy` attribute strings.
    ///
    /// Missing or malformed attributes fall back to zero.
    pub fn from_attrs(xyz: Option<&str>, rpy: Option<&str>) -> Self {
        Self {
            xyz: xyz.and_then(parse_vec3).unwrap_or_default(),
            rpy: rpy.and_then(parse_vec3).unwrap_or_default(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.xyz == [0.0; 3] && self.rpy == [0.0; 3]
    }
}

/// Parse a whitespace separated triple such as `"0 0.1 -0.5"`
pub fn parse_vec3(s: &str) -> Option<[f64; 3]> {
    let parts: Vec<f64> = s
        .split_whitespace()
        .map(|p| p.parse().ok())
        .collect::<Option<Vec<f64>>>()?;
    if parts.len() == 3 {
        Some([parts[0], parts[1], parts[2]])
    } else {
        None
    }
}
