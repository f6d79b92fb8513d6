//! Gaze scoring configuration

use serde::{Deserialize, Serialize};

/// Gaze scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeConfig {
    /// Yaw beyond which the student is looking left/right (degrees)
    pub yaw_threshold_degrees: f32,

    /// Pitch beyond which the student is looking up/down (degrees)
    pub pitch_threshold_degrees: f32,

    /// Roll beyond which the head counts as tilted (degrees)
    pub roll_threshold_degrees: f32,

    /// Levenberg-Marquardt iteration cap per start
    pub max_iterations: usize,

    /// Largest accepted RMS reprojection error, as a fraction of the
    /// observed eye-corner span
    pub max_reprojection_error: f64,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            yaw_threshold_degrees: 30.0,
            pitch_threshold_degrees: 20.0,
            roll_threshold_degrees: 30.0,
            max_iterations: 100,
            max_reprojection_error: 0.15,
        }
    }
}

impl GazeConfig {
    /// Create strict config (lower thresholds)
    pub fn strict() -> Self {
        Self {
            yaw_threshold_degrees: 20.0,
            pitch_threshold_degrees: 15.0,
            roll_threshold_degrees: 20.0,
            ..Default::default()
        }
    }

    /// Create lenient config (higher thresholds)
    pub fn lenient() -> Self {
        Self {
            yaw_threshold_degrees: 45.0,
            pitch_threshold_degrees: 30.0,
            roll_threshold_degrees: 45.0,
            ..Default::default()
        }
    }
}
