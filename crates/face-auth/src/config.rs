//! Face authentication configuration

use serde::{Deserialize, Serialize};

use crate::lbph::LbphParams;

/// Face authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceAuthConfig {
    /// Side length of the square gray patch every template is resized to
    pub patch_size: u32,

    /// Largest LBPH distance (0-100) still accepted as the same person
    pub acceptance_threshold: f32,

    /// Minimum gray-level standard deviation for the whole-frame detector
    /// to report a face
    pub min_face_contrast: f32,

    /// Recognizer layout
    pub lbph: LbphParams,
}

impl Default for FaceAuthConfig {
    fn default() -> Self {
        Self {
            patch_size: 200,
            acceptance_threshold: 70.0,
            min_face_contrast: 4.0,
            lbph: LbphParams::default(),
        }
    }
}

impl FaceAuthConfig {
    /// Create strict config (tighter acceptance)
    pub fn strict() -> Self {
        Self {
            acceptance_threshold: 50.0,
            ..Default::default()
        }
    }

    /// Create lenient config (looser acceptance)
    pub fn lenient() -> Self {
        Self {
            acceptance_threshold: 85.0,
            ..Default::default()
        }
    }
}
