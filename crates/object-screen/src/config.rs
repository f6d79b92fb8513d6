//! Object screening configuration

use serde::{Deserialize, Serialize};

/// Object screening configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectScreenConfig {
    /// Detections at or below this confidence are ignored
    pub min_confidence: f32,

    /// Labels that raise an alert when seen
    pub forbidden_labels: Vec<String>,

    /// Optional detector model path; no model means nothing is ever detected
    pub model_path: Option<String>,
}

impl Default for ObjectScreenConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            forbidden_labels: vec!["cell phone".to_string(), "laptop".to_string()],
            model_path: None,
        }
    }
}

impl ObjectScreenConfig {
    /// Create strict config (more labels, lower confidence bar)
    pub fn strict() -> Self {
        Self {
            min_confidence: 0.35,
            forbidden_labels: ["cell phone", "laptop", "book", "remote", "tablet"]
                .into_iter()
                .map(String::from)
                .collect(),
            model_path: None,
        }
    }
}
