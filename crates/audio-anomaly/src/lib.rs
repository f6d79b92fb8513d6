//! Audio Anomaly Detection
//!
//! Scores client-reported audio summaries (volume and frequency peaks)
//! against an ordered threshold cascade. Both suspiciously quiet and
//! loud or speech-like windows are flagged.

pub mod classifier;
pub mod config;
pub mod event;

pub use classifier::{AnomalyReason, AudioAnomalyClassifier, AudioFeatures, AudioVerdict};
pub use config::AudioThresholds;
pub use event::{AudioEvent, AudioMetrics, AudioStatus};

use thiserror::Error;

/// Audio error types
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Audio feature out of range: {0}")]
    OutOfRange(String),
}
