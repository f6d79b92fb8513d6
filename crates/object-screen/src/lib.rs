//! Object Screening
//!
//! Flags forbidden objects (phones, laptops) in exam webcam frames.
//! Detection itself sits behind the `ObjectDetector` trait so a YOLO
//! backend can be plugged in; screening is pure filtering.

pub mod config;
pub mod object;

pub use config::ObjectScreenConfig;
pub use object::{DetectedObject, NoObjectDetector, ObjectDetector, ObjectScreen, ObjectVerdict};

use thiserror::Error;

/// Object screening error types
#[derive(Error, Debug)]
pub enum ObjectScreenError {
    #[error("Object detection failed: {0}")]
    Detection(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
