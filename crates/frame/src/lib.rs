//! Frame Input Library for Exam Proctoring
//!
//! Turns the raw image bytes posted by an exam client into pixel grids the
//! detectors can work with:
//! - Decoding of JPEG/PNG/WebP webcam snapshots
//! - Grayscale conversion for face recognition
//! - Region clamping and fixed-size patch extraction

pub mod frame;

pub use frame::{decode, gray_patch, Region, VideoFrame};
pub use image::{DynamicImage, GrayImage};

use thiserror::Error;

/// Frame error types
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Image payload is empty")]
    Empty,
}
