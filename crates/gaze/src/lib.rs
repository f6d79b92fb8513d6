//! Gaze Scoring
//!
//! Head pose estimation for exam proctoring:
//! - Perspective-n-point fit of a canonical face model to six landmarks
//! - Yaw/pitch/roll decomposition
//! - Discrete gaze direction labels with a fixed priority order

pub mod analysis;
pub mod config;
pub mod detector;
pub mod pose;

pub use analysis::{GazeAnalysis, GazeDirection, HeadPose};
pub use config::GazeConfig;
pub use detector::{from_face_mesh, LandmarkDetector, Landmarks, NoLandmarkDetector, LANDMARK_COUNT};

use frame::VideoFrame;
use pose::{CameraIntrinsics, SolverSettings};
use thiserror::Error;
use tracing::{debug, warn};

/// Gaze error types
#[derive(Error, Debug)]
pub enum GazeError {
    #[error("Invalid landmarks: {0}")]
    InvalidLandmarks(String),

    #[error("Landmark detection failed: {0}")]
    Detection(String),
}

/// Maps facial landmarks to head pose angles and a gaze label
#[derive(Debug, Clone, Default)]
pub struct GeometryScorer {
    config: GazeConfig,
}

impl GeometryScorer {
    pub fn new(config: GazeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GazeConfig {
        &self.config
    }

    /// Score one face.
    ///
    /// An empty landmark slice is the "No face detected" terminal state.
    /// Degenerate geometry falls back to the same state instead of failing.
    pub fn score(
        &self,
        landmarks: &[(f32, f32)],
        frame_width: u32,
        frame_height: u32,
    ) -> Result<GazeAnalysis, GazeError> {
        if landmarks.is_empty() {
            return Ok(GazeAnalysis::no_face());
        }
        if landmarks.len() != LANDMARK_COUNT {
            return Err(GazeError::InvalidLandmarks(format!(
                "expected {} points, got {}",
                LANDMARK_COUNT,
                landmarks.len()
            )));
        }
        if frame_width == 0 || frame_height == 0 {
            return Err(GazeError::InvalidLandmarks(format!(
                "frame size {}x{} is empty",
                frame_width, frame_height
            )));
        }
        if landmarks.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(GazeError::InvalidLandmarks(
                "coordinates must be finite".to_string(),
            ));
        }

        let mut observed = [[0.0f64; 2]; LANDMARK_COUNT];
        for (dst, &(x, y)) in observed.iter_mut().zip(landmarks) {
            *dst = [x as f64, y as f64];
        }

        let camera = CameraIntrinsics::for_frame(frame_width, frame_height);
        let settings = SolverSettings {
            max_iterations: self.config.max_iterations,
            max_relative_error: self.config.max_reprojection_error,
        };

        let Some(solution) = pose::solve(&observed, &camera, &settings) else {
            warn!("Head pose solve was degenerate; reporting no face");
            return Ok(GazeAnalysis::no_face());
        };

        let (pitch, yaw, roll) = solution.pose.euler_degrees();
        let head_pose = HeadPose {
            yaw: yaw as f32,
            pitch: pitch as f32,
            roll: roll as f32,
        };
        let direction = GazeDirection::classify(&head_pose, &self.config);
        debug!(
            "Head pose yaw={:.1} pitch={:.1} roll={:.1} rms={:.2}px -> {}",
            yaw, pitch, roll, solution.rms_error, direction.label()
        );

        Ok(GazeAnalysis { direction, head_pose })
    }

    /// Run the landmark detector on a frame and score the first face
    pub fn score_frame(
        &self,
        detector: &dyn LandmarkDetector,
        frame: &VideoFrame,
    ) -> Result<GazeAnalysis, GazeError> {
        if frame.is_empty() {
            return Ok(GazeAnalysis::no_face());
        }
        let faces = detector.detect(frame)?;
        match faces.first() {
            Some(landmarks) => self.score(landmarks, frame.width(), frame.height()),
            None => Ok(GazeAnalysis::no_face()),
        }
    }
}
