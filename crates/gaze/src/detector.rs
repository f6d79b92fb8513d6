//! Facial landmark detection seam

use frame::VideoFrame;
use tracing::warn;

use crate::GazeError;

/// Number of landmarks the pose solver consumes
pub const LANDMARK_COUNT: usize = 6;

/// Face-mesh indices for the solver's landmarks, in solver order:
/// nose tip, chin, image-left eye corner, image-right eye corner,
/// image-left mouth corner, image-right mouth corner (unmirrored webcam).
pub const FACE_MESH_INDICES: [usize; LANDMARK_COUNT] = [1, 152, 33, 263, 57, 287];

/// Six (x, y) pixel positions in solver order
pub type Landmarks = Vec<(f32, f32)>;

/// Pluggable landmark detector (face mesh, dlib, ONNX, ...)
pub trait LandmarkDetector: Send + Sync {
    /// Landmark sets for every face found in the frame, best first
    fn detect(&self, frame: &VideoFrame) -> Result<Vec<Landmarks>, GazeError>;
}

/// Detector used when no landmark model is configured; never finds a face
#[derive(Debug, Default)]
pub struct NoLandmarkDetector;

impl LandmarkDetector for NoLandmarkDetector {
    fn detect(&self, _frame: &VideoFrame) -> Result<Vec<Landmarks>, GazeError> {
        Ok(Vec::new())
    }
}

/// Pick the solver landmarks out of a normalised face mesh (coordinates in 0..1)
pub fn from_face_mesh(mesh: &[(f32, f32)], width: u32, height: u32) -> Option<Landmarks> {
    let points: Option<Landmarks> = FACE_MESH_INDICES
        .iter()
        .map(|&idx| mesh.get(idx).map(|&(x, y)| (x * width as f32, y * height as f32)))
        .collect();
    if points.is_none() {
        warn!("Face mesh with {} points is too small for pose scoring", mesh.len());
    }
    points
}
