//! Face region detection seam

use frame::Region;
use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::FaceAuthError;

/// Face bounding box as reported by a detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub bbox: Region,
    pub confidence: f32,
}

impl FaceRegion {
    pub fn new(bbox: Region, confidence: f32) -> Self {
        Self { bbox, confidence }
    }
}

/// Pluggable face detector (Haar cascade, BlazeFace, ...)
pub trait FaceRegionDetector: Send + Sync {
    /// Face regions in the image, best first
    fn detect(&self, image: &GrayImage) -> Result<Vec<FaceRegion>, FaceAuthError>;
}

/// Treats any image with enough contrast as a single centred face.
///
/// Used when no face model is configured: clients already send a tight
/// webcam crop, and blank frames still come back as "no face".
#[derive(Debug, Clone)]
pub struct WholeFrameDetector {
    min_contrast: f32,
}

impl WholeFrameDetector {
    pub fn new(min_contrast: f32) -> Self {
        Self { min_contrast }
    }
}

impl Default for WholeFrameDetector {
    fn default() -> Self {
        Self::new(4.0)
    }
}

fn std_dev(image: &GrayImage) -> f32 {
    let n = image.pixels().len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mean = image.pixels().map(|p| p[0] as f64).sum::<f64>() / n;
    let var = image
        .pixels()
        .map(|p| {
            let d = p[0] as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    var.sqrt() as f32
}

impl FaceRegionDetector for WholeFrameDetector {
    fn detect(&self, image: &GrayImage) -> Result<Vec<FaceRegion>, FaceAuthError> {
        if image.width() == 0 || image.height() == 0 || std_dev(image) < self.min_contrast {
            return Ok(Vec::new());
        }
        Ok(vec![FaceRegion::new(Region::full(image.width(), image.height()), 1.0)])
    }
}

/// Exactly-one-face precondition for enrollment and verification
pub struct FaceGate;

impl FaceGate {
    pub fn single(regions: &[FaceRegion]) -> Result<FaceRegion, FaceAuthError> {
        match regions {
            [] => Err(FaceAuthError::NoFace),
            [only] => Ok(*only),
            many => Err(FaceAuthError::MultipleFaces(many.len())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_blank_image_has_no_face() {
        let blank = GrayImage::from_pixel(64, 64, Luma([128]));
        assert!(WholeFrameDetector::default().detect(&blank).unwrap().is_empty());
        assert!(WholeFrameDetector::default().detect(&GrayImage::new(0, 0)).unwrap().is_empty());
    }

    #[test]
    fn test_textured_image_is_one_face() {
        let img = GrayImage::from_fn(40, 30, |x, _| Luma([(x * 6) as u8]));
        let faces = WholeFrameDetector::default().detect(&img).unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].bbox, Region::full(40, 30));
    }

    #[test]
    fn test_gate() {
        let face = FaceRegion::new(Region::new(0.0, 0.0, 10.0, 10.0), 0.9);
        assert!(matches!(FaceGate::single(&[]), Err(FaceAuthError::NoFace)));
        assert_eq!(FaceGate::single(&[face]).unwrap(), face);
        assert!(matches!(
            FaceGate::single(&[face, face, face]),
            Err(FaceAuthError::MultipleFaces(3))
        ));
    }
}
