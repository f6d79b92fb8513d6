//! Video frame types and processing

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::FrameError;

/// Axis-aligned region of a frame in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Region {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Region covering a whole `width` x `height` frame
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    /// Clamp to the frame and round to whole pixels.
    ///
    /// Returns `None` when nothing of the region is left inside the frame.
    pub fn to_pixels(&self, frame_width: u32, frame_height: u32) -> Option<(u32, u32, u32, u32)> {
        if !(self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()) {
            return None;
        }
        let x0 = self.x.max(0.0).floor() as u32;
        let y0 = self.y.max(0.0).floor() as u32;
        let x1 = ((self.x + self.width).ceil().max(0.0) as u32).min(frame_width);
        let y1 = ((self.y + self.height).ceil().max(0.0) as u32).min(frame_height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }
}

/// Decoded webcam snapshot, kept in whatever pixel layout it arrived in
#[derive(Debug, Clone)]
pub struct VideoFrame {
    image: DynamicImage,
}

impl VideoFrame {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Whether the frame holds no pixels
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Decoded pixels, for detector backends
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Luma conversion for face recognition
    pub fn to_grayscale(&self) -> GrayImage {
        self.image.to_luma8()
    }
}

/// Decode an uploaded snapshot (JPEG, PNG, WebP, ...) into an RGB frame
pub fn decode(bytes: &[u8]) -> Result<VideoFrame, FrameError> {
    if bytes.is_empty() {
        return Err(FrameError::Empty);
    }

    let img = image::load_from_memory(bytes).map_err(|e| FrameError::Decode(e.to_string()))?;
    let frame = VideoFrame::new(img);
    if frame.is_empty() {
        return Err(FrameError::Empty);
    }

    debug!("Decoded {}x{} frame ({} bytes)", frame.width(), frame.height(), bytes.len());
    Ok(frame)
}

/// Cut `region` out of a grayscale image and resize it to a `size` x `size` patch
pub fn gray_patch(gray: &GrayImage, region: &Region, size: u32) -> Option<GrayImage> {
    let (x, y, w, h) = region.to_pixels(gray.width(), gray.height())?;
    let cropped = imageops::crop_imm(gray, x, y, w, h).to_image();
    if cropped.dimensions() == (size, size) {
        return Some(cropped);
    }
    Some(imageops::resize(&cropped, size, size, FilterType::Triangle))
}
