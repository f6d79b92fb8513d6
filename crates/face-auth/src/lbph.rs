//! Local Binary Pattern Histogram recognizer
//!
//! Each face patch is turned into a circular LBP code image, split into a
//! grid of cells, and summarised as one normalised histogram per cell.
//! Two faces are compared with the chi-square distance between their
//! concatenated histograms, scaled so that identical faces score 0 and
//! completely disjoint ones score 100.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{FaceAuthError, LabelId};

/// Bump when the serialized layout changes
pub const MODEL_FORMAT_VERSION: u16 = 1;

/// LBPH layout parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LbphParams {
    pub grid_x: u32,
    pub grid_y: u32,
    pub radius: u32,
    pub neighbors: u32,
}

impl Default for LbphParams {
    fn default() -> Self {
        Self {
            grid_x: 8,
            grid_y: 8,
            radius: 1,
            neighbors: 8,
        }
    }
}

impl LbphParams {
    pub fn validate(&self) -> Result<(), FaceAuthError> {
        if self.grid_x == 0 || self.grid_y == 0 {
            return Err(FaceAuthError::InvalidConfig("LBPH grid must be at least 1x1".into()));
        }
        if self.radius == 0 {
            return Err(FaceAuthError::InvalidConfig("LBPH radius must be positive".into()));
        }
        if !(1..=8).contains(&self.neighbors) {
            return Err(FaceAuthError::InvalidConfig(format!(
                "LBPH neighbors must be 1..=8, got {}",
                self.neighbors
            )));
        }
        Ok(())
    }

    fn bins(&self) -> usize {
        1usize << self.neighbors
    }

    fn cells(&self) -> usize {
        (self.grid_x * self.grid_y) as usize
    }

    /// Length of one spatial histogram
    pub fn histogram_len(&self) -> usize {
        self.bins() * self.cells()
    }

    /// Smallest square patch that still yields a histogram
    pub fn min_patch_size(&self) -> u32 {
        2 * self.radius + self.grid_x.max(self.grid_y)
    }
}

/// Circular LBP codes; the output is `radius` pixels smaller on every side
fn lbp_codes(img: &GrayImage, params: &LbphParams) -> Option<(Vec<u8>, u32, u32)> {
    let r = params.radius;
    let (w, h) = img.dimensions();
    if w <= 2 * r || h <= 2 * r {
        return None;
    }
    let out_w = w - 2 * r;
    let out_h = h - 2 * r;

    // Sample offsets with bilinear weights, shared by every pixel
    let samples: Vec<(f32, f32)> = (0..params.neighbors)
        .map(|n| {
            let angle = 2.0 * std::f32::consts::PI * n as f32 / params.neighbors as f32;
            (r as f32 * angle.cos(), -(r as f32) * angle.sin())
        })
        .collect();

    let px = |x: i64, y: i64| img.get_pixel(x as u32, y as u32)[0] as f32;

    let mut codes = vec![0u8; (out_w * out_h) as usize];
    for y in 0..out_h {
        for x in 0..out_w {
            let cx = (x + r) as i64;
            let cy = (y + r) as i64;
            let center = px(cx, cy);
            let mut code = 0u8;
            for (bit, &(dx, dy)) in samples.iter().enumerate() {
                let sx = cx as f32 + dx;
                let sy = cy as f32 + dy;
                let x0 = sx.floor();
                let y0 = sy.floor();
                let tx = sx - x0;
                let ty = sy - y0;
                let (x0, y0) = (x0 as i64, y0 as i64);
                let x1 = (x0 + 1).min(w as i64 - 1);
                let y1 = (y0 + 1).min(h as i64 - 1);
                let value = (1.0 - tx) * (1.0 - ty) * px(x0, y0)
                    + tx * (1.0 - ty) * px(x1, y0)
                    + (1.0 - tx) * ty * px(x0, y1)
                    + tx * ty * px(x1, y1);
                // Small epsilon keeps exact interpolation ties stable
                if value + 1e-4 >= center {
                    code |= 1 << bit;
                }
            }
            codes[(y * out_w + x) as usize] = code;
        }
    }
    Some((codes, out_w, out_h))
}

/// Spatial LBP histogram of a face patch, one normalised histogram per grid cell
pub fn compute_histogram(img: &GrayImage, params: &LbphParams) -> Option<Vec<f32>> {
    let (codes, w, h) = lbp_codes(img, params)?;
    if w < params.grid_x || h < params.grid_y {
        return None;
    }
    let bins = params.bins();
    let mut hist = vec![0f32; params.histogram_len()];

    for gy in 0..params.grid_y {
        let y0 = gy * h / params.grid_y;
        let y1 = (gy + 1) * h / params.grid_y;
        for gx in 0..params.grid_x {
            let x0 = gx * w / params.grid_x;
            let x1 = (gx + 1) * w / params.grid_x;
            let offset = ((gy * params.grid_x + gx) as usize) * bins;
            let cell = &mut hist[offset..offset + bins];
            for y in y0..y1 {
                for x in x0..x1 {
                    cell[codes[(y * w + x) as usize] as usize] += 1.0;
                }
            }
            let total: f32 = cell.iter().sum();
            if total > 0.0 {
                cell.iter_mut().for_each(|v| *v /= total);
            }
        }
    }
    Some(hist)
}

/// Symmetric chi-square distance scaled to [0, 100]
pub fn chi_square(a: &[f32], b: &[f32], cells: usize) -> f32 {
    if cells == 0 {
        return 100.0;
    }
    let raw: f32 = a
        .iter()
        .zip(b)
        .map(|(&p, &q)| {
            let sum = p + q;
            if sum > f32::EPSILON {
                (p - q) * (p - q) / sum
            } else {
                0.0
            }
        })
        .sum();
    // Each normalised cell contributes at most 2
    (raw * 100.0 / (2.0 * cells as f32)).clamp(0.0, 100.0)
}

/// One trained sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LbphEntry {
    pub label: LabelId,
    pub histogram: Vec<f32>,
}

/// Nearest-neighbour prediction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: LabelId,
    /// LBPH distance, lower is more similar
    pub distance: f32,
}

/// Trained recognizer state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LbphModel {
    version: u16,
    params: LbphParams,
    entries: Vec<LbphEntry>,
}

impl LbphModel {
    /// Model with no training data; predicts nothing
    pub fn empty(params: LbphParams) -> Self {
        Self {
            version: MODEL_FORMAT_VERSION,
            params,
            entries: Vec::new(),
        }
    }

    /// Build a model from labelled face patches.
    ///
    /// Patches too small for the LBP grid are left out of the model.
    pub fn train<'a, I>(params: LbphParams, samples: I) -> Result<Self, FaceAuthError>
    where
        I: IntoIterator<Item = (LabelId, &'a GrayImage)>,
    {
        params.validate()?;
        let mut entries = Vec::new();
        for (label, patch) in samples {
            match compute_histogram(patch, &params) {
                Some(histogram) => entries.push(LbphEntry { label, histogram }),
                None => warn!(
                    "Face patch {}x{} for label {} is too small for the recognizer; skipped",
                    patch.width(),
                    patch.height(),
                    label
                ),
            }
        }
        debug!("Trained LBPH model with {} samples", entries.len());
        Ok(Self {
            version: MODEL_FORMAT_VERSION,
            params,
            entries,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn params(&self) -> &LbphParams {
        &self.params
    }

    pub fn labels(&self) -> impl Iterator<Item = LabelId> + '_ {
        self.entries.iter().map(|e| e.label)
    }

    /// Closest trained sample, or `None` when untrained or the patch is unusable
    pub fn predict(&self, patch: &GrayImage) -> Option<Prediction> {
        if self.entries.is_empty() {
            return None;
        }
        let query = compute_histogram(patch, &self.params)?;
        let cells = self.params.cells();
        self.entries
            .iter()
            .map(|e| Prediction {
                label: e.label,
                distance: chi_square(&query, &e.histogram, cells),
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    pub fn serialize(&self) -> Result<Vec<u8>, FaceAuthError> {
        postcard::to_allocvec(self).map_err(|e| FaceAuthError::Model(e.to_string()))
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, FaceAuthError> {
        let model: Self =
            postcard::from_bytes(bytes).map_err(|e| FaceAuthError::Model(e.to_string()))?;
        if model.version != MODEL_FORMAT_VERSION {
            return Err(FaceAuthError::Model(format!(
                "unsupported model format version {}",
                model.version
            )));
        }
        model.params.validate()?;
        let expected = model.params.histogram_len();
        if model.entries.iter().any(|e| e.histogram.len() != expected) {
            return Err(FaceAuthError::Model("histogram length mismatch".into()));
        }
        Ok(model)
    }
}
