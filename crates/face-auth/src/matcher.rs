//! Identity verification against the enrollment store

use std::sync::Arc;

use frame::{gray_patch, Region};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::detector::FaceRegion;
use crate::enrollment::FaceEnrollmentStore;
use crate::StudentId;

/// Verdict for a claimed identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IdentityVerdict {
    Match,
    /// Student the recognizer predicted; `None` when no usable prediction
    /// was made or its label is no longer enrolled
    Mismatch { predicted: Option<StudentId> },
    NotRegistered,
    NotTrained,
}

impl IdentityVerdict {
    pub fn status(&self) -> &'static str {
        match self {
            IdentityVerdict::Match => "match",
            IdentityVerdict::Mismatch { .. } => "mismatch",
            IdentityVerdict::NotRegistered => "not_registered",
            IdentityVerdict::NotTrained => "not_trained",
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, IdentityVerdict::Match)
    }
}

/// Verdict plus the recognizer distance it was based on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityJudgment {
    #[serde(flatten)]
    pub verdict: IdentityVerdict,
    pub confidence: Option<f32>,
}

impl IdentityJudgment {
    fn bare(verdict: IdentityVerdict) -> Self {
        Self {
            verdict,
            confidence: None,
        }
    }
}

/// Identity of one detected face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionIdentity {
    pub student: Option<StudentId>,
    pub confidence: Option<f32>,
    pub bbox: Region,
}

/// Answers "is this face the claimed student?"
#[derive(Clone)]
pub struct FaceMatcher {
    store: Arc<FaceEnrollmentStore>,
    acceptance_threshold: f32,
}

impl FaceMatcher {
    pub fn new(store: Arc<FaceEnrollmentStore>) -> Self {
        let acceptance_threshold = store.config().acceptance_threshold;
        Self {
            store,
            acceptance_threshold,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.acceptance_threshold = threshold;
        self
    }

    pub fn store(&self) -> &Arc<FaceEnrollmentStore> {
        &self.store
    }

    /// Judge a single-face patch against the claimed student
    pub fn identify(&self, face_patch: &GrayImage, claimed: &str) -> IdentityJudgment {
        let snapshot = self.store.snapshot();
        let Some(claimed_label) = snapshot.label_of(claimed) else {
            return IdentityJudgment::bare(IdentityVerdict::NotRegistered);
        };

        let model = snapshot.model();
        if model.is_empty() {
            return IdentityJudgment::bare(IdentityVerdict::NotTrained);
        }

        let patch = self.store.normalise(face_patch);
        let Some(prediction) = model.predict(&patch) else {
            return IdentityJudgment::bare(IdentityVerdict::Mismatch { predicted: None });
        };

        debug!(
            "Claimed {} (label {}), predicted label {} at distance {:.1}",
            claimed, claimed_label, prediction.label, prediction.distance
        );

        let verdict = if prediction.distance < self.acceptance_threshold && prediction.label == claimed_label {
            IdentityVerdict::Match
        } else {
            IdentityVerdict::Mismatch {
                predicted: snapshot.student_of(prediction.label),
            }
        };

        IdentityJudgment {
            verdict,
            confidence: Some(prediction.distance),
        }
    }

    /// Identify every detected face in a gray frame
    pub fn identify_any(&self, gray: &GrayImage, regions: &[FaceRegion]) -> Vec<RegionIdentity> {
        let snapshot = self.store.snapshot();
        let model = snapshot.model();
        let size = self.store.config().patch_size;

        regions
            .iter()
            .map(|region| {
                let prediction = if model.is_empty() {
                    None
                } else {
                    gray_patch(gray, &region.bbox, size).and_then(|patch| model.predict(&patch))
                };
                let student = prediction
                    .filter(|p| p.distance < self.acceptance_threshold)
                    .and_then(|p| snapshot.student_of(p.label));
                RegionIdentity {
                    student,
                    confidence: prediction.map(|p| p.distance),
                    bbox: region.bbox,
                }
            })
            .collect()
    }
}
