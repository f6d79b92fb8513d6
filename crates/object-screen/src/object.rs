//! Object detection and forbidden object screening

use std::collections::HashSet;

use frame::VideoFrame;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ObjectScreenConfig, ObjectScreenError};

/// Detected object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    /// Class name as reported by the detector (COCO names, e.g. "cell phone")
    #[serde(alias = "name")]
    pub label: String,

    /// Detection confidence
    pub confidence: f32,

    /// Bounding box [x1, y1, x2, y2]
    #[serde(default)]
    pub bbox: Option<[f32; 4]>,
}

impl DetectedObject {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox: None,
        }
    }
}

/// Object detector (YOLO or similar)
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, frame: &VideoFrame) -> Result<Vec<DetectedObject>, ObjectScreenError>;
}

/// Detector used when no object model is configured
#[derive(Debug, Default)]
pub struct NoObjectDetector;

impl ObjectDetector for NoObjectDetector {
    fn detect(&self, _frame: &VideoFrame) -> Result<Vec<DetectedObject>, ObjectScreenError> {
        Ok(Vec::new())
    }
}

/// Screening outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ObjectVerdict {
    Clear,
    #[serde(rename = "forbidden_object")]
    Forbidden { objects: Vec<String> },
}

impl ObjectVerdict {
    pub fn is_forbidden(&self) -> bool {
        matches!(self, ObjectVerdict::Forbidden { .. })
    }
}

/// Filters detections down to the forbidden ones
#[derive(Debug, Clone)]
pub struct ObjectScreen {
    min_confidence: f32,
    forbidden: HashSet<String>,
}

impl ObjectScreen {
    pub fn new(config: &ObjectScreenConfig) -> Result<Self, ObjectScreenError> {
        if !(0.0..=1.0).contains(&config.min_confidence) {
            return Err(ObjectScreenError::InvalidConfig(format!(
                "min_confidence {} outside [0, 1]",
                config.min_confidence
            )));
        }
        Ok(Self {
            min_confidence: config.min_confidence,
            forbidden: config
                .forbidden_labels
                .iter()
                .map(|l| l.trim().to_lowercase())
                .collect(),
        })
    }

    pub fn is_forbidden(&self, label: &str) -> bool {
        self.forbidden.contains(&label.trim().to_lowercase())
    }

    /// Screen detections; forbidden labels come back de-duplicated in first-seen order
    pub fn screen(&self, detections: &[DetectedObject]) -> ObjectVerdict {
        let mut seen = HashSet::new();
        let objects: Vec<String> = detections
            .iter()
            .filter(|d| d.confidence > self.min_confidence)
            .filter(|d| self.is_forbidden(&d.label))
            .filter(|d| seen.insert(d.label.clone()))
            .map(|d| d.label.clone())
            .collect();

        debug!(
            "Screened {} detections, {} forbidden",
            detections.len(),
            objects.len()
        );

        if objects.is_empty() {
            ObjectVerdict::Clear
        } else {
            ObjectVerdict::Forbidden { objects }
        }
    }

    /// Detect and screen in one step
    pub fn screen_frame(
        &self,
        detector: &dyn ObjectDetector,
        frame: &VideoFrame,
    ) -> Result<ObjectVerdict, ObjectScreenError> {
        let detections = detector.detect(frame)?;
        Ok(self.screen(&detections))
    }
}

impl Default for ObjectScreen {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            forbidden: ["cell phone", "laptop"].into_iter().map(String::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_clear_when_nothing_forbidden() {
        let screen = ObjectScreen::default();
        let detections = [DetectedObject::new("person", 0.99), DetectedObject::new("book", 0.8)];
        assert_eq!(screen.screen(&detections), ObjectVerdict::Clear);
        assert_eq!(screen.screen(&[]), ObjectVerdict::Clear);
    }

    #[test]
    fn test_forbidden_dedup_first_seen() {
        let screen = ObjectScreen::default();
        let detections = [
            DetectedObject::new("laptop", 0.7),
            DetectedObject::new("person", 0.9),
            DetectedObject::new("cell phone", 0.6),
            DetectedObject::new("laptop", 0.95),
        ];
        assert_eq!(
            screen.screen(&detections),
            ObjectVerdict::Forbidden {
                objects: vec!["laptop".into(), "cell phone".into()]
            }
        );
    }

    #[test]
    fn test_confidence_must_exceed_threshold() {
        let screen = ObjectScreen::default();
        assert_eq!(screen.screen(&[DetectedObject::new("cell phone", 0.5)]), ObjectVerdict::Clear);
        assert!(screen.screen(&[DetectedObject::new("cell phone", 0.51)]).is_forbidden());
    }

    #[test]
    fn test_custom_config() {
        let screen = ObjectScreen::new(&ObjectScreenConfig::strict()).unwrap();
        assert!(screen.screen(&[DetectedObject::new("book", 0.4)]).is_forbidden());

        let bad = ObjectScreenConfig {
            min_confidence: 1.5,
            ..Default::default()
        };
        assert!(ObjectScreen::new(&bad).is_err());
    }

    #[test]
    fn test_verdict_wire_format() {
        let json = serde_json::to_value(ObjectVerdict::Forbidden {
            objects: vec!["laptop".into()],
        })
        .unwrap();
        assert_eq!(json["status"], "forbidden_object");
        assert_eq!(json["objects"][0], "laptop");

        let parsed: DetectedObject =
            serde_json::from_str(r#"{"name": "cell phone", "confidence": 0.9}"#).unwrap();
        assert_eq!(parsed.label, "cell phone");
    }

    #[test]
    fn test_no_detector_is_clear() {
        let frame = VideoFrame::new(frame::DynamicImage::new_rgb8(2, 2));
        let verdict = ObjectScreen::default().screen_frame(&NoObjectDetector, &frame).unwrap();
        assert_eq!(verdict, ObjectVerdict::Clear);
    }

    proptest! {
        #[test]
        fn prop_reported_objects_are_unique_and_forbidden(
            picks in proptest::collection::vec((0usize..4, 0.0f32..1.0), 0..20)
        ) {
            let labels = ["cell phone", "laptop", "person", "cup"];
            let detections: Vec<_> = picks
                .iter()
                .map(|&(i, c)| DetectedObject::new(labels[i], c))
                .collect();
            match ObjectScreen::default().screen(&detections) {
                ObjectVerdict::Clear => {}
                ObjectVerdict::Forbidden { objects } => {
                    let unique: HashSet<_> = objects.iter().collect();
                    prop_assert_eq!(unique.len(), objects.len());
                    prop_assert!(objects.iter().all(|o| o == "cell phone" || o == "laptop"));
                }
            }
        }
    }
}
