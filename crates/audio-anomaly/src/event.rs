//! Live audio events pushed to the proctor stream

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AnomalyReason, AudioVerdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioStatus {
    AnomalyDetected,
    Clear,
}

/// Metrics carried with every event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioMetrics {
    pub volume_level: f32,
    pub peak_count: usize,
    pub peak_ratio: f32,
    pub reasons: Vec<AnomalyReason>,
}

/// One classified audio window for the live dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioEvent {
    pub student_id: String,
    pub exam_id: String,
    pub status: AudioStatus,
    pub metrics: AudioMetrics,
    pub timestamp: DateTime<Utc>,
}

impl AudioEvent {
    pub fn from_verdict(
        student_id: impl Into<String>,
        exam_id: impl Into<String>,
        volume_level: f32,
        verdict: &AudioVerdict,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            exam_id: exam_id.into(),
            status: if verdict.anomaly {
                AudioStatus::AnomalyDetected
            } else {
                AudioStatus::Clear
            },
            metrics: AudioMetrics {
                volume_level,
                peak_count: verdict.peak_count,
                peak_ratio: verdict.peak_ratio,
                reasons: verdict.reasons.clone(),
            },
            timestamp: Utc::now(),
        }
    }

    pub fn is_anomaly(&self) -> bool {
        self.status == AudioStatus::AnomalyDetected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AudioAnomalyClassifier, AudioFeatures};

    #[test]
    fn test_event_from_verdict() {
        let features = AudioFeatures {
            volume_level: 0.6,
            ..Default::default()
        };
        let verdict = AudioAnomalyClassifier::default().classify(&features).unwrap();
        let event = AudioEvent::from_verdict("s1", "exam", features.volume_level, &verdict);

        assert!(event.is_anomaly());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "anomaly_detected");
        assert_eq!(json["metrics"]["reasons"][0], "very_high_volume");
        assert_eq!(json["student_id"], "s1");
    }
}
