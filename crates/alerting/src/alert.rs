//! Alert records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// What raised the alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Gaze,
    Object,
    Audio,
    Identity,
    Termination,
    ManualFlag,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Gaze => "gaze",
            AlertKind::Object => "object",
            AlertKind::Audio => "audio",
            AlertKind::Identity => "identity",
            AlertKind::Termination => "termination",
            AlertKind::ManualFlag => "manual_flag",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proctoring alert. Never updated once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub student_id: String,
    pub exam_id: String,
    pub kind: AlertKind,
    /// Machine-readable reason tags, most significant first
    pub reason: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Raw detector output kept for audit
    #[serde(default)]
    pub raw_metrics: Value,
}

impl Alert {
    pub fn new(
        student_id: impl Into<String>,
        exam_id: impl Into<String>,
        kind: AlertKind,
        reason: Vec<String>,
        raw_metrics: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id: student_id.into(),
            exam_id: exam_id.into(),
            kind,
            reason,
            created_at: Utc::now(),
            raw_metrics,
        }
    }
}
