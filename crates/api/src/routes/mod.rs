//! HTTP handlers

pub mod admin;
pub mod audio;
pub mod faces;
pub mod gaze;
pub mod health;
pub mod objects;
pub mod teacher;

use alerting::{Alert, AlertKind};
use frame::VideoFrame;
use serde::Deserialize;
use serde_json::Value;

use crate::error::AppError;
use crate::metrics::ALERTS_TOTAL;
use crate::AppState;

/// `?student_id=..&exam_id=..` on frame uploads
#[derive(Debug, Default, Deserialize)]
pub struct ExamQuery {
    pub student_id: Option<String>,
    pub exam_id: Option<String>,
}

impl ExamQuery {
    /// Both ids, which must be present and non-blank
    pub fn require(&self) -> Result<(&str, &str), AppError> {
        Ok((required(self.student_id.as_deref(), "student_id")?, required(self.exam_id.as_deref(), "exam_id")?))
    }

    /// Both ids when both are given; alerts are only raised for known sessions
    pub fn session(&self) -> Option<(&str, &str)> {
        self.require().ok()
    }
}

pub(crate) fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, AppError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::missing(field))
}

pub(crate) fn decode_frame(bytes: &[u8]) -> Result<VideoFrame, AppError> {
    Ok(frame::decode(bytes)?)
}

/// Run CPU-heavy work (decoding, recognizer training) off the async workers
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::internal(format!("worker task failed: {}", e)))
}

/// Build, persist and count an alert; returns whether it was stored
pub(crate) async fn raise_alert(
    state: &AppState,
    student_id: &str,
    exam_id: &str,
    kind: AlertKind,
    reason: Vec<String>,
    raw_metrics: Value,
) -> bool {
    let alert = Alert::new(student_id, exam_id, kind, reason, raw_metrics);
    let stored = state.alerts.record(&alert).await;
    ::metrics::counter!(
        ALERTS_TOTAL,
        "kind" => kind.as_str(),
        "stored" => if stored { "true" } else { "false" }
    )
    .increment(1);
    stored
}
