//! Teacher-only dashboard routes

use std::sync::Arc;

use alerting::{Alert, AlertKind, AlertQuery};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use face_auth::RemovalScope;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::{raise_alert, required};
use crate::auth::TeacherAuth;
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct AlertsResponse {
    pub count: usize,
    pub alerts: Vec<Alert>,
}

/// `GET /alerts?exam_id&student_id&kind&limit`, newest first
pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    _auth: TeacherAuth,
    query: Result<Query<AlertQuery>, QueryRejection>,
) -> Result<Json<AlertsResponse>, AppError> {
    let Query(query) = query?;
    let alerts = state.alerts.list(&query).await?;
    Ok(Json(AlertsResponse {
        count: alerts.len(),
        alerts,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub exam_id: Option<String>,
    /// Limit the reset to one student
    pub student_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub status: &'static str,
    pub alerts_deleted: u64,
    pub faces_removed: usize,
    pub audio_events_cleared: usize,
}

/// `POST /api/exam/reset`
///
/// Clears the exam's alerts and face templates. A whole-exam reset also
/// empties the live audio queue.
pub async fn reset_exam(
    State(state): State<Arc<AppState>>,
    auth: TeacherAuth,
    payload: Result<Json<ResetRequest>, JsonRejection>,
) -> Result<Json<ResetResponse>, AppError> {
    let Json(request) = payload?;
    let exam_id = required(request.exam_id.as_deref(), "exam_id")?;
    let student_id = request
        .student_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let alerts_deleted = state.alerts.reset(exam_id, student_id).await?;

    let scope = match student_id {
        Some(student_id) => RemovalScope::Student {
            exam_id: exam_id.to_string(),
            student_id: student_id.to_string(),
        },
        None => RemovalScope::Exam(exam_id.to_string()),
    };
    let worker = Arc::clone(&state);
    let faces_removed = super::run_blocking(move || worker.faces.store().remove_scope(&scope)).await??;

    let audio_events_cleared = match student_id {
        Some(_) => 0,
        None => state.audio_events.clear(),
    };

    info!(
        "Teacher {} reset exam {}{}: {} alerts, {} faces, {} audio events",
        auth.identity.username,
        exam_id,
        student_id.map(|s| format!(" for {}", s)).unwrap_or_default(),
        alerts_deleted,
        faces_removed,
        audio_events_cleared
    );

    Ok(Json(ResetResponse {
        status: "ok",
        alerts_deleted,
        faces_removed,
        audio_events_cleared,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StudentActionRequest {
    pub student_id: Option<String>,
    pub exam_id: Option<String>,
    /// Free-text note shown on the dashboard
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StudentActionResponse {
    pub status: &'static str,
    pub logged: bool,
}

async fn student_action(
    state: &AppState,
    auth: &TeacherAuth,
    request: StudentActionRequest,
    kind: AlertKind,
) -> Result<Json<StudentActionResponse>, AppError> {
    let student_id = required(request.student_id.as_deref(), "student_id")?;
    let exam_id = required(request.exam_id.as_deref(), "exam_id")?;
    let note = request.reason.as_deref().map(str::trim).filter(|r| !r.is_empty());

    info!("Teacher {} recorded {} for {} in {}", auth.identity.username, kind, student_id, exam_id);
    let logged = raise_alert(
        state,
        student_id,
        exam_id,
        kind,
        vec![kind.as_str().to_string()],
        json!({
            "teacher": auth.identity.username,
            "note": note,
        }),
    )
    .await;

    if !logged {
        return Err(AppError::internal(format!("{} could not be recorded", kind)));
    }
    Ok(Json(StudentActionResponse { status: "ok", logged }))
}

/// `POST /api/students/flag`
pub async fn flag_student(
    State(state): State<Arc<AppState>>,
    auth: TeacherAuth,
    payload: Result<Json<StudentActionRequest>, JsonRejection>,
) -> Result<Json<StudentActionResponse>, AppError> {
    let Json(request) = payload?;
    student_action(&state, &auth, request, AlertKind::ManualFlag).await
}

/// `POST /api/students/terminate`
pub async fn terminate_student(
    State(state): State<Arc<AppState>>,
    auth: TeacherAuth,
    payload: Result<Json<StudentActionRequest>, JsonRejection>,
) -> Result<Json<StudentActionResponse>, AppError> {
    let Json(request) = payload?;
    student_action(&state, &auth, request, AlertKind::Termination).await
}
