//! Head pose routes

use std::sync::Arc;

use alerting::AlertKind;
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use gaze::{from_face_mesh, GazeAnalysis, GazeDirection};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{decode_frame, raise_alert, required, run_blocking, ExamQuery};
use crate::error::AppError;
use crate::metrics::GAZE_DIRECTIONS_TOTAL;
use crate::AppState;

/// Gaze result as exam clients expect it
#[derive(Debug, Serialize)]
pub struct HeadPoseResponse {
    /// Label, prefixed with `ALERT: ` for alert directions
    pub direction: String,
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
    pub alert: bool,
    /// Whether an alert was persisted for this frame
    pub logged: bool,
}

async fn respond(state: &AppState, query: &ExamQuery, analysis: GazeAnalysis) -> HeadPoseResponse {
    ::metrics::counter!(GAZE_DIRECTIONS_TOTAL, "direction" => analysis.direction.tag()).increment(1);

    let logged = match (analysis.is_alert(), query.session()) {
        (true, Some((student_id, exam_id))) => {
            raise_alert(
                state,
                student_id,
                exam_id,
                AlertKind::Gaze,
                vec![analysis.direction.tag().to_string()],
                json!({
                    "direction": analysis.direction.to_string(),
                    "yaw": analysis.head_pose.yaw,
                    "pitch": analysis.head_pose.pitch,
                    "roll": analysis.head_pose.roll,
                }),
            )
            .await
        }
        _ => false,
    };

    HeadPoseResponse {
        direction: analysis.direction.to_string(),
        yaw: analysis.head_pose.yaw,
        pitch: analysis.head_pose.pitch,
        roll: analysis.head_pose.roll,
        alert: analysis.is_alert(),
        logged,
    }
}

/// `POST /detect-head` with an image body
pub async fn detect_head(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ExamQuery>, QueryRejection>,
    body: Bytes,
) -> Result<Json<HeadPoseResponse>, AppError> {
    let Query(query) = query?;

    let worker = Arc::clone(&state);
    let analysis = run_blocking(move || -> Result<GazeAnalysis, AppError> {
        let frame = decode_frame(&body)?;
        Ok(worker.gaze.score_frame(worker.landmarks.as_ref(), &frame)?)
    })
    .await??;

    Ok(Json(respond(&state, &query, analysis).await))
}

/// Client-side landmarks, either the six solver points in pixels or a
/// normalised face mesh
#[derive(Debug, Deserialize)]
pub struct LandmarkRequest {
    #[serde(default)]
    pub landmarks: Vec<(f32, f32)>,
    #[serde(default)]
    pub face_mesh: Option<Vec<(f32, f32)>>,
    pub frame_width: u32,
    pub frame_height: u32,
    pub student_id: Option<String>,
    pub exam_id: Option<String>,
}

/// `POST /score-landmarks`
pub async fn score_landmarks(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LandmarkRequest>, JsonRejection>,
) -> Result<Json<HeadPoseResponse>, AppError> {
    let Json(request) = payload?;

    let landmarks = match &request.face_mesh {
        Some(mesh) => from_face_mesh(mesh, request.frame_width, request.frame_height).ok_or_else(|| {
            AppError::bad_request("invalid_landmarks", format!("face mesh has only {} points", mesh.len()))
        })?,
        None => request.landmarks.clone(),
    };

    let analysis = state
        .gaze
        .score(&landmarks, request.frame_width, request.frame_height)?;

    let query = ExamQuery {
        student_id: request.student_id,
        exam_id: request.exam_id,
    };
    Ok(Json(respond(&state, &query, analysis).await))
}

/// Gaze alert reported by a client that scores frames itself
#[derive(Debug, Deserialize)]
pub struct LogAlertRequest {
    pub student_id: Option<String>,
    pub exam_id: Option<String>,
    pub direction: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LogAlertResponse {
    pub status: &'static str,
    pub logged: bool,
}

/// `POST /log-alert`
pub async fn log_alert(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<LogAlertResponse>, AppError> {
    let Json(raw) = payload?;
    let request: LogAlertRequest = serde_json::from_value(raw.clone())
        .map_err(|e| AppError::bad_request("invalid_json", e.to_string()))?;

    let student_id = required(request.student_id.as_deref(), "student_id")?;
    let exam_id = required(request.exam_id.as_deref(), "exam_id")?;
    let direction = required(request.direction.as_deref(), "direction")?;

    let direction = GazeDirection::from_label(direction).ok_or_else(|| {
        AppError::bad_request("invalid_direction", format!("unknown gaze direction {:?}", direction))
    })?;
    debug!("Client reported {} for {} in {}", direction, student_id, exam_id);

    let logged = raise_alert(
        &state,
        student_id,
        exam_id,
        AlertKind::Gaze,
        vec![direction.tag().to_string()],
        raw,
    )
    .await;

    Ok(Json(LogAlertResponse { status: "ok", logged }))
}
