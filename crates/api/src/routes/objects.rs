//! Forbidden object routes

use std::sync::Arc;

use alerting::AlertKind;
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use object_screen::{DetectedObject, ObjectVerdict};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{decode_frame, raise_alert, run_blocking, ExamQuery};
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ObjectResponse {
    #[serde(flatten)]
    pub verdict: ObjectVerdict,
    pub logged: bool,
}

async fn respond(state: &AppState, query: &ExamQuery, verdict: ObjectVerdict) -> ObjectResponse {
    let logged = match (&verdict, query.session()) {
        (ObjectVerdict::Forbidden { objects }, Some((student_id, exam_id))) => {
            let reason = objects.iter().map(|o| o.replace(' ', "_")).collect();
            raise_alert(
                state,
                student_id,
                exam_id,
                AlertKind::Object,
                reason,
                json!({ "objects": objects }),
            )
            .await
        }
        _ => false,
    };
    ObjectResponse { verdict, logged }
}

/// `POST /detect-object` with an image body
pub async fn detect_object(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ExamQuery>, QueryRejection>,
    body: Bytes,
) -> Result<Json<ObjectResponse>, AppError> {
    let Query(query) = query?;

    let worker = Arc::clone(&state);
    let verdict = run_blocking(move || -> Result<ObjectVerdict, AppError> {
        let frame = decode_frame(&body)?;
        Ok(worker.objects.screen_frame(worker.object_detector.as_ref(), &frame)?)
    })
    .await??;

    Ok(Json(respond(&state, &query, verdict).await))
}

/// Detections produced by a client-side model
#[derive(Debug, Deserialize)]
pub struct ScreenRequest {
    pub detections: Vec<DetectedObject>,
    pub student_id: Option<String>,
    pub exam_id: Option<String>,
}

/// `POST /screen-objects`
pub async fn screen_objects(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ScreenRequest>, JsonRejection>,
) -> Result<Json<ObjectResponse>, AppError> {
    let Json(request) = payload?;
    if let Some(bad) = request.detections.iter().find(|d| !d.confidence.is_finite()) {
        return Err(AppError::bad_request(
            "invalid_detection",
            format!("confidence for {:?} is not a number", bad.label),
        ));
    }

    let verdict = state.objects.screen(&request.detections);
    let query = ExamQuery {
        student_id: request.student_id,
        exam_id: request.exam_id,
    };
    Ok(Json(respond(&state, &query, verdict).await))
}
