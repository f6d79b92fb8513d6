//! Face enrollment and verification routes

use std::sync::Arc;

use alerting::AlertKind;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use face_auth::{FaceGate, IdentityVerdict, LabelId, RegionIdentity};
use frame::{gray_patch, GrayImage};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::{decode_frame, raise_alert, run_blocking, ExamQuery};
use crate::error::AppError;
use crate::metrics::FACE_VERDICTS_TOTAL;
use crate::AppState;

/// Outcome of the exactly-one-face gate
enum Gated {
    Face(GrayImage),
    Rejected(&'static str),
}

fn gate_face(state: &AppState, body: &[u8]) -> Result<Gated, AppError> {
    let frame = decode_frame(body)?;
    let gray = frame.to_grayscale();
    let regions = state.face_detector.detect(&gray)?;
    let region = match FaceGate::single(&regions) {
        Ok(region) => region,
        Err(e) => {
            return match e.gate_status() {
                Some(status) => Ok(Gated::Rejected(status)),
                None => Err(e.into()),
            }
        }
    };
    let size = state.faces.store().config().patch_size;
    Ok(match gray_patch(&gray, &region.bbox, size) {
        Some(patch) => Gated::Face(patch),
        None => Gated::Rejected("no_face"),
    })
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<LabelId>,
}

/// `POST /register-face` with an image body
pub async fn register_face(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ExamQuery>, QueryRejection>,
    body: Bytes,
) -> Result<Json<RegisterResponse>, AppError> {
    let Query(query) = query?;
    let (student_id, exam_id) = query.require()?;
    let (student_id, exam_id) = (student_id.to_string(), exam_id.to_string());

    let worker = Arc::clone(&state);
    let response = run_blocking(move || -> Result<RegisterResponse, AppError> {
        match gate_face(&worker, &body)? {
            Gated::Rejected(status) => Ok(RegisterResponse { status, label: None }),
            Gated::Face(patch) => {
                let label = worker.faces.store().enroll(&student_id, &exam_id, &patch)?;
                Ok(RegisterResponse {
                    status: "registered",
                    label: Some(label),
                })
            }
        }
    })
    .await??;

    ::metrics::counter!(FACE_VERDICTS_TOTAL, "route" => "register", "status" => response.status).increment(1);
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Best guess on a mismatch; `unknown` when no enrolled student is close
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted: Option<String>,
    pub logged: bool,
}

/// `POST /verify-face` with an image body
pub async fn verify_face(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ExamQuery>, QueryRejection>,
    body: Bytes,
) -> Result<Json<VerifyResponse>, AppError> {
    let Query(query) = query?;
    let (student_id, exam_id) = query.require()?;

    let worker = Arc::clone(&state);
    let claimed = student_id.to_string();
    let mut response = run_blocking(move || -> Result<VerifyResponse, AppError> {
        let patch = match gate_face(&worker, &body)? {
            Gated::Face(patch) => patch,
            Gated::Rejected(status) => {
                return Ok(VerifyResponse {
                    status,
                    confidence: None,
                    predicted: None,
                    logged: false,
                })
            }
        };
        let judgment = worker.faces.identify(&patch, &claimed);
        let predicted = match &judgment.verdict {
            IdentityVerdict::Mismatch { predicted } => {
                Some(predicted.clone().unwrap_or_else(|| "unknown".to_string()))
            }
            _ => None,
        };
        Ok(VerifyResponse {
            status: judgment.verdict.status(),
            confidence: judgment.confidence,
            predicted,
            logged: false,
        })
    })
    .await??;

    ::metrics::counter!(FACE_VERDICTS_TOTAL, "route" => "verify", "status" => response.status).increment(1);

    // Identity problems attributable to the student; an untrained model is not one
    if matches!(response.status, "mismatch" | "not_registered" | "multiple_faces") {
        info!("Identity check for {} in {}: {}", student_id, exam_id, response.status);
        response.logged = raise_alert(
            &state,
            student_id,
            exam_id,
            AlertKind::Identity,
            vec![response.status.to_string()],
            json!({
                "confidence": response.confidence,
                "predicted": response.predicted,
            }),
        )
        .await;
    }

    Ok(Json(response))
}

#[derive(Debug, Serialize)]
pub struct IdentifyResponse {
    pub count: usize,
    pub faces: Vec<RegionIdentity>,
}

/// `POST /identify-faces` with an image body
pub async fn identify_faces(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<IdentifyResponse>, AppError> {
    let faces = run_blocking(move || -> Result<Vec<RegionIdentity>, AppError> {
        let frame = decode_frame(&body)?;
        let gray = frame.to_grayscale();
        let regions = state.face_detector.detect(&gray)?;
        Ok(state.faces.identify_any(&gray, &regions))
    })
    .await??;

    Ok(Json(IdentifyResponse {
        count: faces.len(),
        faces,
    }))
}

#[derive(Debug, Serialize)]
pub struct RegisteredResponse {
    pub registered_faces: Vec<String>,
}

/// `GET /registered-faces`
pub async fn registered_faces(State(state): State<Arc<AppState>>) -> Json<RegisteredResponse> {
    Json(RegisteredResponse {
        registered_faces: state.faces.store().registered(),
    })
}
