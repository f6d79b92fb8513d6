//! Teacher login and session routes

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sessions::TeacherIdentity;

use super::{required, run_blocking};
use crate::auth::{bearer_token, TeacherAuth};
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub status: &'static str,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub teacher: TeacherIdentity,
}

/// `POST /teacher/login`
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let Json(request) = payload?;
    let username = required(request.username.as_deref(), "username")?.to_string();
    let password = request.password.unwrap_or_default();

    // Argon2 verification is CPU bound
    let worker = Arc::clone(&state);
    let identity = run_blocking(move || worker.teachers.login(&username, &password))
        .await?
        .ok_or_else(|| AppError::unauthorized("Invalid credentials"))?;

    let issued = state.sessions.issue(identity.clone());
    Ok(Json(LoginResponse {
        status: "ok",
        token: issued.token,
        expires_at: issued.expires_at,
        teacher: identity,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher: Option<TeacherIdentity>,
}

/// `GET /teacher/validate?token=..` (or with a bearer header)
pub async fn validate(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ValidateQuery>,
    headers: HeaderMap,
) -> Json<ValidateResponse> {
    let token = query.token.as_deref().or_else(|| bearer_token(&headers));
    let teacher = token.and_then(|t| state.sessions.validate(t));
    Json(ValidateResponse {
        valid: teacher.is_some(),
        teacher,
    })
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub status: &'static str,
}

/// `POST /teacher/logout`
pub async fn logout(State(state): State<Arc<AppState>>, auth: TeacherAuth) -> Json<LogoutResponse> {
    state.sessions.revoke(&auth.token);
    Json(LogoutResponse { status: "ok" })
}
