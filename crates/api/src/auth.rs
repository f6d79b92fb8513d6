//! Bearer-token guard for privileged routes

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap};
use sessions::TeacherIdentity;

use crate::error::AppError;
use crate::AppState;

/// An authenticated teacher; extracting it rejects with 401 otherwise
#[derive(Debug, Clone)]
pub struct TeacherAuth {
    pub identity: TeacherIdentity,
    pub token: String,
}

/// Token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for TeacherAuth {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::unauthorized("Missing bearer token"))?;
        let identity = state
            .sessions
            .validate(token)
            .ok_or_else(|| AppError::unauthorized("Session not found or expired"))?;
        Ok(Self {
            identity,
            token: token.to_string(),
        })
    }
}
