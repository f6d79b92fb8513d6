//! HTTP error mapping

use alerting::AlertError;
use audio_anomaly::AudioError;
use axum::extract::rejection::{BytesRejection, JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use face_auth::FaceAuthError;
use frame::FrameError;
use gaze::GazeError;
use object_screen::ObjectScreenError;
use serde::Serialize;
use sessions::SessionError;
use storage::StorageError;
use thiserror::Error;
use tracing::{error, warn};

/// Body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub code: String,
    pub message: String,
}

/// Handler error; always rendered as `{status: "error", code, message}`
#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn bad_request(code: &str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    /// Request is missing a required, non-blank field
    pub fn missing(field: &str) -> Self {
        Self::bad_request("missing_field", format!("{} is required", field))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{} {}: {}", self.status, self.code, self.message);
        } else {
            warn!("{} {}: {}", self.status.as_u16(), self.code, self.message);
        }
        let body = ErrorBody {
            status: "error",
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<FrameError> for AppError {
    fn from(e: FrameError) -> Self {
        Self::bad_request("invalid_image", e.to_string())
    }
}

impl From<GazeError> for AppError {
    fn from(e: GazeError) -> Self {
        match e {
            GazeError::InvalidLandmarks(_) => Self::bad_request("invalid_landmarks", e.to_string()),
            GazeError::Detection(_) => Self::internal(e.to_string()),
        }
    }
}

impl From<AudioError> for AppError {
    fn from(e: AudioError) -> Self {
        Self::bad_request("invalid_audio_features", e.to_string())
    }
}

impl From<ObjectScreenError> for AppError {
    fn from(e: ObjectScreenError) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<FaceAuthError> for AppError {
    fn from(e: FaceAuthError) -> Self {
        match e {
            FaceAuthError::InvalidInput(_) => Self::bad_request("invalid_input", e.to_string()),
            _ => Self::internal(e.to_string()),
        }
    }
}

impl From<AlertError> for AppError {
    fn from(e: AlertError) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        Self::bad_request("invalid_json", e.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(e: QueryRejection) -> Self {
        Self::bad_request("invalid_query", e.body_text())
    }
}

impl From<BytesRejection> for AppError {
    fn from(e: BytesRejection) -> Self {
        Self::new(e.status(), "invalid_body", e.body_text())
    }
}

/// Startup failures while assembling the service
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Face(#[from] FaceAuthError),

    #[error(transparent)]
    Objects(#[from] ObjectScreenError),

    #[error(transparent)]
    Sessions(#[from] SessionError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}
