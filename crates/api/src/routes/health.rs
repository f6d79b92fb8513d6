//! Health and metrics routes

use std::sync::Arc;

use alerting::AlertQuery;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::metrics::{ACTIVE_SESSIONS, AUDIO_QUEUE_DEPTH, ENROLLED_STUDENTS};
use crate::AppState;

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime_seconds: u64,
    pub storage: &'static str,
    pub counts: HealthCounts,
}

#[derive(Debug, Serialize)]
pub struct HealthCounts {
    pub enrolled_students: usize,
    pub trained_students: usize,
    /// `None` when the store could not be queried
    pub alerts: Option<u64>,
    pub audio_queue_depth: usize,
    pub audio_events_dropped: u64,
    pub active_sessions: usize,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let alerts = match state.alerts.count(&AlertQuery::default()).await {
        Ok(n) => Some(n),
        Err(e) => {
            warn!("Health check could not count alerts: {}", e);
            None
        }
    };

    let store = state.faces.store();
    Json(HealthResponse {
        status: if alerts.is_some() { "healthy" } else { "degraded" },
        timestamp: Utc::now(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        storage: state.repository.backend_name(),
        counts: HealthCounts {
            enrolled_students: store.registered().len(),
            trained_students: store.model().len(),
            alerts,
            audio_queue_depth: state.audio_events.len(),
            audio_events_dropped: state.audio_events.dropped(),
            active_sessions: state.sessions.len(),
        },
    })
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let Some(handle) = &state.metrics else {
        return (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder unavailable").into_response();
    };

    ::metrics::gauge!(AUDIO_QUEUE_DEPTH).set(state.audio_events.len() as f64);
    ::metrics::gauge!(ENROLLED_STUDENTS).set(state.faces.store().registered().len() as f64);
    ::metrics::gauge!(ACTIVE_SESSIONS).set(state.sessions.len() as f64);

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
        .into_response()
}
