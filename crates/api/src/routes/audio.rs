//! Audio anomaly routes and the live audio stream

use std::convert::Infallible;
use std::sync::Arc;

use alerting::AlertKind;
use audio_anomaly::{AudioEvent, AudioFeatures, AudioVerdict};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use super::{raise_alert, required};
use crate::error::AppError;
use crate::metrics::{AUDIO_QUEUE_DROPPED_TOTAL, AUDIO_WINDOWS_TOTAL};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AudioRequest {
    pub student_id: Option<String>,
    pub exam_id: Option<String>,
    #[serde(default)]
    pub audio_features: AudioFeatures,
}

#[derive(Debug, Serialize)]
pub struct AudioResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub verdict: AudioVerdict,
    pub logged: bool,
}

/// `POST /detect-audio-anomaly`
pub async fn detect_audio_anomaly(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AudioRequest>, JsonRejection>,
) -> Result<Json<AudioResponse>, AppError> {
    let Json(request) = payload?;
    let student_id = required(request.student_id.as_deref(), "student_id")?;
    let exam_id = required(request.exam_id.as_deref(), "exam_id")?;
    let features = &request.audio_features;

    let verdict = state.audio.classify(features)?;
    let status = if verdict.anomaly { "anomaly_detected" } else { "clear" };
    ::metrics::counter!(AUDIO_WINDOWS_TOTAL, "status" => status).increment(1);

    let event = AudioEvent::from_verdict(student_id, exam_id, features.volume_level, &verdict);
    let evicted = state.audio_events.push(event);
    if evicted > 0 {
        ::metrics::counter!(AUDIO_QUEUE_DROPPED_TOTAL).increment(evicted as u64);
        debug!("Audio queue full, dropped {} oldest events", evicted);
    }

    let logged = if verdict.anomaly {
        info!(
            "Audio anomaly for {} in {}: {:?} (vol {:.2}, {} peaks)",
            student_id, exam_id, verdict.reasons, features.volume_level, verdict.peak_count
        );
        raise_alert(
            &state,
            student_id,
            exam_id,
            AlertKind::Audio,
            verdict.reasons.iter().map(|r| r.tag().to_string()).collect(),
            json!({
                "volume_level": features.volume_level,
                "duration": features.duration,
                "peak_count": verdict.peak_count,
                "peak_ratio": verdict.peak_ratio,
            }),
        )
        .await
    } else {
        false
    };

    Ok(Json(AudioResponse {
        status,
        verdict,
        logged,
    }))
}

/// `GET /api/stream/audio`: server-sent events draining the audio queue.
///
/// Every event goes to exactly one reader; concurrent readers split the
/// stream between them. The loop ends when the client disconnects and the
/// response stream is dropped.
pub async fn stream_audio(State(state): State<Arc<AppState>>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let queue = Arc::clone(&state.audio_events);
    let interval = state.config.queue.poll_interval();
    info!("Audio stream reader connected");

    let stream = async_stream::stream! {
        loop {
            let Some(event) = queue.pop_wait(interval).await else {
                continue;
            };
            match serde_json::to_string(&event) {
                Ok(json) => yield Ok(Event::default().event("audio").data(json)),
                Err(e) => warn!("Dropping unencodable audio event: {}", e),
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
