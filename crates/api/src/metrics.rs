//! Prometheus metrics

use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::warn;

pub const REQUESTS_TOTAL: &str = "proctor_requests_total";
pub const ALERTS_TOTAL: &str = "proctor_alerts_total";
pub const GAZE_DIRECTIONS_TOTAL: &str = "proctor_gaze_directions_total";
pub const FACE_VERDICTS_TOTAL: &str = "proctor_face_verdicts_total";
pub const AUDIO_WINDOWS_TOTAL: &str = "proctor_audio_windows_total";
pub const AUDIO_QUEUE_DEPTH: &str = "proctor_audio_queue_depth";
pub const AUDIO_QUEUE_DROPPED_TOTAL: &str = "proctor_audio_queue_dropped_total";
pub const ENROLLED_STUDENTS: &str = "proctor_enrolled_students";
pub const ACTIVE_SESSIONS: &str = "proctor_active_sessions";

static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the global recorder once; later calls share the same handle.
///
/// `None` when another recorder was installed first; metrics are then
/// recorded there and `/metrics` renders nothing.
pub fn install() -> Option<PrometheusHandle> {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Prometheus recorder not installed: {}", e);
                None
            }
        })
        .clone()
}
