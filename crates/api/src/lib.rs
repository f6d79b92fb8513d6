//! Proctor Engine API Server
//!
//! HTTP surface for the exam proctoring engine: frame and audio
//! classification, face enrollment and verification, the live audio
//! stream, and the teacher-only alert dashboard routes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use alerting::AlertLog;
use audio_anomaly::{AudioAnomalyClassifier, AudioEvent};
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use event_queue::EventQueue;
use face_auth::{FaceEnrollmentStore, FaceMatcher, FaceRegionDetector, WholeFrameDetector};
use gaze::{GeometryScorer, LandmarkDetector, NoLandmarkDetector};
use metrics_exporter_prometheus::PrometheusHandle;
use object_screen::{NoObjectDetector, ObjectDetector, ObjectScreen};
use sessions::{SessionRegistry, TeacherDirectory};
use storage::Repository;
use tower_governor::GovernorLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod rate_limit;
pub mod routes;

pub use config::AppConfig;
pub use error::{AppError, BuildError};

use config::LoggingConfig;
use rate_limit::create_governor_config;

/// Pluggable model backends
pub struct Detectors {
    pub landmarks: Arc<dyn LandmarkDetector>,
    pub faces: Arc<dyn FaceRegionDetector>,
    pub objects: Arc<dyn ObjectDetector>,
}

impl Detectors {
    /// Built-in detectors: no landmark or object model, contrast-based face gate
    pub fn builtin(config: &AppConfig) -> Self {
        Self {
            landmarks: Arc::new(NoLandmarkDetector),
            faces: Arc::new(WholeFrameDetector::new(config.face.min_face_contrast)),
            objects: Arc::new(NoObjectDetector),
        }
    }
}

/// Application state shared across handlers
pub struct AppState {
    pub config: AppConfig,
    pub repository: Arc<Repository>,
    pub alerts: AlertLog,
    pub gaze: GeometryScorer,
    pub landmarks: Arc<dyn LandmarkDetector>,
    pub faces: FaceMatcher,
    pub face_detector: Arc<dyn FaceRegionDetector>,
    pub objects: ObjectScreen,
    pub object_detector: Arc<dyn ObjectDetector>,
    pub audio: AudioAnomalyClassifier,
    pub audio_events: Arc<EventQueue<AudioEvent>>,
    pub sessions: SessionRegistry,
    pub teachers: TeacherDirectory,
    pub metrics: Option<PrometheusHandle>,
    pub version: String,
    pub start_time: Instant,
}

impl AppState {
    /// Assemble the service from configuration with the built-in detectors
    pub async fn build(config: AppConfig) -> Result<Self, BuildError> {
        let detectors = Detectors::builtin(&config);
        Self::build_with(config, detectors).await
    }

    /// Assemble the service with caller-supplied detectors
    pub async fn build_with(config: AppConfig, detectors: Detectors) -> Result<Self, BuildError> {
        if config.queue.capacity == 0 {
            return Err(BuildError::Config("queue.capacity must be positive".into()));
        }

        let repository = Arc::new(Repository::connect(config.database.url.as_deref()).await);
        repository.ensure_collection(alerting::ALERTS_COLLECTION).await?;

        let store = FaceEnrollmentStore::new(config.face.clone(), Arc::clone(&detectors.faces))?;
        let faces = FaceMatcher::new(Arc::new(store));
        let objects = ObjectScreen::new(&config.objects)?;
        let teachers = TeacherDirectory::new(config.teachers.clone())?;

        if config.objects.model_path.is_some() {
            warn!("objects.model_path is set but no object detector backend is compiled in");
        }

        info!(
            "Proctor engine state ready: storage={}, queue capacity={}, {} teachers",
            repository.backend_name(),
            config.queue.capacity,
            teachers.len()
        );

        Ok(Self {
            alerts: AlertLog::new(Arc::clone(&repository)),
            repository,
            gaze: GeometryScorer::new(config.gaze.clone()),
            landmarks: detectors.landmarks,
            faces,
            face_detector: detectors.faces,
            objects,
            object_detector: detectors.objects,
            audio: AudioAnomalyClassifier::new(config.audio.clone()),
            audio_events: Arc::new(EventQueue::new(config.queue.capacity)),
            sessions: SessionRegistry::new(&config.sessions),
            teachers,
            metrics: metrics::install(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
            config,
        })
    }
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origin.trim() == "*" {
        return layer.allow_origin(Any);
    }
    match HeaderValue::from_str(origin.trim()) {
        Ok(value) => layer.allow_origin(value),
        Err(e) => {
            warn!("Ignoring invalid CORS origin {:?} ({}); allowing any", origin, e);
            layer.allow_origin(Any)
        }
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut classification = Router::new()
        .route("/detect-head", post(routes::gaze::detect_head))
        .route("/score-landmarks", post(routes::gaze::score_landmarks))
        .route("/log-alert", post(routes::gaze::log_alert))
        .route("/detect-object", post(routes::objects::detect_object))
        .route("/screen-objects", post(routes::objects::screen_objects))
        .route("/register-face", post(routes::faces::register_face))
        .route("/verify-face", post(routes::faces::verify_face))
        .route("/identify-faces", post(routes::faces::identify_faces))
        .route("/detect-audio-anomaly", post(routes::audio::detect_audio_anomaly));

    match create_governor_config(&state.config.rate_limit) {
        Some(config) => classification = classification.layer(GovernorLayer { config }),
        None => info!("Rate limiting disabled"),
    }

    let public = Router::new()
        .route("/api/v1/health", get(routes::health::health))
        .route("/metrics", get(routes::health::metrics))
        .route("/registered-faces", get(routes::faces::registered_faces))
        .route("/api/stream/audio", get(routes::audio::stream_audio))
        .route("/teacher/login", post(routes::teacher::login))
        .route("/teacher/validate", get(routes::teacher::validate))
        .route("/teacher/logout", post(routes::teacher::logout));

    let privileged = Router::new()
        .route("/alerts", get(routes::admin::list_alerts))
        .route("/api/exam/reset", post(routes::admin::reset_exam))
        .route("/api/students/flag", post(routes::admin::flag_student))
        .route("/api/students/terminate", post(routes::admin::terminate_student));

    let body_limit = state.config.server.max_body_bytes;
    let cors = cors_layer(&state.config.server.cors_origin);

    Router::new()
        .merge(classification)
        .merge(public)
        .merge(privileged)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Initialize logging; `RUST_LOG` overrides the configured level
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = Registry::default().with(filter);
    let result = if config.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
    if result.is_err() {
        warn!("Logging was already initialised");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

/// Run the server until Ctrl+C or SIGTERM
pub async fn run_server(config: AppConfig) -> Result<(), BuildError> {
    let addr = config.bind_addr();
    let state = Arc::new(AppState::build(config).await?);
    let app = create_router(state);

    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}
