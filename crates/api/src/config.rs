//! Service configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file (`proctor.toml`, or the path in `PROCTOR_CONFIG`), then environment
//! variables prefixed `PROCTOR__` with `__` between sections, e.g.
//! `PROCTOR__SERVER__PORT=9000` or `PROCTOR__DATABASE__URL=sqlite://proctor.db`.

use std::time::Duration;

use audio_anomaly::AudioThresholds;
use config::{Config, ConfigError, Environment, File};
use face_auth::FaceAuthConfig;
use gaze::GazeConfig;
use object_screen::ObjectScreenConfig;
use serde::{Deserialize, Serialize};
use sessions::{SessionConfig, TeacherAccount};

use crate::rate_limit::RateLimitConfig;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "proctor.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origin; `*` allows any
    pub cors_origin: String,
    /// Largest accepted request body (image uploads)
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_origin: "*".to_string(),
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite URL; unset or unreachable means in-memory storage
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: event_queue::DEFAULT_CAPACITY,
            poll_interval_ms: event_queue::DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    pub gaze: GazeConfig,
    pub face: FaceAuthConfig,
    pub audio: AudioThresholds,
    pub objects: ObjectScreenConfig,
    pub queue: QueueConfig,
    pub sessions: SessionConfig,
    pub rate_limit: RateLimitConfig,
    pub teachers: Vec<TeacherAccount>,
}

impl AppConfig {
    /// Load from `PROCTOR_CONFIG` (or `proctor.toml`) plus the environment
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("PROCTOR_CONFIG").ok();
        Self::load_from(path.as_deref())
    }

    /// Load from an explicit file (missing file is fine) plus the environment
    pub fn load_from(path: Option<&str>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(p) => (p, true),
            None => (DEFAULT_CONFIG_FILE, false),
        };
        Config::builder()
            .add_source(File::with_name(path).required(required))
            .add_source(
                Environment::with_prefix("PROCTOR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
