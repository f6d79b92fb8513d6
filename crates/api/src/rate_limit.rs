//! Rate limiting for the classification routes
//!
//! Per-client-IP GCRA via tower_governor. Peer IPs come from
//! `ConnectInfo`, so the server must be started with
//! `into_make_service_with_connect_info::<SocketAddr>()`.

use governor::middleware::StateInformationMiddleware;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::PeerIpKeyExtractor;

/// Governor config with X-RateLimit-* headers enabled
pub type DefaultGovernorConfig =
    tower_governor::governor::GovernorConfig<PeerIpKeyExtractor, StateInformationMiddleware>;

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Off means no governor layer is installed at all
    pub enabled: bool,
    /// Seconds to replenish one request
    pub per_second: u64,
    /// Requests a client may make back to back
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        // Exam clients post a frame and an audio window every second or two
        Self {
            enabled: true,
            per_second: 1,
            burst_size: 20,
        }
    }
}

impl RateLimitConfig {
    pub fn strict() -> Self {
        Self {
            enabled: true,
            per_second: 2,
            burst_size: 5,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Build the governor config; `None` when disabled or the quota is zero
pub fn create_governor_config(config: &RateLimitConfig) -> Option<Arc<DefaultGovernorConfig>> {
    if !config.enabled {
        return None;
    }
    GovernorConfigBuilder::default()
        .per_second(config.per_second)
        .burst_size(config.burst_size)
        .use_headers()
        .finish()
        .map(Arc::new)
}
