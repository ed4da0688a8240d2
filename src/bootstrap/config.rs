//! Service configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::utils::env::{
    env_duration_secs, env_i64, env_path, env_string, env_u16, env_usize,
};

/// Runtime configuration for the whole service.
///
/// Defaults match a marketplace gateway running on `127.0.0.1:4002` and the
/// service itself listening on `0.0.0.0:8109`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the local marketplace gateway.
    pub gateway_url: String,

    /// Listen port for the local HTTP API.
    pub api_port: u16,

    /// Root directory for the document collections and cached media.
    pub data_dir: PathBuf,

    /// Path to the static country → zip → (lat, lon) map.
    pub location_map: PathBuf,

    /// Default gateway request timeout.
    pub request_timeout: Duration,

    /// Timeout for the bulk listings-summary endpoint.
    pub bulk_timeout: Duration,

    /// Deadline applied to digesting HTTP handlers.
    pub handler_deadline: Duration,

    /// Interval between peer discovery sweeps.
    pub discovery_interval: Duration,

    /// Interval between liveness sweeps over known peers.
    pub liveness_interval: Duration,

    /// Seconds of silence after which a peer's listings are cleared.
    pub stale_after_secs: i64,

    /// Capacity of the discovery → digest peer-id channel.
    pub peer_channel_capacity: usize,

    /// Concurrent neighbor-expansion tasks.
    pub expansion_permits: usize,

    /// Watchdog on a single neighbor-expansion task.
    pub expansion_watchdog: Duration,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            gateway_url: env_string("VOYAGER_GATEWAY_URL", "http://localhost:4002"),
            api_port: env_u16("VOYAGER_API_PORT", 8109),
            data_dir: env_path("VOYAGER_DATA_DIR", "data"),
            location_map: env_path("VOYAGER_LOCATION_MAP", "locationmap.json"),
            request_timeout: env_duration_secs("VOYAGER_REQUEST_TIMEOUT_SECS", 30),
            bulk_timeout: env_duration_secs("VOYAGER_BULK_TIMEOUT_SECS", 70),
            handler_deadline: env_duration_secs("VOYAGER_HANDLER_DEADLINE_SECS", 30),
            discovery_interval: env_duration_secs("VOYAGER_DISCOVERY_INTERVAL_SECS", 5),
            liveness_interval: env_duration_secs("VOYAGER_LIVENESS_INTERVAL_SECS", 1800),
            stale_after_secs: env_i64("VOYAGER_STALE_AFTER_SECS", 86_400),
            peer_channel_capacity: env_usize("VOYAGER_PEER_CHANNEL_CAPACITY", 1000),
            expansion_permits: env_usize("VOYAGER_EXPANSION_PERMITS", 5),
            expansion_watchdog: env_duration_secs("VOYAGER_EXPANSION_WATCHDOG_SECS", 60),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
