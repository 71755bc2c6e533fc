//! Gateway configuration.

use serde::{Deserialize, Serialize};

use tracker_core::limits::{CONNECTION_RATE_WINDOW_SECS, MAX_CONNECTIONS_PER_WINDOW};

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Accept anonymous connections when no credential is supplied.
    /// Development mode only.
    #[serde(default)]
    pub permissive: bool,
    /// Connection-rate window in seconds.
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,
    /// Connections allowed per identity per window.
    #[serde(default = "default_rate_max")]
    pub rate_max_connections: u32,
    /// Geo lookup endpoint; empty disables geolocation.
    #[serde(default)]
    pub geo_endpoint: String,
}

fn default_rate_window_secs() -> u64 {
    CONNECTION_RATE_WINDOW_SECS
}

fn default_rate_max() -> u32 {
    MAX_CONNECTIONS_PER_WINDOW
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            permissive: false,
            rate_window_secs: default_rate_window_secs(),
            rate_max_connections: default_rate_max(),
            geo_endpoint: String::new(),
        }
    }
}
