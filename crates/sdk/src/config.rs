//! SDK configuration.

use std::time::Duration;

/// Default batch size before a flush is forced.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default idle window before a partial batch is flushed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default reconnect attempts before frames are dropped.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Reconnect backoff base and cap.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Tracker configuration.
#[derive(Debug, Clone)]
pub struct SdkConfig {
    /// WebSocket endpoint, e.g. `ws://localhost:8080/ws`.
    pub endpoint: String,
    /// Bearer token, sent as a `token` query parameter.
    pub token: Option<String>,
    pub batch_size: usize,
    pub idle_timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl SdkConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: None,
            batch_size: DEFAULT_BATCH_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_cap: DEFAULT_BACKOFF_CAP,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Full connection URL including the token query parameter.
    pub fn url(&self) -> String {
        match &self.token {
            Some(token) => format!("{}?token={}", self.endpoint, token),
            None => self.endpoint.clone(),
        }
    }
}
