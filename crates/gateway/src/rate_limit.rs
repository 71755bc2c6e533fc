//! Per-identity connection rate limiting.
//!
//! Fixed-window counters: each identity gets a counter that resets when its
//! window expires. The trait is the seam a shared external store would fill
//! for multi-instance deployments; the in-process map covers one gateway.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracker_core::error::RateLimitErrorCode;
use tracker_core::{Error, Result};

/// Admission check for new connections, keyed by identity.
pub trait ConnectionLimiter: Send + Sync {
    /// Count one connection attempt. Err carries RATE_001 and a
    /// retry-after hint when the identity is over its ceiling.
    fn try_acquire(&self, key: &str) -> Result<()>;
}

struct Window {
    started: Instant,
    count: u32,
}

/// In-process fixed-window limiter. Single-instance only; a clustered
/// gateway needs a shared counter store behind [`ConnectionLimiter`].
pub struct FixedWindowLimiter {
    windows: Mutex<HashMap<String, Window>>,
    window: Duration,
    max_connections: u32,
}

impl FixedWindowLimiter {
    pub fn new(window: Duration, max_connections: u32) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            window,
            max_connections,
        }
    }

    /// Drop windows that have expired. Called opportunistically; the map
    /// only grows with distinct identities seen within one window.
    pub fn cleanup(&self) {
        let mut windows = self.windows.lock();
        let now = Instant::now();
        windows.retain(|_, w| now.duration_since(w.started) < self.window);
    }
}

impl ConnectionLimiter for FixedWindowLimiter {
    fn try_acquire(&self, key: &str) -> Result<()> {
        let mut windows = self.windows.lock();
        let now = Instant::now();

        let window = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }

        if window.count >= self.max_connections {
            let elapsed = now.duration_since(window.started);
            let retry_after = self.window.saturating_sub(elapsed).as_secs().max(1);
            return Err(Error::rate_limit(
                RateLimitErrorCode::Exceeded,
                format!("Connection rate exceeded for {key}"),
                Some(retry_after),
            ));
        }

        window.count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_ceiling_then_rejects() {
        let limiter = FixedWindowLimiter::new(Duration::from_secs(60), 100);

        for _ in 0..100 {
            limiter.try_acquire("user-1").unwrap();
        }
        let err = limiter.try_acquire("user-1").unwrap_err();
        assert_eq!(err.error_code(), Some("RATE_001"));
        assert_eq!(err.http_status(), 429);
    }

    #[test]
    fn identities_have_independent_windows() {
        let limiter = FixedWindowLimiter::new(Duration::from_secs(60), 1);
        limiter.try_acquire("a").unwrap();
        limiter.try_acquire("b").unwrap();
        assert!(limiter.try_acquire("a").is_err());
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter = FixedWindowLimiter::new(Duration::from_millis(0), 1);
        limiter.try_acquire("a").unwrap();
        // Zero-length window: the next attempt lands in a fresh window.
        limiter.try_acquire("a").unwrap();
    }

    #[test]
    fn cleanup_drops_expired_windows() {
        let limiter = FixedWindowLimiter::new(Duration::from_millis(0), 10);
        limiter.try_acquire("a").unwrap();
        limiter.cleanup();
        assert!(limiter.windows.lock().is_empty());
    }
}
