//! Internal metrics collection.
//!
//! Collects metrics in-memory; the health endpoint reports a snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in Self::BUCKET_BOUNDS.iter().enumerate() {
            if ms <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        // Value exceeds all buckets, add to last
        self.buckets[10].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns bucket counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the tracking pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    // Gateway metrics
    pub connections_accepted: Counter,
    pub connections_rejected_auth: Counter,
    pub connections_rejected_rate: Counter,
    pub events_received: Counter,
    pub events_failed_validation: Counter,

    // Store metrics
    pub events_persisted: Counter,
    pub persist_errors: Counter,
    pub sessions_persisted: Counter,

    // Fan-out metrics
    pub broadcasts_sent: Counter,
    pub broadcast_lagged: Counter,

    // Latency histograms
    pub handler_latency_ms: Histogram,
    pub store_latency_ms: Histogram,
    pub query_latency_ms: Histogram,

    // Gauges
    pub active_connections: Gauge,
    pub active_sessions: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub connections_accepted: u64,
    pub connections_rejected_auth: u64,
    pub connections_rejected_rate: u64,
    pub events_received: u64,
    pub events_failed_validation: u64,
    pub events_persisted: u64,
    pub persist_errors: u64,
    pub sessions_persisted: u64,
    pub broadcasts_sent: u64,
    pub broadcast_lagged: u64,
    pub handler_latency_mean_ms: f64,
    pub store_latency_mean_ms: f64,
    pub query_latency_mean_ms: f64,
    pub active_connections: u64,
    pub active_sessions: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            connections_accepted: self.connections_accepted.get(),
            connections_rejected_auth: self.connections_rejected_auth.get(),
            connections_rejected_rate: self.connections_rejected_rate.get(),
            events_received: self.events_received.get(),
            events_failed_validation: self.events_failed_validation.get(),
            events_persisted: self.events_persisted.get(),
            persist_errors: self.persist_errors.get(),
            sessions_persisted: self.sessions_persisted.get(),
            broadcasts_sent: self.broadcasts_sent.get(),
            broadcast_lagged: self.broadcast_lagged.get(),
            handler_latency_mean_ms: self.handler_latency_ms.mean(),
            store_latency_mean_ms: self.store_latency_ms.mean(),
            query_latency_mean_ms: self.query_latency_ms.mean(),
            active_connections: self.active_connections.get(),
            active_sessions: self.active_sessions.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_mean_tracks_observations() {
        let h = Histogram::new();
        h.observe(10);
        h.observe(20);
        assert_eq!(h.count(), 2);
        assert_eq!(h.sum(), 30);
        assert!((h.mean() - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn counter_reset_returns_previous() {
        let c = Counter::new();
        c.inc_by(5);
        assert_eq!(c.reset(), 5);
        assert_eq!(c.get(), 0);
    }
}
