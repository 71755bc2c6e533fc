//! Mock implementations for testing.

use async_trait::async_trait;
use parking_lot::Mutex;

use event_store::{BehaviorStore, MemoryStore};
use tracker_core::{
    BehaviorEvent, DeviceStats, Error, EventFilter, HeatmapPoint, MetricsBucket, MetricsInterval,
    OverviewStats, Page, PageStats, Result, Session, SessionFilter, TimeRange, UserDetail,
};

/// In-memory store with injectable write failures.
///
/// Delegates everything to [`MemoryStore`]; when failure mode is armed,
/// `record_event` errors the way a dead ClickHouse would, letting tests
/// assert the gateway's ack-means-persisted behavior.
pub struct FailingStore {
    inner: MemoryStore,
    fail_writes: Mutex<bool>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_writes: Mutex::new(false),
        }
    }

    /// Direct access to the backing store for seeding and assertions.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Arm or disarm event-write failures.
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }
}

impl Default for FailingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BehaviorStore for FailingStore {
    async fn record_event(&self, event: &BehaviorEvent) -> Result<()> {
        if *self.fail_writes.lock() {
            return Err(Error::store_failed("injected store failure"));
        }
        self.inner.record_event(event).await
    }

    async fn upsert_session(&self, session: &Session) -> Result<()> {
        self.inner.upsert_session(session).await
    }

    async fn list_events(&self, filter: EventFilter) -> Result<Page<BehaviorEvent>> {
        self.inner.list_events(filter).await
    }

    async fn list_sessions(&self, filter: SessionFilter) -> Result<Page<Session>> {
        self.inner.list_sessions(filter).await
    }

    async fn overview(&self, range: TimeRange) -> Result<OverviewStats> {
        self.inner.overview(range).await
    }

    async fn metrics_series(&self, interval: MetricsInterval) -> Result<Vec<MetricsBucket>> {
        self.inner.metrics_series(interval).await
    }

    async fn top_pages(&self, range: TimeRange, limit: u64) -> Result<Vec<PageStats>> {
        self.inner.top_pages(range, limit).await
    }

    async fn devices(&self, range: TimeRange) -> Result<Vec<DeviceStats>> {
        self.inner.devices(range).await
    }

    async fn heatmap(&self, url: &str, range: TimeRange) -> Result<Vec<HeatmapPoint>> {
        self.inner.heatmap(url, range).await
    }

    async fn user_detail(&self, user_id: &str, range: TimeRange) -> Result<UserDetail> {
        self.inner.user_detail(user_id, range).await
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use uuid::Uuid;

    #[tokio::test]
    async fn failure_mode_only_affects_event_writes() {
        let store = FailingStore::new();
        store.set_fail_writes(true);

        let event = fixtures::behavior_event(
            fixtures::page_view("/a", None),
            Some("user-1"),
            Uuid::new_v4(),
            1,
        );
        assert!(store.record_event(&event).await.is_err());

        let session = Session::new(Some("user-1".into()), "ua", "127.0.0.1");
        assert!(store.upsert_session(&session).await.is_ok());

        store.set_fail_writes(false);
        assert!(store.record_event(&event).await.is_ok());
    }
}
