//! Storage seam for events, sessions, and analytics aggregations.

use async_trait::async_trait;
use tracker_core::{
    BehaviorEvent, DeviceStats, EventFilter, HeatmapPoint, MetricsBucket, MetricsInterval,
    OverviewStats, Page, PageStats, Result, Session, SessionFilter, TimeRange, UserDetail,
};

/// Turn per-device counts into stats with share percentages.
/// Input order is preserved.
pub(crate) fn percentages(counts: Vec<(String, u64)>) -> Vec<DeviceStats> {
    let total: u64 = counts.iter().map(|(_, c)| c).sum();
    counts
        .into_iter()
        .map(|(device, count)| DeviceStats {
            device,
            count,
            percentage: if total == 0 {
                0.0
            } else {
                count as f64 / total as f64 * 100.0
            },
        })
        .collect()
}

/// Persistence and query surface for the pipeline.
///
/// The gateway writes through this trait on the hot path; the query API
/// reads through it. Implementations must be safe to share across tasks.
#[async_trait]
pub trait BehaviorStore: Send + Sync {
    /// Persist one normalized event. The gateway acknowledges the client
    /// only after this returns Ok.
    async fn record_event(&self, event: &BehaviorEvent) -> Result<()>;

    /// Insert or update a session row. Called on session start, after each
    /// counter update, and on close.
    async fn upsert_session(&self, session: &Session) -> Result<()>;

    /// Paginated event list, newest first.
    async fn list_events(&self, filter: EventFilter) -> Result<Page<BehaviorEvent>>;

    /// Paginated session list, newest first.
    async fn list_sessions(&self, filter: SessionFilter) -> Result<Page<Session>>;

    /// Totals and per-type/per-category breakdowns over a window.
    async fn overview(&self, range: TimeRange) -> Result<OverviewStats>;

    /// Time-series buckets for the given interval.
    async fn metrics_series(&self, interval: MetricsInterval) -> Result<Vec<MetricsBucket>>;

    /// Most-viewed pages over a window.
    async fn top_pages(&self, range: TimeRange, limit: u64) -> Result<Vec<PageStats>>;

    /// Event counts per device type with share percentages.
    async fn devices(&self, range: TimeRange) -> Result<Vec<DeviceStats>>;

    /// Click coordinates aggregated for one page.
    async fn heatmap(&self, url: &str, range: TimeRange) -> Result<Vec<HeatmapPoint>>;

    /// Recent events, sessions, and a summary for one user.
    async fn user_detail(&self, user_id: &str, range: TimeRange) -> Result<UserDetail>;

    /// Connectivity probe for the health surface.
    async fn ping(&self) -> Result<()>;
}
