//! Query filters and aggregation report types for the analytics surface.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::{BehaviorEvent, EventKind};
use crate::limits::{
    DEFAULT_EVENTS_WINDOW_HOURS, DEFAULT_OVERVIEW_WINDOW_DAYS, DEFAULT_PAGE_LIMIT,
    DEFAULT_USER_WINDOW_DAYS, MAX_PAGE_LIMIT,
};
use crate::session::{Session, SessionStatus};

/// Inclusive-start, exclusive-end time window. Every query carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window ending now, spanning the last `hours`.
    pub fn last_hours(hours: i64) -> Self {
        let end = Utc::now();
        Self {
            start: end - Duration::hours(hours),
            end,
        }
    }

    /// Window ending now, spanning the last `days`.
    pub fn last_days(days: i64) -> Self {
        let end = Utc::now();
        Self {
            start: end - Duration::days(days),
            end,
        }
    }

    /// Default window for event lists (last 24h).
    pub fn default_events() -> Self {
        Self::last_hours(DEFAULT_EVENTS_WINDOW_HOURS)
    }

    /// Default window for overview/sessions/top-pages/devices (last 7d).
    pub fn default_overview() -> Self {
        Self::last_days(DEFAULT_OVERVIEW_WINDOW_DAYS)
    }

    /// Default window for per-user queries (last 30d).
    pub fn default_user() -> Self {
        Self::last_days(DEFAULT_USER_WINDOW_DAYS)
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }
}

/// Pagination metadata returned with every list payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: u64,
    pub skip: u64,
    pub limit: u64,
    pub pages: u64,
}

impl Pagination {
    pub fn new(total: u64, skip: u64, limit: u64) -> Self {
        let pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            total,
            skip,
            limit,
            pages,
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

/// Filter for event list and export queries.
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub range: TimeRange,
    pub user_id: Option<String>,
    pub session_id: Option<Uuid>,
    pub kind: Option<EventKind>,
    pub skip: u64,
    pub limit: u64,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            range: TimeRange::default_events(),
            user_id: None,
            session_id: None,
            kind: None,
            skip: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl EventFilter {
    /// Clamp limit to the allowed page size.
    pub fn clamped(mut self) -> Self {
        self.limit = self.limit.clamp(1, MAX_PAGE_LIMIT);
        self
    }

    pub fn matches(&self, event: &BehaviorEvent) -> bool {
        if !self.range.contains(event.received_at) {
            return false;
        }
        if let Some(user_id) = &self.user_id {
            if event.user_id.as_deref() != Some(user_id.as_str()) {
                return false;
            }
        }
        if let Some(session_id) = self.session_id {
            if event.session_id != session_id {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if event.kind() != kind {
                return false;
            }
        }
        true
    }
}

/// Filter for session list queries.
#[derive(Debug, Clone)]
pub struct SessionFilter {
    pub range: TimeRange,
    pub user_id: Option<String>,
    pub status: Option<SessionStatus>,
    pub skip: u64,
    pub limit: u64,
}

impl Default for SessionFilter {
    fn default() -> Self {
        Self {
            range: TimeRange::default_overview(),
            user_id: None,
            status: None,
            skip: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl SessionFilter {
    pub fn clamped(mut self) -> Self {
        self.limit = self.limit.clamp(1, MAX_PAGE_LIMIT);
        self
    }

    pub fn matches(&self, session: &Session) -> bool {
        if !self.range.contains(session.started_at) {
            return false;
        }
        if let Some(user_id) = &self.user_id {
            if session.user_id.as_deref() != Some(user_id.as_str()) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if session.status != status {
                return false;
            }
        }
        true
    }
}

/// Count per event type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeCount {
    pub event_type: String,
    pub count: u64,
}

/// Count per event category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

/// Overview aggregate over a time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewStats {
    pub total_events: u64,
    pub unique_users: u64,
    pub unique_sessions: u64,
    pub by_type: Vec<TypeCount>,
    pub by_category: Vec<CategoryCount>,
}

/// Time-series interval selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsInterval {
    Hour1,
    Day1,
    Days7,
    Days30,
}

impl MetricsInterval {
    /// Query window covered by the interval.
    pub fn range(&self) -> TimeRange {
        match self {
            Self::Hour1 => TimeRange::last_hours(1),
            Self::Day1 => TimeRange::last_hours(24),
            Self::Days7 => TimeRange::last_days(7),
            Self::Days30 => TimeRange::last_days(30),
        }
    }

    /// Bucket width: hour buckets for short windows, day buckets beyond.
    pub fn bucket(&self) -> Duration {
        match self {
            Self::Hour1 | Self::Day1 => Duration::hours(1),
            Self::Days7 | Self::Days30 => Duration::days(1),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour1 => "1hour",
            Self::Day1 => "1day",
            Self::Days7 => "7days",
            Self::Days30 => "30days",
        }
    }
}

impl std::str::FromStr for MetricsInterval {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1hour" => Ok(Self::Hour1),
            "1day" => Ok(Self::Day1),
            "7days" => Ok(Self::Days7),
            "30days" => Ok(Self::Days30),
            other => Err(crate::error::Error::validation(format!(
                "unknown metrics interval: {other}"
            ))),
        }
    }
}

/// One time bucket of the metrics series.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsBucket {
    pub bucket_start: DateTime<Utc>,
    pub events: u64,
    pub unique_users: u64,
    pub unique_sessions: u64,
}

/// Per-URL page-view aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageStats {
    pub url: String,
    pub view_count: u64,
    pub unique_users: u64,
    /// Average over events that reported a time-on-page.
    pub avg_time_on_page: Option<f64>,
}

/// Per-device-type aggregate with post-hoc share percentage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStats {
    pub device: String,
    pub count: u64,
    pub percentage: f64,
}

/// One heat-map cell: integer-truncated coordinates plus element id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapPoint {
    pub x: i64,
    pub y: i64,
    pub element_id: Option<String>,
    pub count: u64,
}

/// Per-user summary block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub total_events: u64,
    pub total_sessions: u64,
    pub by_type: Vec<TypeCount>,
}

/// Per-user detail: recent events, all sessions, and a summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetail {
    pub events: Vec<BehaviorEvent>,
    pub sessions: Vec<Session>,
    pub summary: UserSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_computes_page_count() {
        let p = Pagination::new(101, 0, 50);
        assert_eq!(p.pages, 3);
        let p = Pagination::new(100, 0, 50);
        assert_eq!(p.pages, 2);
        let p = Pagination::new(0, 0, 50);
        assert_eq!(p.pages, 0);
    }

    #[test]
    fn interval_parses() {
        assert_eq!("1hour".parse::<MetricsInterval>().unwrap(), MetricsInterval::Hour1);
        assert_eq!("30days".parse::<MetricsInterval>().unwrap(), MetricsInterval::Days30);
        assert!("fortnight".parse::<MetricsInterval>().is_err());
    }

    #[test]
    fn range_contains_is_half_open() {
        let range = TimeRange::last_hours(1);
        assert!(range.contains(range.start));
        assert!(!range.contains(range.end));
    }
}
