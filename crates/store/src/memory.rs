//! In-memory store.
//!
//! Backs the test suite and single-instance deployments without a
//! ClickHouse cluster. Aggregations mirror the SQL the ClickHouse backend
//! runs, including ordering and tie-breaking.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use telemetry::metrics;
use uuid::Uuid;

use crate::store::{percentages, BehaviorStore};
use tracker_core::limits::MAX_USER_DETAIL_EVENTS;
use tracker_core::{
    BehaviorEvent, CategoryCount, DeviceStats, EventFilter, EventPayload, HeatmapPoint,
    MetricsBucket, MetricsInterval, OverviewStats, Page, PageStats, Pagination, Result, Session,
    SessionFilter, TimeRange, TypeCount, UserDetail, UserSummary,
};

#[derive(Default)]
struct Inner {
    events: Vec<BehaviorEvent>,
    sessions: HashMap<Uuid, Session>,
}

/// Store keeping everything in process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events held (all time windows).
    pub fn event_count(&self) -> usize {
        self.inner.read().events.len()
    }

    /// Snapshot of one session, if known.
    pub fn session(&self, id: Uuid) -> Option<Session> {
        self.inner.read().sessions.get(&id).cloned()
    }
}

/// Count sorted descending, name ascending on ties. Matches the SQL
/// ordering used by the ClickHouse backend.
fn sorted_counts(map: HashMap<String, u64>) -> Vec<(String, u64)> {
    let mut counts: Vec<_> = map.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}

fn events_in_range<'a>(
    events: &'a [BehaviorEvent],
    range: &'a TimeRange,
) -> impl Iterator<Item = &'a BehaviorEvent> {
    events.iter().filter(move |e| range.contains(e.received_at))
}

#[async_trait]
impl BehaviorStore for MemoryStore {
    async fn record_event(&self, event: &BehaviorEvent) -> Result<()> {
        self.inner.write().events.push(event.clone());
        metrics().events_persisted.inc();
        Ok(())
    }

    async fn upsert_session(&self, session: &Session) -> Result<()> {
        self.inner
            .write()
            .sessions
            .insert(session.id, session.clone());
        metrics().sessions_persisted.inc();
        Ok(())
    }

    async fn list_events(&self, filter: EventFilter) -> Result<Page<BehaviorEvent>> {
        let filter = filter.clamped();
        let inner = self.inner.read();

        let mut matched: Vec<_> = inner
            .events
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.received_at.cmp(&a.received_at));

        let total = matched.len() as u64;
        let items = matched
            .into_iter()
            .skip(filter.skip as usize)
            .take(filter.limit as usize)
            .collect();

        Ok(Page {
            items,
            pagination: Pagination::new(total, filter.skip, filter.limit),
        })
    }

    async fn list_sessions(&self, filter: SessionFilter) -> Result<Page<Session>> {
        let filter = filter.clamped();
        let inner = self.inner.read();

        let mut matched: Vec<_> = inner
            .sessions
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        let total = matched.len() as u64;
        let items = matched
            .into_iter()
            .skip(filter.skip as usize)
            .take(filter.limit as usize)
            .collect();

        Ok(Page {
            items,
            pagination: Pagination::new(total, filter.skip, filter.limit),
        })
    }

    async fn overview(&self, range: TimeRange) -> Result<OverviewStats> {
        let inner = self.inner.read();

        let mut total = 0u64;
        let mut users = HashSet::new();
        let mut sessions = HashSet::new();
        let mut by_type: HashMap<String, u64> = HashMap::new();
        let mut by_category: HashMap<String, u64> = HashMap::new();

        for event in events_in_range(&inner.events, &range) {
            total += 1;
            if let Some(user_id) = &event.user_id {
                users.insert(user_id.clone());
            }
            sessions.insert(event.session_id);
            *by_type.entry(event.kind().as_str().to_string()).or_default() += 1;
            *by_category
                .entry(event.category().as_str().to_string())
                .or_default() += 1;
        }

        Ok(OverviewStats {
            total_events: total,
            unique_users: users.len() as u64,
            unique_sessions: sessions.len() as u64,
            by_type: sorted_counts(by_type)
                .into_iter()
                .map(|(event_type, count)| TypeCount { event_type, count })
                .collect(),
            by_category: sorted_counts(by_category)
                .into_iter()
                .map(|(category, count)| CategoryCount { category, count })
                .collect(),
        })
    }

    async fn metrics_series(&self, interval: MetricsInterval) -> Result<Vec<MetricsBucket>> {
        let range = interval.range();
        let bucket = interval.bucket();
        let inner = self.inner.read();

        struct Acc {
            events: u64,
            users: HashSet<String>,
            sessions: HashSet<Uuid>,
        }

        let mut buckets: BTreeMap<i64, Acc> = BTreeMap::new();

        for event in events_in_range(&inner.events, &range) {
            let ts = event.received_at.timestamp_millis();
            let width = bucket.num_milliseconds();
            let bucket_start = ts - ts.rem_euclid(width);

            let acc = buckets.entry(bucket_start).or_insert_with(|| Acc {
                events: 0,
                users: HashSet::new(),
                sessions: HashSet::new(),
            });
            acc.events += 1;
            if let Some(user_id) = &event.user_id {
                acc.users.insert(user_id.clone());
            }
            acc.sessions.insert(event.session_id);
        }

        Ok(buckets
            .into_iter()
            .map(|(start_ms, acc)| MetricsBucket {
                bucket_start: chrono::DateTime::from_timestamp_millis(start_ms)
                    .unwrap_or_default(),
                events: acc.events,
                unique_users: acc.users.len() as u64,
                unique_sessions: acc.sessions.len() as u64,
            })
            .collect())
    }

    async fn top_pages(&self, range: TimeRange, limit: u64) -> Result<Vec<PageStats>> {
        let inner = self.inner.read();

        struct Acc {
            views: u64,
            users: HashSet<String>,
            time_sum: f64,
            time_count: u64,
        }

        let mut pages: HashMap<String, Acc> = HashMap::new();

        for event in events_in_range(&inner.events, &range) {
            let EventPayload::PageView(data) = &event.payload else {
                continue;
            };
            let acc = pages.entry(event.url.clone()).or_insert_with(|| Acc {
                views: 0,
                users: HashSet::new(),
                time_sum: 0.0,
                time_count: 0,
            });
            acc.views += 1;
            if let Some(user_id) = &event.user_id {
                acc.users.insert(user_id.clone());
            }
            if let Some(time_on_page) = data.time_on_page {
                acc.time_sum += time_on_page;
                acc.time_count += 1;
            }
        }

        let mut stats: Vec<PageStats> = pages
            .into_iter()
            .map(|(url, acc)| PageStats {
                url,
                view_count: acc.views,
                unique_users: acc.users.len() as u64,
                avg_time_on_page: (acc.time_count > 0)
                    .then(|| acc.time_sum / acc.time_count as f64),
            })
            .collect();
        stats.sort_by(|a, b| {
            b.view_count
                .cmp(&a.view_count)
                .then_with(|| a.url.cmp(&b.url))
        });
        stats.truncate(limit as usize);
        Ok(stats)
    }

    async fn devices(&self, range: TimeRange) -> Result<Vec<DeviceStats>> {
        let inner = self.inner.read();

        let mut counts: HashMap<String, u64> = HashMap::new();
        for event in events_in_range(&inner.events, &range) {
            *counts.entry(event.device.as_str().to_string()).or_default() += 1;
        }

        Ok(percentages(sorted_counts(counts)))
    }

    async fn heatmap(&self, url: &str, range: TimeRange) -> Result<Vec<HeatmapPoint>> {
        let inner = self.inner.read();

        let mut cells: HashMap<(i64, i64, Option<String>), u64> = HashMap::new();
        for event in events_in_range(&inner.events, &range) {
            if event.url != url {
                continue;
            }
            // Scroll samples have no horizontal position or element; they
            // land on the x = 0 column at their scroll depth.
            let key = match &event.payload {
                EventPayload::Click(data) => (
                    data.x.trunc() as i64,
                    data.y.trunc() as i64,
                    data.element_id.clone(),
                ),
                EventPayload::Scroll(data) => (0, data.scroll_position.trunc() as i64, None),
                _ => continue,
            };
            *cells.entry(key).or_default() += 1;
        }

        let mut points: Vec<HeatmapPoint> = cells
            .into_iter()
            .map(|((x, y, element_id), count)| HeatmapPoint {
                x,
                y,
                element_id,
                count,
            })
            .collect();
        points.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| (a.x, a.y).cmp(&(b.x, b.y)))
        });
        Ok(points)
    }

    async fn user_detail(&self, user_id: &str, range: TimeRange) -> Result<UserDetail> {
        let inner = self.inner.read();

        let mut events: Vec<_> = events_in_range(&inner.events, &range)
            .filter(|e| e.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.received_at.cmp(&a.received_at));

        let mut by_type: HashMap<String, u64> = HashMap::new();
        for event in &events {
            *by_type.entry(event.kind().as_str().to_string()).or_default() += 1;
        }
        let total_events = events.len() as u64;
        events.truncate(MAX_USER_DETAIL_EVENTS as usize);

        let mut sessions: Vec<_> = inner
            .sessions
            .values()
            .filter(|s| s.user_id.as_deref() == Some(user_id) && range.contains(s.started_at))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        Ok(UserDetail {
            summary: UserSummary {
                total_events,
                total_sessions: sessions.len() as u64,
                by_type: sorted_counts(by_type)
                    .into_iter()
                    .map(|(event_type, count)| TypeCount { event_type, count })
                    .collect(),
            },
            events,
            sessions,
        })
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
