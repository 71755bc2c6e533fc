//! ClickHouse-backed store.
//!
//! Events are flattened into one wide row; the type-specific payload is
//! kept as a JSON blob (including its type tag) so reads can rebuild the
//! typed event without per-kind tables.

use async_trait::async_trait;
use clickhouse::Row;
use serde::{Deserialize, Serialize};
use telemetry::metrics;
use tracing::debug;
use uuid::Uuid;

use crate::client::ClickHouseClient;
use crate::store::{percentages, BehaviorStore};
use tracker_core::{
    BehaviorEvent, Browser, CategoryCount, DeviceStats, Error, EventFilter, EventStatus,
    HeatmapPoint, MetricsBucket, MetricsInterval, OverviewStats, Page, PageStats, Pagination,
    Result, Session, SessionFilter, SessionStatus, TimeRange, TypeCount, UserDetail, UserSummary,
};
use tracker_core::limits::MAX_USER_DETAIL_EVENTS;

/// Flattened event row for the pulse.events table.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct EventRow {
    pub event_id: String,
    pub session_id: String,
    pub user_id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub category: String,
    pub status: String,
    pub url: String,
    pub timestamp: i64, // DateTime64(3) as milliseconds
    pub client_time: Option<i64>,
    pub device_type: String,
    pub browser: String,
    pub browser_version: String,
    pub country: Option<String>,
    pub region: Option<String>,
    pub tags: String,
    pub data: String, // JSON payload blob, carries the type tag
}

impl TryFrom<&BehaviorEvent> for EventRow {
    type Error = Error;

    fn try_from(event: &BehaviorEvent) -> Result<Self> {
        Ok(Self {
            event_id: event.id.to_string(),
            session_id: event.session_id.to_string(),
            user_id: event.user_id.clone(),
            event_type: event.kind().as_str().to_string(),
            category: event.category().as_str().to_string(),
            status: event.status.as_str().to_string(),
            url: event.url.clone(),
            timestamp: event.received_at.timestamp_millis(),
            client_time: event.client_time.map(|t| t.timestamp_millis()),
            device_type: event.device.as_str().to_string(),
            browser: event.browser.name.clone(),
            browser_version: event.browser.version.clone(),
            country: event.country.clone(),
            region: event.region.clone(),
            tags: serde_json::to_string(&event.tags)?,
            data: serde_json::to_string(&event.payload)?,
        })
    }
}

impl TryFrom<EventRow> for BehaviorEvent {
    type Error = Error;

    fn try_from(row: EventRow) -> Result<Self> {
        let payload = serde_json::from_str(&row.data)?;
        let status = match row.status.as_str() {
            "warning" => EventStatus::Warning,
            "error" => EventStatus::Error,
            _ => EventStatus::Success,
        };
        Ok(Self {
            id: parse_uuid(&row.event_id)?,
            session_id: parse_uuid(&row.session_id)?,
            user_id: row.user_id,
            url: row.url,
            device: row.device_type.parse().unwrap_or_default(),
            browser: Browser {
                name: row.browser,
                version: row.browser_version,
            },
            country: row.country,
            region: row.region,
            received_at: millis_to_datetime(row.timestamp),
            client_time: row.client_time.map(millis_to_datetime),
            status,
            tags: serde_json::from_str(&row.tags).unwrap_or_default(),
            payload,
        })
    }
}

/// Session row for the pulse.sessions table.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct SessionRow {
    pub session_id: String,
    pub user_id: Option<String>,
    pub user_agent: String,
    pub ip: String,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub status: String,
    pub page_views: u64,
    pub interactions: u64,
    pub duration_ms: Option<u64>,
    pub updated_at: i64,
}

impl From<&Session> for SessionRow {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id.to_string(),
            user_id: session.user_id.clone(),
            user_agent: session.user_agent.clone(),
            ip: session.ip.clone(),
            started_at: session.started_at.timestamp_millis(),
            ended_at: session.ended_at.map(|t| t.timestamp_millis()),
            status: session.status.as_str().to_string(),
            page_views: session.page_views,
            interactions: session.interactions,
            duration_ms: session.duration_ms,
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

impl TryFrom<SessionRow> for Session {
    type Error = Error;

    fn try_from(row: SessionRow) -> Result<Self> {
        Ok(Self {
            id: parse_uuid(&row.session_id)?,
            user_id: row.user_id,
            user_agent: row.user_agent,
            ip: row.ip,
            started_at: millis_to_datetime(row.started_at),
            ended_at: row.ended_at.map(millis_to_datetime),
            status: row.status.parse().unwrap_or(SessionStatus::Ended),
            page_views: row.page_views,
            interactions: row.interactions,
            duration_ms: row.duration_ms,
        })
    }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::internal(format!("bad id in store: {}", e)))
}

fn millis_to_datetime(ms: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[derive(Debug, Row, Deserialize)]
struct CountRow {
    count: u64,
}

#[derive(Debug, Row, Deserialize)]
struct TypeCountRow {
    key: String,
    count: u64,
}

#[derive(Debug, Row, Deserialize)]
struct OverviewRow {
    total: u64,
    users: u64,
    sessions: u64,
}

#[derive(Debug, Row, Deserialize)]
struct BucketRow {
    bucket_ms: i64,
    events: u64,
    users: u64,
    sessions: u64,
}

#[derive(Debug, Row, Deserialize)]
struct PageStatsRow {
    url: String,
    views: u64,
    users: u64,
    avg_time: Option<f64>,
}

#[derive(Debug, Row, Deserialize)]
struct HeatmapRow {
    x: i64,
    y: i64,
    element_id: String,
    count: u64,
}

/// Production store backed by ClickHouse.
#[derive(Clone)]
pub struct ClickHouseStore {
    client: ClickHouseClient,
}

impl ClickHouseStore {
    pub fn new(client: ClickHouseClient) -> Self {
        Self { client }
    }

    fn query_err(e: clickhouse::error::Error) -> Error {
        Error::store_failed(format!("ClickHouse query error: {}", e))
    }
}

const RANGE_CLAUSE: &str =
    "timestamp >= fromUnixTimestamp64Milli(?) AND timestamp < fromUnixTimestamp64Milli(?)";

#[async_trait]
impl BehaviorStore for ClickHouseStore {
    async fn record_event(&self, event: &BehaviorEvent) -> Result<()> {
        let row = EventRow::try_from(event)?;
        let start = std::time::Instant::now();

        let mut insert = self
            .client
            .inner()
            .insert("pulse.events")
            .map_err(|e| {
                metrics().persist_errors.inc();
                Error::store_failed(format!("Insert error: {}", e))
            })?;

        insert.write(&row).await.map_err(|e| {
            metrics().persist_errors.inc();
            Error::store_failed(format!("Write error: {}", e))
        })?;

        insert.end().await.map_err(|e| {
            metrics().persist_errors.inc();
            Error::store_failed(format!("End error: {}", e))
        })?;

        metrics()
            .store_latency_ms
            .observe(start.elapsed().as_millis() as u64);
        metrics().events_persisted.inc();

        debug!(event_id = %row.event_id, event_type = %row.event_type, "Persisted event");
        Ok(())
    }

    async fn upsert_session(&self, session: &Session) -> Result<()> {
        let row = SessionRow::from(session);

        let mut insert = self
            .client
            .inner()
            .insert("pulse.sessions")
            .map_err(|e| Error::store_failed(format!("Insert error: {}", e)))?;

        insert
            .write(&row)
            .await
            .map_err(|e| Error::store_failed(format!("Write error: {}", e)))?;

        insert
            .end()
            .await
            .map_err(|e| Error::store_failed(format!("End error: {}", e)))?;

        metrics().sessions_persisted.inc();
        Ok(())
    }

    async fn list_events(&self, filter: EventFilter) -> Result<Page<BehaviorEvent>> {
        let filter = filter.clamped();
        let mut conditions = vec![RANGE_CLAUSE.to_string()];
        if filter.user_id.is_some() {
            conditions.push("user_id = ?".to_string());
        }
        if filter.session_id.is_some() {
            conditions.push("session_id = ?".to_string());
        }
        if filter.kind.is_some() {
            conditions.push("type = ?".to_string());
        }
        let where_clause = conditions.join(" AND ");

        let bind_filters = |mut q: clickhouse::query::Query| {
            q = q
                .bind(filter.range.start.timestamp_millis())
                .bind(filter.range.end.timestamp_millis());
            if let Some(ref user_id) = filter.user_id {
                q = q.bind(user_id.as_str());
            }
            if let Some(session_id) = filter.session_id {
                q = q.bind(session_id.to_string());
            }
            if let Some(kind) = filter.kind {
                q = q.bind(kind.as_str());
            }
            q
        };

        let count_sql = format!("SELECT count() AS count FROM pulse.events WHERE {where_clause}");
        let total: CountRow = bind_filters(self.client.inner().query(&count_sql))
            .fetch_one()
            .await
            .map_err(Self::query_err)?;

        let list_sql = format!(
            "SELECT event_id, session_id, user_id, type, category, status, url, \
             toUnixTimestamp64Milli(timestamp) AS timestamp, \
             toUnixTimestamp64Milli(client_time) AS client_time, \
             device_type, browser, browser_version, country, region, tags, data \
             FROM pulse.events WHERE {where_clause} \
             ORDER BY timestamp DESC LIMIT ? OFFSET ?"
        );
        let rows: Vec<EventRow> = bind_filters(self.client.inner().query(&list_sql))
            .bind(filter.limit)
            .bind(filter.skip)
            .fetch_all()
            .await
            .map_err(Self::query_err)?;

        let items = rows
            .into_iter()
            .map(BehaviorEvent::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            pagination: Pagination::new(total.count, filter.skip, filter.limit),
        })
    }

    async fn list_sessions(&self, filter: SessionFilter) -> Result<Page<Session>> {
        let filter = filter.clamped();
        let mut conditions = vec![
            "started_at >= fromUnixTimestamp64Milli(?) AND started_at < fromUnixTimestamp64Milli(?)"
                .to_string(),
        ];
        if filter.user_id.is_some() {
            conditions.push("user_id = ?".to_string());
        }
        if filter.status.is_some() {
            conditions.push("status = ?".to_string());
        }
        let where_clause = conditions.join(" AND ");

        let bind_filters = |mut q: clickhouse::query::Query| {
            q = q
                .bind(filter.range.start.timestamp_millis())
                .bind(filter.range.end.timestamp_millis());
            if let Some(ref user_id) = filter.user_id {
                q = q.bind(user_id.as_str());
            }
            if let Some(status) = filter.status {
                q = q.bind(status.as_str());
            }
            q
        };

        // FINAL collapses ReplacingMergeTree versions to the latest snapshot.
        let count_sql =
            format!("SELECT count() AS count FROM pulse.sessions FINAL WHERE {where_clause}");
        let total: CountRow = bind_filters(self.client.inner().query(&count_sql))
            .fetch_one()
            .await
            .map_err(Self::query_err)?;

        let list_sql = format!(
            "SELECT session_id, user_id, user_agent, ip, \
             toUnixTimestamp64Milli(started_at) AS started_at, \
             toUnixTimestamp64Milli(ended_at) AS ended_at, \
             status, page_views, interactions, duration_ms, \
             toUnixTimestamp64Milli(updated_at) AS updated_at \
             FROM pulse.sessions FINAL WHERE {where_clause} \
             ORDER BY started_at DESC LIMIT ? OFFSET ?"
        );
        let rows: Vec<SessionRow> = bind_filters(self.client.inner().query(&list_sql))
            .bind(filter.limit)
            .bind(filter.skip)
            .fetch_all()
            .await
            .map_err(Self::query_err)?;

        let items = rows
            .into_iter()
            .map(Session::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            pagination: Pagination::new(total.count, filter.skip, filter.limit),
        })
    }

    async fn overview(&self, range: TimeRange) -> Result<OverviewStats> {
        let totals_sql = format!(
            "SELECT count() AS total, uniqExact(user_id) AS users, \
             uniqExact(session_id) AS sessions \
             FROM pulse.events WHERE {RANGE_CLAUSE}"
        );
        let totals: OverviewRow = self
            .client
            .inner()
            .query(&totals_sql)
            .bind(range.start.timestamp_millis())
            .bind(range.end.timestamp_millis())
            .fetch_one()
            .await
            .map_err(Self::query_err)?;

        let by_type_sql = format!(
            "SELECT type AS key, count() AS count FROM pulse.events \
             WHERE {RANGE_CLAUSE} GROUP BY type ORDER BY count DESC, key ASC"
        );
        let by_type: Vec<TypeCountRow> = self
            .client
            .inner()
            .query(&by_type_sql)
            .bind(range.start.timestamp_millis())
            .bind(range.end.timestamp_millis())
            .fetch_all()
            .await
            .map_err(Self::query_err)?;

        let by_category_sql = format!(
            "SELECT category AS key, count() AS count FROM pulse.events \
             WHERE {RANGE_CLAUSE} GROUP BY category ORDER BY count DESC, key ASC"
        );
        let by_category: Vec<TypeCountRow> = self
            .client
            .inner()
            .query(&by_category_sql)
            .bind(range.start.timestamp_millis())
            .bind(range.end.timestamp_millis())
            .fetch_all()
            .await
            .map_err(Self::query_err)?;

        Ok(OverviewStats {
            total_events: totals.total,
            unique_users: totals.users,
            unique_sessions: totals.sessions,
            by_type: by_type
                .into_iter()
                .map(|r| TypeCount {
                    event_type: r.key,
                    count: r.count,
                })
                .collect(),
            by_category: by_category
                .into_iter()
                .map(|r| CategoryCount {
                    category: r.key,
                    count: r.count,
                })
                .collect(),
        })
    }

    async fn metrics_series(&self, interval: MetricsInterval) -> Result<Vec<MetricsBucket>> {
        let range = interval.range();
        let bucket_fn = if interval.bucket() == chrono::Duration::hours(1) {
            "toStartOfHour"
        } else {
            "toStartOfDay"
        };

        let sql = format!(
            "SELECT toUnixTimestamp64Milli(toDateTime64({bucket_fn}(timestamp), 3)) AS bucket_ms, \
             count() AS events, uniqExact(user_id) AS users, uniqExact(session_id) AS sessions \
             FROM pulse.events WHERE {RANGE_CLAUSE} \
             GROUP BY bucket_ms ORDER BY bucket_ms ASC"
        );

        let rows: Vec<BucketRow> = self
            .client
            .inner()
            .query(&sql)
            .bind(range.start.timestamp_millis())
            .bind(range.end.timestamp_millis())
            .fetch_all()
            .await
            .map_err(Self::query_err)?;

        Ok(rows
            .into_iter()
            .map(|r| MetricsBucket {
                bucket_start: millis_to_datetime(r.bucket_ms),
                events: r.events,
                unique_users: r.users,
                unique_sessions: r.sessions,
            })
            .collect())
    }

    async fn top_pages(&self, range: TimeRange, limit: u64) -> Result<Vec<PageStats>> {
        let sql = format!(
            "SELECT url, count() AS views, uniqExact(user_id) AS users, \
             avgOrNullIf(JSONExtractFloat(data, 'timeOnPage'), JSONHas(data, 'timeOnPage')) AS avg_time \
             FROM pulse.events WHERE type = 'page_view' AND {RANGE_CLAUSE} \
             GROUP BY url ORDER BY views DESC, url ASC LIMIT ?"
        );

        let rows: Vec<PageStatsRow> = self
            .client
            .inner()
            .query(&sql)
            .bind(range.start.timestamp_millis())
            .bind(range.end.timestamp_millis())
            .bind(limit)
            .fetch_all()
            .await
            .map_err(Self::query_err)?;

        Ok(rows
            .into_iter()
            .map(|r| PageStats {
                url: r.url,
                view_count: r.views,
                unique_users: r.users,
                avg_time_on_page: r.avg_time,
            })
            .collect())
    }

    async fn devices(&self, range: TimeRange) -> Result<Vec<DeviceStats>> {
        let sql = format!(
            "SELECT device_type AS key, count() AS count FROM pulse.events \
             WHERE {RANGE_CLAUSE} GROUP BY device_type ORDER BY count DESC, key ASC"
        );

        let rows: Vec<TypeCountRow> = self
            .client
            .inner()
            .query(&sql)
            .bind(range.start.timestamp_millis())
            .bind(range.end.timestamp_millis())
            .fetch_all()
            .await
            .map_err(Self::query_err)?;

        Ok(percentages(
            rows.into_iter().map(|r| (r.key, r.count)).collect(),
        ))
    }

    async fn heatmap(&self, url: &str, range: TimeRange) -> Result<Vec<HeatmapPoint>> {
        // Scroll samples carry no x or element id; JSONExtractFloat yields 0
        // for the missing key, so they group on the x = 0 column at their
        // scroll depth.
        let sql = format!(
            "SELECT toInt64(JSONExtractFloat(data, 'x')) AS x, \
             toInt64(JSONExtractFloat(data, if(type = 'scroll', 'scrollPosition', 'y'))) AS y, \
             JSONExtractString(data, 'elementId') AS element_id, \
             count() AS count \
             FROM pulse.events WHERE type IN ('click', 'scroll') AND url = ? AND {RANGE_CLAUSE} \
             GROUP BY x, y, element_id ORDER BY count DESC"
        );

        let rows: Vec<HeatmapRow> = self
            .client
            .inner()
            .query(&sql)
            .bind(url)
            .bind(range.start.timestamp_millis())
            .bind(range.end.timestamp_millis())
            .fetch_all()
            .await
            .map_err(Self::query_err)?;

        Ok(rows
            .into_iter()
            .map(|r| HeatmapPoint {
                x: r.x,
                y: r.y,
                element_id: (!r.element_id.is_empty()).then_some(r.element_id),
                count: r.count,
            })
            .collect())
    }

    async fn user_detail(&self, user_id: &str, range: TimeRange) -> Result<UserDetail> {
        let events_sql = format!(
            "SELECT event_id, session_id, user_id, type, category, status, url, \
             toUnixTimestamp64Milli(timestamp) AS timestamp, \
             toUnixTimestamp64Milli(client_time) AS client_time, \
             device_type, browser, browser_version, country, region, tags, data \
             FROM pulse.events WHERE user_id = ? AND {RANGE_CLAUSE} \
             ORDER BY timestamp DESC LIMIT ?"
        );
        let event_rows: Vec<EventRow> = self
            .client
            .inner()
            .query(&events_sql)
            .bind(user_id)
            .bind(range.start.timestamp_millis())
            .bind(range.end.timestamp_millis())
            .bind(MAX_USER_DETAIL_EVENTS)
            .fetch_all()
            .await
            .map_err(Self::query_err)?;

        let sessions_sql = "SELECT session_id, user_id, user_agent, ip, \
             toUnixTimestamp64Milli(started_at) AS started_at, \
             toUnixTimestamp64Milli(ended_at) AS ended_at, \
             status, page_views, interactions, duration_ms, \
             toUnixTimestamp64Milli(updated_at) AS updated_at \
             FROM pulse.sessions FINAL WHERE user_id = ? \
             AND started_at >= fromUnixTimestamp64Milli(?) \
             AND started_at < fromUnixTimestamp64Milli(?) \
             ORDER BY started_at DESC";
        let session_rows: Vec<SessionRow> = self
            .client
            .inner()
            .query(sessions_sql)
            .bind(user_id)
            .bind(range.start.timestamp_millis())
            .bind(range.end.timestamp_millis())
            .fetch_all()
            .await
            .map_err(Self::query_err)?;

        let summary_sql = format!(
            "SELECT type AS key, count() AS count FROM pulse.events \
             WHERE user_id = ? AND {RANGE_CLAUSE} \
             GROUP BY type ORDER BY count DESC, key ASC"
        );
        let by_type: Vec<TypeCountRow> = self
            .client
            .inner()
            .query(&summary_sql)
            .bind(user_id)
            .bind(range.start.timestamp_millis())
            .bind(range.end.timestamp_millis())
            .fetch_all()
            .await
            .map_err(Self::query_err)?;

        let total_events: u64 = by_type.iter().map(|r| r.count).sum();

        Ok(UserDetail {
            events: event_rows
                .into_iter()
                .map(BehaviorEvent::try_from)
                .collect::<Result<Vec<_>>>()?,
            summary: UserSummary {
                total_events,
                total_sessions: session_rows.len() as u64,
                by_type: by_type
                    .into_iter()
                    .map(|r| TypeCount {
                        event_type: r.key,
                        count: r.count,
                    })
                    .collect(),
            },
            sessions: session_rows
                .into_iter()
                .map(Session::try_from)
                .collect::<Result<Vec<_>>>()?,
        })
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .inner()
            .query("SELECT 1")
            .execute()
            .await
            .map_err(|e| Error::store_failed(format!("Ping error: {}", e)))
    }
}
