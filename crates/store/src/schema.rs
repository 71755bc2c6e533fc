//! ClickHouse table schemas.
//!
//! Two tables: a MergeTree events table partitioned by month with a 90-day
//! TTL, and a ReplacingMergeTree sessions table keyed on session_id so
//! upserts from the gateway collapse to the latest snapshot.

use crate::client::ClickHouseClient;
use tracker_core::Result;

/// SQL for creating the events table.
///
/// Type-specific payload fields live in the `data` JSON blob; the flat
/// columns cover everything the aggregation queries group on.
pub const CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pulse.events (
    event_id String,
    session_id String,
    user_id Nullable(String),

    type LowCardinality(String),
    category LowCardinality(String),
    status LowCardinality(String),

    url String,
    timestamp DateTime64(3),
    client_time Nullable(DateTime64(3)),

    device_type LowCardinality(String),
    browser LowCardinality(String),
    browser_version String,
    country Nullable(String),
    region Nullable(String),

    tags String,
    data String,

    created_at DateTime DEFAULT now()
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(timestamp)
ORDER BY (timestamp, event_id)
TTL toDateTime(timestamp) + INTERVAL 90 DAY
SETTINGS index_granularity = 8192
"#;

/// SQL for creating the sessions table.
///
/// The gateway rewrites the whole row on every counter update and on
/// close; ReplacingMergeTree keeps the newest version per session_id.
pub const CREATE_SESSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pulse.sessions (
    session_id String,
    user_id Nullable(String),
    user_agent String,
    ip String,
    started_at DateTime64(3),
    ended_at Nullable(DateTime64(3)),
    status LowCardinality(String),
    page_views UInt64,
    interactions UInt64,
    duration_ms Nullable(UInt64),
    updated_at DateTime64(3)
)
ENGINE = ReplacingMergeTree(updated_at)
PARTITION BY toYYYYMM(started_at)
ORDER BY (session_id)
TTL toDateTime(started_at) + INTERVAL 90 DAY
SETTINGS index_granularity = 8192
"#;

/// SQL for creating the database.
pub const CREATE_DATABASE: &str = r#"
CREATE DATABASE IF NOT EXISTS pulse
"#;

/// All schema statements in creation order.
pub fn all_tables() -> Vec<&'static str> {
    vec![CREATE_DATABASE, CREATE_EVENTS_TABLE, CREATE_SESSIONS_TABLE]
}

/// Initialize the database schema.
///
/// Creates the database and all tables if they don't exist.
pub async fn init_schema(client: &ClickHouseClient) -> Result<()> {
    for sql in all_tables() {
        client
            .inner()
            .query(sql)
            .execute()
            .await
            .map_err(|e| tracker_core::Error::internal(format!("Schema init error: {}", e)))?;
    }
    Ok(())
}
