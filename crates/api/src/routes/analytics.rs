//! Analytics query endpoints.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Instant;
use telemetry::metrics;
use tracing::debug;
use uuid::Uuid;

use event_store::events_to_csv;
use tracker_core::limits::{DEFAULT_TOP_PAGES_LIMIT, MAX_PAGE_LIMIT, MAX_TOP_PAGES_LIMIT};
use tracker_core::{EventFilter, MetricsInterval, SessionFilter, TimeRange};

use crate::extractors::AuthedCaller;
use crate::response::{ApiError, ApiResponse};
use crate::state::ApiState;

/// Optional explicit time window, RFC 3339 bounds.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeParams {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl RangeParams {
    /// Resolve against the endpoint's default window; either bound may be
    /// overridden independently.
    fn resolve(&self, default: TimeRange) -> TimeRange {
        TimeRange::new(
            self.start_date.unwrap_or(default.start),
            self.end_date.unwrap_or(default.end),
        )
    }
}

/// GET /api/analytics/overview
pub async fn overview_handler(
    State(state): State<ApiState>,
    _caller: AuthedCaller,
    Query(params): Query<RangeParams>,
) -> Result<Response, ApiError> {
    let start = Instant::now();
    let range = params.resolve(TimeRange::default_overview());
    let stats = state.store.overview(range).await?;
    metrics()
        .query_latency_ms
        .observe(start.elapsed().as_millis() as u64);
    Ok(ApiResponse::ok(stats).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsParams {
    pub user_id: Option<String>,
    pub session_id: Option<Uuid>,
    pub event_type: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
}

/// GET /api/analytics/events
pub async fn events_handler(
    State(state): State<ApiState>,
    _caller: AuthedCaller,
    Query(params): Query<EventsParams>,
) -> Result<Response, ApiError> {
    let start = Instant::now();
    let kind = params
        .event_type
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(|e: tracker_core::Error| ApiError::bad_request(e.to_string()))?;

    let mut filter = EventFilter {
        user_id: params.user_id,
        session_id: params.session_id,
        kind,
        ..EventFilter::default()
    };
    filter.range = RangeParams {
        start_date: params.start_date,
        end_date: params.end_date,
    }
    .resolve(filter.range);
    if let Some(limit) = params.limit {
        filter.limit = limit;
    }
    filter.skip = params.skip.unwrap_or(0);

    let page = state.store.list_events(filter.clamped()).await?;
    metrics()
        .query_latency_ms
        .observe(start.elapsed().as_millis() as u64);
    Ok(ApiResponse::ok(page).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsParams {
    pub user_id: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
}

/// GET /api/analytics/sessions
pub async fn sessions_handler(
    State(state): State<ApiState>,
    _caller: AuthedCaller,
    Query(params): Query<SessionsParams>,
) -> Result<Response, ApiError> {
    let status = params
        .status
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(|e: tracker_core::Error| ApiError::bad_request(e.to_string()))?;

    let mut filter = SessionFilter {
        user_id: params.user_id,
        status,
        ..SessionFilter::default()
    };
    filter.range = RangeParams {
        start_date: params.start_date,
        end_date: params.end_date,
    }
    .resolve(filter.range);
    if let Some(limit) = params.limit {
        filter.limit = limit;
    }
    filter.skip = params.skip.unwrap_or(0);

    let page = state.store.list_sessions(filter.clamped()).await?;
    Ok(ApiResponse::ok(page).into_response())
}

/// GET /api/analytics/user/:user_id
pub async fn user_handler(
    State(state): State<ApiState>,
    _caller: AuthedCaller,
    Path(user_id): Path<String>,
    Query(params): Query<RangeParams>,
) -> Result<Response, ApiError> {
    let range = params.resolve(TimeRange::default_user());
    let detail = state.store.user_detail(&user_id, range).await?;
    Ok(ApiResponse::ok(detail).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapParams {
    pub url: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// GET /api/analytics/heatmap
pub async fn heatmap_handler(
    State(state): State<ApiState>,
    _caller: AuthedCaller,
    Query(params): Query<HeatmapParams>,
) -> Result<Response, ApiError> {
    let url = params
        .url
        .as_deref()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::bad_request("url parameter is required"))?;

    let range = RangeParams {
        start_date: params.start_date,
        end_date: params.end_date,
    }
    .resolve(TimeRange::default_overview());

    let points = state.store.heatmap(url, range).await?;
    Ok(ApiResponse::ok(points).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricsParams {
    pub interval: Option<String>,
}

/// GET /api/analytics/metrics
pub async fn metrics_handler(
    State(state): State<ApiState>,
    _caller: AuthedCaller,
    Query(params): Query<MetricsParams>,
) -> Result<Response, ApiError> {
    let interval: MetricsInterval = params
        .interval
        .as_deref()
        .unwrap_or("1day")
        .parse()
        .map_err(|e: tracker_core::Error| ApiError::bad_request(e.to_string()))?;

    let series = state.store.metrics_series(interval).await?;
    Ok(ApiResponse::ok(series).into_response())
}

/// GET /api/analytics/devices
pub async fn devices_handler(
    State(state): State<ApiState>,
    _caller: AuthedCaller,
    Query(params): Query<RangeParams>,
) -> Result<Response, ApiError> {
    let range = params.resolve(TimeRange::default_overview());
    let stats = state.store.devices(range).await?;
    Ok(ApiResponse::ok(stats).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopPagesParams {
    pub limit: Option<u64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// GET /api/analytics/top-pages
pub async fn top_pages_handler(
    State(state): State<ApiState>,
    _caller: AuthedCaller,
    Query(params): Query<TopPagesParams>,
) -> Result<Response, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_TOP_PAGES_LIMIT)
        .clamp(1, MAX_TOP_PAGES_LIMIT);
    let range = RangeParams {
        start_date: params.start_date,
        end_date: params.end_date,
    }
    .resolve(TimeRange::default_overview());

    let pages = state.store.top_pages(range, limit).await?;
    Ok(ApiResponse::ok(pages).into_response())
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub format: ExportFormat,
    pub event_type: Option<String>,
    pub user_id: Option<String>,
}

/// POST /api/analytics/export
pub async fn export_handler(
    State(state): State<ApiState>,
    _caller: AuthedCaller,
    Json(request): Json<ExportRequest>,
) -> Result<Response, ApiError> {
    let start = Instant::now();
    let kind = request
        .event_type
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(|e: tracker_core::Error| ApiError::bad_request(e.to_string()))?;

    let mut filter = EventFilter {
        user_id: request.user_id,
        kind,
        limit: MAX_PAGE_LIMIT,
        ..EventFilter::default()
    };
    filter.range = RangeParams {
        start_date: request.start_date,
        end_date: request.end_date,
    }
    .resolve(filter.range);

    let page = state.store.list_events(filter).await?;
    metrics()
        .query_latency_ms
        .observe(start.elapsed().as_millis() as u64);
    debug!(rows = page.items.len(), format = ?request.format, "Export served");

    match request.format {
        ExportFormat::Json => Ok(ApiResponse::ok(page).into_response()),
        ExportFormat::Csv => {
            let body = events_to_csv(&page.items);
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=\"events.csv\"",
                    ),
                ],
                body,
            )
                .into_response())
        }
    }
}
