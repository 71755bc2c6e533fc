//! API routes.

pub mod analytics;
pub mod health;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::ApiState;

/// Creates the query API router.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/analytics/overview", get(analytics::overview_handler))
        .route("/api/analytics/events", get(analytics::events_handler))
        .route("/api/analytics/sessions", get(analytics::sessions_handler))
        .route("/api/analytics/user/:user_id", get(analytics::user_handler))
        .route("/api/analytics/heatmap", get(analytics::heatmap_handler))
        .route("/api/analytics/metrics", get(analytics::metrics_handler))
        .route("/api/analytics/devices", get(analytics::devices_handler))
        .route("/api/analytics/top-pages", get(analytics::top_pages_handler))
        .route("/api/analytics/export", post(analytics::export_handler))
        .route("/health", get(health::health_handler))
        .route("/health/ready", get(health::ready_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
