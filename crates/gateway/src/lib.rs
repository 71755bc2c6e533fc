//! WebSocket connection gateway.
//!
//! One upgrade route; auth and rate limiting decide before the socket
//! exists, then a single task per connection runs the session lifecycle:
//! normalize inbound events, persist, fan out, acknowledge.

use axum::routing::get;
use axum::Router;
use std::sync::Arc;

pub mod config;
pub mod connection;
pub mod geo;
pub mod handlers;
pub mod protocol;
pub mod rate_limit;
pub mod state;

pub use config::GatewayConfig;
pub use geo::{DisabledGeoResolver, GeoInfo, GeoResolver, HttpGeoResolver};
pub use rate_limit::{ConnectionLimiter, FixedWindowLimiter};
pub use state::GatewayState;

/// Build the gateway router. Callers serve it with
/// `into_make_service_with_connect_info::<SocketAddr>()` so the upgrade
/// handler sees peer addresses.
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/ws", get(connection::ws_handler))
        .with_state(state)
}
