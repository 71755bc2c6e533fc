//! Shared gateway state.

use std::sync::Arc;
use std::time::Duration;

use auth_client::AuthClient;
use backplane::Backplane;
use event_store::{BehaviorStore, SessionCache};

use crate::config::GatewayConfig;
use crate::geo::{DisabledGeoResolver, GeoResolver, HttpGeoResolver};
use crate::rate_limit::{ConnectionLimiter, FixedWindowLimiter};

/// Everything a connection needs, shared across the gateway.
pub struct GatewayState {
    pub config: GatewayConfig,
    pub auth: AuthClient,
    pub store: Arc<dyn BehaviorStore>,
    pub backplane: Arc<dyn Backplane>,
    pub sessions: SessionCache,
    pub limiter: Arc<dyn ConnectionLimiter>,
    pub geo: Arc<dyn GeoResolver>,
}

impl GatewayState {
    /// Wire up state from configuration, with the in-process limiter and
    /// the configured geo resolver.
    pub fn new(
        config: GatewayConfig,
        auth: AuthClient,
        store: Arc<dyn BehaviorStore>,
        backplane: Arc<dyn Backplane>,
        sessions: SessionCache,
    ) -> Self {
        let limiter = Arc::new(FixedWindowLimiter::new(
            Duration::from_secs(config.rate_window_secs),
            config.rate_max_connections,
        ));
        let geo: Arc<dyn GeoResolver> = if config.geo_endpoint.is_empty() {
            Arc::new(DisabledGeoResolver)
        } else {
            Arc::new(HttpGeoResolver::new(config.geo_endpoint.clone()))
        };

        Self {
            config,
            auth,
            store,
            backplane,
            sessions,
            limiter,
            geo,
        }
    }
}
