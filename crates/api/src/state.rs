//! Application state shared across handlers.

use std::sync::Arc;

use auth_client::AuthClient;
use event_store::{BehaviorStore, SessionCache};

/// Shared application state.
#[derive(Clone)]
pub struct ApiState {
    /// Store backend (ClickHouse in production, in-memory in tests)
    pub store: Arc<dyn BehaviorStore>,
    /// Auth service client
    pub auth: AuthClient,
    /// Live-session cache, written by the gateway
    pub sessions: SessionCache,
}

impl ApiState {
    pub fn new(store: Arc<dyn BehaviorStore>, auth: AuthClient, sessions: SessionCache) -> Self {
        Self {
            store,
            auth,
            sessions,
        }
    }
}
