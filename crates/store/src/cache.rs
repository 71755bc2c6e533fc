//! In-process cache of live sessions.
//!
//! The gateway is the writer; the health surface reads the active count.
//! Entries expire after one hour of inactivity so crashed connections
//! don't pin sessions forever.

use moka::sync::Cache;
use std::time::Duration;
use uuid::Uuid;

use tracker_core::limits::SESSION_CACHE_TTL_SECS;
use tracker_core::Session;

/// TTL-bounded cache of sessions for currently connected clients.
#[derive(Clone)]
pub struct SessionCache {
    cache: Cache<Uuid, Session>,
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCache {
    pub fn new() -> Self {
        Self {
            cache: Cache::builder()
                .time_to_idle(Duration::from_secs(SESSION_CACHE_TTL_SECS))
                .build(),
        }
    }

    /// Insert or refresh a session snapshot.
    pub fn put(&self, session: Session) {
        self.cache.insert(session.id, session);
    }

    pub fn get(&self, id: Uuid) -> Option<Session> {
        self.cache.get(&id)
    }

    /// Drop a session at disconnect.
    pub fn remove(&self, id: Uuid) {
        self.cache.invalidate(&id);
    }

    /// Number of live sessions, for the health endpoint.
    pub fn active_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}
