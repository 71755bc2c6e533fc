//! Session lifecycle types.
//!
//! One session per connection, owned by the gateway; the store only
//! persists snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::EventKind;

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "ended" => Ok(Self::Ended),
            other => Err(crate::error::Error::InvalidSession(format!(
                "unknown session status: {other}"
            ))),
        }
    }
}

/// A session spanning one client connection's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session ID, generated per connection.
    pub id: Uuid,
    /// Owning user identity; None means anonymous.
    pub user_id: Option<String>,
    /// User agent captured at the handshake.
    pub user_agent: String,
    /// Origin IP captured at the handshake.
    pub ip: String,
    pub started_at: DateTime<Utc>,
    /// Set exactly once, at disconnect.
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    /// Page-view events seen on this session.
    pub page_views: u64,
    /// All accepted events on this session.
    pub interactions: u64,
    /// Computed once, at disconnect.
    pub duration_ms: Option<u64>,
}

impl Session {
    /// Creates a new active session for a freshly accepted connection.
    pub fn new(user_id: Option<String>, user_agent: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            user_agent: user_agent.into(),
            ip: ip.into(),
            started_at: Utc::now(),
            ended_at: None,
            status: SessionStatus::Active,
            page_views: 0,
            interactions: 0,
            duration_ms: None,
        }
    }

    /// Records one accepted event against the session counters.
    pub fn record_event(&mut self, kind: EventKind) {
        self.interactions += 1;
        if kind == EventKind::PageView {
            self.page_views += 1;
        }
    }

    /// Closes the session. End time and duration are set exactly once;
    /// closing an already-ended session is a no-op.
    pub fn close(&mut self) {
        if self.status == SessionStatus::Ended {
            return;
        }
        let now = Utc::now();
        self.status = SessionStatus::Ended;
        self.ended_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_active_with_zero_counters() {
        let session = Session::new(Some("user-1".into()), "Mozilla/5.0", "203.0.113.9");
        assert!(session.is_active());
        assert_eq!(session.interactions, 0);
        assert_eq!(session.page_views, 0);
        assert!(session.ended_at.is_none());
        assert!(session.duration_ms.is_none());
    }

    #[test]
    fn record_event_bumps_counters() {
        let mut session = Session::new(None, "ua", "127.0.0.1");
        session.record_event(EventKind::PageView);
        session.record_event(EventKind::Click);
        session.record_event(EventKind::Click);
        assert_eq!(session.interactions, 3);
        assert_eq!(session.page_views, 1);
    }

    #[test]
    fn close_sets_end_state_exactly_once() {
        let mut session = Session::new(None, "ua", "127.0.0.1");
        session.close();
        let first_end = session.ended_at;
        let first_duration = session.duration_ms;
        assert_eq!(session.status, SessionStatus::Ended);
        assert!(first_end.is_some());
        assert!(first_duration.is_some());

        session.close();
        assert_eq!(session.ended_at, first_end);
        assert_eq!(session.duration_ms, first_duration);
    }
}
