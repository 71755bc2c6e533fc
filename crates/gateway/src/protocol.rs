//! Socket wire protocol.
//!
//! Inbound frames are JSON envelopes `{id?, event, data, timestamp?}`;
//! the `event` tag selects the variant at deserialization, so dispatch is
//! an exhaustive match rather than a string-keyed handler table. Outbound
//! frames are tagged the same way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tracker_core::{
    ClickData, CustomData, EventPayload, FormSubmitData, PageViewData, ScrollData, SearchData,
    SocialData, VideoData,
};

/// Inbound message variants, tagged by wire event name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "pageView")]
    PageView(PageViewData),
    #[serde(rename = "click")]
    Click(ClickData),
    #[serde(rename = "scroll")]
    Scroll(ScrollData),
    #[serde(rename = "formSubmit")]
    FormSubmit(FormSubmitData),
    #[serde(rename = "videoPlay")]
    VideoPlay(VideoData),
    #[serde(rename = "videoPause")]
    VideoPause(VideoData),
    #[serde(rename = "search")]
    Search(SearchData),
    #[serde(rename = "social:like")]
    Like(SocialData),
    #[serde(rename = "social:comment")]
    Comment(SocialData),
    #[serde(rename = "social:share")]
    Share(SocialData),
    #[serde(rename = "social:follow")]
    Follow(SocialData),
    #[serde(rename = "engagement:custom")]
    Custom(CustomData),
    #[serde(rename = "join")]
    Join(RoomData),
    #[serde(rename = "leave")]
    Leave(RoomData),
}

/// Room membership payload for join/leave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomData {
    pub room: String,
}

impl ClientMessage {
    /// Behavior payload for event messages; None for join/leave.
    pub fn into_payload(self) -> Option<EventPayload> {
        match self {
            Self::PageView(d) => Some(EventPayload::PageView(d)),
            Self::Click(d) => Some(EventPayload::Click(d)),
            Self::Scroll(d) => Some(EventPayload::Scroll(d)),
            Self::FormSubmit(d) => Some(EventPayload::FormSubmit(d)),
            Self::VideoPlay(d) => Some(EventPayload::VideoPlay(d)),
            Self::VideoPause(d) => Some(EventPayload::VideoPause(d)),
            Self::Search(d) => Some(EventPayload::Search(d)),
            Self::Like(d) => Some(EventPayload::Like(d)),
            Self::Comment(d) => Some(EventPayload::Comment(d)),
            Self::Share(d) => Some(EventPayload::Share(d)),
            Self::Follow(d) => Some(EventPayload::Follow(d)),
            Self::Custom(d) => Some(EventPayload::Custom(d)),
            Self::Join(_) | Self::Leave(_) => None,
        }
    }
}

/// Inbound frame envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientEnvelope {
    /// Client correlation id, echoed in the ack.
    #[serde(default)]
    pub id: Option<String>,
    /// Client-reported emission time.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub message: ClientMessage,
}

/// Outbound frame variants, tagged by wire event name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ServerMessage {
    /// Per-message acknowledgment.
    #[serde(rename = "ack", rename_all = "camelCase")]
    Ack {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<Uuid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    /// Echo confirming one event reached the store.
    #[serde(rename = "behavior:acknowledged", rename_all = "camelCase")]
    Acknowledged { event_id: Uuid },
    /// Presence: a connection for this identity opened.
    #[serde(rename = "user:connected", rename_all = "camelCase")]
    UserConnected {
        user_id: Option<String>,
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    /// Presence: a connection for this identity closed.
    #[serde(rename = "user:disconnected", rename_all = "camelCase")]
    UserDisconnected {
        user_id: Option<String>,
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    /// Processed event, fanned out on the owner's identity topic.
    #[serde(rename = "behavior:event", rename_all = "camelCase")]
    Behavior {
        #[serde(rename = "type")]
        event_type: String,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
    /// Processed event, fanned out on the analytics room.
    #[serde(rename = "analytics:update", rename_all = "camelCase")]
    AnalyticsUpdate {
        event_type: String,
        event_data: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
}

impl ServerMessage {
    pub fn ack_success(id: Option<String>, event_id: Uuid) -> Self {
        Self::Ack {
            id,
            success: true,
            event_id: Some(event_id),
            error: None,
            code: None,
        }
    }

    /// Ack for control messages (join/leave) that produce no event.
    pub fn ack_ok(id: Option<String>) -> Self {
        Self::Ack {
            id,
            success: true,
            event_id: None,
            error: None,
            code: None,
        }
    }

    pub fn ack_failure(id: Option<String>, error: &tracker_core::Error) -> Self {
        Self::Ack {
            id,
            success: false,
            event_id: None,
            error: Some(error.to_string()),
            code: error.error_code().map(str::to_string),
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
