//! Outbound frame construction.
//!
//! The gateway dispatches on the `event` name in the envelope, so the SDK
//! maps each payload kind onto its wire name and serializes the payload
//! struct alone as `data`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use tracker_core::EventPayload;

/// Outbound envelope: `{id, event, data, timestamp}`.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub id: String,
    pub event: &'static str,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn new(payload: &EventPayload, timestamp: DateTime<Utc>) -> Self {
        let (event, data) = wire_parts(payload);
        Self {
            id: Uuid::new_v4().to_string(),
            event,
            data,
            timestamp,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

fn value_of<T: Serialize>(data: &T) -> serde_json::Value {
    serde_json::to_value(data).unwrap_or_default()
}

/// Wire event name plus the bare data object for one payload.
pub fn wire_parts(payload: &EventPayload) -> (&'static str, serde_json::Value) {
    match payload {
        EventPayload::PageView(d) => ("pageView", value_of(d)),
        EventPayload::Click(d) => ("click", value_of(d)),
        EventPayload::Scroll(d) => ("scroll", value_of(d)),
        EventPayload::FormSubmit(d) => ("formSubmit", value_of(d)),
        EventPayload::VideoPlay(d) => ("videoPlay", value_of(d)),
        EventPayload::VideoPause(d) => ("videoPause", value_of(d)),
        EventPayload::Search(d) => ("search", value_of(d)),
        EventPayload::Like(d) => ("social:like", value_of(d)),
        EventPayload::Comment(d) => ("social:comment", value_of(d)),
        EventPayload::Share(d) => ("social:share", value_of(d)),
        EventPayload::Follow(d) => ("social:follow", value_of(d)),
        EventPayload::Custom(d) => ("engagement:custom", value_of(d)),
    }
}
