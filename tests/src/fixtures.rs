//! Test data builders.

use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use tracker_core::{
    BehaviorEvent, Browser, ClickData, DeviceType, EventPayload, EventStatus, PageViewData,
};

/// A well-formed bearer token the mock auth client accepts.
pub fn token() -> String {
    "test-token-0123456789abcdef".to_string()
}

/// A second identity, distinct from [`token`].
pub fn other_token() -> String {
    "other-token-fedcba9876543210".to_string()
}

pub fn page_view(url: &str, time_on_page: Option<f64>) -> EventPayload {
    EventPayload::PageView(PageViewData {
        url: url.to_string(),
        title: None,
        referrer: None,
        time_on_page,
    })
}

pub fn click(url: &str, x: f64, y: f64, element_id: Option<&str>) -> EventPayload {
    EventPayload::Click(ClickData {
        url: url.to_string(),
        element_id: element_id.map(str::to_string),
        element_class: None,
        element_text: None,
        x,
        y,
    })
}

/// A fully-normalized event as the gateway would persist it.
pub fn behavior_event(
    payload: EventPayload,
    user_id: Option<&str>,
    session_id: Uuid,
    minutes_ago: i64,
) -> BehaviorEvent {
    behavior_event_on(payload, user_id, session_id, minutes_ago, DeviceType::Desktop)
}

pub fn behavior_event_on(
    payload: EventPayload,
    user_id: Option<&str>,
    session_id: Uuid,
    minutes_ago: i64,
    device: DeviceType,
) -> BehaviorEvent {
    BehaviorEvent {
        id: Uuid::new_v4(),
        session_id,
        user_id: user_id.map(str::to_string),
        url: payload.url().to_string(),
        device,
        browser: Browser::unknown(),
        country: None,
        region: None,
        received_at: Utc::now() - Duration::minutes(minutes_ago),
        client_time: None,
        status: EventStatus::Success,
        tags: Vec::new(),
        payload,
    }
}

/// Serialized client frame for the socket protocol.
pub fn frame(id: &str, event: &str, data: serde_json::Value) -> String {
    json!({ "id": id, "event": event, "data": data }).to_string()
}

pub fn page_view_frame(id: &str, url: &str) -> String {
    frame(id, "pageView", json!({ "url": url }))
}

pub fn click_frame(id: &str, url: &str, x: f64, y: f64) -> String {
    frame(id, "click", json!({ "url": url, "x": x, "y": y }))
}
