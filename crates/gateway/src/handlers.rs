//! Per-event normalization.
//!
//! Everything connection-dependent (identity, device, browser, location)
//! is resolved once at accept time and captured in [`ConnectionContext`],
//! so turning a payload into a persistable event is a pure function.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::geo::GeoInfo;
use tracker_core::error::ValidationErrorCode;
use tracker_core::{
    classify_device, parse_browser, BehaviorEvent, Browser, DeviceType, Error, EventPayload,
    EventStatus, Result,
};

/// Connection-scoped enrichment, resolved at accept.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub session_id: Uuid,
    pub user_id: Option<String>,
    pub device: DeviceType,
    pub browser: Browser,
    pub geo: Option<GeoInfo>,
}

impl ConnectionContext {
    pub fn new(
        session_id: Uuid,
        user_id: Option<String>,
        user_agent: &str,
        geo: Option<GeoInfo>,
    ) -> Self {
        Self {
            session_id,
            user_id,
            device: classify_device(user_agent),
            browser: parse_browser(user_agent),
            geo,
        }
    }
}

/// Sanitize, validate, and enrich one inbound payload into an immutable
/// event. Truncation runs before the bounds check, so over-long text is
/// clipped rather than rejected; remaining violations map to VALID_001
/// and fail only this event's ack.
pub fn normalize(
    ctx: &ConnectionContext,
    mut payload: EventPayload,
    client_time: Option<DateTime<Utc>>,
) -> Result<BehaviorEvent> {
    payload.sanitize();
    payload.normalize();

    payload.validate_bounds().map_err(|e| {
        Error::validation_code(
            ValidationErrorCode::InvalidFormat,
            format!("Invalid {} payload: {}", payload.kind().as_str(), e),
        )
    })?;

    Ok(BehaviorEvent {
        id: Uuid::new_v4(),
        session_id: ctx.session_id,
        user_id: ctx.user_id.clone(),
        url: payload.url().to_string(),
        device: ctx.device,
        browser: ctx.browser.clone(),
        country: ctx.geo.as_ref().and_then(|g| g.country.clone()),
        region: ctx.geo.as_ref().and_then(|g| g.region.clone()),
        received_at: Utc::now(),
        client_time,
        status: EventStatus::Success,
        tags: Vec::new(),
        payload,
    })
}
