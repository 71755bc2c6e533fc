//! Behavior event types for the tracking pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::error::Error;
use crate::limits::MAX_CUSTOM_METADATA_BYTES;
use crate::sanitize::sanitize_value;

/// All supported event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PageView,
    Click,
    Scroll,
    FormSubmit,
    VideoPlay,
    VideoPause,
    Search,
    Like,
    Comment,
    Share,
    Follow,
    Custom,
}

impl EventKind {
    /// Returns the stored string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PageView => "page_view",
            Self::Click => "click",
            Self::Scroll => "scroll",
            Self::FormSubmit => "form_submit",
            Self::VideoPlay => "video_play",
            Self::VideoPause => "video_pause",
            Self::Search => "search",
            Self::Like => "like",
            Self::Comment => "comment",
            Self::Share => "share",
            Self::Follow => "follow",
            Self::Custom => "custom",
        }
    }

    /// Returns the category this kind aggregates under.
    pub fn category(&self) -> EventCategory {
        match self {
            Self::PageView => EventCategory::Navigation,
            Self::Click | Self::Scroll | Self::Search => EventCategory::Engagement,
            Self::FormSubmit | Self::VideoPlay | Self::VideoPause => EventCategory::Content,
            Self::Like | Self::Comment | Self::Share | Self::Follow => EventCategory::Social,
            Self::Custom => EventCategory::Custom,
        }
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "page_view" => Ok(Self::PageView),
            "click" => Ok(Self::Click),
            "scroll" => Ok(Self::Scroll),
            "form_submit" => Ok(Self::FormSubmit),
            "video_play" => Ok(Self::VideoPlay),
            "video_pause" => Ok(Self::VideoPause),
            "search" => Ok(Self::Search),
            "like" => Ok(Self::Like),
            "comment" => Ok(Self::Comment),
            "share" => Ok(Self::Share),
            "follow" => Ok(Self::Follow),
            "custom" => Ok(Self::Custom),
            other => Err(Error::InvalidEventType(other.to_string())),
        }
    }
}

/// Event category for aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Navigation,
    Engagement,
    Content,
    Social,
    Custom,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigation => "navigation",
            Self::Engagement => "engagement",
            Self::Content => "content",
            Self::Social => "social",
            Self::Custom => "custom",
        }
    }
}

/// Processing status recorded on a persisted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Success,
    Warning,
    Error,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Page view event data.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PageViewData {
    #[validate(length(min = 1, max = 2000))]
    pub url: String,
    #[validate(length(max = 500))]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub referrer: Option<String>,
    /// Time spent on page (ms), reported by the exit event.
    #[validate(range(min = 0.0))]
    pub time_on_page: Option<f64>,
}

/// Click event data.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ClickData {
    #[validate(length(min = 1, max = 2000))]
    pub url: String,
    #[validate(length(max = 256))]
    pub element_id: Option<String>,
    #[validate(length(max = 256))]
    pub element_class: Option<String>,
    /// Element text content, truncated to 200 chars at normalization.
    #[validate(length(max = 200))]
    pub element_text: Option<String>,
    pub x: f64,
    pub y: f64,
}

/// Scroll event data.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ScrollData {
    #[validate(length(min = 1, max = 2000))]
    pub url: String,
    #[validate(range(min = 0.0))]
    pub scroll_position: f64,
    #[validate(range(min = 0.0))]
    pub page_height: f64,
    #[validate(range(min = 0.0))]
    pub viewport_height: f64,
    /// Derived server-side, clamped to 0-100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scroll_percentage: Option<f64>,
}

impl ScrollData {
    /// Scroll depth as a percentage of the scrollable range.
    ///
    /// A page shorter than the viewport has no scrollable range and counts
    /// as fully scrolled.
    pub fn percentage(&self) -> f64 {
        let range = self.page_height - self.viewport_height;
        if range <= 0.0 {
            return 100.0;
        }
        (self.scroll_position / range * 100.0).clamp(0.0, 100.0)
    }
}

/// Form submission event data.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FormSubmitData {
    #[validate(length(min = 1, max = 2000))]
    pub url: String,
    #[validate(length(max = 256))]
    pub form_id: Option<String>,
    /// Field name -> value map; sensitive keys are redacted at normalization.
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
    pub field_count: u32,
    #[validate(range(min = 0.0))]
    pub time_to_complete_ms: Option<f64>,
}

/// Video play/pause event data.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VideoData {
    #[validate(length(min = 1, max = 2000))]
    pub url: String,
    #[validate(length(min = 1, max = 256))]
    pub video_id: String,
    #[validate(length(max = 500))]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub video_url: Option<String>,
    #[validate(range(min = 0.0))]
    pub duration_sec: f64,
    #[validate(range(min = 0.0))]
    pub current_time_sec: f64,
    /// Derived server-side, clamped to 0-100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch_percentage: Option<f64>,
}

impl VideoData {
    /// Watched share of the video, clamped to 0-100.
    pub fn percentage(&self) -> f64 {
        if self.duration_sec <= 0.0 {
            return 0.0;
        }
        (self.current_time_sec / self.duration_sec * 100.0).clamp(0.0, 100.0)
    }
}

/// Search event data.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SearchData {
    #[validate(length(min = 1, max = 2000))]
    pub url: String,
    /// Truncated to 100 chars at normalization.
    #[validate(length(max = 100))]
    pub query: String,
    pub result_count: u64,
    #[validate(range(min = 0.0))]
    pub time_to_search_ms: Option<f64>,
}

/// Social interaction event data (like/comment/share/follow).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SocialData {
    #[validate(length(min = 1, max = 2000))]
    pub url: String,
    #[validate(length(min = 1, max = 256))]
    pub content_id: String,
    #[validate(length(max = 64))]
    pub content_type: Option<String>,
    #[validate(length(max = 128))]
    pub content_owner_id: Option<String>,
    /// True for like/follow, false for unlike/unfollow.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Validates custom metadata JSON size.
fn validate_metadata_size(metadata: &serde_json::Value) -> Result<(), ValidationError> {
    if metadata.is_null() {
        return Ok(());
    }

    let size = serde_json::to_vec(metadata).map(|v| v.len()).unwrap_or(0);

    if size > MAX_CUSTOM_METADATA_BYTES {
        let mut err = ValidationError::new("metadata_too_large");
        err.message = Some(
            format!(
                "metadata {}KB exceeds {}KB limit",
                size / 1024,
                MAX_CUSTOM_METADATA_BYTES / 1024
            )
            .into(),
        );
        return Err(err);
    }
    Ok(())
}

/// Caller-defined custom event data.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CustomData {
    #[validate(length(min = 1, max = 2000))]
    pub url: String,
    /// Custom event name.
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    /// Arbitrary metadata (max 16KB), sanitized before persistence.
    #[validate(custom(function = "validate_metadata_size"))]
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Event payload variants, tagged by stored event type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    #[serde(rename = "page_view")]
    PageView(PageViewData),
    #[serde(rename = "click")]
    Click(ClickData),
    #[serde(rename = "scroll")]
    Scroll(ScrollData),
    #[serde(rename = "form_submit")]
    FormSubmit(FormSubmitData),
    #[serde(rename = "video_play")]
    VideoPlay(VideoData),
    #[serde(rename = "video_pause")]
    VideoPause(VideoData),
    #[serde(rename = "search")]
    Search(SearchData),
    #[serde(rename = "like")]
    Like(SocialData),
    #[serde(rename = "comment")]
    Comment(SocialData),
    #[serde(rename = "share")]
    Share(SocialData),
    #[serde(rename = "follow")]
    Follow(SocialData),
    #[serde(rename = "custom")]
    Custom(CustomData),
}

impl EventPayload {
    /// Returns the event kind for this payload.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PageView(_) => EventKind::PageView,
            Self::Click(_) => EventKind::Click,
            Self::Scroll(_) => EventKind::Scroll,
            Self::FormSubmit(_) => EventKind::FormSubmit,
            Self::VideoPlay(_) => EventKind::VideoPlay,
            Self::VideoPause(_) => EventKind::VideoPause,
            Self::Search(_) => EventKind::Search,
            Self::Like(_) => EventKind::Like,
            Self::Comment(_) => EventKind::Comment,
            Self::Share(_) => EventKind::Share,
            Self::Follow(_) => EventKind::Follow,
            Self::Custom(_) => EventKind::Custom,
        }
    }

    /// Returns the associated URL.
    pub fn url(&self) -> &str {
        match self {
            Self::PageView(d) => &d.url,
            Self::Click(d) => &d.url,
            Self::Scroll(d) => &d.url,
            Self::FormSubmit(d) => &d.url,
            Self::VideoPlay(d) | Self::VideoPause(d) => &d.url,
            Self::Search(d) => &d.url,
            Self::Like(d) | Self::Comment(d) | Self::Share(d) | Self::Follow(d) => &d.url,
            Self::Custom(d) => &d.url,
        }
    }

    /// Validate the payload against its field bounds.
    pub fn validate_bounds(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            Self::PageView(d) => d.validate(),
            Self::Click(d) => d.validate(),
            Self::Scroll(d) => d.validate(),
            Self::FormSubmit(d) => d.validate(),
            Self::VideoPlay(d) | Self::VideoPause(d) => d.validate(),
            Self::Search(d) => d.validate(),
            Self::Like(d) | Self::Comment(d) | Self::Share(d) | Self::Follow(d) => d.validate(),
            Self::Custom(d) => d.validate(),
        }
    }

    /// Redact sensitive keys in user-supplied maps (form fields, custom
    /// metadata). Built-in fields carry no free-form keys and pass through.
    pub fn sanitize(&mut self) {
        match self {
            Self::FormSubmit(d) => {
                let map = std::mem::take(&mut d.fields);
                if let serde_json::Value::Object(clean) =
                    sanitize_value(serde_json::Value::Object(map))
                {
                    d.fields = clean;
                }
            }
            Self::Custom(d) => {
                d.metadata = sanitize_value(std::mem::take(&mut d.metadata));
            }
            _ => {}
        }
    }

    /// Derive server-side fields (scroll and watch percentages) and apply
    /// truncation rules.
    pub fn normalize(&mut self) {
        match self {
            Self::Scroll(d) => d.scroll_percentage = Some(d.percentage()),
            Self::VideoPlay(d) | Self::VideoPause(d) => {
                d.watch_percentage = Some(d.percentage())
            }
            Self::Click(d) => {
                if let Some(text) = &mut d.element_text {
                    truncate_in_place(text, crate::limits::MAX_ELEMENT_TEXT_LEN);
                }
            }
            Self::Search(d) => {
                truncate_in_place(&mut d.query, crate::limits::MAX_SEARCH_QUERY_LEN);
            }
            _ => {}
        }
    }
}

/// Truncate a string to at most `max` chars, respecting char boundaries.
fn truncate_in_place(s: &mut String, max: usize) {
    if let Some((idx, _)) = s.char_indices().nth(max) {
        s.truncate(idx);
    }
}

/// A single normalized, immutable behavior event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorEvent {
    /// Unique event ID, generated server-side and never client-supplied.
    pub id: Uuid,
    /// Owning session.
    pub session_id: Uuid,
    /// Optional user identity (None for anonymous sessions).
    pub user_id: Option<String>,
    /// Associated URL, copied from the payload.
    pub url: String,
    /// Device classification from the connection's user agent.
    pub device: crate::device::DeviceType,
    /// Parsed browser name and version.
    pub browser: crate::device::Browser,
    /// Country from IP geolocation, when available.
    pub country: Option<String>,
    /// Region from IP geolocation, when available.
    pub region: Option<String>,
    /// Server receipt time.
    pub received_at: DateTime<Utc>,
    /// Client-reported time; may differ from receipt time.
    pub client_time: Option<DateTime<Utc>>,
    /// Processing status.
    pub status: EventStatus,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Type-specific payload.
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl BehaviorEvent {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn category(&self) -> EventCategory {
        self.kind().category()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [
            EventKind::PageView,
            EventKind::Click,
            EventKind::Scroll,
            EventKind::FormSubmit,
            EventKind::VideoPlay,
            EventKind::VideoPause,
            EventKind::Search,
            EventKind::Like,
            EventKind::Comment,
            EventKind::Share,
            EventKind::Follow,
            EventKind::Custom,
        ] {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("not_a_kind".parse::<EventKind>().is_err());
    }

    #[test]
    fn categories_match_contract() {
        assert_eq!(EventKind::PageView.category(), EventCategory::Navigation);
        assert_eq!(EventKind::Click.category(), EventCategory::Engagement);
        assert_eq!(EventKind::FormSubmit.category(), EventCategory::Content);
        assert_eq!(EventKind::Like.category(), EventCategory::Social);
        assert_eq!(EventKind::Custom.category(), EventCategory::Custom);
    }

    #[test]
    fn scroll_percentage_clamps() {
        let data = ScrollData {
            url: "/".into(),
            scroll_position: 500.0,
            page_height: 2000.0,
            viewport_height: 1000.0,
            scroll_percentage: None,
        };
        assert_eq!(data.percentage(), 50.0);

        let short_page = ScrollData {
            url: "/".into(),
            scroll_position: 0.0,
            page_height: 400.0,
            viewport_height: 800.0,
            scroll_percentage: None,
        };
        assert_eq!(short_page.percentage(), 100.0);

        let overshoot = ScrollData {
            url: "/".into(),
            scroll_position: 5000.0,
            page_height: 2000.0,
            viewport_height: 1000.0,
            scroll_percentage: None,
        };
        assert_eq!(overshoot.percentage(), 100.0);
    }

    #[test]
    fn video_percentage_handles_zero_duration() {
        let data = VideoData {
            url: "/watch".into(),
            video_id: "v1".into(),
            title: None,
            video_url: None,
            duration_sec: 0.0,
            current_time_sec: 10.0,
            watch_percentage: None,
        };
        assert_eq!(data.percentage(), 0.0);
    }

    #[test]
    fn normalize_truncates_click_text_and_query() {
        let mut payload = EventPayload::Click(ClickData {
            url: "/".into(),
            element_id: None,
            element_class: None,
            element_text: Some("x".repeat(300)),
            x: 1.0,
            y: 2.0,
        });
        payload.normalize();
        if let EventPayload::Click(d) = &payload {
            assert_eq!(d.element_text.as_ref().unwrap().len(), 200);
        } else {
            unreachable!();
        }

        let mut payload = EventPayload::Search(SearchData {
            url: "/".into(),
            query: "q".repeat(150),
            result_count: 3,
            time_to_search_ms: None,
        });
        payload.normalize();
        if let EventPayload::Search(d) = &payload {
            assert_eq!(d.query.len(), 100);
        } else {
            unreachable!();
        }
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let payload = EventPayload::PageView(PageViewData {
            url: "/home".into(),
            title: Some("Home".into()),
            referrer: None,
            time_on_page: None,
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "page_view");
        assert_eq!(json["url"], "/home");
    }
}
