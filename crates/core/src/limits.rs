//! Size limits and fixed windows for the tracking pipeline.
//!
//! The `#[validate]` derive macro requires literal values in attributes,
//! so field limits are duplicated there. Keep both in sync when modifying.

// === Wire limits ===

/// Maximum single inbound message size in bytes (32KB).
pub const MAX_MESSAGE_SIZE_BYTES: usize = 32 * 1024;

/// Maximum custom-event metadata JSON size in bytes (16KB).
pub const MAX_CUSTOM_METADATA_BYTES: usize = 16 * 1024;

// === String field limits (chars) ===

/// Element text captured on click events is truncated to this length.
pub const MAX_ELEMENT_TEXT_LEN: usize = 200;

/// Search queries are truncated to this length.
pub const MAX_SEARCH_QUERY_LEN: usize = 100;

/// URL max length.
pub const MAX_URL_LEN: usize = 2000;

/// User agent string max length.
pub const MAX_USER_AGENT_LEN: usize = 512;

/// User ID max length (UUIDs=36, emails=~50, custom IDs up to 128).
pub const MAX_USER_ID_LEN: usize = 128;

// === Gateway limits ===

/// Connection-rate window per identity (fixed, not sliding).
pub const CONNECTION_RATE_WINDOW_SECS: u64 = 60;

/// Connections allowed per identity within one window.
pub const MAX_CONNECTIONS_PER_WINDOW: u32 = 100;

/// Live-session cache TTL; safety net against orphaned active sessions.
pub const SESSION_CACHE_TTL_SECS: u64 = 3600;

// === Query defaults ===

/// Default window for event lists (hours).
pub const DEFAULT_EVENTS_WINDOW_HOURS: i64 = 24;

/// Default window for overview/sessions/top-pages/devices (days).
pub const DEFAULT_OVERVIEW_WINDOW_DAYS: i64 = 7;

/// Default window for per-user queries (days).
pub const DEFAULT_USER_WINDOW_DAYS: i64 = 30;

/// Maximum events returned in a per-user detail query.
pub const MAX_USER_DETAIL_EVENTS: u64 = 100;

/// Default page size for list endpoints.
pub const DEFAULT_PAGE_LIMIT: u64 = 50;

/// Cap on list page sizes.
pub const MAX_PAGE_LIMIT: u64 = 500;

/// Default and maximum entry count for top-pages.
pub const DEFAULT_TOP_PAGES_LIMIT: u64 = 10;
pub const MAX_TOP_PAGES_LIMIT: u64 = 100;
