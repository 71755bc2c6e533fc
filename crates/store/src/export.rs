//! CSV export of event lists.

use chrono::SecondsFormat;
use tracker_core::BehaviorEvent;

/// Fixed CSV header for event exports.
pub const CSV_HEADER: &str = "eventId,userId,eventType,eventCategory,url,timestamp,status";

/// Render events as CSV with the fixed column set.
///
/// Every field is quoted; embedded quotes are doubled per RFC 4180.
pub fn events_to_csv(events: &[BehaviorEvent]) -> String {
    let mut out = String::with_capacity(64 * (events.len() + 1));
    out.push_str(CSV_HEADER);
    out.push('\n');

    for event in events {
        let fields = [
            event.id.to_string(),
            event.user_id.clone().unwrap_or_default(),
            event.kind().as_str().to_string(),
            event.category().as_str().to_string(),
            event.url.clone(),
            event
                .received_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            event.status.as_str().to_string(),
        ];
        let row: Vec<String> = fields
            .iter()
            .map(|f| format!("\"{}\"", f.replace('"', "\"\"")))
            .collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }

    out
}
