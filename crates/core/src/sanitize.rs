//! Redaction of sensitive-looking payload keys.
//!
//! Applied on both sides of the wire: the SDK sanitizes before transmission
//! and the handlers sanitize again before persistence.

use serde_json::Value;

/// Replacement written over sensitive values.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Case-insensitive substrings that mark a key as sensitive.
const SENSITIVE_KEY_PATTERNS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "credit",
    "card",
    "cvv",
    "ssn",
    "api_key",
    "apikey",
    "authorization",
];

/// Whether a key should have its value redacted.
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_lowercase();
    SENSITIVE_KEY_PATTERNS.iter().any(|p| key.contains(p))
}

/// Recursively redact values under sensitive keys.
///
/// Objects are walked key by key; arrays element by element. Redaction is
/// idempotent: sanitizing an already-sanitized value is a no-op.
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, val)| {
                    if is_sensitive_key(&key) {
                        (key, Value::String(REDACTION_MARKER.to_string()))
                    } else {
                        (key, sanitize_value(val))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_sensitive_keys_case_insensitively() {
        let input = json!({
            "username": "alice",
            "Password": "hunter2",
            "CREDIT_CARD_NUMBER": "4111111111111111",
            "accessToken": "abc123",
        });
        let out = sanitize_value(input);
        assert_eq!(out["username"], "alice");
        assert_eq!(out["Password"], REDACTION_MARKER);
        assert_eq!(out["CREDIT_CARD_NUMBER"], REDACTION_MARKER);
        assert_eq!(out["accessToken"], REDACTION_MARKER);
    }

    #[test]
    fn recurses_into_nested_objects_and_arrays() {
        let input = json!({
            "profile": { "ssn": "123-45-6789", "name": "bob" },
            "entries": [ { "apiKey": "k" }, { "note": "ok" } ],
        });
        let out = sanitize_value(input);
        assert_eq!(out["profile"]["ssn"], REDACTION_MARKER);
        assert_eq!(out["profile"]["name"], "bob");
        assert_eq!(out["entries"][0]["apiKey"], REDACTION_MARKER);
        assert_eq!(out["entries"][1]["note"], "ok");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let input = json!({
            "password": "secret",
            "nested": { "cardCvv": "999", "plain": 42 },
            "list": [ { "token": "t" } ],
        });
        let once = sanitize_value(input);
        let twice = sanitize_value(once.clone());
        assert_eq!(once, twice);
        assert_eq!(once["password"], REDACTION_MARKER);
    }

    #[test]
    fn non_object_values_pass_through() {
        assert_eq!(sanitize_value(json!(3)), json!(3));
        assert_eq!(sanitize_value(json!("password")), json!("password"));
        assert_eq!(sanitize_value(Value::Null), Value::Null);
    }
}
