//! Bearer-token extraction and format validation.

use regex::Regex;
use std::sync::LazyLock;

use tracker_core::error::{AuthErrorCode, Error, Result};

/// Opaque bearer token shape: URL-safe characters, 16-512 chars.
const TOKEN_PATTERN: &str = r"^[A-Za-z0-9._~+/=-]{16,512}$";

static TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(TOKEN_PATTERN).expect("invalid token pattern"));

/// Parsed and format-checked bearer token from a handshake or request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParsedToken {
    raw: String,
}

impl ParsedToken {
    /// Parse and format-check a raw token string.
    pub fn parse(token: &str) -> Result<Self> {
        if token.is_empty() {
            return Err(Error::auth(
                AuthErrorCode::MissingToken,
                "Credential is required",
            ));
        }

        if !TOKEN_REGEX.is_match(token) {
            return Err(Error::auth(
                AuthErrorCode::InvalidFormat,
                "Malformed credential",
            ));
        }

        Ok(Self {
            raw: token.to_string(),
        })
    }

    /// Get the raw token string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Extract a bearer token from a request.
///
/// Checks in order:
/// 1. `Authorization: Bearer <token>`
/// 2. A `token` query parameter (WebSocket handshakes cannot always set
///    headers from the browser)
///
/// Returns `Ok(None)` when no credential was supplied at all; the caller
/// decides whether that is permitted (permissive development mode).
pub fn extract_bearer_token(
    auth_header: Option<&str>,
    token_param: Option<&str>,
) -> Result<Option<ParsedToken>> {
    if let Some(auth) = auth_header {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            return ParsedToken::parse(token.trim()).map(Some);
        }
    }

    if let Some(token) = token_param {
        return ParsedToken::parse(token.trim()).map(Some);
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_token_parses() {
        let token = ParsedToken::parse("plse_ABC123xyz789DEF456ghi012JKL345mn").unwrap();
        assert_eq!(token.as_str(), "plse_ABC123xyz789DEF456ghi012JKL345mn");
    }

    #[test]
    fn rejects_bad_formats() {
        // Too short
        assert!(ParsedToken::parse("short").is_err());
        // Disallowed chars
        assert!(ParsedToken::parse("has spaces in the middle!").is_err());
        // Empty
        assert!(ParsedToken::parse("").is_err());
    }

    #[test]
    fn extracts_from_authorization_header() {
        let token = extract_bearer_token(
            Some("Bearer plse_ABC123xyz789DEF456ghi012JKL345mn"),
            None,
        )
        .unwrap()
        .unwrap();
        assert_eq!(token.as_str(), "plse_ABC123xyz789DEF456ghi012JKL345mn");
    }

    #[test]
    fn extracts_from_query_param() {
        let token = extract_bearer_token(None, Some("plse_ABC123xyz789DEF456ghi012JKL345mn"))
            .unwrap()
            .unwrap();
        assert_eq!(token.as_str(), "plse_ABC123xyz789DEF456ghi012JKL345mn");
    }

    #[test]
    fn header_wins_over_query_param() {
        let token = extract_bearer_token(
            Some("Bearer headertoken1234567890"),
            Some("querytoken1234567890"),
        )
        .unwrap()
        .unwrap();
        assert_eq!(token.as_str(), "headertoken1234567890");
    }

    #[test]
    fn absent_credential_is_none_not_error() {
        assert!(extract_bearer_token(None, None).unwrap().is_none());
    }

    #[test]
    fn malformed_header_token_is_an_error() {
        assert!(extract_bearer_token(Some("Bearer nope"), None).is_err());
    }
}
