//! Auth service client with response caching.

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::token::ParsedToken;
use tracker_core::error::{AuthErrorCode, Error, Result};

/// Cache TTL for auth responses (30 seconds).
const AUTH_CACHE_TTL: Duration = Duration::from_secs(30);

/// Maximum cache entries.
const AUTH_CACHE_MAX_CAPACITY: u64 = 10_000;

/// The identity bound to a connection or request after authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Validated user identity.
    User(String),
    /// Anonymous connection, only permitted in permissive mode.
    Anonymous,
}

impl Identity {
    /// User id when authenticated.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::User(id) => Some(id),
            Self::Anonymous => None,
        }
    }

    /// Bucket key for rate limiting: the user id, or a shared anonymous
    /// bucket.
    pub fn rate_limit_key(&self) -> &str {
        match self {
            Self::User(id) => id,
            Self::Anonymous => "anonymous",
        }
    }
}

/// Wire request to the auth service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    pub token: String,
}

/// Auth service response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// Whether the token is valid.
    pub valid: bool,
    /// User identity bound to the token.
    pub user_id: Option<String>,
    /// Error details if invalid.
    pub error: Option<String>,
}

impl AuthResponse {
    /// Extract the user id, mapping invalid responses to auth errors.
    pub fn user_id(&self) -> Result<&str> {
        if !self.valid {
            let msg = self.error.as_deref().unwrap_or("Invalid credential");
            return Err(Error::auth(AuthErrorCode::InvalidToken, msg));
        }
        self.user_id
            .as_deref()
            .ok_or_else(|| Error::auth(AuthErrorCode::InvalidToken, "Missing user in response"))
    }
}

/// Auth service client.
///
/// Calls the platform auth service's `/internal/auth/validate` endpoint and
/// caches responses for 30 seconds to keep connection handshakes off the
/// network.
#[derive(Clone)]
pub struct AuthClient {
    /// Auth service URL (e.g., "http://auth-service:8080")
    base_url: String,
    http_client: reqwest::Client,
    /// Auth response cache (token -> AuthResponse)
    cache: Cache<String, AuthResponse>,
    /// Whether to validate locally (development and tests)
    mock_mode: bool,
}

impl AuthClient {
    /// Creates a new auth client. An empty URL or "mock" selects mock mode.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let mock_mode = base_url.is_empty() || base_url == "mock";

        Self {
            base_url,
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("Failed to create HTTP client"),
            cache: Cache::builder()
                .max_capacity(AUTH_CACHE_MAX_CAPACITY)
                .time_to_live(AUTH_CACHE_TTL)
                .build(),
            mock_mode,
        }
    }

    /// Validate a bearer token, returning the bound user identity.
    pub async fn validate(&self, token: &ParsedToken) -> Result<Identity> {
        let cache_key = token.as_str().to_string();

        let response = if let Some(cached) = self.cache.get(&cache_key).await {
            debug!("Auth cache hit");
            cached
        } else {
            let response = if self.mock_mode {
                self.mock_validate(token)
            } else {
                self.remote_validate(token).await?
            };
            self.cache.insert(cache_key, response.clone()).await;
            response
        };

        Ok(Identity::User(response.user_id()?.to_string()))
    }

    /// Invalidate a cached response for a token.
    pub async fn invalidate(&self, token: &ParsedToken) {
        self.cache.invalidate(&token.as_str().to_string()).await;
    }

    /// Call the remote auth service.
    async fn remote_validate(&self, token: &ParsedToken) -> Result<AuthResponse> {
        let url = format!("{}/internal/auth/validate", self.base_url);
        let request = AuthRequest {
            token: token.as_str().to_string(),
        };

        debug!(url = %url, "Calling auth service");

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Auth service request failed");
                Error::internal(format!("Auth service unavailable: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Auth service returned error");
            return Err(Error::internal(format!(
                "Auth service returned {}: {}",
                status, body
            )));
        }

        let auth_response: AuthResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "Failed to parse auth response");
            Error::internal(format!("Invalid auth response: {}", e))
        })?;

        Ok(auth_response)
    }

    /// Mock validation for development and tests: any well-formed token is
    /// valid and maps to a deterministic user id.
    fn mock_validate(&self, token: &ParsedToken) -> AuthResponse {
        debug!("Using mock auth validation");
        AuthResponse {
            valid: true,
            user_id: Some(generate_mock_user_id(token)),
            error: None,
        }
    }
}

/// Generate a deterministic mock user id from the token.
/// For development and tests only; in production the auth service provides
/// the identity.
pub fn generate_mock_user_id(token: &ParsedToken) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    token.as_str().hash(&mut hasher);
    format!("user-{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_mode_validates_any_well_formed_token() {
        let client = AuthClient::new("mock");
        let token = ParsedToken::parse("plse_ABC123xyz789DEF456ghi012JKL345mn").unwrap();

        let identity = client.validate(&token).await.unwrap();
        assert!(identity.user_id().is_some());

        // Deterministic mapping
        let again = client.validate(&token).await.unwrap();
        assert_eq!(identity, again);
    }

    #[tokio::test]
    async fn distinct_tokens_map_to_distinct_identities() {
        let client = AuthClient::new("");
        let a = ParsedToken::parse("token-aaaaaaaaaaaaaaaa").unwrap();
        let b = ParsedToken::parse("token-bbbbbbbbbbbbbbbb").unwrap();

        let ia = client.validate(&a).await.unwrap();
        let ib = client.validate(&b).await.unwrap();
        assert_ne!(ia, ib);
    }

    #[test]
    fn invalid_response_maps_to_auth_error() {
        let response = AuthResponse {
            valid: false,
            user_id: None,
            error: Some("Invalid credential".into()),
        };
        let err = response.user_id().unwrap_err();
        assert_eq!(err.error_code(), Some("AUTH_003"));
    }

    #[test]
    fn anonymous_identity_buckets_together() {
        assert_eq!(Identity::Anonymous.rate_limit_key(), "anonymous");
        assert_eq!(Identity::User("u1".into()).rate_limit_key(), "u1");
        assert!(Identity::Anonymous.user_id().is_none());
    }
}
