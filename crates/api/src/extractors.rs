//! Request extractors.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use auth_client::{extract_bearer_token, Identity};
use tracker_core::error::AuthErrorCode;
use tracker_core::Error;

use crate::response::ApiError;
use crate::state::ApiState;

/// Authenticated caller, validated against the auth service.
#[derive(Debug, Clone)]
pub struct AuthedCaller {
    pub identity: Identity,
}

#[async_trait]
impl FromRequestParts<ApiState> for AuthedCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        let token = extract_bearer_token(auth_header, None)?.ok_or_else(|| {
            ApiError::from(Error::auth(
                AuthErrorCode::MissingToken,
                "Bearer token is required",
            ))
        })?;

        let identity = state.auth.validate(&token).await?;

        Ok(AuthedCaller { identity })
    }
}
