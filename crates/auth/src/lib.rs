//! Bearer-token validation shared by the gateway and the query API.
//!
//! Tokens are validated against the platform auth service; responses are
//! cached for a short TTL to keep the hot path off the network. A mock mode
//! (empty URL or "mock") validates any well-formed token locally, which is
//! what development and the test suite run against.

pub mod client;
pub mod token;

pub use client::{AuthClient, AuthResponse, Identity};
pub use token::{extract_bearer_token, ParsedToken};
