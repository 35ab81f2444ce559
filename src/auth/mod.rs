//! Request identity: who is calling, and how that is worked out from a request.
//!
//! The session-context middleware asks an [`IdentityResolver`] once per request.
//! [`ClerkResolver`] is the production resolver; tests substitute their own.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use serde::Serialize;
use thiserror::Error;

pub mod clerk;

pub use clerk::{ClerkResolver, SessionClaims};

/// Cookie Clerk's frontend SDKs use to carry the session token.
pub const SESSION_COOKIE: &str = "__session";

/// Authenticated user context for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: String,
    pub session_id: Option<String>,
    pub org_id: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: None,
            org_id: None,
        }
    }
}

/// Failure to work out whether a request is signed in. Distinct from "signed out".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("auth context missing from request; session middleware not installed")]
    ContextMissing,

    #[error("failed to fetch signing keys: {0}")]
    Jwks(String),

    #[error("invalid verification key: {0}")]
    InvalidKey(String),

    #[error("identity resolver failed: {0}")]
    Resolver(String),
}

/// Resolves the identity behind a request.
///
/// `Ok(None)` means the request is anonymous. `Err` means resolution itself broke
/// and the request cannot be judged either way.
#[async_trait]
pub trait IdentityResolver: Send + Sync + 'static {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<Identity>, AuthError>;
}

/// Pull the session token from `Authorization: Bearer ...`, falling back to the `__session` cookie.
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Some(token) = value.to_str().ok().and_then(|v| v.strip_prefix("Bearer ")) {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}
