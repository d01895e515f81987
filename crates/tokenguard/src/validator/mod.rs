//! Token validators
//!
//! Local (JWT signature + claims against the authority's keys) and Remote
//! (introspection endpoint) validation are two implementations of
//! [`TokenValidator`]. The orchestrator picks and combines them by mode.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::claims::Claims;
use crate::error::AuthResult;

pub mod local;
pub mod remote;

pub use local::LocalValidator;
pub use remote::RemoteValidator;

/// Which path produced a validation result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationSource {
    /// Verified locally against the authority's signing keys
    Local,
    /// Confirmed by the introspection endpoint
    Remote,
}

impl std::fmt::Display for ValidationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationSource::Local => f.write_str("local"),
            ValidationSource::Remote => f.write_str("remote"),
        }
    }
}

/// Successful validation of one token.
///
/// Failures are reported as [`AuthError`](crate::AuthError) instead of an
/// `is_valid = false` result; an inactive token is `Err(TokenInactive)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// Token claims in order
    pub claims: Claims,
    /// Token expiry (Unix seconds), if the token or endpoint reported one
    pub expires_at: Option<u64>,
    /// Which validator produced this result
    pub source: ValidationSource,
}

impl ValidationResult {
    /// Build a result, taking expiry from the `exp` claim
    pub fn new(claims: Claims, source: ValidationSource) -> Self {
        let expires_at = claims.expires_at();
        Self {
            claims,
            expires_at,
            source,
        }
    }
}

/// Given a token, produce a validation result or an error kind
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Validate a bearer token
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`](crate::AuthError) whose kind says why the
    /// token was rejected or why validation could not be performed.
    async fn validate(&self, token: &str) -> AuthResult<ValidationResult>;

    /// Which path this validator represents
    fn source(&self) -> ValidationSource;
}
