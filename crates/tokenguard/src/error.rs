//! Error types for bearer token validation
//!
//! Every failure the crate produces is an [`AuthError`]: an [`ErrorKind`] for
//! programmatic handling plus a human-readable message. Setup-time errors
//! (`ConfigurationInvalid`) stop the component from starting; everything else
//! is a per-request rejection that callers map onto a `401`/`403`/`503`
//! response via [`AuthError::status_code`].

use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used throughout the crate
pub type AuthResult<T> = Result<T, AuthError>;

/// Error classification for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // === Setup ===
    /// Configuration is missing or invalid (fatal at startup)
    ConfigurationInvalid,

    // === Authority infrastructure ===
    /// Discovery document could not be fetched or is malformed
    DiscoveryUnavailable,
    /// Authority published an empty signing key set
    NoSigningKeys,
    /// Introspection endpoint could not be reached or answered unintelligibly
    EndpointUnavailable,

    // === Token ===
    /// No bearer token was presented
    MissingToken,
    /// Token is not a structurally valid JWT
    MalformedToken,
    /// Signature did not verify against any signing key
    InvalidSignature,
    /// `iss` does not match the authority's issuer
    InvalidIssuer,
    /// `aud` does not contain the expected audience
    InvalidAudience,
    /// Token is outside its `nbf`/`exp` window
    TokenExpired,
    /// Authority reported the token as inactive
    TokenInactive,

    // === Authorization ===
    /// Token lacks one or more required scopes
    MissingScope,
}

impl ErrorKind {
    /// Stable snake_case identifier, matching the serde representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigurationInvalid => "configuration_invalid",
            ErrorKind::DiscoveryUnavailable => "discovery_unavailable",
            ErrorKind::NoSigningKeys => "no_signing_keys",
            ErrorKind::EndpointUnavailable => "endpoint_unavailable",
            ErrorKind::MissingToken => "missing_token",
            ErrorKind::MalformedToken => "malformed_token",
            ErrorKind::InvalidSignature => "invalid_signature",
            ErrorKind::InvalidIssuer => "invalid_issuer",
            ErrorKind::InvalidAudience => "invalid_audience",
            ErrorKind::TokenExpired => "token_expired",
            ErrorKind::TokenInactive => "token_inactive",
            ErrorKind::MissingScope => "missing_scope",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication / authorization failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct AuthError {
    /// Error classification
    pub kind: ErrorKind,
    /// Human-readable reason, safe to return to the caller
    pub message: String,
}

impl AuthError {
    /// Create a new error with kind and message
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Configuration is missing or invalid
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigurationInvalid, message)
    }

    /// Discovery document unavailable or malformed
    #[must_use]
    pub fn discovery_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DiscoveryUnavailable, message)
    }

    /// Authority advertised no usable signing keys
    #[must_use]
    pub fn no_signing_keys(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoSigningKeys, message)
    }

    /// Introspection endpoint unavailable
    #[must_use]
    pub fn endpoint_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EndpointUnavailable, message)
    }

    /// No bearer token presented
    #[must_use]
    pub fn missing_token(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingToken, message)
    }

    /// Token is not a JWT
    #[must_use]
    pub fn malformed_token(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedToken, message)
    }

    /// Signature verification failed
    #[must_use]
    pub fn invalid_signature(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidSignature, message)
    }

    /// Issuer mismatch
    #[must_use]
    pub fn invalid_issuer(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidIssuer, message)
    }

    /// Audience mismatch
    #[must_use]
    pub fn invalid_audience(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidAudience, message)
    }

    /// Token outside its validity window
    #[must_use]
    pub fn token_expired(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TokenExpired, message)
    }

    /// Token reported inactive by the authority
    #[must_use]
    pub fn token_inactive(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TokenInactive, message)
    }

    /// Required scope(s) missing
    #[must_use]
    pub fn missing_scope(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingScope, message)
    }

    /// Merge a local and a remote failure into one rejection.
    ///
    /// The remote kind wins so an endpoint outage stays distinguishable from a
    /// bad token; both reasons are kept in the message.
    #[must_use]
    pub fn combined(local: &AuthError, remote: &AuthError) -> Self {
        Self::new(remote.kind, format!("local: {local}; remote: {remote}"))
    }

    /// Whether the failure is caused by authority infrastructure rather than
    /// the token itself. Callers may retry these or answer `503`.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::DiscoveryUnavailable
                | ErrorKind::EndpointUnavailable
                | ErrorKind::NoSigningKeys
        )
    }

    /// HTTP status a resource server should answer with
    pub fn status_code(&self) -> StatusCode {
        match self.kind {
            ErrorKind::ConfigurationInvalid => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::DiscoveryUnavailable
            | ErrorKind::EndpointUnavailable
            | ErrorKind::NoSigningKeys => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::MissingScope => StatusCode::FORBIDDEN,
            ErrorKind::MissingToken
            | ErrorKind::MalformedToken
            | ErrorKind::InvalidSignature
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::TokenExpired
            | ErrorKind::TokenInactive => StatusCode::UNAUTHORIZED,
        }
    }
}
