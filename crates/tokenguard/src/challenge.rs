//! `WWW-Authenticate: Bearer` challenges (RFC 6750 Section 3)
//!
//! ```text
//! WWW-Authenticate: Bearer realm="orders", error="invalid_token", error_description="token expired at 1700000000"
//! WWW-Authenticate: Bearer realm="orders", scope="api1 api3", error="insufficient_scope"
//! ```

use std::fmt;

use crate::error::{AuthError, ErrorKind};

/// Standard OAuth 2.0 error codes per RFC 6750 Section 3.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuth2ErrorCode {
    /// The access token provided is expired, revoked, malformed, or invalid
    /// for other reasons.
    InvalidToken,

    /// The request requires higher privileges than provided by the access token.
    InsufficientScope,
}

impl OAuth2ErrorCode {
    /// Get the error code string per RFC 6750
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuth2ErrorCode::InvalidToken => "invalid_token",
            OAuth2ErrorCode::InsufficientScope => "insufficient_scope",
        }
    }
}

impl fmt::Display for OAuth2ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bearer challenge for a rejected request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BearerChallenge {
    realm: Option<String>,
    scopes: Vec<String>,
    error: Option<OAuth2ErrorCode>,
    error_description: Option<String>,
}

impl BearerChallenge {
    /// Create an empty challenge (`Bearer`)
    pub fn new() -> Self {
        Self::default()
    }

    /// Challenge describing a rejection.
    ///
    /// Returns `None` for failures that are not the client's fault
    /// (configuration or authority outages); those are answered without a
    /// challenge. A missing token gets a bare challenge with no error code.
    pub fn for_error(error: &AuthError, required_scopes: &[String]) -> Option<Self> {
        match error.kind {
            ErrorKind::ConfigurationInvalid
            | ErrorKind::DiscoveryUnavailable
            | ErrorKind::NoSigningKeys
            | ErrorKind::EndpointUnavailable => None,
            ErrorKind::MissingToken => Some(Self::new()),
            ErrorKind::MissingScope => Some(
                Self::new()
                    .scopes(required_scopes.to_vec())
                    .error(OAuth2ErrorCode::InsufficientScope)
                    .error_description(&error.message),
            ),
            ErrorKind::MalformedToken
            | ErrorKind::InvalidSignature
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::TokenExpired
            | ErrorKind::TokenInactive => Some(
                Self::new()
                    .error(OAuth2ErrorCode::InvalidToken)
                    .error_description(&error.message),
            ),
        }
    }

    /// Set the realm
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Set required scopes
    pub fn scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Set the error code
    pub fn error(mut self, error: OAuth2ErrorCode) -> Self {
        self.error = Some(error);
        self
    }

    /// Set a human-readable description
    pub fn error_description(mut self, description: impl Into<String>) -> Self {
        self.error_description = Some(description.into());
        self
    }

    /// Error code, if any
    pub fn error_code(&self) -> Option<OAuth2ErrorCode> {
        self.error
    }

    /// Render the `WWW-Authenticate` header value
    pub fn to_header_value(&self) -> String {
        let mut params = Vec::new();

        if let Some(realm) = &self.realm {
            params.push(format!("realm=\"{}\"", escape_param_value(realm)));
        }

        if !self.scopes.is_empty() {
            params.push(format!(
                "scope=\"{}\"",
                escape_param_value(&self.scopes.join(" "))
            ));
        }

        if let Some(error) = self.error {
            params.push(format!("error=\"{}\"", error.as_str()));
        }

        if let Some(desc) = &self.error_description {
            params.push(format!(
                "error_description=\"{}\"",
                escape_param_value(&sanitize_description(desc))
            ));
        }

        if params.is_empty() {
            "Bearer".to_string()
        } else {
            format!("Bearer {}", params.join(", "))
        }
    }
}

impl fmt::Display for BearerChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_header_value())
    }
}

/// Per RFC 2617, quoted-string values need `"` and `\` escaped
fn escape_param_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// `error_description` is limited to printable ASCII (RFC 6750 Section 3)
fn sanitize_description(value: &str) -> String {
    value
        .chars()
        .map(|c| if (' '..='~').contains(&c) { c } else { '?' })
        .collect()
}
