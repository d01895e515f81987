//! Granted identity handed to the surrounding framework

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::claims::Claims;
use crate::config::ValidationConfig;
use crate::validator::{ValidationResult, ValidationSource};

/// Identity derived from a successful validation.
///
/// Name, roles and scopes are resolved once from the claims using the
/// configured claim keys. The orchestrator does not retain identities; the
/// caller owns this value for the rest of the request.
///
/// # Example
///
/// ```rust,ignore
/// let auth = authenticator.authenticate(token).await?;
/// let identity = auth.identity;
///
/// if identity.has_role("admin") && identity.has_scope("orders.write") {
///     // Allow action
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantedIdentity {
    /// Value of the configured name claim
    pub name: Option<String>,
    /// Values of the configured role claim
    #[serde(default)]
    pub roles: Vec<String>,
    /// Granted scopes, space-delimited values split apart
    #[serde(default)]
    pub scopes: Vec<String>,
    /// All claims, in token order
    pub claims: Claims,
    /// Authentication type (`"Bearer"` unless configured otherwise)
    pub authentication_type: String,
    /// Token expiry (Unix seconds), if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    /// Which validator granted this identity
    pub source: ValidationSource,
}

impl GrantedIdentity {
    /// Build an identity from a validation result.
    ///
    /// `token` is appended as a `token` claim when
    /// `preserve_access_token` is set.
    pub fn from_result(result: ValidationResult, config: &ValidationConfig, token: &str) -> Self {
        let ValidationResult {
            mut claims,
            expires_at,
            source,
        } = result;

        if config.preserve_access_token {
            claims.push("token", token);
        }

        let name = claims.first(&config.name_claim).map(str::to_owned);
        let roles = claims.values(&config.role_claim).map(str::to_owned).collect();

        let mut scopes: Vec<String> = Vec::new();
        for value in claims.values(&config.scope_claim) {
            for scope in value.split_whitespace() {
                if !scopes.iter().any(|s| s == scope) {
                    scopes.push(scope.to_owned());
                }
            }
        }

        Self {
            name,
            roles,
            scopes,
            claims,
            authentication_type: config.authentication_type.clone(),
            expires_at,
            source,
        }
    }

    /// `sub` claim, if present
    pub fn subject(&self) -> Option<&str> {
        self.claims.subject()
    }

    /// Check if the identity has a specific role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Check if the identity has a specific scope
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Check if the identity has all of the given scopes
    pub fn has_all_scopes<S: AsRef<str>>(&self, scopes: &[S]) -> bool {
        scopes.iter().all(|s| self.has_scope(s.as_ref()))
    }

    /// Whether the token behind this identity has expired
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(exp) => SystemTime::now() >= UNIX_EPOCH + Duration::from_secs(exp),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Claim;

    fn result(claims: Vec<Claim>) -> ValidationResult {
        ValidationResult {
            claims: claims.into_iter().collect(),
            expires_at: Some(4_102_444_800),
            source: ValidationSource::Local,
        }
    }

    #[test]
    fn test_identity_uses_configured_claim_keys() {
        let config = ValidationConfig::builder("https://auth.example.com")
            .name_claim("preferred_username")
            .role_claim("groups")
            .build()
            .unwrap();

        let identity = GrantedIdentity::from_result(
            result(vec![
                Claim::new("sub", "248289761001"),
                Claim::new("preferred_username", "alice"),
                Claim::new("name", "Alice Example"),
                Claim::new("groups", "admins"),
                Claim::new("groups", "ops"),
                Claim::new("role", "ignored"),
            ]),
            &config,
            "token",
        );

        assert_eq!(identity.name.as_deref(), Some("alice"));
        assert_eq!(identity.roles, vec!["admins", "ops"]);
        assert!(identity.has_role("ops"));
        assert!(!identity.has_role("ignored"));
        assert_eq!(identity.authentication_type, "Bearer");
        assert_eq!(identity.subject(), Some("248289761001"));
    }

    #[test]
    fn test_scopes_split_and_deduplicated() {
        let config = ValidationConfig::builder("https://auth.example.com")
            .build()
            .unwrap();

        let identity = GrantedIdentity::from_result(
            result(vec![
                Claim::new("scope", "api1 api2"),
                Claim::new("scope", "api2"),
                Claim::new("scope", "openid"),
            ]),
            &config,
            "token",
        );

        assert_eq!(identity.scopes, vec!["api1", "api2", "openid"]);
        assert!(identity.has_all_scopes(&["api1", "openid"]));
        assert!(!identity.has_all_scopes(&["api1", "api3"]));
    }

    #[test]
    fn test_preserve_access_token() {
        let config = ValidationConfig::builder("https://auth.example.com")
            .preserve_access_token(true)
            .build()
            .unwrap();

        let identity = GrantedIdentity::from_result(result(vec![]), &config, "abc.def.ghi");
        assert_eq!(identity.claims.first("token"), Some("abc.def.ghi"));

        let config = ValidationConfig::builder("https://auth.example.com")
            .build()
            .unwrap();
        let identity = GrantedIdentity::from_result(result(vec![]), &config, "abc.def.ghi");
        assert!(!identity.claims.contains("token"));
    }

    #[test]
    fn test_is_expired() {
        let config = ValidationConfig::builder("https://auth.example.com")
            .build()
            .unwrap();
        let mut identity = GrantedIdentity::from_result(result(vec![]), &config, "t");
        assert!(!identity.is_expired());

        identity.expires_at = Some(1);
        assert!(identity.is_expired());
    }
}
