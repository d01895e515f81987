//! Discovery document and resolved authority metadata

use std::fmt;
use std::time::{Duration, SystemTime};

use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{Jwk, PublicKeyUse};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

/// Raw OpenID Connect discovery document, only the fields validation needs
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoveryDocument {
    /// Issuer identifier (REQUIRED)
    #[serde(default)]
    pub issuer: Option<String>,

    /// JWK Set URL
    #[serde(default)]
    pub jwks_uri: Option<String>,

    /// Inline JWK Set, published by some authorities instead of `jwks_uri`
    #[serde(default)]
    pub jwks: Option<JwksDocument>,

    /// RFC 7662 token introspection endpoint
    #[serde(default)]
    pub introspection_endpoint: Option<String>,

    /// IdentityServer's legacy validation endpoint
    #[serde(default)]
    pub access_token_validation_endpoint: Option<String>,
}

impl DiscoveryDocument {
    /// Introspection endpoint, falling back to the legacy validation endpoint
    pub fn validation_endpoint(&self) -> Option<&str> {
        self.introspection_endpoint
            .as_deref()
            .or(self.access_token_validation_endpoint.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

/// JWK Set as published; keys stay untyped until filtered
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JwksDocument {
    /// Raw keys
    #[serde(default)]
    pub keys: Vec<Value>,
}

impl JwksDocument {
    /// Keys usable for signature verification.
    ///
    /// Keys that fail to parse, carry `use` other than `sig`, or cannot be
    /// turned into a verification key are skipped.
    pub fn signing_keys(&self) -> Vec<SigningKey> {
        self.keys
            .iter()
            .filter_map(|raw| match serde_json::from_value::<Jwk>(raw.clone()) {
                Ok(jwk) => Some(jwk),
                Err(e) => {
                    debug!(error = %e, "Skipping unparseable JWK");
                    None
                }
            })
            .filter(|jwk| {
                matches!(
                    jwk.common.public_key_use,
                    None | Some(PublicKeyUse::Signature)
                )
            })
            .filter_map(|jwk| SigningKey::from_jwk(jwk).ok())
            .collect()
    }
}

/// Verification key published by the authority
#[derive(Clone)]
pub struct SigningKey {
    /// `kid`, when published
    pub kid: Option<String>,
    /// Source JWK
    pub jwk: Jwk,
    key: DecodingKey,
}

impl SigningKey {
    /// Build a verification key from a JWK
    ///
    /// # Errors
    ///
    /// Returns the underlying `jsonwebtoken` error if the key material is
    /// unusable (unsupported key type, bad encoding).
    pub fn from_jwk(jwk: Jwk) -> Result<Self, jsonwebtoken::errors::Error> {
        let key = DecodingKey::from_jwk(&jwk).inspect_err(|e| {
            debug!(kid = ?jwk.common.key_id, error = %e, "Skipping unusable JWK");
        })?;

        Ok(Self {
            kid: jwk.common.key_id.clone(),
            jwk,
            key,
        })
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("alg", &self.jwk.common.key_algorithm)
            .finish_non_exhaustive()
    }
}

/// Resolved metadata of the trusted authority.
///
/// Replaced wholesale on refresh, never mutated. `signing_keys` is never
/// empty.
#[derive(Debug, Clone)]
pub struct AuthorityMetadata {
    /// Expected `iss` value
    pub issuer: String,
    /// Keys tokens may be signed with
    pub signing_keys: Vec<SigningKey>,
    /// Introspection endpoint, when the authority publishes one
    pub introspection_endpoint: Option<Url>,
    /// Where the key set was fetched from (`None` for inline keys)
    pub jwks_uri: Option<Url>,
    /// When this metadata was fetched
    pub fetched_at: SystemTime,
}

impl AuthorityMetadata {
    /// Keys to try for a token, `kid` matches first.
    ///
    /// With a `kid`, only matching keys and keys without a `kid` are
    /// returned. Without one, every key is a candidate.
    pub fn candidate_keys<'a>(&'a self, kid: Option<&'a str>) -> Vec<&'a SigningKey> {
        match kid {
            Some(kid) => {
                let mut keys: Vec<&SigningKey> = self
                    .signing_keys
                    .iter()
                    .filter(|k| k.kid.as_deref() == Some(kid))
                    .collect();
                keys.extend(self.signing_keys.iter().filter(|k| k.kid.is_none()));
                keys
            }
            None => self.signing_keys.iter().collect(),
        }
    }

    /// Whether a key with this `kid` is published
    pub fn has_key(&self, kid: &str) -> bool {
        self.signing_keys
            .iter()
            .any(|k| k.kid.as_deref() == Some(kid))
    }

    /// Age of this document
    pub fn age(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.fetched_at)
            .unwrap_or(Duration::MAX)
    }

    /// Whether this document is younger than `ttl`
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}
