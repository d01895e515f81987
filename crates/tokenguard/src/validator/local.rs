//! Local JWT validation against the authority's signing keys
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. signature (any candidate key, `kid` matches first)
//! 2. issuer (`iss` equals the discovered issuer)
//! 3. audience (`aud` contains the expected audience)
//! 4. time window (`nbf`/`exp`, with clock skew leeway)
//!
//! A signature failure, including a `kid` that no published key carries,
//! triggers exactly one forced metadata refresh before the token is rejected.
//! This is how key rotation is picked up without a restart.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, Header, Validation, decode, decode_header};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use super::{TokenValidator, ValidationResult, ValidationSource};
use crate::claims::{Claims, parse_numeric_date};
use crate::config::ValidationConfig;
use crate::discovery::{AuthorityMetadata, DiscoveryResolver};
use crate::error::{AuthError, AuthResult, ErrorKind};

/// Validates self-contained JWT access tokens locally
pub struct LocalValidator {
    resolver: Arc<DiscoveryResolver>,
    audience: String,
    clock_skew: Duration,
    allowed_algorithms: Vec<Algorithm>,
}

impl std::fmt::Debug for LocalValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalValidator")
            .field("authority", &self.resolver.authority().as_str())
            .field("audience", &self.audience)
            .field("clock_skew", &self.clock_skew)
            .field("allowed_algorithms", &self.allowed_algorithms)
            .finish()
    }
}

impl LocalValidator {
    /// Create a local validator sharing the given resolver
    pub fn new(resolver: Arc<DiscoveryResolver>, config: &ValidationConfig) -> Self {
        Self {
            resolver,
            audience: config.expected_audience(),
            clock_skew: config.clock_skew,
            allowed_algorithms: config.allowed_algorithms.clone(),
        }
    }

    /// Expected audience
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Validate a token against a specific metadata snapshot.
    ///
    /// No refresh is attempted; see [`TokenValidator::validate`] for the
    /// rotating variant.
    ///
    /// # Errors
    ///
    /// - `MalformedToken` if the token is not a JWT
    /// - `InvalidSignature`, `InvalidIssuer`, `InvalidAudience` or
    ///   `TokenExpired` for the first failing check
    pub fn validate_with_metadata(
        &self,
        token: &str,
        metadata: &AuthorityMetadata,
    ) -> AuthResult<ValidationResult> {
        let header = self.parse_header(token)?;
        self.check(token, &header, metadata, unix_now())
    }

    fn parse_header(&self, token: &str) -> AuthResult<Header> {
        let header = decode_header(token).map_err(|e| {
            debug!(error = %e, "Failed to decode JWT header");
            AuthError::malformed_token(format!("not a JWT: {e}"))
        })?;

        if !self.allowed_algorithms.contains(&header.alg) {
            warn!(
                algorithm = ?header.alg,
                allowed = ?self.allowed_algorithms,
                "JWT algorithm not allowed"
            );
            return Err(AuthError::invalid_signature(format!(
                "algorithm {:?} not allowed",
                header.alg
            )));
        }

        Ok(header)
    }

    fn check(
        &self,
        token: &str,
        header: &Header,
        metadata: &AuthorityMetadata,
        now: u64,
    ) -> AuthResult<ValidationResult> {
        let claims = self.verify_signature(token, header, metadata)?;

        match claims.get("iss").and_then(Value::as_str) {
            Some(iss) if iss == metadata.issuer => {}
            Some(iss) => {
                return Err(AuthError::invalid_issuer(format!(
                    "issuer '{iss}' does not match '{}'",
                    metadata.issuer
                )));
            }
            None => return Err(AuthError::invalid_issuer("token has no iss claim")),
        }

        if !audience_contains(claims.get("aud"), &self.audience) {
            return Err(AuthError::invalid_audience(format!(
                "audience does not contain '{}'",
                self.audience
            )));
        }

        let leeway = self.clock_skew.as_secs();
        let exp = numeric_claim(&claims, "exp")
            .ok_or_else(|| AuthError::token_expired("token has no exp claim"))?;
        if exp.saturating_add(leeway) < now {
            return Err(AuthError::token_expired(format!("token expired at {exp}")));
        }
        if let Some(nbf) = numeric_claim(&claims, "nbf")
            && nbf > now.saturating_add(leeway)
        {
            return Err(AuthError::token_expired(format!(
                "token not valid before {nbf}"
            )));
        }

        debug!(
            issuer = %metadata.issuer,
            audience = %self.audience,
            kid = ?header.kid,
            algorithm = ?header.alg,
            "JWT validation successful"
        );

        let claims = Claims::from_json(&claims);
        Ok(ValidationResult {
            claims,
            expires_at: Some(exp),
            source: ValidationSource::Local,
        })
    }

    /// Try each candidate key until one verifies the signature
    fn verify_signature(
        &self,
        token: &str,
        header: &Header,
        metadata: &AuthorityMetadata,
    ) -> AuthResult<Map<String, Value>> {
        let candidates = metadata.candidate_keys(header.kid.as_deref());
        if candidates.is_empty() {
            return Err(AuthError::invalid_signature(format!(
                "no signing key matches kid {:?}",
                header.kid
            )));
        }

        // Claim checks are done by hand so the failure order is fixed
        let mut validation = Validation::new(header.alg);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let mut last_error = None;
        for key in candidates {
            match decode::<Map<String, Value>>(token, key.decoding_key(), &validation) {
                Ok(data) => return Ok(data.claims),
                Err(e) => match e.kind() {
                    JwtErrorKind::InvalidToken
                    | JwtErrorKind::Base64(_)
                    | JwtErrorKind::Json(_)
                    | JwtErrorKind::Utf8(_) => {
                        return Err(AuthError::malformed_token(format!("not a JWT: {e}")));
                    }
                    _ => {
                        debug!(kid = ?key.kid, error = %e, "Signing key did not verify token");
                        last_error = Some(e);
                    }
                },
            }
        }

        Err(AuthError::invalid_signature(match last_error {
            Some(e) => format!("signature did not verify: {e}"),
            None => "signature did not verify".to_string(),
        }))
    }
}

#[async_trait]
impl TokenValidator for LocalValidator {
    async fn validate(&self, token: &str) -> AuthResult<ValidationResult> {
        let header = self.parse_header(token)?;
        let metadata = self.resolver.resolve().await?;

        match self.check(token, &header, &metadata, unix_now()) {
            Err(first) if first.kind == ErrorKind::InvalidSignature => {
                warn!(
                    kid = ?header.kid,
                    error = %first,
                    "JWT signature check failed, refreshing signing keys and retrying"
                );

                let fresh = self
                    .resolver
                    .refresh_from(Some(&metadata))
                    .await
                    .inspect_err(|e| {
                        error!(error = %e, "Forced metadata refresh failed");
                    })?;

                self.check(token, &header, &fresh, unix_now())
                    .inspect_err(|e| warn!(error = %e, "JWT validation failed after key refresh"))
            }
            Err(e) => {
                warn!(error = %e, "JWT validation failed");
                Err(e)
            }
            ok => ok,
        }
    }

    fn source(&self) -> ValidationSource {
        ValidationSource::Local
    }
}

fn audience_contains(aud: Option<&Value>, expected: &str) -> bool {
    match aud {
        Some(Value::String(aud)) => aud == expected,
        Some(Value::Array(values)) => values.iter().any(|v| v.as_str() == Some(expected)),
        _ => false,
    }
}

fn numeric_claim(claims: &Map<String, Value>, name: &str) -> Option<u64> {
    match claims.get(name)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => parse_numeric_date(s),
        _ => None,
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, encode};
    use serde_json::json;

    use crate::discovery::JwksDocument;

    const SIGNING_PEM: &str = include_str!("../../tests/fixtures/signing.pem");
    const SIGNING_JWK: &str = include_str!("../../tests/fixtures/signing.jwk.json");
    const ROTATED_PEM: &str = include_str!("../../tests/fixtures/rotated.pem");

    const ISSUER: &str = "https://auth.example.com";
    const AUDIENCE: &str = "https://auth.example.com/resources";

    fn validator() -> LocalValidator {
        let config = ValidationConfig::builder(ISSUER).build().unwrap();
        let resolver = Arc::new(DiscoveryResolver::new(&config).unwrap());
        LocalValidator::new(resolver, &config)
    }

    fn metadata() -> AuthorityMetadata {
        let jwks = JwksDocument {
            keys: vec![serde_json::from_str(SIGNING_JWK).unwrap()],
        };
        AuthorityMetadata {
            issuer: ISSUER.into(),
            signing_keys: jwks.signing_keys(),
            introspection_endpoint: None,
            jwks_uri: None,
            fetched_at: SystemTime::now(),
        }
    }

    fn mint(pem: &str, kid: &str, claims: Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
        encode(&header, &claims, &key).unwrap()
    }

    fn valid_claims() -> Value {
        let now = unix_now();
        json!({
            "iss": ISSUER,
            "aud": AUDIENCE,
            "sub": "alice",
            "name": "Alice",
            "role": ["admin", "user"],
            "scope": "api1 api2",
            "iat": now,
            "nbf": now,
            "exp": now + 3600,
        })
    }

    #[test]
    fn test_valid_token() {
        let token = mint(SIGNING_PEM, "signing-key", valid_claims());
        let result = validator().validate_with_metadata(&token, &metadata()).unwrap();

        assert_eq!(result.source, ValidationSource::Local);
        assert_eq!(result.claims.first("name"), Some("Alice"));
        assert_eq!(result.claims.values("role").count(), 2);
        assert!(result.expires_at.is_some());
    }

    #[test]
    fn test_audience_array() {
        let mut claims = valid_claims();
        claims["aud"] = json!(["other", AUDIENCE]);
        let token = mint(SIGNING_PEM, "signing-key", claims);
        assert!(validator().validate_with_metadata(&token, &metadata()).is_ok());
    }

    #[test]
    fn test_opaque_token_is_malformed() {
        let err = validator()
            .validate_with_metadata("2YotnFZFEjr1zCsicMWpAA", &metadata())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedToken);
    }

    #[test]
    fn test_wrong_key_is_invalid_signature() {
        let token = mint(ROTATED_PEM, "signing-key", valid_claims());
        let err = validator().validate_with_metadata(&token, &metadata()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidSignature);
    }

    #[test]
    fn test_unknown_kid_is_invalid_signature() {
        let token = mint(SIGNING_PEM, "retired-key", valid_claims());
        let err = validator().validate_with_metadata(&token, &metadata()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidSignature);
    }

    #[test]
    fn test_disallowed_algorithm() {
        let header = Header::new(Algorithm::HS256);
        let token = encode(&header, &valid_claims(), &EncodingKey::from_secret(b"secret")).unwrap();
        let err = validator().validate_with_metadata(&token, &metadata()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidSignature);
    }

    #[test]
    fn test_check_order_issuer_before_audience_before_time() {
        let now = unix_now();
        let token = mint(
            SIGNING_PEM,
            "signing-key",
            json!({"iss": "https://evil.example.com", "aud": "wrong", "exp": now - 7200}),
        );
        let err = validator().validate_with_metadata(&token, &metadata()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidIssuer);

        let token = mint(
            SIGNING_PEM,
            "signing-key",
            json!({"iss": ISSUER, "aud": "wrong", "exp": now - 7200}),
        );
        let err = validator().validate_with_metadata(&token, &metadata()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidAudience);

        let token = mint(
            SIGNING_PEM,
            "signing-key",
            json!({"iss": ISSUER, "aud": AUDIENCE, "exp": now - 7200}),
        );
        let err = validator().validate_with_metadata(&token, &metadata()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TokenExpired);
    }

    #[test]
    fn test_clock_skew_leeway() {
        let now = unix_now();
        let mut claims = valid_claims();
        claims["exp"] = json!(now - 30);
        let token = mint(SIGNING_PEM, "signing-key", claims);
        assert!(validator().validate_with_metadata(&token, &metadata()).is_ok());

        let mut claims = valid_claims();
        claims["nbf"] = json!(now + 600);
        let token = mint(SIGNING_PEM, "signing-key", claims);
        let err = validator().validate_with_metadata(&token, &metadata()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TokenExpired);
    }

    #[test]
    fn test_missing_exp_is_expired() {
        let mut claims = valid_claims();
        claims.as_object_mut().unwrap().remove("exp");
        let token = mint(SIGNING_PEM, "signing-key", claims);
        let err = validator().validate_with_metadata(&token, &metadata()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TokenExpired);
    }
}
