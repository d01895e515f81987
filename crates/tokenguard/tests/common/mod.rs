//! Common test utilities for tokenguard integration tests

#![allow(dead_code)]

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use tokenguard::{ValidationConfig, ValidationMode};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SIGNING_PEM: &str = include_str!("../fixtures/signing.pem");
pub const SIGNING_JWK: &str = include_str!("../fixtures/signing.jwk.json");
pub const SIGNING_KID: &str = "signing-key";

pub const ROTATED_PEM: &str = include_str!("../fixtures/rotated.pem");
pub const ROTATED_JWK: &str = include_str!("../fixtures/rotated.jwk.json");
pub const ROTATED_KID: &str = "rotated-key";

pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
pub const JWKS_PATH: &str = "/jwks";
pub const INTROSPECTION_PATH: &str = "/connect/introspect";

/// Mock identity authority backed by wiremock
pub struct MockAuthority {
    pub server: MockServer,
}

impl MockAuthority {
    /// Start an authority with nothing mounted
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Start an authority publishing the signing key and an introspection endpoint
    pub async fn with_signing_key() -> Self {
        let authority = Self::start().await;
        authority.mount_discovery().await;
        authority.mount_jwks(&[SIGNING_JWK]).await;
        authority
    }

    /// Authority URL, also the issuer
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    /// Default expected audience for this authority
    pub fn audience(&self) -> String {
        format!("{}/resources", self.server.uri())
    }

    pub fn discovery_document(&self) -> Value {
        json!({
            "issuer": self.issuer(),
            "jwks_uri": format!("{}{JWKS_PATH}", self.uri()),
            "introspection_endpoint": format!("{}{INTROSPECTION_PATH}", self.uri()),
        })
    }

    pub async fn mount_discovery(&self) {
        self.mount_discovery_document(self.discovery_document()).await;
    }

    pub async fn mount_discovery_document(&self, document: Value) {
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(document))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_jwks(&self, keys: &[&str]) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks(keys)))
            .mount(&self.server)
            .await;
    }

    /// Mount an introspection endpoint answering every request with `body`
    pub async fn mount_introspection(&self, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(path(INTROSPECTION_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Number of requests the authority received on `request_path`
    pub async fn hits(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == request_path)
            .count()
    }
}

/// JWKS document from JWK JSON strings
pub fn jwks(keys: &[&str]) -> Value {
    let keys: Vec<Value> = keys
        .iter()
        .map(|k| serde_json::from_str(k).expect("fixture JWK is valid JSON"))
        .collect();
    json!({ "keys": keys })
}

/// Sign `claims` as an RS256 JWT
pub fn mint(pem: &str, kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("fixture PEM is valid");
    encode(&header, claims, &key).expect("token encodes")
}

/// Sign `claims` with the authority's current signing key
pub fn mint_signed(claims: &Value) -> String {
    mint(SIGNING_PEM, Some(SIGNING_KID), claims)
}

pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .as_secs()
}

/// Claims accepted by a default configuration for `authority`
pub fn valid_claims(authority: &MockAuthority) -> Value {
    let now = current_timestamp();
    json!({
        "iss": authority.issuer(),
        "aud": authority.audience(),
        "sub": "user-123",
        "name": "alice",
        "role": ["admin", "reader"],
        "scope": "api1 api2",
        "iat": now,
        "nbf": now,
        "exp": now + 3600,
    })
}

/// Successful introspection response for an opaque token
pub fn active_introspection(scope: &str) -> Value {
    json!({
        "active": true,
        "sub": "service-7",
        "name": "svc",
        "scope": scope,
        "exp": current_timestamp() + 3600,
    })
}

/// Configuration for `authority` in `mode`, with client credentials for introspection.
///
/// The refresh rate limit is off so a forced refresh right after priming
/// always fetches.
pub fn config(authority: &MockAuthority, mode: ValidationMode) -> ValidationConfig {
    ValidationConfig::builder(authority.uri())
        .mode(mode)
        .client_credentials("api", Some("secret".to_string()))
        .http_timeout(Duration::from_secs(5))
        .min_refresh_interval(Duration::ZERO)
        .build()
        .expect("test configuration is valid")
}
