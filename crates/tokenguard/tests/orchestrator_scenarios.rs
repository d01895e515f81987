//! Mode state machine, result cache and scope enforcement end to end

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokenguard::{
    Authenticator, ErrorKind, ValidationConfig, ValidationMode, ValidationSource, ValidationState,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

const OPAQUE: &str = "2YotnFZFEjr1zCsicMWpAA";

#[tokio::test]
async fn test_local_mode_accepts_signed_token() {
    let authority = MockAuthority::with_signing_key().await;
    let authenticator = Authenticator::new(config(&authority, ValidationMode::Local)).unwrap();

    let auth = authenticator
        .authenticate(&mint_signed(&valid_claims(&authority)))
        .await
        .unwrap();

    assert!(auth.visited(ValidationState::LocallyValid));
    assert_eq!(auth.identity.name.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_endpoint_mode_rejects_inactive_token() {
    let authority = MockAuthority::with_signing_key().await;
    authority
        .mount_introspection(200, json!({ "active": false }))
        .await;
    let authenticator = Authenticator::new(config(&authority, ValidationMode::Endpoint)).unwrap();

    let err = authenticator.authenticate(OPAQUE).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::TokenInactive);
}

#[tokio::test]
async fn test_both_mode_falls_back_to_remote_on_signature_failure() {
    let authority = MockAuthority::with_signing_key().await;
    authority
        .mount_introspection(200, active_introspection("api1"))
        .await;
    let authenticator = Authenticator::new(config(&authority, ValidationMode::Both)).unwrap();

    // Signed by a key the authority does not publish
    let token = mint(ROTATED_PEM, Some(ROTATED_KID), &valid_claims(&authority));
    let auth = authenticator.authenticate(&token).await.unwrap();

    assert_eq!(
        auth.path,
        vec![
            ValidationState::NotValidated,
            ValidationState::RemotelyValid,
            ValidationState::CombinedValid,
        ]
    );
    assert_eq!(auth.source(), ValidationSource::Remote);
    assert_eq!(auth.identity.subject(), Some("service-7"));
}

#[tokio::test]
async fn test_both_mode_local_success_skips_endpoint() {
    let authority = MockAuthority::with_signing_key().await;
    Mock::given(method("POST"))
        .and(path(INTROSPECTION_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(active_introspection("api1")))
        .expect(0)
        .mount(&authority.server)
        .await;
    let authenticator = Authenticator::new(config(&authority, ValidationMode::Both)).unwrap();

    let auth = authenticator
        .authenticate(&mint_signed(&valid_claims(&authority)))
        .await
        .unwrap();

    assert_eq!(auth.source(), ValidationSource::Local);
    assert!(!auth.visited(ValidationState::RemotelyValid));
}

#[tokio::test]
async fn test_both_mode_opaque_token_uses_endpoint() {
    let authority = MockAuthority::with_signing_key().await;
    authority
        .mount_introspection(200, active_introspection("api1"))
        .await;
    let authenticator = Authenticator::new(config(&authority, ValidationMode::Both)).unwrap();

    let auth = authenticator.authenticate(OPAQUE).await.unwrap();
    assert_eq!(auth.source(), ValidationSource::Remote);
}

#[tokio::test]
async fn test_both_mode_double_failure_keeps_remote_kind() {
    let authority = MockAuthority::with_signing_key().await;
    authority
        .mount_introspection(200, json!({ "active": false }))
        .await;
    let authenticator = Authenticator::new(config(&authority, ValidationMode::Both)).unwrap();

    let err = authenticator.authenticate(OPAQUE).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::TokenInactive);
    assert!(err.message.contains("local:"));
    assert!(err.message.contains("remote:"));
}

#[tokio::test]
async fn test_required_scopes_are_enforced() {
    let authority = MockAuthority::with_signing_key().await;
    let token = mint_signed(&valid_claims(&authority));

    let allowed = ValidationConfig::builder(authority.uri())
        .mode(ValidationMode::Local)
        .required_scopes(["api1"])
        .build()
        .unwrap();
    let auth = Authenticator::new(allowed)
        .unwrap()
        .authorize(&token)
        .await
        .unwrap();
    assert!(auth.identity.has_scope("api2"));

    let denied = ValidationConfig::builder(authority.uri())
        .mode(ValidationMode::Local)
        .required_scopes(["api3"])
        .build()
        .unwrap();
    let err = Authenticator::new(denied)
        .unwrap()
        .authorize(&token)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::MissingScope);
    assert_eq!(err.status_code(), http::StatusCode::FORBIDDEN);
    assert!(err.message.contains("api3"));
}

#[tokio::test]
async fn test_authorize_header_requires_bearer_scheme() {
    let authority = MockAuthority::with_signing_key().await;
    let authenticator = Authenticator::new(config(&authority, ValidationMode::Local)).unwrap();
    let token = mint_signed(&valid_claims(&authority));

    assert!(
        authenticator
            .authorize_header(&format!("bearer {token}"))
            .await
            .is_ok()
    );

    let err = authenticator
        .authorize_header(&format!("Basic {token}"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::MissingToken);
}

#[tokio::test]
async fn test_cached_result_is_served_without_second_introspection() {
    let authority = MockAuthority::with_signing_key().await;
    Mock::given(method("POST"))
        .and(path(INTROSPECTION_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(active_introspection("api1")))
        .expect(1)
        .mount(&authority.server)
        .await;

    let config = ValidationConfig::builder(authority.uri())
        .mode(ValidationMode::Endpoint)
        .cache(Duration::from_secs(60))
        .build()
        .unwrap();
    let authenticator = Authenticator::new(config).unwrap();

    let first = authenticator.authenticate(OPAQUE).await.unwrap();
    let second = authenticator.authenticate(OPAQUE).await.unwrap();

    assert_eq!(first.identity, second.identity);
    assert_eq!(authenticator.cache().map(|c| c.len()), Some(1));
}

#[tokio::test]
async fn test_inactive_result_is_not_cached() {
    let authority = MockAuthority::with_signing_key().await;
    Mock::given(method("POST"))
        .and(path(INTROSPECTION_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "active": false })))
        .expect(2)
        .mount(&authority.server)
        .await;

    let config = ValidationConfig::builder(authority.uri())
        .mode(ValidationMode::Endpoint)
        .cache(Duration::from_secs(60))
        .build()
        .unwrap();
    let authenticator = Authenticator::new(config).unwrap();

    assert!(authenticator.authenticate(OPAQUE).await.is_err());
    assert!(authenticator.authenticate(OPAQUE).await.is_err());
    assert_eq!(authenticator.cache().map(|c| c.is_empty()), Some(true));
}

#[tokio::test]
async fn test_cache_entry_expires_at_ceiling() {
    let authority = MockAuthority::with_signing_key().await;
    Mock::given(method("POST"))
        .and(path(INTROSPECTION_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(active_introspection("api1")))
        .expect(2)
        .mount(&authority.server)
        .await;

    let config = ValidationConfig::builder(authority.uri())
        .mode(ValidationMode::Endpoint)
        .cache(Duration::from_secs(1))
        .build()
        .unwrap();
    let authenticator = Authenticator::new(config).unwrap();

    authenticator.authenticate(OPAQUE).await.unwrap();
    authenticator.authenticate(OPAQUE).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    authenticator.authenticate(OPAQUE).await.unwrap();
}

#[tokio::test]
async fn test_cache_disabled_calls_endpoint_every_time() {
    let authority = MockAuthority::with_signing_key().await;
    Mock::given(method("POST"))
        .and(path(INTROSPECTION_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(active_introspection("api1")))
        .expect(3)
        .mount(&authority.server)
        .await;

    let authenticator = Authenticator::new(config(&authority, ValidationMode::Endpoint)).unwrap();
    assert!(authenticator.cache().is_none());

    for _ in 0..3 {
        authenticator.authenticate(OPAQUE).await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_authentications_share_metadata() {
    let authority = MockAuthority::start().await;
    authority.mount_discovery().await;
    authority.mount_jwks(&[SIGNING_JWK]).await;
    let authenticator =
        Arc::new(Authenticator::new(config(&authority, ValidationMode::Local)).unwrap());
    authenticator.prime().await.unwrap();

    let token = mint_signed(&valid_claims(&authority));
    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..32 {
        let authenticator = Arc::clone(&authenticator);
        let token = token.clone();
        tasks.spawn(async move { authenticator.authenticate(&token).await });
    }

    while let Some(outcome) = tasks.join_next().await {
        assert!(outcome.unwrap().is_ok());
    }
    assert_eq!(authority.hits(DISCOVERY_PATH).await, 1);
}
