//! # tokenguard - OAuth2 Bearer Token Validation
//!
//! Authenticates inbound requests carrying OAuth2 bearer tokens against a
//! trusted identity authority, then optionally enforces required scopes.
//!
//! ## Key Features
//!
//! - **OIDC Discovery** - issuer, signing keys and introspection endpoint from
//!   `{authority}/.well-known/openid-configuration`, cached and refreshed
//! - **Local Validation** - JWT signature, issuer, audience and lifetime
//!   checks, with one forced key refresh on a key miss (key rotation)
//! - **Remote Validation** - RFC 7662 introspection or the legacy
//!   IdentityServer validation endpoint, for opaque reference tokens
//! - **Result Cache** - optional read-through cache of introspection results,
//!   bounded by token expiry and a TTL ceiling
//! - **Scope Enforcement** - required scopes as a superset check
//!
//! ## Architecture
//!
//! - [`config`] - Immutable [`ValidationConfig`] with builder and serde support
//! - [`discovery`] - [`DiscoveryResolver`] and [`AuthorityMetadata`]
//! - [`validator`] - The [`TokenValidator`] trait, [`LocalValidator`], [`RemoteValidator`]
//! - [`cache`] - [`ValidationResultCache`]
//! - [`orchestrator`] - [`Authenticator`], the mode state machine
//! - [`scope`] - [`ScopeRequirement`]
//! - [`challenge`] - RFC 6750 `WWW-Authenticate` challenges
//! - `tower` - Tower layer (feature `middleware`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tokenguard::{Authenticator, ValidationConfig, ValidationMode};
//!
//! # tokio_test::block_on(async {
//! let config = ValidationConfig::builder("https://auth.example.com")
//!     .mode(ValidationMode::Both)
//!     .required_scopes(["api1"])
//!     .build()?;
//!
//! let authenticator = Authenticator::new(config)?;
//!
//! match authenticator.authorize_header("Bearer eyJhbGciOi...").await {
//!     Ok(auth) => println!("authenticated {:?} via {}", auth.identity.name, auth.source()),
//!     Err(e) => println!("rejected ({}): {}", e.status_code(), e),
//! }
//! # Ok::<(), tokenguard::AuthError>(())
//! # });
//! ```
//!
//! ## Feature Flags
//!
//! - `middleware` (alias `tower`) - Tower `Layer`/`Service` for `http` requests

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod bearer;
pub mod cache;
pub mod challenge;
pub mod claims;
pub mod config;
pub mod discovery;
pub mod error;
pub mod identity;
pub mod orchestrator;
pub mod scope;
mod transport;
pub mod validator;

#[cfg(feature = "middleware")]
#[cfg_attr(docsrs, doc(cfg(feature = "middleware")))]
pub mod tower;

pub use bearer::{bearer_token_from_headers, extract_bearer_token};
pub use cache::{CacheStats, ValidationResultCache, token_key};
pub use challenge::{BearerChallenge, OAuth2ErrorCode};
pub use claims::{Claim, Claims};
pub use config::{EndpointMethod, ValidationConfig, ValidationConfigBuilder, ValidationMode};
pub use discovery::{AuthorityMetadata, DiscoveryResolver, SigningKey};
pub use error::{AuthError, AuthResult, ErrorKind};
pub use identity::GrantedIdentity;
pub use orchestrator::{Authentication, Authenticator, ValidationState};
pub use scope::{ScopeRequirement, check_scopes};
pub use validator::{
    LocalValidator, RemoteValidator, TokenValidator, ValidationResult, ValidationSource,
};

/// Re-exported so callers can configure `allowed_algorithms` without a
/// direct `jsonwebtoken` dependency
pub use jsonwebtoken::Algorithm;
