//! # Tower Middleware Integration
//!
//! [`BearerAuthLayer`] wraps an HTTP service with bearer token validation and
//! required-scope enforcement, composing an [`Authenticator`] explicitly
//! rather than through a framework-specific pipeline.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tower::ServiceBuilder;
//! use tokenguard::tower::BearerAuthLayer;
//!
//! let authenticator = Arc::new(Authenticator::new(config)?);
//!
//! let service = ServiceBuilder::new()
//!     .layer(BearerAuthLayer::new(authenticator).realm("orders").bypass_path("/health"))
//!     .service(my_http_handler);
//! ```
//!
//! ## Request Extensions
//!
//! On success the [`GrantedIdentity`] is inserted into the request's
//! extensions:
//!
//! ```rust,ignore
//! if let Some(identity) = req.extensions().get::<GrantedIdentity>() {
//!     println!("Authenticated: {:?}", identity.name);
//! }
//! ```
//!
//! Rejected requests never reach the inner service. They are answered with
//! [`AuthError::status_code`](crate::AuthError::status_code), an empty body,
//! and a `WWW-Authenticate` challenge where one applies.
//!
//! [`Authenticator`]: crate::Authenticator
//! [`GrantedIdentity`]: crate::GrantedIdentity

mod layer;
mod service;

pub use layer::BearerAuthLayer;
pub use service::{BearerAuthFuture, BearerAuthService};

/// Configuration for the bearer auth layer
#[derive(Debug, Clone, Default)]
pub struct BearerAuthConfig {
    /// Realm advertised in `WWW-Authenticate`
    pub realm: Option<String>,
    /// Request paths served without authentication (e.g. `/health`)
    pub bypass_paths: Vec<String>,
}

impl BearerAuthConfig {
    /// Whether a request path skips authentication
    pub fn should_bypass(&self, path: &str) -> bool {
        self.bypass_paths.iter().any(|p| p == path)
    }
}
