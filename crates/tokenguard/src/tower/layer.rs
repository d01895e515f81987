//! Tower Layer for bearer authentication

use std::sync::Arc;

use tower::Layer;

use super::BearerAuthConfig;
use super::service::BearerAuthService;
use crate::orchestrator::Authenticator;

/// Tower Layer that adds bearer authentication to services
#[derive(Debug, Clone)]
pub struct BearerAuthLayer {
    authenticator: Arc<Authenticator>,
    config: BearerAuthConfig,
}

impl BearerAuthLayer {
    /// Create a layer with default configuration
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self {
            authenticator,
            config: BearerAuthConfig::default(),
        }
    }

    /// Create a layer with custom configuration
    pub fn with_config(authenticator: Arc<Authenticator>, config: BearerAuthConfig) -> Self {
        Self {
            authenticator,
            config,
        }
    }

    /// Set the realm advertised in challenges
    #[must_use]
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.config.realm = Some(realm.into());
        self
    }

    /// Serve a path without authentication
    #[must_use]
    pub fn bypass_path(mut self, path: impl Into<String>) -> Self {
        self.config.bypass_paths.push(path.into());
        self
    }
}

impl<S> Layer<S> for BearerAuthLayer {
    type Service = BearerAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuthService::new(inner, Arc::clone(&self.authenticator), self.config.clone())
    }
}
