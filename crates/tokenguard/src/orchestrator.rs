//! Validation orchestrator
//!
//! [`Authenticator`] owns the configuration, the shared discovery resolver,
//! both validators and the optional result cache, and runs the mode state
//! machine:
//!
//! | mode       | path                                                              |
//! |------------|-------------------------------------------------------------------|
//! | `Local`    | `NotValidated → LocallyValid → CombinedValid`                     |
//! | `Endpoint` | `NotValidated → RemotelyValid → CombinedValid` (cache read-through) |
//! | `Both`     | local first; on local failure the `Endpoint` path                 |
//!
//! Any failure ends in `Rejected`. In `Both` mode a local success returns
//! immediately without touching the endpoint; Remote is reserved for tokens
//! that cannot be verified locally, such as opaque reference tokens.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::bearer::extract_bearer_token;
use crate::cache::ValidationResultCache;
use crate::config::{ValidationConfig, ValidationMode};
use crate::discovery::{AuthorityMetadata, DiscoveryResolver};
use crate::error::{AuthError, AuthResult};
use crate::identity::GrantedIdentity;
use crate::scope::ScopeRequirement;
use crate::validator::{
    LocalValidator, RemoteValidator, TokenValidator, ValidationResult, ValidationSource,
};

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    /// Nothing checked yet
    NotValidated,
    /// Local validation succeeded
    LocallyValid,
    /// Remote validation succeeded
    RemotelyValid,
    /// Accepted
    CombinedValid,
    /// Rejected
    Rejected,
}

impl fmt::Display for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationState::NotValidated => "not_validated",
            ValidationState::LocallyValid => "locally_valid",
            ValidationState::RemotelyValid => "remotely_valid",
            ValidationState::CombinedValid => "combined_valid",
            ValidationState::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Successful authentication
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Authentication {
    /// Identity for the rest of the request
    pub identity: GrantedIdentity,
    /// States visited, from `NotValidated` to `CombinedValid`
    pub path: Vec<ValidationState>,
}

impl Authentication {
    /// Whether the orchestrator passed through `state`
    pub fn visited(&self, state: ValidationState) -> bool {
        self.path.contains(&state)
    }

    /// Which validator granted the identity
    pub fn source(&self) -> ValidationSource {
        self.identity.source
    }
}

/// Bearer token authenticator for one authority.
///
/// Cheap to share: wrap in an `Arc` and call from any number of concurrent
/// requests. The configuration is immutable after construction.
///
/// # Example
///
/// ```rust,no_run
/// use tokenguard::{Authenticator, ValidationConfig, ValidationMode};
///
/// # tokio_test::block_on(async {
/// let config = ValidationConfig::builder("https://auth.example.com")
///     .mode(ValidationMode::Both)
///     .required_scopes(["api1"])
///     .build()?;
///
/// let authenticator = Authenticator::new(config)?;
/// authenticator.prime().await?;
///
/// let auth = authenticator.authorize_header("Bearer eyJhbGciOi...").await?;
/// println!("hello {:?}", auth.identity.name);
/// # Ok::<(), tokenguard::AuthError>(())
/// # });
/// ```
pub struct Authenticator {
    config: Arc<ValidationConfig>,
    resolver: Arc<DiscoveryResolver>,
    local: Arc<dyn TokenValidator>,
    remote: Arc<dyn TokenValidator>,
    cache: Option<ValidationResultCache>,
    scopes: ScopeRequirement,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("authority", &self.resolver.authority().as_str())
            .field("mode", &self.config.mode)
            .field("cache", &self.cache)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Build an authenticator from a configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` if the configuration does not validate
    /// or the HTTP client cannot be created.
    pub fn new(config: ValidationConfig) -> AuthResult<Self> {
        config.validate()?;

        let resolver = Arc::new(DiscoveryResolver::new(&config)?);
        let local: Arc<dyn TokenValidator> =
            Arc::new(LocalValidator::new(Arc::clone(&resolver), &config));
        let remote: Arc<dyn TokenValidator> =
            Arc::new(RemoteValidator::new(Arc::clone(&resolver), &config)?);

        Self::with_validators(config, resolver, local, remote)
    }

    /// Build an authenticator from explicit parts.
    ///
    /// Lets callers substitute either validator, e.g. a custom Remote
    /// implementation for a non-standard endpoint.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` if the configuration does not validate.
    pub fn with_validators(
        config: ValidationConfig,
        resolver: Arc<DiscoveryResolver>,
        local: Arc<dyn TokenValidator>,
        remote: Arc<dyn TokenValidator>,
    ) -> AuthResult<Self> {
        config.validate()?;

        let cache = (config.cache_enabled && config.mode.uses_endpoint())
            .then(|| ValidationResultCache::new(config.cache_ttl_ceiling));
        let scopes = ScopeRequirement::new(config.required_scopes.iter().cloned());

        Ok(Self {
            config: Arc::new(config),
            resolver,
            local,
            remote,
            cache,
            scopes,
        })
    }

    /// Configuration in effect
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Discovery resolver shared by both validators
    pub fn resolver(&self) -> &Arc<DiscoveryResolver> {
        &self.resolver
    }

    /// Result cache, when enabled and the mode calls the endpoint
    pub fn cache(&self) -> Option<&ValidationResultCache> {
        self.cache.as_ref()
    }

    /// Scopes every request must carry
    pub fn scope_requirement(&self) -> &ScopeRequirement {
        &self.scopes
    }

    /// Load authority metadata now instead of on the first request
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryUnavailable` or `NoSigningKeys` if the authority
    /// cannot be resolved.
    pub async fn prime(&self) -> AuthResult<Arc<AuthorityMetadata>> {
        self.resolver.resolve().await
    }

    /// Validate a token according to the configured mode.
    ///
    /// Scopes are not checked; see [`authorize`](Self::authorize).
    ///
    /// # Errors
    ///
    /// Returns the rejecting validator's error. In `Both` mode, when both
    /// paths fail, the error carries the Remote kind and both reasons.
    #[instrument(skip_all, fields(mode = %self.config.mode))]
    pub async fn authenticate(&self, token: &str) -> AuthResult<Authentication> {
        let mut path = vec![ValidationState::NotValidated];

        if token.trim().is_empty() {
            return Err(self.reject(path, AuthError::missing_token("empty bearer token")));
        }

        let outcome = match self.config.mode {
            ValidationMode::Local => self.local.validate(token).await.map(|result| {
                path.push(ValidationState::LocallyValid);
                result
            }),
            ValidationMode::Endpoint => self.remote_path(token).await.map(|result| {
                path.push(ValidationState::RemotelyValid);
                result
            }),
            ValidationMode::Both => match self.local.validate(token).await {
                Ok(result) => {
                    path.push(ValidationState::LocallyValid);
                    Ok(result)
                }
                Err(local_err) => {
                    debug!(error = %local_err, "Local validation failed, trying endpoint");
                    match self.remote_path(token).await {
                        Ok(result) => {
                            path.push(ValidationState::RemotelyValid);
                            Ok(result)
                        }
                        Err(remote_err) => Err(AuthError::combined(&local_err, &remote_err)),
                    }
                }
            },
        };

        match outcome {
            Ok(result) => {
                path.push(ValidationState::CombinedValid);
                debug!(path = ?path, source = %result.source, "Token accepted");
                Ok(Authentication {
                    identity: GrantedIdentity::from_result(result, &self.config, token),
                    path,
                })
            }
            Err(e) => Err(self.reject(path, e)),
        }
    }

    /// Validate a token, then enforce the configured required scopes
    ///
    /// # Errors
    ///
    /// Any error of [`authenticate`](Self::authenticate), or `MissingScope`.
    pub async fn authorize(&self, token: &str) -> AuthResult<Authentication> {
        let auth = self.authenticate(token).await?;
        self.scopes.check(&auth.identity)?;
        Ok(auth)
    }

    /// [`authorize`](Self::authorize) starting from an `Authorization` header
    ///
    /// # Errors
    ///
    /// `MissingToken` if the header is not a single bearer token, otherwise
    /// as [`authorize`](Self::authorize).
    pub async fn authorize_header(&self, header: &str) -> AuthResult<Authentication> {
        let token = extract_bearer_token(header)?;
        self.authorize(token).await
    }

    /// Cache read-through around the Remote validator
    async fn remote_path(&self, token: &str) -> AuthResult<ValidationResult> {
        if let Some(cache) = &self.cache
            && let Some(hit) = cache.get(token)
        {
            debug!("Validation result cache hit");
            return Ok(hit);
        }

        let result = self.remote.validate(token).await?;

        if let Some(cache) = &self.cache {
            cache.put(token, result.clone());
        }

        Ok(result)
    }

    fn reject(&self, mut path: Vec<ValidationState>, error: AuthError) -> AuthError {
        path.push(ValidationState::Rejected);
        warn!(path = ?path, kind = %error.kind, reason = %error.message, "Token rejected");
        error
    }
}
