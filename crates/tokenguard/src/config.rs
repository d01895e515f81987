//! Validation configuration
//!
//! A [`ValidationConfig`] is built once at startup, either through
//! [`ValidationConfig::builder`] or by deserializing it (file, environment)
//! and calling [`ValidationConfig::validate`]. The orchestrator takes ownership
//! of it behind an `Arc` and never mutates it afterwards, so concurrent
//! requests observe one consistent configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use secrecy::SecretString;
use serde::Deserialize;
use serde_with::{DurationSeconds, serde_as};
use url::Url;

use crate::error::{AuthError, AuthResult};
use crate::transport::is_loopback;

/// Default upper bound for cached introspection results (5 minutes)
pub const DEFAULT_CACHE_TTL_CEILING: Duration = Duration::from_secs(300);
/// Default timeout for discovery and introspection calls
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
/// Default lifetime of a fetched discovery document
pub const DEFAULT_METADATA_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);
/// Default minimum spacing between two discovery fetches
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(5);
/// Default clock skew tolerance for `exp`/`nbf`
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);
/// Default cap on discovery / JWKS / introspection response bodies
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 64 * 1024;

/// Which validation strategy the orchestrator applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Verify JWTs locally against the authority's signing keys
    Local,
    /// Ask the authority's introspection endpoint
    #[serde(alias = "validation_endpoint")]
    Endpoint,
    /// Local first; fall back to the endpoint when local validation fails
    #[default]
    Both,
}

impl ValidationMode {
    /// Whether this mode may call the introspection endpoint
    pub fn uses_endpoint(&self) -> bool {
        matches!(self, ValidationMode::Endpoint | ValidationMode::Both)
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationMode::Local => f.write_str("local"),
            ValidationMode::Endpoint => f.write_str("endpoint"),
            ValidationMode::Both => f.write_str("both"),
        }
    }
}

impl FromStr for ValidationMode {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(ValidationMode::Local),
            "endpoint" | "validation_endpoint" | "validationendpoint" => {
                Ok(ValidationMode::Endpoint)
            }
            "both" => Ok(ValidationMode::Both),
            other => Err(AuthError::configuration(format!(
                "unknown validation mode '{other}' (expected local, endpoint or both)"
            ))),
        }
    }
}

/// HTTP method used to call the introspection endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointMethod {
    /// RFC 7662: form-encoded `POST` with `token=...`
    #[default]
    Post,
    /// Legacy validation endpoints: `GET ...?token=...`
    Get,
}

/// Bearer token validation configuration
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    /// Base URL of the identity authority (required)
    pub authority: String,

    /// Validation strategy
    #[serde(default)]
    pub mode: ValidationMode,

    /// Scopes every request must carry (empty = no requirement)
    #[serde(default)]
    pub required_scopes: Vec<String>,

    /// Memoize successful introspection results
    #[serde(default)]
    pub cache_enabled: bool,

    /// Upper bound for how long an introspection result is reused
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_cache_ttl_ceiling")]
    pub cache_ttl_ceiling: Duration,

    /// Claim used as the identity's name
    #[serde(default = "default_name_claim")]
    pub name_claim: String,

    /// Claim used for the identity's roles
    #[serde(default = "default_role_claim")]
    pub role_claim: String,

    /// Claim carrying granted scopes
    #[serde(default = "default_scope_claim")]
    pub scope_claim: String,

    /// Expected `aud` value (defaults to `{authority}/resources`)
    #[serde(default)]
    pub audience: Option<String>,

    /// Client id presented to the introspection endpoint
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret presented to the introspection endpoint
    #[serde(default)]
    pub client_secret: Option<SecretString>,

    /// Introspection request method
    #[serde(default)]
    pub endpoint_method: EndpointMethod,

    /// Keep the raw access token as a `token` claim on the identity
    #[serde(default)]
    pub preserve_access_token: bool,

    /// Authentication type stamped on granted identities
    #[serde(default = "default_authentication_type")]
    pub authentication_type: String,

    /// Timeout for every outbound call
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_http_timeout")]
    pub http_timeout: Duration,

    /// How long a discovery document is considered fresh
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_metadata_refresh_interval")]
    pub metadata_refresh_interval: Duration,

    /// Minimum time between two discovery fetches once a document is cached
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_min_refresh_interval")]
    pub min_refresh_interval: Duration,

    /// Clock skew tolerance for `exp`/`nbf`
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_clock_skew")]
    pub clock_skew: Duration,

    /// JWS algorithms accepted for local validation
    #[serde(default = "default_allowed_algorithms")]
    pub allowed_algorithms: Vec<Algorithm>,

    /// Maximum accepted response body size for outbound calls
    #[serde(default = "default_max_response_size")]
    pub max_response_size: usize,
}

fn default_cache_ttl_ceiling() -> Duration {
    DEFAULT_CACHE_TTL_CEILING
}

fn default_name_claim() -> String {
    "name".to_string()
}

fn default_role_claim() -> String {
    "role".to_string()
}

fn default_scope_claim() -> String {
    "scope".to_string()
}

fn default_authentication_type() -> String {
    "Bearer".to_string()
}

fn default_http_timeout() -> Duration {
    DEFAULT_HTTP_TIMEOUT
}

fn default_metadata_refresh_interval() -> Duration {
    DEFAULT_METADATA_REFRESH_INTERVAL
}

fn default_min_refresh_interval() -> Duration {
    DEFAULT_MIN_REFRESH_INTERVAL
}

fn default_clock_skew() -> Duration {
    DEFAULT_CLOCK_SKEW
}

fn default_allowed_algorithms() -> Vec<Algorithm> {
    vec![Algorithm::ES256, Algorithm::RS256, Algorithm::PS256]
}

fn default_max_response_size() -> usize {
    DEFAULT_MAX_RESPONSE_SIZE
}

impl ValidationConfig {
    /// Start building a configuration for the given authority
    pub fn builder(authority: impl Into<String>) -> ValidationConfigBuilder {
        ValidationConfigBuilder::new(authority)
    }

    /// Check the configuration for setup-time errors
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` if:
    /// - `authority` is empty, not an absolute URL, or plain `http` on a
    ///   host other than loopback
    /// - caching is enabled with a zero TTL ceiling
    /// - no algorithms are allowed
    /// - a claim key or the HTTP timeout is empty/zero
    pub fn validate(&self) -> AuthResult<()> {
        self.authority_url()?;

        if self.cache_enabled && self.cache_ttl_ceiling.is_zero() {
            return Err(AuthError::configuration(
                "cache_ttl_ceiling must be greater than zero when caching is enabled",
            ));
        }

        if self.allowed_algorithms.is_empty() {
            return Err(AuthError::configuration(
                "allowed_algorithms must not be empty",
            ));
        }

        for (field, value) in [
            ("name_claim", &self.name_claim),
            ("role_claim", &self.role_claim),
            ("scope_claim", &self.scope_claim),
        ] {
            if value.trim().is_empty() {
                return Err(AuthError::configuration(format!("{field} must not be empty")));
            }
        }

        if self.http_timeout.is_zero() {
            return Err(AuthError::configuration(
                "http_timeout must be greater than zero",
            ));
        }

        if let Some(audience) = &self.audience
            && audience.trim().is_empty()
        {
            return Err(AuthError::configuration("audience must not be empty when set"));
        }

        Ok(())
    }

    /// Parsed authority URL
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` if the authority is missing,
    /// unparseable, or not reachable over https (plain `http` is accepted for
    /// loopback hosts only).
    pub fn authority_url(&self) -> AuthResult<Url> {
        let authority = self.authority.trim();
        if authority.is_empty() {
            return Err(AuthError::configuration("authority must be set"));
        }

        let url = Url::parse(authority)
            .map_err(|e| AuthError::configuration(format!("invalid authority URL: {e}")))?;

        match url.scheme() {
            "https" => Ok(url),
            "http" if is_loopback(&url) => Ok(url),
            "http" => Err(AuthError::configuration(format!(
                "authority must use https unless it is a loopback host, got '{url}'"
            ))),
            scheme => Err(AuthError::configuration(format!(
                "authority must use https, got '{scheme}'"
            ))),
        }
    }

    /// Audience local validation expects in `aud`
    pub fn expected_audience(&self) -> String {
        match &self.audience {
            Some(audience) => audience.clone(),
            None => format!("{}/resources", self.authority.trim().trim_end_matches('/')),
        }
    }
}

/// Fluent builder for [`ValidationConfig`]
#[derive(Debug, Clone)]
pub struct ValidationConfigBuilder {
    config: ValidationConfig,
}

impl ValidationConfigBuilder {
    fn new(authority: impl Into<String>) -> Self {
        Self {
            config: ValidationConfig {
                authority: authority.into(),
                mode: ValidationMode::default(),
                required_scopes: Vec::new(),
                cache_enabled: false,
                cache_ttl_ceiling: DEFAULT_CACHE_TTL_CEILING,
                name_claim: default_name_claim(),
                role_claim: default_role_claim(),
                scope_claim: default_scope_claim(),
                audience: None,
                client_id: None,
                client_secret: None,
                endpoint_method: EndpointMethod::default(),
                preserve_access_token: false,
                authentication_type: default_authentication_type(),
                http_timeout: DEFAULT_HTTP_TIMEOUT,
                metadata_refresh_interval: DEFAULT_METADATA_REFRESH_INTERVAL,
                min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
                clock_skew: DEFAULT_CLOCK_SKEW,
                allowed_algorithms: default_allowed_algorithms(),
                max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            },
        }
    }

    /// Set the validation mode
    pub fn mode(mut self, mode: ValidationMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Require the given scopes on every request
    pub fn required_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.required_scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Enable the introspection result cache with the given ceiling
    pub fn cache(mut self, ttl_ceiling: Duration) -> Self {
        self.config.cache_enabled = true;
        self.config.cache_ttl_ceiling = ttl_ceiling;
        self
    }

    /// Disable the introspection result cache
    pub fn no_cache(mut self) -> Self {
        self.config.cache_enabled = false;
        self
    }

    /// Override the name claim key
    pub fn name_claim(mut self, claim: impl Into<String>) -> Self {
        self.config.name_claim = claim.into();
        self
    }

    /// Override the role claim key
    pub fn role_claim(mut self, claim: impl Into<String>) -> Self {
        self.config.role_claim = claim.into();
        self
    }

    /// Override the scope claim key
    pub fn scope_claim(mut self, claim: impl Into<String>) -> Self {
        self.config.scope_claim = claim.into();
        self
    }

    /// Set the expected audience
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.config.audience = Some(audience.into());
        self
    }

    /// Credentials for the introspection endpoint
    pub fn client_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: Option<String>,
    ) -> Self {
        self.config.client_id = Some(client_id.into());
        self.config.client_secret = client_secret.map(SecretString::new);
        self
    }

    /// Set the introspection request method
    pub fn endpoint_method(mut self, method: EndpointMethod) -> Self {
        self.config.endpoint_method = method;
        self
    }

    /// Keep the raw token as a `token` claim
    pub fn preserve_access_token(mut self, preserve: bool) -> Self {
        self.config.preserve_access_token = preserve;
        self
    }

    /// Set the authentication type stamped on identities
    pub fn authentication_type(mut self, authentication_type: impl Into<String>) -> Self {
        self.config.authentication_type = authentication_type.into();
        self
    }

    /// Set the timeout for outbound calls
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.config.http_timeout = timeout;
        self
    }

    /// Set how long discovery documents stay fresh
    pub fn metadata_refresh_interval(mut self, interval: Duration) -> Self {
        self.config.metadata_refresh_interval = interval;
        self
    }

    /// Set the minimum spacing between discovery fetches.
    ///
    /// Bounds how often tokens with unknown key ids can make the resolver
    /// refetch. `Duration::ZERO` disables the limit.
    pub fn min_refresh_interval(mut self, interval: Duration) -> Self {
        self.config.min_refresh_interval = interval;
        self
    }

    /// Set the clock skew tolerance
    pub fn clock_skew(mut self, leeway: Duration) -> Self {
        self.config.clock_skew = leeway;
        self
    }

    /// Set allowed JWS algorithms
    ///
    /// Only use asymmetric algorithms for tokens issued by a third party.
    pub fn allowed_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.config.allowed_algorithms = algorithms;
        self
    }

    /// Set the response body size cap
    pub fn max_response_size(mut self, bytes: usize) -> Self {
        self.config.max_response_size = bytes;
        self
    }

    /// Validate and return the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` under the conditions listed on
    /// [`ValidationConfig::validate`].
    pub fn build(self) -> AuthResult<ValidationConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
