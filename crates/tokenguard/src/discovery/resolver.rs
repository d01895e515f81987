//! Discovery resolver with in-memory metadata cache

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use url::Url;

use super::types::{AuthorityMetadata, DiscoveryDocument, JwksDocument};
use crate::config::ValidationConfig;
use crate::error::{AuthError, AuthResult};
use crate::transport::{HttpFetcher, ensure_secure};

/// Well-known OpenID Connect discovery path
pub const WELL_KNOWN_PATH: &str = ".well-known/openid-configuration";

/// Build the discovery URL for an authority.
///
/// The authority is normalized to exactly one trailing `/` before the
/// well-known path is appended, so `https://id.example.com`,
/// `https://id.example.com/` and `https://id.example.com//` all resolve to
/// `https://id.example.com/.well-known/openid-configuration`.
///
/// # Errors
///
/// Returns `ConfigurationInvalid` if the result is not a valid URL.
pub fn discovery_url(authority: &Url) -> AuthResult<Url> {
    let base = authority.as_str().trim_end_matches('/');
    Url::parse(&format!("{base}/{WELL_KNOWN_PATH}"))
        .map_err(|e| AuthError::configuration(format!("invalid discovery URL: {e}")))
}

/// Resolves and caches the authority's discovery metadata.
///
/// The current document lives in an `ArcSwapOption`: readers load it without
/// locking, and a refresh fetches into a local value before swapping it in.
///
/// Fetches are serialized by a single mutex. While one caller refreshes an
/// expired document, other callers are served the previous one instead of
/// starting their own fetch. Two fetches are at least
/// `min_refresh_interval` apart whenever a document is already cached.
///
/// # Example
///
/// ```rust,no_run
/// # use tokenguard::{DiscoveryResolver, ValidationConfig};
/// # tokio_test::block_on(async {
/// let config = ValidationConfig::builder("https://auth.example.com").build()?;
/// let resolver = DiscoveryResolver::new(&config)?;
///
/// // Fetched once, then served from memory until the refresh interval elapses
/// let metadata = resolver.resolve().await?;
/// println!("issuer: {}", metadata.issuer);
/// # Ok::<(), tokenguard::AuthError>(())
/// # });
/// ```
#[derive(Debug)]
pub struct DiscoveryResolver {
    authority: Url,
    discovery_url: Url,
    fetcher: HttpFetcher,
    refresh_interval: Duration,
    min_refresh_interval: Duration,
    current: ArcSwapOption<AuthorityMetadata>,
    /// Held while fetching; records when the last fetch started
    last_fetch: Mutex<Option<Instant>>,
}

impl DiscoveryResolver {
    /// Create a resolver for the configured authority
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` if the authority URL is invalid or the
    /// HTTP client cannot be built.
    pub fn new(config: &ValidationConfig) -> AuthResult<Self> {
        let fetcher = HttpFetcher::new(config)?;
        Self::with_fetcher(config, fetcher)
    }

    pub(crate) fn with_fetcher(
        config: &ValidationConfig,
        fetcher: HttpFetcher,
    ) -> AuthResult<Self> {
        let authority = config.authority_url()?;
        let discovery_url = discovery_url(&authority)?;

        Ok(Self {
            authority,
            discovery_url,
            fetcher,
            refresh_interval: config.metadata_refresh_interval,
            min_refresh_interval: config.min_refresh_interval,
            current: ArcSwapOption::empty(),
            last_fetch: Mutex::new(None),
        })
    }

    /// Authority this resolver is bound to
    pub fn authority(&self) -> &Url {
        &self.authority
    }

    /// Discovery document URL
    pub fn discovery_url(&self) -> &Url {
        &self.discovery_url
    }

    /// Currently cached metadata, fresh or not
    pub fn cached(&self) -> Option<Arc<AuthorityMetadata>> {
        self.current.load_full()
    }

    /// Resolve the authority metadata.
    ///
    /// Returns the cached document while it is younger than the refresh
    /// interval. Otherwise fetches a new one; if that fails and an older
    /// document exists, the older document is served. The older document is
    /// also served while another caller's fetch is in flight, and when the
    /// last fetch started less than `min_refresh_interval` ago.
    ///
    /// # Errors
    ///
    /// With no prior document:
    /// - `DiscoveryUnavailable` if the document cannot be fetched or lacks
    ///   an issuer or key set
    /// - `NoSigningKeys` if the key set contains no signing keys
    pub async fn resolve(&self) -> AuthResult<Arc<AuthorityMetadata>> {
        let stale = match self.current.load_full() {
            Some(metadata) if metadata.is_fresh(self.refresh_interval) => {
                debug!(authority = %self.authority, "Using cached authority metadata");
                return Ok(metadata);
            }
            stale => stale,
        };

        let mut last_fetch = match self.last_fetch.try_lock() {
            Ok(guard) => guard,
            Err(_) => match stale {
                Some(stale) => {
                    debug!(
                        authority = %self.authority,
                        "Metadata refresh in flight, serving previous document"
                    );
                    return Ok(stale);
                }
                None => self.last_fetch.lock().await,
            },
        };

        if let Some(current) = self.current.load_full() {
            if current.is_fresh(self.refresh_interval) {
                return Ok(current);
            }
            if self.fetched_recently(*last_fetch) {
                debug!(
                    authority = %self.authority,
                    "Metadata refresh rate limited, serving previous document"
                );
                return Ok(current);
            }
        }

        *last_fetch = Some(Instant::now());
        match self.fetch_and_store().await {
            Ok(metadata) => Ok(metadata),
            Err(e) => match self.current.load_full() {
                Some(stale) => {
                    warn!(
                        authority = %self.authority,
                        age_secs = stale.age().as_secs(),
                        error = %e,
                        "Metadata refresh failed, serving previous document"
                    );
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }

    /// Fetch the document now, ignoring the cache.
    ///
    /// Used for the single forced refresh after a key lookup miss. Unlike
    /// [`resolve`](Self::resolve), a failure is returned even if an older
    /// document exists; the older document stays cached.
    ///
    /// No fetch happens when the last one started less than
    /// `min_refresh_interval` ago, or when another caller replaced the
    /// document while this one waited; the cached document is returned.
    ///
    /// # Errors
    ///
    /// Same conditions as [`resolve`](Self::resolve).
    pub async fn refresh(&self) -> AuthResult<Arc<AuthorityMetadata>> {
        let seen = self.current.load_full();
        self.refresh_from(seen.as_ref()).await
    }

    /// Forced refresh of a document the caller found lacking
    pub(crate) async fn refresh_from(
        &self,
        seen: Option<&Arc<AuthorityMetadata>>,
    ) -> AuthResult<Arc<AuthorityMetadata>> {
        let mut last_fetch = self.last_fetch.lock().await;

        if let Some(current) = self.current.load_full() {
            if seen.is_none_or(|seen| !Arc::ptr_eq(seen, &current)) {
                debug!(
                    authority = %self.authority,
                    "Metadata replaced while waiting, skipping forced refresh"
                );
                return Ok(current);
            }
            if self.fetched_recently(*last_fetch) {
                warn!(
                    authority = %self.authority,
                    min_interval_ms = self.min_refresh_interval.as_millis(),
                    "Forced metadata refresh rate limited, using cached document"
                );
                return Ok(current);
            }
        }

        *last_fetch = Some(Instant::now());
        self.fetch_and_store().await
    }

    fn fetched_recently(&self, last_fetch: Option<Instant>) -> bool {
        last_fetch.is_some_and(|at| at.elapsed() < self.min_refresh_interval)
    }

    async fn fetch_and_store(&self) -> AuthResult<Arc<AuthorityMetadata>> {
        let metadata = Arc::new(self.fetch().await?);
        self.current.store(Some(Arc::clone(&metadata)));
        Ok(metadata)
    }

    async fn fetch(&self) -> AuthResult<AuthorityMetadata> {
        info!(
            authority = %self.authority,
            url = %self.discovery_url,
            "Fetching discovery document"
        );

        let document: DiscoveryDocument = self
            .fetcher
            .get_json(&self.discovery_url)
            .await
            .map_err(|e| {
                error!(url = %self.discovery_url, error = %e, "Discovery fetch failed");
                AuthError::discovery_unavailable(format!("{}: {e}", self.discovery_url))
            })?;

        let issuer = document
            .issuer
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                AuthError::discovery_unavailable("discovery document has no issuer")
            })?;

        let introspection_endpoint = match document.validation_endpoint() {
            Some(raw) => Some(Url::parse(raw).map_err(|e| {
                AuthError::discovery_unavailable(format!("invalid introspection endpoint: {e}"))
            })?),
            None => None,
        };

        let (jwks, jwks_uri) = match (&document.jwks, &document.jwks_uri) {
            (Some(inline), _) => (inline.clone(), None),
            (None, Some(raw)) => {
                let uri = Url::parse(raw).map_err(|e| {
                    AuthError::discovery_unavailable(format!("invalid jwks_uri: {e}"))
                })?;
                (self.fetch_jwks(&uri).await?, Some(uri))
            }
            (None, None) => {
                return Err(AuthError::discovery_unavailable(
                    "discovery document has neither jwks_uri nor jwks",
                ));
            }
        };

        let signing_keys = jwks.signing_keys();
        if signing_keys.is_empty() {
            warn!(authority = %self.authority, "Authority published no usable signing keys");
            return Err(AuthError::no_signing_keys(format!(
                "{} published no usable signing keys",
                self.authority
            )));
        }

        info!(
            authority = %self.authority,
            issuer = %issuer,
            keys = signing_keys.len(),
            introspection = introspection_endpoint.is_some(),
            "Authority metadata refreshed"
        );

        Ok(AuthorityMetadata {
            issuer,
            signing_keys,
            introspection_endpoint,
            jwks_uri,
            fetched_at: SystemTime::now(),
        })
    }

    async fn fetch_jwks(&self, uri: &Url) -> AuthResult<JwksDocument> {
        ensure_secure(uri)
            .map_err(|e| AuthError::discovery_unavailable(e.to_string()))?;

        debug!(jwks_uri = %uri, "Fetching JWKS");
        self.fetcher.get_json(uri).await.map_err(|e| {
            error!(jwks_uri = %uri, error = %e, "JWKS fetch failed");
            AuthError::discovery_unavailable(format!("{uri}: {e}"))
        })
    }
}
