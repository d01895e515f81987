//! Remote validation via the authority's introspection endpoint
//!
//! Handles both RFC 7662 introspection (`POST`, `{"active": ...}`) and the
//! older IdentityServer access token validation endpoint (`GET ?token=`,
//! claims at the top level or under `claims`).

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};
use url::Url;

use super::{TokenValidator, ValidationResult, ValidationSource};
use crate::claims::{Claim, Claims};
use crate::config::{EndpointMethod, ValidationConfig};
use crate::discovery::{AuthorityMetadata, DiscoveryResolver};
use crate::error::{AuthError, AuthResult};
use crate::transport::{FetchError, HttpFetcher, ensure_secure};

/// Fields that describe the introspection outcome rather than the token
const OUTCOME_FIELDS: &[&str] = &["active", "valid"];

/// Validates tokens by asking the authority
pub struct RemoteValidator {
    resolver: Arc<DiscoveryResolver>,
    fetcher: HttpFetcher,
    client_id: Option<String>,
    client_secret: Option<SecretString>,
    method: EndpointMethod,
}

// Manual Debug impl to keep the client secret out of logs
impl std::fmt::Debug for RemoteValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteValidator")
            .field("authority", &self.resolver.authority().as_str())
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("method", &self.method)
            .finish()
    }
}

impl RemoteValidator {
    /// Create a remote validator sharing the given resolver
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` if the HTTP client cannot be built.
    pub fn new(resolver: Arc<DiscoveryResolver>, config: &ValidationConfig) -> AuthResult<Self> {
        Ok(Self::with_fetcher(resolver, config, HttpFetcher::new(config)?))
    }

    pub(crate) fn with_fetcher(
        resolver: Arc<DiscoveryResolver>,
        config: &ValidationConfig,
        fetcher: HttpFetcher,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            method: config.endpoint_method,
        }
    }

    /// Send the token to the introspection endpoint named in `metadata`.
    ///
    /// # Errors
    ///
    /// - `TokenInactive` if the endpoint reports the token inactive/invalid
    /// - `EndpointUnavailable` on transport failure, timeout, an oversized
    ///   body, or a non-2xx answer that does not parse as an inactive result;
    ///   also when the authority publishes no introspection endpoint
    pub async fn validate_with_metadata(
        &self,
        token: &str,
        metadata: &AuthorityMetadata,
    ) -> AuthResult<ValidationResult> {
        let endpoint = metadata.introspection_endpoint.as_ref().ok_or_else(|| {
            AuthError::endpoint_unavailable("authority publishes no introspection endpoint")
        })?;

        ensure_secure(endpoint).map_err(|e| AuthError::endpoint_unavailable(e.to_string()))?;

        let (status, body) = self.send(endpoint, token).await.map_err(|e| {
            error!(endpoint = %endpoint, error = %e, "Introspection request failed");
            AuthError::endpoint_unavailable(format!("{endpoint}: {e}"))
        })?;

        let parsed = serde_json::from_slice::<Value>(&body).ok();

        if !status.is_success() {
            return match parsed.as_ref().and_then(Value::as_object).and_then(outcome) {
                Some(false) => {
                    warn!(endpoint = %endpoint, status = %status, "Token reported inactive");
                    Err(AuthError::token_inactive(format!(
                        "introspection endpoint answered {status} for an inactive token"
                    )))
                }
                _ => {
                    error!(endpoint = %endpoint, status = %status, "Introspection endpoint error");
                    Err(AuthError::endpoint_unavailable(format!(
                        "{endpoint}: HTTP {status}"
                    )))
                }
            };
        }

        let Some(Value::Object(object)) = parsed else {
            error!(endpoint = %endpoint, "Introspection response is not a JSON object");
            return Err(AuthError::endpoint_unavailable(format!(
                "{endpoint}: response is not a JSON object"
            )));
        };

        // Legacy validation endpoints answer 200 with bare claims and no flag
        if outcome(&object) == Some(false) {
            warn!(endpoint = %endpoint, "Token reported inactive");
            return Err(AuthError::token_inactive(
                "introspection endpoint reported the token inactive",
            ));
        }

        let claims = claims_from_response(object);
        debug!(
            endpoint = %endpoint,
            subject = ?claims.subject(),
            claims = claims.len(),
            "Introspection successful"
        );

        Ok(ValidationResult::new(claims, ValidationSource::Remote))
    }

    async fn send(
        &self,
        endpoint: &Url,
        token: &str,
    ) -> Result<(http::StatusCode, Vec<u8>), FetchError> {
        let request = match self.method {
            EndpointMethod::Post => {
                let mut form: Vec<(&str, &str)> =
                    vec![("token", token), ("token_type_hint", "access_token")];
                if let Some(client_id) = &self.client_id {
                    form.push(("client_id", client_id.as_str()));
                }
                if let Some(secret) = &self.client_secret {
                    form.push(("client_secret", secret.expose_secret()));
                }
                self.fetcher.client().post(endpoint.clone()).form(&form)
            }
            EndpointMethod::Get => {
                let mut url = endpoint.clone();
                url.query_pairs_mut().append_pair("token", token);
                self.fetcher.client().get(url)
            }
        };

        let response = request
            .header(http::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FetchError::Request(e.without_url().to_string()))?;

        self.fetcher.read_body(response).await
    }
}

#[async_trait]
impl TokenValidator for RemoteValidator {
    async fn validate(&self, token: &str) -> AuthResult<ValidationResult> {
        let metadata = self.resolver.resolve().await?;
        self.validate_with_metadata(token, &metadata).await
    }

    fn source(&self) -> ValidationSource {
        ValidationSource::Remote
    }
}

/// `active` (RFC 7662) or `valid` flag, when present
fn outcome(object: &Map<String, Value>) -> Option<bool> {
    OUTCOME_FIELDS
        .iter()
        .find_map(|field| object.get(*field).and_then(Value::as_bool))
}

/// Claims live under `claims` when present, otherwise at the top level
fn claims_from_response(mut object: Map<String, Value>) -> Claims {
    match object.remove("claims") {
        Some(Value::Object(claims)) => Claims::from_json(&claims),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let name = item.get("type").and_then(Value::as_str)?;
                let value = item.get("value").and_then(Value::as_str)?;
                Some(Claim::new(name, value))
            })
            .collect(),
        Some(other) => {
            object.insert("claims".to_string(), other);
            top_level_claims(&object)
        }
        None => top_level_claims(&object),
    }
}

fn top_level_claims(object: &Map<String, Value>) -> Claims {
    let filtered: Map<String, Value> = object
        .iter()
        .filter(|(k, _)| !OUTCOME_FIELDS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Claims::from_json(&filtered)
}
