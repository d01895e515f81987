//! Outbound HTTP shared by discovery and introspection
//!
//! One `reqwest::Client` per authenticator, with the configured timeout, no
//! redirect following, and a hard cap on response body size.

use serde::de::DeserializeOwned;
use thiserror::Error;
use url::{Host, Url};

use crate::config::ValidationConfig;
use crate::error::{AuthError, AuthResult};

const USER_AGENT: &str = concat!("tokenguard/", env!("CARGO_PKG_VERSION"));
const BODY_EXCERPT_LEN: usize = 200;

/// Transport-level failure, mapped onto an [`AuthError`] kind by the caller
#[derive(Debug, Error)]
pub(crate) enum FetchError {
    /// URL is not https and not loopback
    #[error("refusing non-https URL {0}")]
    InsecureUrl(String),

    /// Connection, timeout or body read failure
    #[error("request failed: {0}")]
    Request(String),

    /// Non-2xx status
    #[error("HTTP {status}{}", body_excerpt(.body))]
    Status {
        status: http::StatusCode,
        body: Vec<u8>,
    },

    /// Body exceeded `max_response_size`
    #[error("response exceeds {limit} bytes")]
    TooLarge { limit: usize },

    /// Body was not the expected JSON
    #[error("invalid JSON: {0}")]
    Json(String),
}

/// Thin wrapper over `reqwest::Client` enforcing the transport guards
#[derive(Debug, Clone)]
pub(crate) struct HttpFetcher {
    client: reqwest::Client,
    max_response_size: usize,
}

impl HttpFetcher {
    pub(crate) fn new(config: &ValidationConfig) -> AuthResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::configuration(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_response_size: config.max_response_size,
        })
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// GET `url` and decode a JSON body
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, FetchError> {
        ensure_secure(url)?;

        let response = self
            .client
            .get(url.clone())
            .header(http::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let (status, body) = self.read_body(response).await?;
        if !status.is_success() {
            return Err(FetchError::Status { status, body });
        }

        serde_json::from_slice(&body).map_err(|e| FetchError::Json(e.to_string()))
    }

    /// Read a response body under the size cap, returning the status alongside
    pub(crate) async fn read_body(
        &self,
        response: reqwest::Response,
    ) -> Result<(http::StatusCode, Vec<u8>), FetchError> {
        let status = response.status();

        if let Some(content_length) = response.content_length()
            && content_length > self.max_response_size as u64
        {
            return Err(FetchError::TooLarge {
                limit: self.max_response_size,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Request(format!("failed to read response: {e}")))?;

        if body.len() > self.max_response_size {
            return Err(FetchError::TooLarge {
                limit: self.max_response_size,
            });
        }

        Ok((status, body.to_vec()))
    }
}

/// `": <first bytes of body>"`, or nothing for an empty body
fn body_excerpt(body: &[u8]) -> String {
    let end = body.len().min(BODY_EXCERPT_LEN);
    let text = String::from_utf8_lossy(&body[..end]);
    let text = text.trim();
    if text.is_empty() {
        String::new()
    } else {
        format!(": {text}")
    }
}

/// Require https unless the host is loopback
pub(crate) fn ensure_secure(url: &Url) -> Result<(), FetchError> {
    match url.scheme() {
        "https" => Ok(()),
        "http" if is_loopback(url) => Ok(()),
        _ => Err(FetchError::InsecureUrl(url.to_string())),
    }
}

pub(crate) fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}
