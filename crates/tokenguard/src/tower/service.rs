//! Tower Service for bearer authentication

use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use http::{HeaderValue, Request, Response, header};
use tower_service::Service;
use tracing::debug;

use super::BearerAuthConfig;
use crate::bearer::bearer_token_from_headers;
use crate::challenge::BearerChallenge;
use crate::error::AuthError;
use crate::orchestrator::Authenticator;

/// Future returned by [`BearerAuthService`]
pub type BearerAuthFuture<T, E> = BoxFuture<'static, Result<T, E>>;

/// Tower Service that authenticates and authorizes HTTP requests
///
/// Extracts the bearer token, runs [`Authenticator::authorize`], inserts the
/// resulting [`GrantedIdentity`](crate::GrantedIdentity) into the request's
/// extensions and forwards to the inner service.
#[derive(Debug, Clone)]
pub struct BearerAuthService<S> {
    inner: S,
    authenticator: Arc<Authenticator>,
    config: BearerAuthConfig,
}

impl<S> BearerAuthService<S> {
    /// Create a new bearer auth service
    pub fn new(inner: S, authenticator: Arc<Authenticator>, config: BearerAuthConfig) -> Self {
        Self {
            inner,
            authenticator,
            config,
        }
    }

    /// Get a reference to the inner service
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Get a mutable reference to the inner service
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

impl<S, B, ResBody> Service<Request<B>> for BearerAuthService<S>
where
    S: Service<Request<B>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    B: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BearerAuthFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        // The clone is not ready; keep the polled service for this call
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if self.config.should_bypass(req.uri().path()) {
            debug!(path = %req.uri().path(), "Authentication bypassed");
            return Box::pin(async move { inner.call(req).await });
        }

        let authenticator = Arc::clone(&self.authenticator);
        let realm = self.config.realm.clone();
        let token = bearer_token_from_headers(req.headers()).map(str::to_owned);

        Box::pin(async move {
            let outcome = match token {
                Ok(token) => authenticator.authorize(&token).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(auth) => {
                    req.extensions_mut().insert(auth.identity);
                    inner.call(req).await
                }
                Err(e) => Ok(rejection(
                    &e,
                    authenticator.scope_requirement().scopes(),
                    realm.as_deref(),
                )),
            }
        })
    }
}

/// Empty-bodied response for a rejected request
fn rejection<ResBody: Default>(
    error: &AuthError,
    required_scopes: &[String],
    realm: Option<&str>,
) -> Response<ResBody> {
    let mut response = Response::new(ResBody::default());
    *response.status_mut() = error.status_code();

    if let Some(mut challenge) = BearerChallenge::for_error(error, required_scopes) {
        if let Some(realm) = realm {
            challenge = challenge.realm(realm);
        }
        if let Ok(value) = HeaderValue::from_str(&challenge.to_header_value()) {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
    }

    response
}
