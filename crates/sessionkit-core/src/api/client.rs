//! HTTP gateway for the authentication API.
//!
//! `ApiClient` attaches the bearer credential to outgoing requests and
//! recovers from credential expiry: a 401 triggers one coalesced refresh,
//! after which the request is reissued exactly once.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info, warn};
use url::Url;

use super::refresh::{release, RefreshFailure, RefreshState, RefreshTrigger};
use super::ApiError;
use crate::auth::TokenStore;
use crate::events::{Listeners, Subscription};
use crate::models::{AuthTokens, RefreshPayload, RefreshRequest};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in milliseconds, unless configured otherwise.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Credential renewal endpoint
pub const REFRESH_PATH: &str = "/auth/refresh";

// ============================================================================
// Request options
// ============================================================================

/// Per-request behaviour switches.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Send without the bearer credential
    pub skip_auth: bool,
    /// Surface a 401 as-is instead of refreshing and retrying
    pub skip_refresh: bool,
    /// Override the client's default timeout
    pub timeout: Option<Duration>,
    pub headers: HeaderMap,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    pub fn skip_refresh(mut self) -> Self {
        self.skip_refresh = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// A caller-supplied `Authorization` header is never replaced, so a
    /// 401 on it is final.
    fn recovers_from_unauthorized(&self) -> bool {
        !self.skip_auth && !self.skip_refresh && !self.headers.contains_key(AUTHORIZATION)
    }
}

// ============================================================================
// Client
// ============================================================================

struct ClientInner {
    http: Client,
    base_url: String,
    timeout: Duration,
    tokens: Arc<TokenStore>,
    refresh: Mutex<RefreshState>,
    auth_failure: Listeners<()>,
    token_refreshed: Listeners<()>,
}

/// Gateway to the authentication API.
/// Clone is cheap - all clones share the connection pool, cookie jar and
/// refresh coordinator.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

pub struct ApiClientBuilder {
    base_url: String,
    timeout: Duration,
    https_only: bool,
}

impl ApiClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Refuse plain-HTTP transport (production deployments)
    pub fn https_only(mut self, https_only: bool) -> Self {
        self.https_only = https_only;
        self
    }

    pub fn build(self, tokens: Arc<TokenStore>) -> Result<ApiClient, ApiError> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| ApiError::InvalidRequest(format!("Invalid base URL {}: {}", self.base_url, e)))?;
        if self.https_only && url.scheme() != "https" {
            return Err(ApiError::InsecureTransport(self.base_url));
        }

        let http = Client::builder()
            .timeout(self.timeout)
            .cookie_store(true)
            .https_only(self.https_only)
            .build()
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to build HTTP client: {}", e)))?;

        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                http,
                base_url: self.base_url.trim_end_matches('/').to_string(),
                timeout: self.timeout,
                tokens,
                refresh: Mutex::new(RefreshState::default()),
                auth_failure: Listeners::new(),
                token_refreshed: Listeners::new(),
            }),
        })
    }
}

impl ApiClient {
    /// Create a client with the default timeout
    pub fn new(base_url: impl Into<String>, tokens: Arc<TokenStore>) -> Result<Self, ApiError> {
        Self::builder(base_url).build(tokens)
    }

    pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder {
            base_url: base_url.into(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            https_only: false,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.inner.tokens
    }

    /// Whether a credential refresh is currently running
    pub fn is_refreshing(&self) -> bool {
        self.inner.refresh.lock().in_flight()
    }

    /// Called once per failed refresh cycle that was started by a rejected
    /// request. Credentials are already cleared when it fires.
    pub fn on_auth_failure<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.auth_failure.subscribe(move |_| callback())
    }

    /// Called after every successful refresh, before waiters are released.
    pub fn on_token_refreshed<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.token_refreshed.subscribe(move |_| callback())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    // ========================================================================
    // Requests
    // ========================================================================

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::GET, path, None::<&()>, RequestOptions::default())
            .await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::POST, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PUT, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PATCH, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::DELETE, path, None::<&()>, RequestOptions::default())
            .await
    }

    /// Send a JSON request and decode the JSON response.
    ///
    /// An empty success body decodes as `null`, so `()` and `Option<T>`
    /// work for endpoints that return nothing.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.url(path);
        let body = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to encode request body: {}", e)))?;

        let token = if options.skip_auth || options.headers.contains_key(AUTHORIZATION) {
            None
        } else {
            self.inner.tokens.access_token()
        };

        debug!(%method, path, "Sending request");
        let response = self
            .send(&method, &url, body.as_deref(), &options, token.as_deref())
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED || !options.recovers_from_unauthorized() {
            return Self::read_response(path, response).await;
        }

        // A refresh may have landed while this request was on the wire
        let fresh = match self.inner.tokens.access_token() {
            Some(current) if token.as_deref().is_some_and(|sent| sent != current) => {
                debug!(path, "Credential changed in flight, retrying");
                current
            }
            _ => {
                debug!(path, "Unauthorized, waiting for credential refresh");
                self.refresh_access_token(RefreshTrigger::Request)
                    .await
                    .map_err(|e| {
                        debug!(path, error = %e, "Refresh failed, giving up on request");
                        ApiError::Unauthorized
                    })?
            }
        };

        let retry = self
            .send(&method, &url, body.as_deref(), &options, Some(&fresh))
            .await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            warn!(path, "Request still unauthorized after refresh");
            return Err(ApiError::Unauthorized);
        }
        Self::read_response(path, retry).await
    }

    async fn send(
        &self,
        method: &Method,
        url: &str,
        body: Option<&[u8]>,
        options: &RequestOptions,
        token: Option<&str>,
    ) -> Result<Response, ApiError> {
        let mut builder = self
            .inner
            .http
            .request(method.clone(), url)
            .headers(options.headers.clone())
            .timeout(options.timeout.unwrap_or(self.inner.timeout));
        if let Some(body) = body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_vec());
        }

        let mut request = builder
            .build()
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidRequest("Credential is not a valid header value".to_string()))?;
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        self.inner
            .http
            .execute(request)
            .await
            .map_err(ApiError::from_transport)
    }

    /// Check response status and decode the body
    async fn read_response<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, ApiError> {
        let status = response.status();

        if status.is_success() {
            let text = response.text().await.map_err(ApiError::from_transport)?;
            let text = if text.trim().is_empty() { "null" } else { text.as_str() };
            return serde_json::from_str(text).map_err(|e| {
                ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", path, e))
            });
        }

        let body = response.text().await.unwrap_or_default();
        match status.as_u16() {
            403 => warn!(path, "Access forbidden"),
            500..=599 => error!(path, status = status.as_u16(), "Server error"),
            _ => debug!(path, status = status.as_u16(), "Request failed"),
        }
        Err(ApiError::from_status(status, &body))
    }

    // ========================================================================
    // Credential refresh
    // ========================================================================

    /// Obtain a fresh access token, joining a refresh already in flight.
    ///
    /// The network call runs in its own task, so a caller that gives up
    /// waiting never leaves the coordinator stuck.
    pub async fn refresh_access_token(&self, trigger: RefreshTrigger) -> Result<String, RefreshFailure> {
        let (rx, start) = self.inner.refresh.lock().join(trigger);
        if start {
            let client = self.clone();
            tokio::spawn(async move { client.run_refresh().await });
        } else {
            debug!("Joining in-flight credential refresh");
        }
        rx.await.unwrap_or(Err(RefreshFailure::Abandoned))
    }

    async fn run_refresh(&self) {
        let tokens = &self.inner.tokens;
        let generation = tokens.generation();
        info!("Refreshing access token");

        // Store before finishing so a 401 arriving now retries with the new
        // credential instead of starting another refresh
        let result = self.call_refresh_endpoint().await.map(|issued| {
            tokens
                .set_tokens_if_current(generation, &issued)
                .then_some(issued.access_token)
        });
        let (waiters, escalate) = self.inner.refresh.lock().finish();

        let outcome = match result {
            Ok(Some(token)) => {
                info!(waiters = waiters.len(), "Access token refreshed");
                self.inner.token_refreshed.emit(&());
                Ok(token)
            }
            // Logged out or logged in again meanwhile; whatever is stored
            // now wins over this result
            Ok(None) => Self::superseded(tokens),
            Err(e) => {
                warn!(error = %e, waiters = waiters.len(), "Credential refresh failed");
                if !escalate {
                    Err(e)
                } else if tokens.clear_if_current(generation) {
                    self.inner.auth_failure.emit(&());
                    Err(e)
                } else {
                    Self::superseded(tokens)
                }
            }
        };
        release(waiters, &outcome);
    }

    fn superseded(tokens: &TokenStore) -> Result<String, RefreshFailure> {
        debug!("Refresh superseded by a newer session change");
        tokens.access_token().ok_or(RefreshFailure::Superseded)
    }

    async fn call_refresh_endpoint(&self) -> Result<AuthTokens, RefreshFailure> {
        let mut builder = self
            .inner
            .http
            .post(self.url(REFRESH_PATH))
            .timeout(self.inner.timeout);

        // Without a stored refresh token the cookie jar carries the session
        if let Some(refresh_token) = self.inner.tokens.refresh_token() {
            builder = builder.json(&RefreshRequest {
                refresh_token: &refresh_token,
            });
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                RefreshFailure::Timeout
            } else {
                RefreshFailure::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshFailure::Rejected(status.as_u16()));
        }

        let payload: RefreshPayload = response
            .json()
            .await
            .map_err(|e| RefreshFailure::InvalidResponse(e.to_string()))?;
        Ok(payload.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_rejects_plain_http_when_https_only() {
        let tokens = Arc::new(TokenStore::in_memory());
        let result = ApiClient::builder("http://api.example.com")
            .https_only(true)
            .build(tokens.clone());
        assert!(matches!(result, Err(ApiError::InsecureTransport(_))));

        assert!(ApiClient::builder("https://api.example.com")
            .https_only(true)
            .build(tokens)
            .is_ok());
    }

    #[test]
    fn test_builder_rejects_invalid_url() {
        let result = ApiClient::new("not a url", Arc::new(TokenStore::in_memory()));
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
    }

    #[test]
    fn test_url_joining() {
        let client = ApiClient::new("http://localhost:3000/api/", Arc::new(TokenStore::in_memory())).unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000/api");
        assert_eq!(client.url("/auth/me"), "http://localhost:3000/api/auth/me");
    }

    #[test]
    fn test_request_options_recovery() {
        assert!(RequestOptions::new().recovers_from_unauthorized());
        assert!(!RequestOptions::new().skip_auth().recovers_from_unauthorized());
        assert!(!RequestOptions::new().skip_refresh().recovers_from_unauthorized());
        assert!(!RequestOptions::new()
            .header(AUTHORIZATION, HeaderValue::from_static("Basic YTpi"))
            .recovers_from_unauthorized());
    }
}
