use reqwest::{Client, ClientBuilder};
use std::{sync::Arc, time::Duration};
use tokio::sync::Semaphore;

use crate::{
    backend::BackendError,
    types::{JsonRpcRequest, JsonRpcResponse},
};

/// Maximum number of body bytes kept in an [`BackendError::HttpError`].
const ERROR_BODY_EXCERPT: usize = 256;

/// Configuration for the shared backend HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Maximum number of backend calls in flight across all requests.
    pub concurrent_limit: usize,
    /// How long a call may wait for a free slot before failing.
    pub permit_timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            concurrent_limit: 1000,
            permit_timeout: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// HTTP client used for every SDK daemon call.
///
/// One instance is shared by all requests; it owns the connection pool and a semaphore that
/// bounds the number of concurrent backend calls. Calls are never retried here.
pub struct HttpClient {
    client: Client,
    concurrent_limit: Arc<Semaphore>,
    config: HttpClientConfig,
}

impl HttpClient {
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn new() -> Result<Self, BackendError> {
        Self::with_config(HttpClientConfig::default())
    }

    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn with_config(config: HttpClientConfig) -> Result<Self, BackendError> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(100)
            .connect_timeout(config.connect_timeout)
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("walletgate/", env!("CARGO_PKG_VERSION")))
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build http client");
                BackendError::ConnectionFailed(format!("HTTP client build failed: {e}"))
            })?;

        Ok(Self { client, concurrent_limit: Arc::new(Semaphore::new(config.concurrent_limit)), config })
    }

    /// Maps a transport error to a message that does not reveal the backend address.
    fn sanitize_network_error(error: &reqwest::Error) -> String {
        if error.is_connect() {
            "connection refused or unreachable".to_string()
        } else if error.is_request() {
            "request failed".to_string()
        } else if error.is_body() {
            "response body error".to_string()
        } else if error.is_decode() {
            "response decode error".to_string()
        } else {
            "network error".to_string()
        }
    }

    /// Posts a raw JSON body and returns the raw response body.
    ///
    /// # Errors
    ///
    /// - [`BackendError::ConcurrencyLimit`] if no slot frees up within the permit timeout
    /// - [`BackendError::Timeout`] if the call exceeds `timeout`
    /// - [`BackendError::HttpError`] for non-success HTTP status codes
    /// - [`BackendError::ConnectionFailed`] for other transport failures
    pub async fn send_request(
        &self,
        url: &str,
        body: bytes::Bytes,
        timeout: Duration,
    ) -> Result<bytes::Bytes, BackendError> {
        let _permit = tokio::time::timeout(
            self.config.permit_timeout,
            Arc::clone(&self.concurrent_limit).acquire_owned(),
        )
        .await
        .map_err(|_| {
            tracing::warn!(
                available_permits = self.concurrent_limit.available_permits(),
                "backend client slot acquisition timed out"
            );
            BackendError::ConcurrencyLimit
        })?
        .map_err(|_| BackendError::ConcurrencyLimit)?;

        let response = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .body(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout
                } else {
                    BackendError::ConnectionFailed(Self::sanitize_network_error(&e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let raw_text = response.text().await.unwrap_or_default();
            let excerpt: String = raw_text.chars().take(ERROR_BODY_EXCERPT).collect();
            tracing::trace!(status = status.as_u16(), "backend returned non-success status");
            return Err(BackendError::HttpError(status.as_u16(), excerpt));
        }

        response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout
            } else {
                BackendError::ConnectionFailed(Self::sanitize_network_error(&e))
            }
        })
    }

    /// Sends a JSON-RPC request and decodes the JSON-RPC response.
    ///
    /// A response carrying a JSON-RPC `error` is returned as `Ok`: it is the backend's answer
    /// and is passed through to the client untouched.
    ///
    /// # Errors
    ///
    /// Transport failures as in [`send_request`](Self::send_request), plus
    /// [`BackendError::InvalidResponse`] when the body is not a JSON-RPC response.
    pub async fn call(
        &self,
        url: &str,
        request: &JsonRpcRequest,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, BackendError> {
        let body = serde_json::to_vec(request)
            .map_err(|e| BackendError::InvalidRequest(format!("Failed to serialize request: {e}")))?;

        let response_bytes = self.send_request(url, bytes::Bytes::from(body), timeout).await?;

        let response: JsonRpcResponse = serde_json::from_slice(&response_bytes)
            .map_err(|e| BackendError::InvalidResponse(format!("Invalid JSON: {e}")))?;

        if response.result.is_none() && response.error.is_none() {
            return Err(BackendError::InvalidResponse(
                "response has neither result nor error".to_string(),
            ));
        }

        Ok(response)
    }

    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.concurrent_limit.available_permits()
    }
}
