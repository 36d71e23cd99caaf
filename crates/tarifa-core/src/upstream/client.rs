//! HTTP client for the pricing oracle.
//!
//! The oracle is slow and rate-limited, so the client bounds its own
//! concurrency with a semaphore and retries 5xx answers a small, fixed
//! number of times with backoff. Anything beyond that is the circuit
//! breaker's job.

use crate::{types::PricedRate, upstream::UpstreamError};
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio::sync::Semaphore;

const MAX_RETRIES: u32 = 2;
const BODY_SNIPPET_LIMIT: usize = 256;

/// Connection settings for the pricing oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Endpoint receiving pricing queries. Must start with `http`.
    #[serde(default)]
    pub url: String,

    /// Bearer token attached to every request.
    #[serde(default)]
    pub api_token: String,

    /// Per-request timeout in seconds. Defaults to `10`.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Maximum concurrent in-flight requests. Defaults to `64`.
    #[serde(default = "default_concurrent_limit")]
    pub concurrent_limit: usize,
}

fn default_request_timeout_seconds() -> u64 {
    10
}

fn default_concurrent_limit() -> usize {
    64
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_token: String::new(),
            request_timeout_seconds: default_request_timeout_seconds(),
            concurrent_limit: default_concurrent_limit(),
        }
    }
}

/// Pricing oracle client with semaphore-based concurrency control.
pub struct OracleClient {
    client: Client,
    config: OracleConfig,
    concurrent_limit: Arc<Semaphore>,
}

impl OracleClient {
    /// Creates a client from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client fails to build.
    pub fn new(config: OracleConfig) -> Result<Self, UpstreamError> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .use_rustls_tls()
            .user_agent(concat!("tarifa/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build oracle http client");
                UpstreamError::Connection(format!("http client build failed: {e}"))
            })?;

        let concurrent_limit = Arc::new(Semaphore::new(config.concurrent_limit));
        Ok(Self { client, config, concurrent_limit })
    }

    /// Sends one pricing query and decodes the answer.
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::ConcurrencyLimit`] when no permit is available in time
    /// - [`UpstreamError::Timeout`] when the request exceeds its budget
    /// - [`UpstreamError::Http`] for non-success statuses after retries
    /// - [`UpstreamError::InvalidResponse`] when the body does not decode
    pub async fn fetch_rates(&self, attrs: &Value) -> Result<Vec<PricedRate>, UpstreamError> {
        let _permit = tokio::time::timeout(
            Duration::from_millis(500),
            Arc::clone(&self.concurrent_limit).acquire_owned(),
        )
        .await
        .map_err(|_| {
            tracing::warn!(
                available_permits = self.concurrent_limit.available_permits(),
                "oracle client permit acquisition timed out"
            );
            UpstreamError::ConcurrencyLimit
        })?
        .map_err(|_| UpstreamError::ConcurrencyLimit)?;

        let mut retries = 0;
        loop {
            let result = self
                .client
                .post(&self.config.url)
                .bearer_auth(&self.config.api_token)
                .json(attrs)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    return response.json::<Vec<PricedRate>>().await.map_err(|e| {
                        UpstreamError::InvalidResponse(format!("body decode failed: {e}"))
                    });
                }
                Ok(response) => {
                    let status = response.status();
                    if status.is_server_error() && retries < MAX_RETRIES {
                        retries += 1;
                        tokio::time::sleep(Duration::from_millis(100 * (1 << retries))).await;
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    let snippet = if body.len() > BODY_SNIPPET_LIMIT {
                        format!("{}... (truncated)", &body[..BODY_SNIPPET_LIMIT])
                    } else {
                        body
                    };
                    return Err(UpstreamError::Http(status.as_u16(), snippet));
                }
                Err(_) if retries < MAX_RETRIES => {
                    retries += 1;
                    tokio::time::sleep(Duration::from_millis(100 * (1 << retries))).await;
                }
                Err(e) if e.is_timeout() => return Err(UpstreamError::Timeout),
                Err(e) => return Err(UpstreamError::Connection(sanitize_network_error(&e))),
            }
        }
    }
}

/// Collapses transport errors into fixed phrases so upstream internals
/// never leak into logs or client-visible messages.
fn sanitize_network_error(error: &reqwest::Error) -> String {
    if error.is_connect() {
        "connection refused or unreachable".to_string()
    } else if error.is_request() {
        "request failed".to_string()
    } else if error.is_body() || error.is_decode() {
        "response body error".to_string()
    } else {
        "network error".to_string()
    }
}
