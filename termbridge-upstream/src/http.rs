//! Retrying HTTP client for upstream GET calls.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use termbridge_core::{
    redact_api_key, ConfigError, RetryConfig, TermBridgeError, TermBridgeResult, UpstreamConfig,
    UpstreamError,
};
use termbridge_storage::ResponseFetcher;
use tracing::{debug, warn};

/// Outcome of a single attempt.
enum AttemptError {
    /// Worth retrying: connection failures, 5xx, 429.
    Retryable(TermBridgeError),
    /// Final: 403, 404, other 4xx.
    Fatal(TermBridgeError),
}

/// Upstream HTTP client.
///
/// 403 and 404 are surfaced as typed errors without retry. Transport
/// failures and 5xx/429 responses are retried with exponential backoff.
pub struct UpstreamHttp {
    client: Client,
    retry: RetryConfig,
}

impl UpstreamHttp {
    pub fn new(config: &UpstreamConfig) -> TermBridgeResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "upstream".to_string(),
                value: config.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            retry: config.retry.clone(),
        })
    }

    /// Build with an existing client, mainly for tests.
    pub fn with_client(client: Client, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    /// GET `url`, returning the body or `None` when the body is empty.
    pub async fn get(&self, url: &str) -> TermBridgeResult<Option<String>> {
        let mut attempt = 0u32;
        loop {
            match self.attempt(url).await {
                Ok(body) => return Ok(body),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Retryable(e)) if attempt < self.retry.max_retries => {
                    attempt += 1;
                    let wait = self.retry.backoff_for(attempt);
                    warn!(
                        url = %redact_api_key(url),
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "Upstream call failed, retrying"
                    );
                    if wait > Duration::ZERO {
                        tokio::time::sleep(wait).await;
                    }
                }
                Err(AttemptError::Retryable(e)) => return Err(e),
            }
        }
    }

    async fn attempt(&self, url: &str) -> Result<Option<String>, AttemptError> {
        let redacted = redact_api_key(url);
        let transport = |reason: String| -> TermBridgeError {
            UpstreamError::Transport {
                url: redacted.clone(),
                reason,
            }
            .into()
        };

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| AttemptError::Retryable(transport(format!("HTTP request failed: {e}"))))?;

        let status = response.status();
        debug!(url = %redacted, status = status.as_u16(), "Upstream response");

        match status {
            s if s.is_success() => {
                let body = response.text().await.map_err(|e| {
                    AttemptError::Retryable(transport(format!("Failed to read body: {e}")))
                })?;
                Ok(if body.trim().is_empty() { None } else { Some(body) })
            }
            StatusCode::FORBIDDEN => Err(AttemptError::Fatal(
                UpstreamError::PrivateResource {
                    url: redacted.clone(),
                }
                .into(),
            )),
            StatusCode::NOT_FOUND => Err(AttemptError::Fatal(
                UpstreamError::NotFound {
                    url: redacted.clone(),
                }
                .into(),
            )),
            s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => Err(
                AttemptError::Retryable(transport(format!("upstream returned {s}"))),
            ),
            s => Err(AttemptError::Fatal(transport(format!("upstream returned {s}")))),
        }
    }
}

#[async_trait]
impl ResponseFetcher for UpstreamHttp {
    async fn fetch(&self, url: &str) -> TermBridgeResult<Option<String>> {
        self.get(url).await
    }
}

impl std::fmt::Debug for UpstreamHttp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamHttp")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
