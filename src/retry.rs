//! Timeout and retry policy for calls to external providers.
//!
//! Every embedding, completion, and object-storage call runs through a
//! [`CallPolicy`]:
//!
//! - The call is bounded by `timeout`. Expiry yields
//!   [`RagError::ProviderTimeout`] and is never retried.
//! - Transient failures ([`RagError::is_transient`]: network errors,
//!   HTTP 429, HTTP 5xx, unavailable stores) are retried up to
//!   `max_retries` times after `retry_backoff`, doubling per attempt.
//! - Everything else is returned immediately.

use std::future::Future;
use std::time::Duration;

use docrag_core::{RagError, RagResult};

use crate::config::{CompletionConfig, EmbeddingConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 1,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl CallPolicy {
    pub fn new(timeout: Duration, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            timeout,
            max_retries,
            retry_backoff,
        }
    }

    pub fn for_embedding(config: &EmbeddingConfig) -> Self {
        Self::new(
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
            Duration::from_millis(config.retry_backoff_ms),
        )
    }

    pub fn for_completion(config: &CompletionConfig) -> Self {
        Self::new(
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
            Duration::from_millis(config.retry_backoff_ms),
        )
    }

    /// Run `call` under this policy. `operation` names the call in errors and logs.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> RagResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RagResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match tokio::time::timeout(self.timeout, call()).await {
                Err(_) => {
                    tracing::warn!(operation, timeout_ms = self.timeout.as_millis() as u64, "call timed out");
                    return Err(RagError::ProviderTimeout {
                        operation: operation.to_string(),
                        timeout: self.timeout,
                    });
                }
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.retry_backoff * (1u32 << attempt.min(5));
                    tracing::warn!(operation, attempt, error = %e, "transient failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Ok(Err(e)) => return Err(e),
            }
        }
    }
}

/// Classify a non-success HTTP response from a provider.
///
/// 429 and 5xx are transient; other statuses are permanent.
pub fn status_error(provider: &str, status: reqwest::StatusCode, body: &str) -> RagError {
    let message = format!("{} API error {}: {}", provider, status, body);
    if status.as_u16() == 429 || status.is_server_error() {
        RagError::transient(message)
    } else {
        RagError::permanent(message)
    }
}

/// Classify a transport-level error. Connection problems are transient;
/// malformed payloads are not.
pub fn request_error(provider: &str, err: reqwest::Error) -> RagError {
    let message = format!("{} request failed: {}", provider, err);
    if err.is_decode() || err.is_builder() {
        RagError::permanent(message)
    } else {
        RagError::transient(message)
    }
}
