use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::warn;

use evoforge_core::config::RetryConfig;
use evoforge_core::error::{ForgeError, Result};
use evoforge_core::traits::ModelClient;
use evoforge_core::types::{ModelRequest, ModelResponse};

/// A model client that retries transient failures with exponential backoff.
pub struct RetryingClient {
    inner: Arc<dyn ModelClient>,
    config: RetryConfig,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn ModelClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

/// Timeouts, provider rate limits, and transient server or connection
/// failures are worth another attempt. Everything else surfaces at once.
pub fn is_retryable(e: &ForgeError) -> bool {
    match e {
        ForgeError::ModelTimeout(_) | ForgeError::RateLimited(_) => true,
        ForgeError::ModelRequest(msg) => {
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        _ => false,
    }
}

/// `min(initial * 2^attempt, max)` scaled by a 0.8x to 1.2x jitter.
pub fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let base = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    let ms = base.min(config.max_backoff_ms);
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl ModelClient for RetryingClient {
    fn complete(&self, request: ModelRequest) -> BoxFuture<'_, Result<ModelResponse>> {
        Box::pin(async move {
            let max_retries = self.config.max_retries;
            let timeout = Duration::from_secs(self.config.request_timeout_secs);

            let mut attempt = 0;
            loop {
                let result = match tokio::time::timeout(timeout, self.inner.complete(request.clone())).await {
                    Ok(result) => result,
                    Err(_) => Err(ForgeError::ModelTimeout(self.config.request_timeout_secs)),
                };
                match result {
                    Ok(response) => return Ok(response),
                    Err(e) if is_retryable(&e) && attempt < max_retries => {
                        let backoff = calculate_backoff(attempt, &self.config);
                        warn!(
                            attempt = attempt + 1,
                            max_retries,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Retrying model request"
                        );
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        })
    }
}
