//! Retry wrapper: re-issues a request on transient failures.
//!
//! Each attempt runs under its own timeout. Only errors for which
//! [`ProviderError::is_transient`] holds are retried; anything else is
//! returned immediately.

use async_trait::async_trait;
use citycode_core::error::ProviderError;
use citycode_core::provider::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct RetryProvider {
    inner: Arc<dyn Provider>,
    max_retries: u32,
    attempt_timeout: Duration,
    backoff: Duration,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn Provider>, max_retries: u32, attempt_timeout: Duration) -> Self {
        Self {
            inner,
            max_retries,
            attempt_timeout,
            backoff: Duration::from_millis(500),
        }
    }

    /// Base delay between attempts; doubles after each failure.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn run<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let provider_name = self.inner.name().to_string();
        let mut delay = self.backoff;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match tokio::time::timeout(self.attempt_timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => ProviderError::Timeout(format!(
                    "Provider '{}' timed out after {}s",
                    provider_name,
                    self.attempt_timeout.as_secs()
                )),
            };

            if !error.is_transient() || attempt > self.max_retries {
                return Err(error);
            }

            warn!(
                provider = %provider_name,
                attempt,
                max_retries = self.max_retries,
                error = %error,
                "{what} failed, retrying"
            );
            let wait = match &error {
                ProviderError::RateLimited { retry_after_secs } => {
                    delay.max(Duration::from_secs(*retry_after_secs))
                }
                _ => delay,
            };
            tokio::time::sleep(wait).await;
            delay *= 2;
            info!(provider = %provider_name, attempt = attempt + 1, "Retrying {what}");
        }
    }
}

#[async_trait]
impl Provider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        self.run("completion", || self.inner.complete(request.clone()))
            .await
    }

    async fn complete_structured(
        &self,
        request: ProviderRequest,
        schema: &StructuredSchema,
    ) -> std::result::Result<serde_json::Value, ProviderError> {
        self.run("structured completion", || {
            self.inner.complete_structured(request.clone(), schema)
        })
        .await
    }
}
