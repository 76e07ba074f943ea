//! Retry configuration, delay calculation, and the retrying transport decorator.
//!
//! [`with_retry_if`] holds the retry loop; [`RetryingTransport`] applies it
//! to every call of a wrapped [`Transport`], using the transport's own error
//! classifier to decide what is worth another attempt.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::traits::{Transport, call_with_timeout};
use crate::telemetry;
use crate::types::{BackendKind, Completion, GenerationInput, GenerationMethod};
use crate::{GatewayError, Result};

/// Configuration for retry behaviour on retryable errors.
///
/// Uses exponential backoff: 1s, 2s, 4s, … capped at `max_delay`.
///
/// ```rust
/// # use portunus::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200));
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Delay before the first retry. Default: 1s.
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps exponential growth). Default: 30s.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    /// Set the delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay after the failure of a given attempt (0-indexed).
    ///
    /// `initial_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// Delay honouring a provider `retry_after` hint when one is present.
    ///
    /// The hint is still capped at `max_delay`.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after
            .map(|hint| hint.min(self.max_delay))
            .unwrap_or_else(|| self.delay_for_attempt(attempt))
    }
}

/// Execute an async operation with retry logic.
///
/// Errors for which `is_retryable` returns true are retried up to
/// `config.max_attempts` with exponential backoff; every failed attempt is
/// logged with its method, attempt number and error code. Errors that are
/// not retryable, and the failure of the final attempt, are returned as-is.
pub async fn with_retry_if<F, Fut, T, C>(
    config: &RetryConfig,
    backend: BackendKind,
    method: GenerationMethod,
    is_retryable: C,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
    C: Fn(&GatewayError) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        let err = match f().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };
        let retryable = is_retryable(&err);
        let last = attempt + 1 >= max_attempts;
        if !retryable || last {
            warn!(
                backend = backend.as_str(),
                method = method.as_str(),
                attempt = attempt + 1,
                max_attempts,
                code = err.code(),
                retryable,
                error = %err,
                "generation attempt failed, giving up"
            );
            return Err(err);
        }

        metrics::counter!(telemetry::RETRIES_TOTAL,
            "backend" => backend.as_str(),
            "method" => method.as_str(),
        )
        .increment(1);
        let delay = config.effective_delay(attempt, err.retry_after());
        warn!(
            backend = backend.as_str(),
            method = method.as_str(),
            attempt = attempt + 1,
            max_attempts,
            code = err.code(),
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "generation attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// [`with_retry_if`] using the default [`GatewayError::is_retryable`] classifier.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    backend: BackendKind,
    method: GenerationMethod,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_retry_if(config, backend, method, GatewayError::is_retryable, f).await
}

/// Decorator that wraps a [`Transport`] with retry logic.
///
/// Each attempt runs under the inner transport's timeout, so a hung call
/// surfaces as a retryable `ProviderTimeout` instead of stalling the loop.
/// The inner transport's classifier decides which failures are retried.
pub struct RetryingTransport {
    inner: Arc<dyn Transport>,
    config: RetryConfig,
}

impl RetryingTransport {
    /// Wrap a transport with retry logic.
    pub fn new(inner: Arc<dyn Transport>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl Transport for RetryingTransport {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn backend(&self) -> BackendKind {
        self.inner.backend()
    }

    fn is_retryable(&self, err: &GatewayError) -> bool {
        self.inner.is_retryable(err)
    }

    async fn call(&self, input: &GenerationInput) -> Result<Completion> {
        let inner = self.inner.as_ref();
        with_retry_if(
            &self.config,
            inner.backend(),
            input.method(),
            |e| inner.is_retryable(e),
            || call_with_timeout(inner, input),
        )
        .await
    }

    async fn probe(&self) -> Result<()> {
        self.inner.probe().await
    }
}
