use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use portunus::providers::retry::{RetryConfig, RetryingTransport, with_retry};
use portunus::providers::traits::Transport;
use portunus::{BackendKind, Completion, GatewayError, GenerationInput, GenerationMethod, Result};
use tokio::time::Instant;

/// Mock transport that fails N times then succeeds.
struct FailThenSucceed {
    fail_count: AtomicU32,
    fail_with: fn() -> GatewayError,
    total_calls: AtomicU32,
}

impl FailThenSucceed {
    fn new(failures: u32, fail_with: fn() -> GatewayError) -> Self {
        Self {
            fail_count: AtomicU32::new(failures),
            fail_with,
            total_calls: AtomicU32::new(0),
        }
    }

    fn call_count(&self) -> u32 {
        self.total_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for FailThenSucceed {
    fn name(&self) -> &str {
        "mock-retry"
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn call(&self, _input: &GenerationInput) -> Result<Completion> {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        let remaining = self.fail_count.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_count.fetch_sub(1, Ordering::Relaxed);
            return Err((self.fail_with)());
        }
        Ok(Completion::new("ok"))
    }
}

/// Mock transport that never answers within its deadline.
struct Hangs {
    total_calls: AtomicU32,
}

#[async_trait]
impl Transport for Hangs {
    fn name(&self) -> &str {
        "mock-hang"
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Local
    }

    fn timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(30))
    }

    async fn call(&self, _input: &GenerationInput) -> Result<Completion> {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Completion::new("too late"))
    }
}

fn unreachable() -> GatewayError {
    GatewayError::ProviderUnreachable {
        backend: BackendKind::Local,
        detail: "connection refused".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn retries_on_transient_error_then_succeeds() {
    let inner = Arc::new(FailThenSucceed::new(2, unreachable));
    let transport = RetryingTransport::new(inner.clone(), RetryConfig::default());

    let start = Instant::now();
    let completion = transport.call(&GenerationInput::text("hi")).await.unwrap();

    assert_eq!(completion.text, "ok");
    assert_eq!(inner.call_count(), 3);
    // 1s + 2s of backoff
    assert!(start.elapsed() >= Duration::from_secs(3));
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_attempts_with_last_error() {
    let inner = Arc::new(FailThenSucceed::new(10, || GatewayError::ProviderOverloaded {
        backend: BackendKind::Local,
        detail: "out of memory".into(),
    }));
    let transport = RetryingTransport::new(inner.clone(), RetryConfig::default());

    let err = transport.call(&GenerationInput::text("hi")).await.unwrap_err();

    assert!(matches!(err, GatewayError::ProviderOverloaded { .. }));
    assert_eq!(inner.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn non_retryable_error_is_not_retried() {
    let inner = Arc::new(FailThenSucceed::new(1, || {
        GatewayError::InvalidInput("bad prompt".into())
    }));
    let transport = RetryingTransport::new(inner.clone(), RetryConfig::default());

    let start = Instant::now();
    let err = transport.call(&GenerationInput::text("hi")).await.unwrap_err();

    assert!(matches!(err, GatewayError::InvalidInput(_)));
    assert_eq!(inner.call_count(), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn upstream_retry_after_hint_is_honoured() {
    let inner = Arc::new(FailThenSucceed::new(1, || GatewayError::UpstreamRateLimited {
        retry_after: Some(Duration::from_millis(300)),
    }));
    let transport = RetryingTransport::new(inner.clone(), RetryConfig::default());

    let start = Instant::now();
    transport.call(&GenerationInput::text("hi")).await.unwrap();

    assert_eq!(inner.call_count(), 2);
    assert!(start.elapsed() >= Duration::from_millis(300));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn hung_call_times_out_per_attempt() {
    let inner = Arc::new(Hangs {
        total_calls: AtomicU32::new(0),
    });
    let transport = RetryingTransport::new(inner.clone(), RetryConfig::default());

    let start = Instant::now();
    let err = transport.call(&GenerationInput::text("hi")).await.unwrap_err();

    assert!(matches!(
        err,
        GatewayError::ProviderTimeout { backend: BackendKind::Local, timeout } if timeout == Duration::from_secs(30)
    ));
    assert_eq!(inner.total_calls.load(Ordering::Relaxed), 3);
    // three 30s deadlines plus 1s + 2s backoff
    assert!(start.elapsed() >= Duration::from_secs(93));
}

#[tokio::test(start_paused = true)]
async fn disabled_retry_makes_single_attempt() {
    let inner = Arc::new(FailThenSucceed::new(1, unreachable));
    let transport = RetryingTransport::new(inner.clone(), RetryConfig::disabled());

    assert!(transport.call(&GenerationInput::text("hi")).await.is_err());
    assert_eq!(inner.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn with_retry_wraps_arbitrary_operations() {
    let attempts = AtomicU32::new(0);
    let counter = &attempts;
    let result = with_retry(
        &RetryConfig::default(),
        BackendKind::Cloud,
        GenerationMethod::Chat,
        || async move {
            if counter.fetch_add(1, Ordering::Relaxed) == 0 {
                Err(GatewayError::ProviderTimeout {
                    backend: BackendKind::Cloud,
                    timeout: Duration::from_secs(60),
                })
            } else {
                Ok(7)
            }
        },
    )
    .await;

    assert_eq!(result.unwrap(), 7);
    assert_eq!(attempts.load(Ordering::Relaxed), 2);
}
