//! The transport capability set shared by both backend clients.
//!
//! A [`Transport`] is the raw network call to one generation backend plus
//! the knowledge needed to run it safely: how its failures are classified
//! and how long a single call may take. Cross-cutting policies are layered
//! on top as decorators that themselves implement `Transport`:
//!
//! ```text
//! AdmittedTransport      (bounded concurrency, local backend only)
//!   └─ RetryingTransport (backoff on retryable errors)
//!        └─ CloudTransport | LocalTransport  (per-attempt timeout)
//! ```
//!
//! [`BackendClient`](super::BackendClient) sits above the chain and adds
//! sanitization, caching and usage logging.

use std::time::Duration;

use async_trait::async_trait;

use crate::types::{BackendKind, Completion, GenerationInput};
use crate::{GatewayError, Result};

/// Network call to a single generation backend.
///
/// Implementations classify their own failures into [`GatewayError`] at the
/// point of failure; callers above never re-classify.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    /// Which backend this transport reaches.
    fn backend(&self) -> BackendKind;

    /// Deadline for a single call. `None` means the call is not wrapped.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Classifier consulted by the retry policy.
    fn is_retryable(&self, err: &GatewayError) -> bool {
        err.is_retryable()
    }

    /// Perform one generation call with already-sanitized input.
    async fn call(&self, input: &GenerationInput) -> Result<Completion>;

    /// Cheap reachability check used by health reporting.
    async fn probe(&self) -> Result<()> {
        Ok(())
    }
}

/// Run one call under the transport's deadline.
///
/// Elapsing the deadline drops the in-flight call and yields a
/// `ProviderTimeout` for the transport's backend.
pub(crate) async fn call_with_timeout(
    transport: &dyn Transport,
    input: &GenerationInput,
) -> Result<Completion> {
    match transport.timeout() {
        Some(limit) => match tokio::time::timeout(limit, transport.call(input)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::ProviderTimeout {
                backend: transport.backend(),
                timeout: limit,
            }),
        },
        None => transport.call(input).await,
    }
}
