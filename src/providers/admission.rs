//! Bounded-concurrency admission gate for the resource-constrained backend.
//!
//! [`AdmissionSemaphore`] allows at most `max_concurrent` operations to run
//! at once. Further callers wait in arrival order (tokio's semaphore is
//! fair) and are resumed one by one as slots free. Slots are RAII permits,
//! so a failing, panicking or cancelled operation still releases its slot
//! and wakes the next waiter. A caller dropped while queued leaves the
//! queue without disturbing the order of the others.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Semaphore, SemaphorePermit};

use super::traits::Transport;
use crate::telemetry;
use crate::types::{BackendKind, Completion, GenerationInput};
use crate::{GatewayError, Result};

/// Default number of concurrent local-backend calls.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// FIFO bounded-concurrency gate.
pub struct AdmissionSemaphore {
    semaphore: Semaphore,
    max_concurrent: usize,
    queued: AtomicUsize,
}

/// Held slot. Releasing it refreshes the in-flight gauge, including when
/// the operation is cancelled mid-call.
struct Slot<'a> {
    gate: &'a AdmissionSemaphore,
    permit: Option<SemaphorePermit<'a>>,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        drop(self.permit.take());
        self.gate.report_in_flight();
    }
}

/// Decrements the queued counter however the wait ends.
struct QueuedGuard<'a>(&'a AtomicUsize);

impl Drop for QueuedGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AdmissionSemaphore {
    /// Create a gate admitting `max_concurrent` operations (at least one).
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Semaphore::new(max_concurrent),
            max_concurrent,
            queued: AtomicUsize::new(0),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Operations currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.semaphore.available_permits()
    }

    /// Callers waiting for a slot.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Run `f` once a slot is available, releasing the slot when it finishes.
    pub async fn run<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let permit = {
            self.queued.fetch_add(1, Ordering::SeqCst);
            let _queued = QueuedGuard(&self.queued);
            self.semaphore
                .acquire()
                .await
                .map_err(|_| GatewayError::Unknown("admission gate closed".into()))?
        };
        let _slot = Slot {
            gate: self,
            permit: Some(permit),
        };
        self.report_in_flight();

        f().await
    }

    fn report_in_flight(&self) {
        metrics::gauge!(telemetry::ADMISSION_IN_FLIGHT).set(self.in_flight() as f64);
    }
}

impl Default for AdmissionSemaphore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT)
    }
}

/// Decorator that runs every call of a [`Transport`] through an [`AdmissionSemaphore`].
///
/// Wrapping a [`RetryingTransport`](super::RetryingTransport) holds the slot
/// for the whole retry sequence, backoff delays included.
pub struct AdmittedTransport {
    inner: Arc<dyn Transport>,
    gate: Arc<AdmissionSemaphore>,
}

impl AdmittedTransport {
    pub fn new(inner: Arc<dyn Transport>, gate: Arc<AdmissionSemaphore>) -> Self {
        Self { inner, gate }
    }
}

#[async_trait]
impl Transport for AdmittedTransport {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn backend(&self) -> BackendKind {
        self.inner.backend()
    }

    fn timeout(&self) -> Option<std::time::Duration> {
        self.inner.timeout()
    }

    fn is_retryable(&self, err: &GatewayError) -> bool {
        self.inner.is_retryable(err)
    }

    async fn call(&self, input: &GenerationInput) -> Result<Completion> {
        self.gate.run(|| self.inner.call(input)).await
    }

    async fn probe(&self) -> Result<()> {
        self.inner.probe().await
    }
}
