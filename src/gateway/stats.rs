//! Running counters and latency tracking for the orchestrator.
//!
//! Counters are plain atomics. Latency keeps an EWMA (as a routing-style
//! smoothed estimate) plus a rolling window of recent samples for mean and
//! p95 reporting.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

use crate::ledger::LedgerSummary;
use crate::types::BackendKind;

/// Samples retained per backend for mean/p95.
pub const LATENCY_WINDOW: usize = 100;

/// Default EWMA smoothing factor.
const DEFAULT_ALPHA: f64 = 0.2;

/// Per-backend response-time tracker.
///
/// `alpha` controls how quickly the EWMA follows new observations; higher
/// is more responsive and noisier.
#[derive(Debug)]
pub struct LatencyTracker {
    alpha: f64,
    state: Mutex<LatencyState>,
}

#[derive(Debug, Default)]
struct LatencyState {
    ewma_ms: f64,
    count: u64,
    samples: VecDeque<u64>,
}

impl LatencyTracker {
    pub fn new(alpha: f64) -> Self {
        debug_assert!((0.0..=1.0).contains(&alpha), "alpha must be in [0.0, 1.0]");
        Self {
            alpha,
            state: Mutex::new(LatencyState::default()),
        }
    }

    pub fn record(&self, elapsed: Duration) {
        let ms = elapsed.as_millis() as u64;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.ewma_ms = if state.count == 0 {
            ms as f64
        } else {
            self.alpha * ms as f64 + (1.0 - self.alpha) * state.ewma_ms
        };
        state.count += 1;
        if state.samples.len() == LATENCY_WINDOW {
            state.samples.pop_front();
        }
        state.samples.push_back(ms);
    }

    pub fn summary(&self) -> LatencySummary {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.samples.is_empty() {
            return LatencySummary::default();
        }
        let mut sorted: Vec<u64> = state.samples.iter().copied().collect();
        sorted.sort_unstable();
        let sum: u64 = sorted.iter().sum();
        // nearest-rank percentile
        let rank = (sorted.len() * 95).div_ceil(100).max(1);
        LatencySummary {
            observations: state.count,
            samples: sorted.len(),
            mean_ms: sum as f64 / sorted.len() as f64,
            p95_ms: sorted[rank - 1],
            ewma_ms: state.ewma_ms,
        }
    }
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

/// Latency report for one backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencySummary {
    /// Observations since start.
    pub observations: u64,
    /// Samples in the rolling window.
    pub samples: usize,
    pub mean_ms: f64,
    pub p95_ms: u64,
    pub ewma_ms: f64,
}

#[derive(Debug, Default)]
struct BackendCounters {
    requests: AtomicU64,
    failures: AtomicU64,
    cache_hits: AtomicU64,
    latency: LatencyTracker,
}

/// Shared counters updated by every routed request.
#[derive(Debug, Default)]
pub struct GatewayCounters {
    total: AtomicU64,
    failures: AtomicU64,
    fallbacks: AtomicU64,
    cloud: BackendCounters,
    local: BackendCounters,
}

impl GatewayCounters {
    fn backend(&self, backend: BackendKind) -> &BackendCounters {
        match backend {
            BackendKind::Cloud => &self.cloud,
            BackendKind::Local => &self.local,
        }
    }

    pub(crate) fn record_request(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// One attempt against `backend`, successful or not.
    pub(crate) fn record_backend(&self, backend: BackendKind, elapsed: Duration, ok: bool, cached: bool) {
        let counters = self.backend(backend);
        counters.requests.fetch_add(1, Ordering::Relaxed);
        if ok {
            counters.latency.record(elapsed);
        } else {
            counters.failures.fetch_add(1, Ordering::Relaxed);
        }
        if cached {
            counters.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn backend_stats(
        &self,
        backend: BackendKind,
        configured: bool,
        cache_entries: usize,
    ) -> BackendStats {
        let counters = self.backend(backend);
        BackendStats {
            configured,
            requests: counters.requests.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
            cache_hits: counters.cache_hits.load(Ordering::Relaxed),
            cache_entries,
            latency: counters.latency.summary(),
        }
    }

    pub(crate) fn totals(&self) -> (u64, u64, u64) {
        (
            self.total.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed),
            self.fallbacks.load(Ordering::Relaxed),
        )
    }
}

/// Stats for one backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStats {
    pub configured: bool,
    pub requests: u64,
    pub failures: u64,
    pub cache_hits: u64,
    pub cache_entries: usize,
    pub latency: LatencySummary,
}

/// Admission gate occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionStats {
    pub max_concurrent: usize,
    pub in_flight: usize,
    pub queued: usize,
}

/// Snapshot returned by [`Gateway::stats`](super::Gateway::stats).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStats {
    pub primary: BackendKind,
    pub fallback_enabled: bool,
    pub total_requests: u64,
    pub failures: u64,
    pub fallbacks: u64,
    pub cloud: BackendStats,
    pub local: BackendStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admission: Option<AdmissionStats>,
    pub usage: LedgerSummary,
}
