//! Gateway orchestrator: backend selection, fallback and aggregate stats.
//!
//! The [`Gateway`] owns one [`BackendClient`] per configured backend. A
//! request goes to the configured primary; when the primary is the local
//! backend and its failure is fallback-eligible (unreachable, timed out or
//! overloaded after exhausting retries), the same input is re-issued to the
//! cloud backend and the result is flagged `used_fallback`. A cloud primary
//! never falls back. When every attempt fails the last classified error is
//! returned unchanged.

mod builder;
pub mod stats;

use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{instrument, warn};

pub use builder::GatewayBuilder;
pub use stats::{AdmissionStats, BackendStats, GatewayStats, LatencySummary};

use crate::ledger::{UsageLedger, UsageLogEntry};
use crate::providers::BackendClient;
use crate::telemetry;
use crate::types::{BackendKind, GenerationInput, GenerationRequest, GenerationResult};
use crate::{GatewayError, Result};
use stats::GatewayCounters;

/// Routes generation requests across the cloud and local backends.
pub struct Gateway {
    primary: BackendKind,
    fallback_enabled: bool,
    cloud: Option<BackendClient>,
    local: Option<BackendClient>,
    ledger: Arc<UsageLedger>,
    counters: GatewayCounters,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("primary", &self.primary)
            .field("fallback_enabled", &self.fallback_enabled)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Create a builder with default configuration and no backends.
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    pub fn primary(&self) -> BackendKind {
        self.primary
    }

    /// Whether a failed primary may be retried on the alternate backend.
    pub fn fallback_enabled(&self) -> bool {
        self.fallback_enabled
    }

    pub fn client(&self, backend: BackendKind) -> Option<&BackendClient> {
        match backend {
            BackendKind::Cloud => self.cloud.as_ref(),
            BackendKind::Local => self.local.as_ref(),
        }
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    /// Route a request issued by an authenticated caller.
    pub async fn route_request(&self, request: GenerationRequest) -> Result<GenerationResult> {
        self.route(request.user_id, request.input).await
    }

    /// Generate a response for `input` on behalf of `user_id`.
    ///
    /// `elapsed_ms` on the result covers the whole call, fallback included.
    #[instrument(
        name = "gateway.route",
        skip(self, input),
        fields(method = %input.method(), primary = %self.primary)
    )]
    pub async fn route(&self, user_id: u64, input: GenerationInput) -> Result<GenerationResult> {
        let start = Instant::now();
        let method = input.method();
        self.counters.record_request();

        let outcome = self.dispatch(user_id, input).await;
        let elapsed = start.elapsed();

        match outcome {
            Ok(mut result) => {
                result.elapsed_ms = elapsed.as_millis() as u64;
                metrics::counter!(telemetry::REQUESTS_TOTAL,
                    "backend" => result.backend.as_str(),
                    "method" => method.as_str(),
                    "status" => "ok",
                )
                .increment(1);
                metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
                    "backend" => result.backend.as_str(),
                    "method" => method.as_str(),
                )
                .record(elapsed.as_secs_f64());
                Ok(result)
            }
            Err(err) => {
                self.counters.record_failure();
                let backend = err.backend().unwrap_or(self.primary);
                metrics::counter!(telemetry::REQUESTS_TOTAL,
                    "backend" => backend.as_str(),
                    "method" => method.as_str(),
                    "status" => err.code(),
                )
                .increment(1);
                Err(err)
            }
        }
    }

    async fn dispatch(&self, user_id: u64, input: GenerationInput) -> Result<GenerationResult> {
        let primary = self.client(self.primary).ok_or_else(|| {
            GatewayError::Configuration(format!("{} backend is not configured", self.primary))
        })?;
        let alternate = if self.fallback_enabled {
            self.client(self.primary.alternate())
        } else {
            None
        };
        // keep a copy only when a second attempt is possible
        let retained = alternate.map(|_| input.clone());

        let err = match self.attempt(primary, input, user_id).await {
            Ok(result) => return Ok(result),
            Err(err) => err,
        };

        let (Some(alternate), Some(input)) = (alternate, retained) else {
            return Err(err);
        };
        if !err.is_fallback_eligible() {
            return Err(err);
        }

        warn!(
            from = primary.backend().as_str(),
            to = alternate.backend().as_str(),
            code = err.code(),
            error = %err,
            "primary backend failed, falling back"
        );
        self.counters.record_fallback();
        metrics::counter!(telemetry::FALLBACKS_TOTAL,
            "from" => primary.backend().as_str(),
            "to" => alternate.backend().as_str(),
        )
        .increment(1);

        let mut result = self.attempt(alternate, input, user_id).await?;
        result.used_fallback = true;
        Ok(result)
    }

    async fn attempt(
        &self,
        client: &BackendClient,
        input: GenerationInput,
        user_id: u64,
    ) -> Result<GenerationResult> {
        let start = Instant::now();
        let outcome = client.generate(input, user_id).await;
        let cached = outcome.as_ref().is_ok_and(|r| r.cached);
        self.counters
            .record_backend(client.backend(), start.elapsed(), outcome.is_ok(), cached);
        outcome
    }

    /// Snapshot of counters, latency, cache, admission and usage totals.
    pub fn stats(&self) -> GatewayStats {
        let (total_requests, failures, fallbacks) = self.counters.totals();
        let backend_stats = |kind: BackendKind| {
            let client = self.client(kind);
            self.counters.backend_stats(
                kind,
                client.is_some(),
                client.map_or(0, |c| c.cache().len()),
            )
        };
        GatewayStats {
            primary: self.primary,
            fallback_enabled: self.fallback_enabled,
            total_requests,
            failures,
            fallbacks,
            cloud: backend_stats(BackendKind::Cloud),
            local: backend_stats(BackendKind::Local),
            admission: self
                .local
                .as_ref()
                .and_then(BackendClient::admission)
                .map(|gate| AdmissionStats {
                    max_concurrent: gate.max_concurrent(),
                    in_flight: gate.in_flight(),
                    queued: gate.queued(),
                }),
            usage: self.ledger.summary(),
        }
    }

    /// Drop every cached response on both backends. Returns how many were dropped.
    pub fn clear_cache(&self) -> usize {
        [&self.cloud, &self.local]
            .into_iter()
            .flatten()
            .map(|client| client.cache().clear())
            .sum()
    }

    /// The caller's most recent usage entries, newest first.
    pub fn recent_usage(&self, user_id: u64, limit: usize) -> Vec<UsageLogEntry> {
        self.ledger.recent_for_user(user_id, limit)
    }

    /// Probe every configured backend concurrently.
    pub async fn health(&self) -> HealthReport {
        let (cloud, local) = tokio::join!(
            probe(self.cloud.as_ref()),
            probe(self.local.as_ref())
        );
        let primary_ok = match self.primary {
            BackendKind::Cloud => cloud.reachable,
            BackendKind::Local => local.reachable,
        };
        HealthReport {
            status: if primary_ok { "ok" } else { "degraded" },
            primary: self.primary,
            version: crate::version::version_string(),
            cloud,
            local,
        }
    }
}

async fn probe(client: Option<&BackendClient>) -> BackendHealth {
    let Some(client) = client else {
        return BackendHealth::default();
    };
    match client.probe().await {
        Ok(()) => BackendHealth {
            configured: true,
            reachable: true,
            error: None,
        },
        Err(err) => BackendHealth {
            configured: true,
            reachable: false,
            error: Some(err.code()),
        },
    }
}

/// Reachability of the backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// `"ok"` when the primary backend answered its probe.
    pub status: &'static str,
    pub primary: BackendKind,
    pub version: String,
    pub cloud: BackendHealth,
    pub local: BackendHealth,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "ok"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackendHealth {
    pub configured: bool,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}
