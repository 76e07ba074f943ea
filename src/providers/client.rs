//! Generic backend client: sanitize → cache → admitted, retried call → cache → ledger.
//!
//! Both the cloud and the local backend are a `BackendClient` around a
//! different [`Transport`]. The client owns the backend's response cache;
//! the usage ledger is shared across clients.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::debug;

use super::admission::{AdmissionSemaphore, AdmittedTransport};
use super::retry::{RetryConfig, RetryingTransport};
use super::sanitize::{estimate_tokens, sanitize};
use super::traits::Transport;
use crate::cache::{ResponseCache, cache_key};
use crate::ledger::{UsageLedger, UsageLogEntry};
use crate::telemetry;
use crate::types::{BackendKind, GenerationInput, GenerationResult, TokenCounts};
use crate::Result;

/// A generation backend with caching, retry, optional admission control and
/// usage logging layered over its raw transport.
pub struct BackendClient {
    backend: BackendKind,
    name: String,
    transport: Arc<dyn Transport>,
    cache: Arc<ResponseCache>,
    ledger: Arc<UsageLedger>,
    admission: Option<Arc<AdmissionSemaphore>>,
}

impl BackendClient {
    /// Wrap a raw transport with the retry policy.
    pub fn new(
        raw: Arc<dyn Transport>,
        retry: RetryConfig,
        cache: Arc<ResponseCache>,
        ledger: Arc<UsageLedger>,
    ) -> Self {
        let backend = raw.backend();
        let name = raw.name().to_string();
        Self {
            backend,
            name,
            transport: Arc::new(RetryingTransport::new(raw, retry)),
            cache,
            ledger,
            admission: None,
        }
    }

    /// Run every network call (including its retries) through an admission gate.
    pub fn with_admission(mut self, gate: Arc<AdmissionSemaphore>) -> Self {
        self.transport = Arc::new(AdmittedTransport::new(self.transport, gate.clone()));
        self.admission = Some(gate);
        self
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn admission(&self) -> Option<&AdmissionSemaphore> {
        self.admission.as_deref()
    }

    /// Generate a response for `input` on behalf of `user_id`.
    ///
    /// Cache hits return immediately (still logged to the ledger with the
    /// stored token counts). Misses go through admission and retry, then
    /// populate the cache and the ledger.
    pub async fn generate(&self, input: GenerationInput, user_id: u64) -> Result<GenerationResult> {
        let start = Instant::now();
        let method = input.method();
        let input = sanitize(input)?;
        let key = cache_key(&input);

        if let Some(entry) = self.cache.get(&key) {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL,
                "backend" => self.backend.as_str(),
                "method" => method.as_str(),
            )
            .increment(1);
            debug!(backend = self.backend.as_str(), method = method.as_str(), user_id, "cache hit");
            self.ledger.record(UsageLogEntry::now(
                user_id,
                method,
                entry.tokens,
                true,
                self.backend,
            ));
            return Ok(GenerationResult {
                text: entry.response,
                cached: true,
                backend: self.backend,
                used_fallback: false,
                elapsed_ms: start.elapsed().as_millis() as u64,
                tokens: entry.tokens,
            });
        }
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL,
            "backend" => self.backend.as_str(),
            "method" => method.as_str(),
        )
        .increment(1);

        let completion = self.transport.call(&input).await?;
        let tokens = completion.tokens.unwrap_or_else(|| {
            TokenCounts::new(
                estimate_tokens(input.text_chars()),
                estimate_tokens(completion.text.chars().count()),
            )
        });

        self.cache.insert(key, completion.text.clone(), tokens);
        self.ledger.record(UsageLogEntry::now(
            user_id,
            method,
            tokens,
            false,
            self.backend,
        ));
        record_token_usage(self.backend, tokens);

        Ok(GenerationResult {
            text: completion.text,
            cached: false,
            backend: self.backend,
            used_fallback: false,
            elapsed_ms: start.elapsed().as_millis() as u64,
            tokens,
        })
    }

    /// Reachability probe of the underlying backend.
    pub async fn probe(&self) -> Result<()> {
        self.transport.probe().await
    }
}

fn record_token_usage(backend: BackendKind, tokens: TokenCounts) {
    metrics::counter!(telemetry::TOKENS_TOTAL,
        "backend" => backend.as_str(),
        "direction" => "input",
    )
    .increment(u64::from(tokens.input));
    metrics::counter!(telemetry::TOKENS_TOTAL,
        "backend" => backend.as_str(),
        "direction" => "output",
    )
    .increment(u64::from(tokens.output));
}
