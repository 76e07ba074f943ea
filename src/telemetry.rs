//! Telemetry metric name constants.
//!
//! Centralised metric names for gateway operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `portunus_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `backend`: "cloud" or "local"
//! - `method`: "text", "image" or "chat"
//! - `status`: "ok" or the error code
//! - `direction`: token direction, "input" or "output"

/// Total requests routed through the gateway.
///
/// Labels: `backend`, `method`, `status`.
pub const REQUESTS_TOTAL: &str = "portunus_requests_total";

/// End-to-end request duration in seconds, fallback included.
///
/// Labels: `backend`, `method`.
pub const REQUEST_DURATION_SECONDS: &str = "portunus_request_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `backend`, `method`.
pub const RETRIES_TOTAL: &str = "portunus_retries_total";

/// Total tokens consumed.
///
/// Labels: `backend`, `direction`.
pub const TOKENS_TOTAL: &str = "portunus_tokens_total";

/// Response cache hits.
///
/// Labels: `backend`, `method`.
pub const CACHE_HITS_TOTAL: &str = "portunus_cache_hits_total";

/// Response cache misses.
///
/// Labels: `backend`, `method`.
pub const CACHE_MISSES_TOTAL: &str = "portunus_cache_misses_total";

/// Requests served by the alternate backend after the primary failed.
///
/// Labels: `from`, `to`.
pub const FALLBACKS_TOTAL: &str = "portunus_fallbacks_total";

/// Requests rejected by the per-user rate limiter.
pub const RATE_LIMITED_TOTAL: &str = "portunus_rate_limited_total";

/// Local-backend calls currently holding an admission slot.
pub const ADMISSION_IN_FLIGHT: &str = "portunus_admission_in_flight";
