//! Portunus error types
//!
//! Errors are classified once, at the point of failure closest to the
//! network call. Upstream layers (retry, admission, orchestrator, HTTP
//! boundary) only query the classification through [`GatewayError::is_retryable`]
//! and [`GatewayError::is_fallback_eligible`]; they never re-map one kind
//! into another.

use std::time::Duration;

use crate::types::BackendKind;

/// Portunus error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    // Caller-facing admission errors
    #[error("authentication required")]
    Unauthenticated,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("rate limited, retry after {} seconds", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    // Provider/network errors
    #[error("{backend} provider unreachable: {detail}")]
    ProviderUnreachable { backend: BackendKind, detail: String },

    #[error("{backend} provider timed out after {timeout:?}")]
    ProviderTimeout {
        backend: BackendKind,
        timeout: Duration,
    },

    #[error("{backend} provider overloaded: {detail}")]
    ProviderOverloaded { backend: BackendKind, detail: String },

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("upstream rate limited, retry after {retry_after:?}")]
    UpstreamRateLimited { retry_after: Option<Duration> },

    #[error("upstream authentication failed")]
    UpstreamAuthFailure,

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unexpected failure: {0}")]
    Unknown(String),
}

impl GatewayError {
    /// Stable snake_case code used in logs, metrics labels and HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::InvalidInput(_) => "invalid_input",
            Self::RateLimited { .. } => "rate_limited",
            Self::ProviderUnreachable { .. } => "provider_unreachable",
            Self::ProviderTimeout { .. } => "provider_timeout",
            Self::ProviderOverloaded { .. } => "provider_overloaded",
            Self::ModelNotFound(_) => "model_not_found",
            Self::UpstreamRateLimited { .. } => "upstream_rate_limited",
            Self::UpstreamAuthFailure => "upstream_auth_failure",
            Self::Configuration(_) => "configuration",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Whether the retry policy may re-issue the call that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnreachable { .. }
                | Self::ProviderTimeout { .. }
                | Self::ProviderOverloaded { .. }
                | Self::UpstreamRateLimited { .. }
        )
    }

    /// Whether an exhausted failure of the primary backend may be re-attempted
    /// against the alternate backend.
    ///
    /// `UpstreamRateLimited` is retryable but only the cloud backend produces
    /// it, and the cloud backend has nothing further to fall back to.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnreachable { .. }
                | Self::ProviderTimeout { .. }
                | Self::ProviderOverloaded { .. }
        )
    }

    /// Provider hint for how long to wait before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            Self::UpstreamRateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Backend the failure is attributed to, when known.
    pub fn backend(&self) -> Option<BackendKind> {
        match self {
            Self::ProviderUnreachable { backend, .. }
            | Self::ProviderTimeout { backend, .. }
            | Self::ProviderOverloaded { backend, .. } => Some(*backend),
            Self::UpstreamRateLimited { .. } | Self::UpstreamAuthFailure => {
                Some(BackendKind::Cloud)
            }
            _ => None,
        }
    }
}

/// Result type alias for Portunus operations
pub type Result<T> = std::result::Result<T, GatewayError>;
