//! Portunus - AI request gateway
//!
//! Routes text, image-analysis and chat generation requests to one of two
//! interchangeable backends (a metered cloud API and a self-hosted local
//! model server) and adds the reliability layer neither provides alone:
//! per-user rate limiting, response caching, bounded concurrency toward the
//! local backend, retry with backoff, automatic fallback and usage logging.
//!
//! # Example
//!
//! ```rust,no_run
//! use portunus::{GatewayBuilder, GatewayConfig, GenerationInput};
//!
//! #[tokio::main]
//! async fn main() -> portunus::Result<()> {
//!     let config = GatewayConfig::from_env()?;
//!     let gateway = GatewayBuilder::from_config(config)?.build()?;
//!
//!     let result = gateway
//!         .route(42, GenerationInput::text("Summarise the agenda for today."))
//!         .await?;
//!
//!     println!("{} (from {}, cached: {})", result.text, result.backend, result.cached);
//!     Ok(())
//! }
//! ```
//!
//! # HTTP service (requires `server` feature)
//!
//! [`server::router`] exposes the gateway under `/ai/*` with identity and
//! rate-limit middleware; `portunusd` serves it.

pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod limiter;
pub mod providers;
#[cfg(feature = "server")]
pub mod server;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use cache::{CacheConfig, ResponseCache};
pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use gateway::{Gateway, GatewayBuilder, GatewayStats, HealthReport};
pub use ledger::{UsageLedger, UsageLogEntry};
pub use limiter::{RateLimitConfig, RateLimitDecision, RateLimiter};
pub use providers::{AdmissionSemaphore, BackendClient, RetryConfig, Transport};
pub use types::{
    BackendKind, ChatMessage, Completion, GenerationInput, GenerationMethod, GenerationRequest,
    GenerationResult, Role, TokenCounts,
};
pub use version::{PKG_VERSION, version_string};
