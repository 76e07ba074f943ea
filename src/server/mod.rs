//! HTTP surface of the gateway.
//!
//! Routes:
//!
//! | Method | Path | |
//! |---|---|---|
//! | POST | `/ai/text` | `{ prompt }` |
//! | POST | `/ai/image` | `{ prompt, image (base64), mimeType? }` |
//! | POST | `/ai/chat` | `{ messages: [{ role, content }] }` |
//! | GET | `/ai/stats` | aggregated counters |
//! | POST | `/ai/cache/clear` | drop all cached responses |
//! | GET | `/ai/usage?limit=n` | caller's recent usage entries |
//! | GET | `/ai/health` | backend probes, no identity or rate limit |
//!
//! Every route except `/ai/health` passes through the admission-control
//! middleware, which requires an upstream-verified user id and applies the
//! per-user rate limit.

pub mod config;
mod error;
mod handlers;
pub mod identity;
mod middleware;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};

pub use error::ApiError;
pub use handlers::{ChatReply, DEFAULT_IMAGE_MIME};
pub use identity::{ForwardedIdentity, IdentityVerifier, UserId};
pub use middleware::{LIMIT_HEADER, REMAINING_HEADER, RESET_HEADER};

use crate::gateway::Gateway;
use crate::limiter::RateLimiter;

/// Default request body limit (16 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub limiter: Arc<RateLimiter>,
    pub identity: Arc<dyn IdentityVerifier>,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            gateway,
            limiter,
            identity: Arc::new(ForwardedIdentity::default()),
        }
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityVerifier>) -> Self {
        self.identity = identity;
        self
    }
}

/// Create the API router with all routes.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/ai/text", post(handlers::text))
        .route("/ai/image", post(handlers::image))
        .route("/ai/chat", post(handlers::chat))
        .route("/ai/stats", get(handlers::stats))
        .route("/ai/cache/clear", post(handlers::clear_cache))
        .route("/ai/usage", get(handlers::usage))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::admission_control,
        ))
        .route("/ai/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}
