//! Admission-control middleware: identity, then per-user rate limit.

use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::AppState;
use super::error::ApiError;
use super::identity::UserId;
use crate::GatewayError;
use crate::limiter::RateLimitDecision;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Reject unauthenticated callers, count the request against the caller's
/// window, and stamp quota headers on the response whether or not it was
/// admitted.
pub(crate) async fn admission_control(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(user_id) = state.identity.verify(req.headers()) else {
        return ApiError(GatewayError::Unauthenticated).into_response();
    };

    let decision = state.limiter.check(user_id);
    let mut response = if decision.allowed {
        req.extensions_mut().insert(UserId(user_id));
        next.run(req).await
    } else {
        ApiError(GatewayError::RateLimited {
            retry_after: Duration::from_secs(decision.reset_secs()),
        })
        .into_response()
    };
    apply_quota_headers(response.headers_mut(), &decision);
    response
}

fn apply_quota_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(decision.reset_secs()));
}
