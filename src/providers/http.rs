//! HTTP helpers shared by the cloud and local transports.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response};

use crate::types::BackendKind;
use crate::{GatewayError, Result};

/// Longest error body excerpt kept for logs.
const MAX_DETAIL_CHARS: usize = 200;

/// Build a reqwest client with a connect timeout.
///
/// The overall per-call deadline is enforced by the transport layer, not
/// by reqwest, so it applies uniformly to mocked transports as well.
pub(crate) fn build_client(connect_timeout: Duration) -> Result<Client> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| GatewayError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Classify a reqwest transport failure (no HTTP status available).
pub(crate) fn transport_error(
    backend: BackendKind,
    timeout: Duration,
    err: reqwest::Error,
) -> GatewayError {
    if err.is_timeout() {
        GatewayError::ProviderTimeout { backend, timeout }
    } else if err.is_decode() || err.is_body() {
        GatewayError::Unknown(format!("{backend} response could not be read: {err}"))
    } else {
        GatewayError::ProviderUnreachable {
            backend,
            detail: err.to_string(),
        }
    }
}

/// Parse a `Retry-After` header given in seconds.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Read an error body, truncated for logging.
pub(crate) async fn error_detail(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    body.chars().take(MAX_DETAIL_CHARS).collect()
}
