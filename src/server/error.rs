//! HTTP error handling and response mapping.
//!
//! Each [`GatewayError`] kind maps to a fixed status and a generic message.
//! Provider error text never reaches the caller; it is logged instead.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{error, warn};

use crate::GatewayError;

/// Response wrapper for gateway errors.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            GatewayError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GatewayError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::ProviderTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::ProviderUnreachable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match &self.0 {
            GatewayError::Unauthenticated => "authentication required".to_string(),
            GatewayError::InvalidInput(msg) => msg.clone(),
            GatewayError::RateLimited { retry_after } => format!(
                "rate limit exceeded, retry in {} seconds",
                retry_after.as_secs()
            ),
            GatewayError::ProviderTimeout { .. } => {
                "the generation backend timed out".to_string()
            }
            GatewayError::ProviderUnreachable { .. } => {
                "the generation backend is unavailable".to_string()
            }
            _ => "generation failed".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.0.code(), error = %self.0, "request failed");
        } else if status != StatusCode::TOO_MANY_REQUESTS {
            warn!(code = self.0.code(), "request rejected");
        }

        let body = Json(json!({
            "error": {
                "code": self.0.code(),
                "message": self.message(),
            }
        }));
        let mut response = (status, body).into_response();

        if let GatewayError::RateLimited { retry_after } = &self.0 {
            if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}
