//! Route handlers for the `/ai/*` surface.

use axum::{
    Extension, Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AppState;
use super::error::ApiError;
use super::identity::UserId;
use crate::providers::sanitize::MAX_IMAGE_BYTES;
use crate::types::{ChatMessage, GenerationInput, GenerationResult};
use crate::GatewayError;

/// MIME type assumed when an image request does not name one.
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// Default and maximum page size for `/ai/usage`.
const DEFAULT_USAGE_LIMIT: usize = 50;
const MAX_USAGE_LIMIT: usize = 1_000;

type ApiResult<T> = std::result::Result<T, ApiError>;

fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| GatewayError::InvalidInput(rejection.body_text()).into())
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub prompt: String,
}

pub(crate) async fn text(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
    payload: std::result::Result<Json<TextRequest>, JsonRejection>,
) -> ApiResult<Json<GenerationResult>> {
    let request = body(payload)?;
    let result = state
        .gateway
        .route(user_id, GenerationInput::text(request.prompt))
        .await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    #[serde(default)]
    pub prompt: String,
    /// Base64 image bytes, optionally as a `data:` URL.
    pub image: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

pub(crate) async fn image(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
    payload: std::result::Result<Json<ImageRequest>, JsonRejection>,
) -> ApiResult<Json<GenerationResult>> {
    let request = body(payload)?;
    let (data_url_mime, encoded) = split_data_url(&request.image);
    let mime_type = request
        .mime_type
        .or(data_url_mime)
        .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string());

    // base64 expands by 4/3, so reject oversized payloads before decoding
    if encoded.len() / 4 * 3 > MAX_IMAGE_BYTES + 3 {
        return Err(GatewayError::InvalidInput("image exceeds 10 MiB".to_string()).into());
    }
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|_| GatewayError::InvalidInput("image is not valid base64".to_string()))?;

    let result = state
        .gateway
        .route(
            user_id,
            GenerationInput::image(request.prompt, bytes, mime_type),
        )
        .await?;
    Ok(Json(result))
}

/// Split `data:<mime>;base64,<payload>` into its parts.
fn split_data_url(raw: &str) -> (Option<String>, &str) {
    let Some(rest) = raw.strip_prefix("data:") else {
        return (None, raw);
    };
    match rest.split_once(',') {
        Some((meta, payload)) => {
            let mime = meta
                .split(';')
                .next()
                .filter(|m| !m.is_empty())
                .map(str::to_string);
            (mime, payload)
        }
        None => (None, raw),
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    #[serde(flatten)]
    pub result: GenerationResult,
    /// The submitted turns with the assistant reply appended.
    pub messages: Vec<ChatMessage>,
}

pub(crate) async fn chat(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<ChatReply>> {
    let request = body(payload)?;
    let mut messages = request.messages;
    let result = state
        .gateway
        .route(user_id, GenerationInput::chat(messages.clone()))
        .await?;
    messages.push(ChatMessage::assistant(result.text.clone()));
    Ok(Json(ChatReply { result, messages }))
}

pub(crate) async fn stats(State(state): State<AppState>) -> Response {
    let limiter = state.limiter.config();
    Json(json!({
        "gateway": state.gateway.stats(),
        "rateLimit": {
            "limit": limiter.max_requests,
            "windowSecs": limiter.window.as_secs(),
            "trackedUsers": state.limiter.tracked_users(),
        },
    }))
    .into_response()
}

pub(crate) async fn clear_cache(State(state): State<AppState>) -> Response {
    let cleared = state.gateway.clear_cache();
    Json(json!({ "cleared": cleared })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub limit: Option<usize>,
}

pub(crate) async fn usage(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
    query: std::result::Result<Query<UsageQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query
        .map_err(|rejection| GatewayError::InvalidInput(rejection.body_text()))?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_USAGE_LIMIT)
        .min(MAX_USAGE_LIMIT);
    let entries = state.gateway.recent_usage(user_id, limit);
    Ok(Json(json!({ "userId": user_id, "entries": entries })).into_response())
}

pub(crate) async fn health(State(state): State<AppState>) -> Response {
    let report = state.gateway.health().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}
