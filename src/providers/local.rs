//! Local backend transport: self-hosted model server.
//!
//! Talks to an Ollama-compatible server on the local network. Text and
//! image requests go to `/api/generate`; chat goes to `/api/chat`. Both use
//! non-streaming mode.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::http::{build_client, error_detail, transport_error};
use super::traits::Transport;
use crate::types::{BackendKind, ChatMessage, Completion, GenerationInput, TokenCounts};
use crate::{GatewayError, Result};

/// Default model server address
pub const DEFAULT_LOCAL_BASE_URL: &str = "http://localhost:11434";

/// Default model name
pub const DEFAULT_LOCAL_MODEL: &str = "llama3";

/// Default per-call deadline
pub const DEFAULT_LOCAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport for the self-hosted model server.
#[derive(Clone)]
pub struct LocalTransport {
    base_url: String,
    model: String,
    timeout: Duration,
    http: Client,
}

impl LocalTransport {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            timeout: DEFAULT_LOCAL_TIMEOUT,
            http: build_client(Duration::from_secs(5))?,
        })
    }

    /// Override the per-call deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(BackendKind::Local, self.timeout, e))?;

        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let detail = error_detail(response).await;
        Err(classify_status(status, &self.model, detail))
    }

    async fn generate(&self, prompt: &str, images: Option<Vec<String>>) -> Result<Completion> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            images,
            stream: false,
        };
        let response: GenerateResponse = self
            .post("/api/generate", &body)
            .await?
            .json()
            .await
            .map_err(|e| transport_error(BackendKind::Local, self.timeout, e))?;
        completion(response.response, response.counts)
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<Completion> {
        let body = ChatRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            stream: false,
        };
        let response: ChatResponse = self
            .post("/api/chat", &body)
            .await?
            .json()
            .await
            .map_err(|e| transport_error(BackendKind::Local, self.timeout, e))?;
        let text = response.message.map(|m| m.content).unwrap_or_default();
        completion(text, response.counts)
    }
}

fn completion(text: String, counts: EvalCounts) -> Result<Completion> {
    if text.trim().is_empty() {
        return Err(GatewayError::Unknown(
            "local model returned an empty response".to_string(),
        ));
    }
    let completion = Completion::new(text);
    Ok(match (counts.prompt_eval_count, counts.eval_count) {
        (Some(input), Some(output)) => completion.with_tokens(TokenCounts::new(input, output)),
        _ => completion,
    })
}

/// Map a non-success HTTP status from the model server onto the taxonomy.
///
/// The server reports out-of-memory and model-loading failures as 5xx, so
/// every server-side error counts as overload.
pub(crate) fn classify_status(status: StatusCode, model: &str, detail: String) -> GatewayError {
    match status.as_u16() {
        400 => GatewayError::InvalidInput(format!("local model rejected request ({status})")),
        404 => GatewayError::ModelNotFound(model.to_string()),
        500..=599 => GatewayError::ProviderOverloaded {
            backend: BackendKind::Local,
            detail: format!("{status}: {detail}"),
        },
        _ => GatewayError::Unknown(format!("local model returned {status}: {detail}")),
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn name(&self) -> &str {
        "ollama"
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Local
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }

    async fn call(&self, input: &GenerationInput) -> Result<Completion> {
        match input {
            GenerationInput::Text { prompt } => self.generate(prompt, None).await,
            GenerationInput::Image { prompt, image, .. } => {
                self.generate(prompt, Some(vec![STANDARD.encode(image)]))
                    .await
            }
            GenerationInput::Chat { messages } => self.chat(messages).await,
        }
    }

    async fn probe(&self) -> Result<()> {
        let response = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| transport_error(BackendKind::Local, self.timeout, e))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let detail = error_detail(response).await;
            Err(classify_status(status, &self.model, detail))
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize, Default)]
struct EvalCounts {
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(flatten)]
    counts: EvalCounts,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ReplyMessage>,
    #[serde(flatten)]
    counts: EvalCounts,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}
