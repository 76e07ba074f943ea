//! Cloud backend transport: metered Generative Language API.
//!
//! Speaks the `models/{model}:generateContent` REST dialect. Authentication
//! uses the `x-goog-api-key` header so the key never appears in URLs or
//! logs.
//! See: <https://ai.google.dev/api/generate-content>

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::http::{build_client, error_detail, retry_after, transport_error};
use super::traits::Transport;
use crate::types::{BackendKind, Completion, GenerationInput, Role, TokenCounts};
use crate::{GatewayError, Result};

/// Default base URL for the Generative Language API
pub const DEFAULT_CLOUD_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model when none is configured
pub const DEFAULT_CLOUD_MODEL: &str = "gemini-1.5-flash";

/// Default per-call deadline
pub const DEFAULT_CLOUD_TIMEOUT: Duration = Duration::from_secs(60);

/// Transport for the cloud generation API.
#[derive(Clone)]
pub struct CloudTransport {
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    http: Client,
}

impl CloudTransport {
    /// Create a transport against the public endpoint.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, model, DEFAULT_CLOUD_BASE_URL)
    }

    /// Create a transport with a custom base URL (for testing with wiremock).
    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(GatewayError::Configuration(
                "cloud API key is empty".to_string(),
            ));
        }
        Ok(Self {
            api_key,
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_CLOUD_TIMEOUT,
            http: build_client(Duration::from_secs(10))?,
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

    fn build_request(input: &GenerationInput) -> GenerateContentRequest {
        match input {
            GenerationInput::Text { prompt } => GenerateContentRequest {
                contents: vec![Content::user(vec![Part::text(prompt)])],
                system_instruction: None,
            },
            GenerationInput::Image {
                prompt,
                image,
                mime_type,
            } => GenerateContentRequest {
                contents: vec![Content::user(vec![
                    Part::text(prompt),
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: mime_type.clone(),
                            data: STANDARD.encode(image),
                        },
                    },
                ])],
                system_instruction: None,
            },
            GenerationInput::Chat { messages } => {
                let system: Vec<&str> = messages
                    .iter()
                    .filter(|m| m.role == Role::System)
                    .map(|m| m.content.as_str())
                    .collect();
                let contents = messages
                    .iter()
                    .filter(|m| m.role != Role::System)
                    .map(|m| Content {
                        role: Some(match m.role {
                            Role::Assistant => "model".to_string(),
                            _ => "user".to_string(),
                        }),
                        parts: vec![Part::text(&m.content)],
                    })
                    .collect();
                GenerateContentRequest {
                    contents,
                    system_instruction: (!system.is_empty()).then(|| Content {
                        role: None,
                        parts: vec![Part::text(&system.join("\n\n"))],
                    }),
                }
            }
        }
    }

    async fn classify_failure(&self, response: reqwest::Response) -> GatewayError {
        let status = response.status();
        let hint = retry_after(response.headers());
        let detail = error_detail(response).await;
        classify_status(status, hint, &self.model, self.timeout, detail)
    }
}

/// Map a non-success HTTP status from the cloud API onto the taxonomy.
pub(crate) fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    model: &str,
    timeout: Duration,
    detail: String,
) -> GatewayError {
    match status.as_u16() {
        429 => GatewayError::UpstreamRateLimited { retry_after },
        401 | 403 => GatewayError::UpstreamAuthFailure,
        404 => GatewayError::ModelNotFound(model.to_string()),
        400 | 413 | 422 => GatewayError::InvalidInput(format!("cloud provider rejected request ({status})")),
        503 | 529 => GatewayError::ProviderOverloaded {
            backend: BackendKind::Cloud,
            detail,
        },
        504 => GatewayError::ProviderTimeout {
            backend: BackendKind::Cloud,
            timeout,
        },
        500..=599 => GatewayError::ProviderUnreachable {
            backend: BackendKind::Cloud,
            detail: format!("{status}: {detail}"),
        },
        _ => GatewayError::Unknown(format!("cloud provider returned {status}: {detail}")),
    }
}

#[async_trait]
impl Transport for CloudTransport {
    fn name(&self) -> &str {
        "gemini"
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Cloud
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }

    async fn call(&self, input: &GenerationInput) -> Result<Completion> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::build_request(input))
            .send()
            .await
            .map_err(|e| transport_error(BackendKind::Cloud, self.timeout, e))?;

        if !response.status().is_success() {
            return Err(self.classify_failure(response).await);
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| transport_error(BackendKind::Cloud, self.timeout, e))?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        if text.is_empty() {
            return Err(GatewayError::Unknown(
                "cloud provider returned no candidate text".to_string(),
            ));
        }

        let mut completion = Completion::new(text);
        if let Some(usage) = body.usage_metadata {
            completion = completion.with_tokens(TokenCounts::new(
                usage.prompt_token_count,
                usage.candidates_token_count,
            ));
        }
        Ok(completion)
    }

    async fn probe(&self) -> Result<()> {
        let url = format!("{}/v1beta/models/{}", self.base_url, self.model);
        let response = self
            .http
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| transport_error(BackendKind::Cloud, self.timeout, e))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.classify_failure(response).await)
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

impl Content {
    fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts,
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl Part {
    fn text(text: &str) -> Self {
        Part::Text {
            text: text.to_string(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    #[test]
    fn chat_maps_roles_and_system_instruction() {
        let input = GenerationInput::chat(vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ]);
        let body = serde_json::to_value(CloudTransport::build_request(&input)).unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn image_is_inlined_as_base64() {
        let input = GenerationInput::image("what is it", vec![0xff, 0x00], "image/png");
        let body = serde_json::to_value(CloudTransport::build_request(&input)).unwrap();
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "what is it");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inlineData"]["data"], "/wA=");
    }

    #[test]
    fn status_classification() {
        let classify = |code: u16| {
            classify_status(
                StatusCode::from_u16(code).unwrap(),
                None,
                "m",
                Duration::from_secs(5),
                String::new(),
            )
        };
        assert!(matches!(classify(429), GatewayError::UpstreamRateLimited { .. }));
        assert!(matches!(classify(401), GatewayError::UpstreamAuthFailure));
        assert!(matches!(classify(404), GatewayError::ModelNotFound(_)));
        assert!(matches!(classify(400), GatewayError::InvalidInput(_)));
        assert!(matches!(classify(503), GatewayError::ProviderOverloaded { .. }));
        assert!(matches!(
            classify(504),
            GatewayError::ProviderTimeout { timeout, .. } if timeout == Duration::from_secs(5)
        ));
        assert!(matches!(classify(500), GatewayError::ProviderUnreachable { .. }));
        assert!(!classify(418).is_retryable());
    }

    #[test]
    fn empty_api_key_is_configuration_error() {
        let err = CloudTransport::new("  ", DEFAULT_CLOUD_MODEL).err().unwrap();
        assert!(matches!(err, GatewayError::Configuration(_)));
    }
}
