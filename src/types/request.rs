//! Inbound generation request types

use serde::{Deserialize, Serialize};

use super::message::ChatMessage;

/// Kind of generation a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMethod {
    Text,
    Image,
    Chat,
}

impl GenerationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMethod::Text => "text",
            GenerationMethod::Image => "image",
            GenerationMethod::Chat => "chat",
        }
    }
}

impl std::fmt::Display for GenerationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend-independent generation input.
///
/// The variant determines the [`GenerationMethod`], so a request can never
/// carry a method that disagrees with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationInput {
    /// Single free-form prompt.
    Text { prompt: String },
    /// Prompt plus raw image bytes to analyse.
    Image {
        prompt: String,
        image: Vec<u8>,
        mime_type: String,
    },
    /// Ordered, role-tagged conversation turns.
    Chat { messages: Vec<ChatMessage> },
}

impl GenerationInput {
    /// Create a text prompt input
    pub fn text(prompt: impl Into<String>) -> Self {
        Self::Text {
            prompt: prompt.into(),
        }
    }

    /// Create an image-analysis input
    pub fn image(prompt: impl Into<String>, image: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self::Image {
            prompt: prompt.into(),
            image,
            mime_type: mime_type.into(),
        }
    }

    /// Create a chat input
    pub fn chat(messages: Vec<ChatMessage>) -> Self {
        Self::Chat { messages }
    }

    pub fn method(&self) -> GenerationMethod {
        match self {
            Self::Text { .. } => GenerationMethod::Text,
            Self::Image { .. } => GenerationMethod::Image,
            Self::Chat { .. } => GenerationMethod::Chat,
        }
    }

    /// Number of text characters in the input (image bytes excluded).
    ///
    /// Used for token estimation when a provider does not report counts.
    pub fn text_chars(&self) -> usize {
        match self {
            Self::Text { prompt } | Self::Image { prompt, .. } => prompt.chars().count(),
            Self::Chat { messages } => messages.iter().map(|m| m.content.chars().count()).sum(),
        }
    }
}

/// A generation request as issued by an authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub user_id: u64,
    pub input: GenerationInput,
}

impl GenerationRequest {
    pub fn new(user_id: u64, input: GenerationInput) -> Self {
        Self { user_id, input }
    }

    pub fn method(&self) -> GenerationMethod {
        self.input.method()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_follows_payload() {
        assert_eq!(GenerationInput::text("a").method(), GenerationMethod::Text);
        assert_eq!(
            GenerationInput::image("a", vec![1, 2], "image/png").method(),
            GenerationMethod::Image
        );
        assert_eq!(
            GenerationInput::chat(vec![ChatMessage::user("a")]).method(),
            GenerationMethod::Chat
        );
    }

    #[test]
    fn text_chars_sums_chat_turns() {
        let input = GenerationInput::chat(vec![
            ChatMessage::system("abc"),
            ChatMessage::user("défg"),
        ]);
        assert_eq!(input.text_chars(), 7);
    }
}
