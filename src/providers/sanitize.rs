//! Input sanitization and token estimation.
//!
//! Every input is cleaned before it reaches the cache or a backend so that
//! cache keys are computed over the same bytes the provider sees, and so
//! request size (and therefore cost) stays bounded.

use crate::types::{ChatMessage, GenerationInput, Role};
use crate::{GatewayError, Result};

/// Maximum characters kept per prompt or chat turn.
pub const MAX_INPUT_CHARS: usize = 30_000;

/// Maximum decoded image size accepted for analysis (10 MiB).
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Prompt used for image analysis when the caller sends none.
pub const DEFAULT_IMAGE_PROMPT: &str = "Describe this image.";

/// Approximate characters per token when a provider does not report counts.
const CHARS_PER_TOKEN: usize = 4;

/// Strip control characters (newlines and tabs survive), trim, and truncate
/// to [`MAX_INPUT_CHARS`] characters.
pub fn clean_text(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    let trimmed = stripped.trim();
    match trimmed.char_indices().nth(MAX_INPUT_CHARS) {
        Some((cut, _)) => trimmed[..cut].trim_end().to_string(),
        None => trimmed.to_string(),
    }
}

/// Sanitize a raw generation input.
///
/// Returns `InvalidInput` when nothing usable remains after cleaning.
pub fn sanitize(input: GenerationInput) -> Result<GenerationInput> {
    match input {
        GenerationInput::Text { prompt } => {
            let prompt = clean_text(&prompt);
            if prompt.is_empty() {
                return Err(GatewayError::InvalidInput("prompt is empty".into()));
            }
            Ok(GenerationInput::Text { prompt })
        }
        GenerationInput::Image {
            prompt,
            image,
            mime_type,
        } => {
            if image.is_empty() {
                return Err(GatewayError::InvalidInput("image is empty".into()));
            }
            if image.len() > MAX_IMAGE_BYTES {
                return Err(GatewayError::InvalidInput(format!(
                    "image exceeds {MAX_IMAGE_BYTES} bytes"
                )));
            }
            let mime_type = clean_text(&mime_type).to_ascii_lowercase();
            if !mime_type.starts_with("image/") {
                return Err(GatewayError::InvalidInput(format!(
                    "unsupported mime type '{mime_type}'"
                )));
            }
            let prompt = match clean_text(&prompt) {
                p if p.is_empty() => DEFAULT_IMAGE_PROMPT.to_string(),
                p => p,
            };
            Ok(GenerationInput::Image {
                prompt,
                image,
                mime_type,
            })
        }
        GenerationInput::Chat { messages } => {
            let messages: Vec<ChatMessage> = messages
                .into_iter()
                .map(|m| ChatMessage {
                    role: m.role,
                    content: clean_text(&m.content),
                })
                .filter(|m| !m.content.is_empty())
                .collect();
            if messages.is_empty() {
                return Err(GatewayError::InvalidInput(
                    "chat requires at least one non-empty message".into(),
                ));
            }
            let messages = fit_to_budget(messages);
            if messages.iter().all(|m| m.role == Role::System) {
                return Err(GatewayError::InvalidInput(
                    "chat requires at least one user or assistant message".into(),
                ));
            }
            Ok(GenerationInput::Chat { messages })
        }
    }
}

/// Keep the most recent turns whose combined length fits in
/// [`MAX_INPUT_CHARS`]. The oldest surviving turn keeps only its tail.
fn fit_to_budget(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut budget = MAX_INPUT_CHARS;
    let mut kept = Vec::with_capacity(messages.len());
    for mut message in messages.into_iter().rev() {
        if budget == 0 {
            break;
        }
        let chars = message.content.chars().count();
        if chars <= budget {
            budget -= chars;
            kept.push(message);
            continue;
        }
        let tail: String = message.content.chars().skip(chars - budget).collect();
        message.content = tail.trim_start().to_string();
        if !message.content.is_empty() {
            kept.push(message);
        }
        break;
    }
    kept.reverse();
    kept
}

/// Estimate a token count from a character count (1 token ≈ 4 characters).
pub fn estimate_tokens(chars: usize) -> u32 {
    u32::try_from(chars.div_ceil(CHARS_PER_TOKEN)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_characters_but_keeps_newlines() {
        assert_eq!(clean_text("  a\u{0}b\u{7}c\nd\te\u{7f} "), "abc\nd\te");
    }

    #[test]
    fn truncates_to_max_chars() {
        let long = "é".repeat(MAX_INPUT_CHARS + 10);
        let cleaned = clean_text(&long);
        assert_eq!(cleaned.chars().count(), MAX_INPUT_CHARS);
    }

    #[test]
    fn empty_text_is_invalid() {
        let err = sanitize(GenerationInput::text(" \u{1} ")).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidInput(_)));
    }

    #[test]
    fn image_gets_default_prompt() {
        let input = sanitize(GenerationInput::image("", vec![1], "IMAGE/PNG")).unwrap();
        assert_eq!(
            input,
            GenerationInput::image(DEFAULT_IMAGE_PROMPT, vec![1], "image/png")
        );
    }

    #[test]
    fn image_rejects_non_image_mime() {
        let err = sanitize(GenerationInput::image("x", vec![1], "text/plain")).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidInput(_)));
    }

    #[test]
    fn chat_drops_empty_turns() {
        let input = sanitize(GenerationInput::chat(vec![
            ChatMessage::system("\u{0}"),
            ChatMessage::user(" hi "),
        ]))
        .unwrap();
        assert_eq!(input, GenerationInput::chat(vec![ChatMessage::user("hi")]));
    }

    #[test]
    fn chat_all_empty_is_invalid() {
        assert!(sanitize(GenerationInput::chat(vec![])).is_err());
    }

    #[test]
    fn system_only_chat_is_invalid() {
        let err = sanitize(GenerationInput::chat(vec![ChatMessage::system("be brief")]))
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidInput(_)));
    }

    #[test]
    fn chat_budget_spans_all_turns() {
        let input = sanitize(GenerationInput::chat(vec![
            ChatMessage::user("a".repeat(MAX_INPUT_CHARS)),
            ChatMessage::assistant(format!("{}b", "c".repeat(MAX_INPUT_CHARS - 5))),
            ChatMessage::user("0123456789"),
        ]))
        .unwrap();

        assert_eq!(input.text_chars(), MAX_INPUT_CHARS);
        let GenerationInput::Chat { messages } = input else {
            panic!("expected chat");
        };
        // the oldest turn is dropped and the middle one loses its head
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::Assistant);
        assert!(messages[0].content.ends_with('b'));
        assert_eq!(messages[1].content, "0123456789");
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(0), 0);
        assert_eq!(estimate_tokens(1), 1);
        assert_eq!(estimate_tokens(8), 2);
        assert_eq!(estimate_tokens(9), 3);
    }
}
