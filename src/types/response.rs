//! Generation result types

use serde::{Deserialize, Serialize};

/// Which generation backend served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Metered, remotely hosted generation API.
    Cloud,
    /// Self-hosted model server on the local network.
    Local,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Cloud => "cloud",
            BackendKind::Local => "local",
        }
    }

    /// The other backend.
    pub fn alternate(&self) -> Self {
        match self {
            BackendKind::Cloud => BackendKind::Local,
            BackendKind::Local => BackendKind::Cloud,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cloud" => Ok(BackendKind::Cloud),
            "local" => Ok(BackendKind::Local),
            other => Err(format!("unknown provider '{other}', expected 'cloud' or 'local'")),
        }
    }
}

/// Input/output token counts for one generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub input: u32,
    pub output: u32,
}

impl TokenCounts {
    pub fn new(input: u32, output: u32) -> Self {
        Self { input, output }
    }

    pub fn total(&self) -> u32 {
        self.input.saturating_add(self.output)
    }
}

/// Raw completion returned by a backend transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    /// Exact counts when the provider reports them.
    pub tokens: Option<TokenCounts>,
}

impl Completion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tokens: None,
        }
    }

    pub fn with_tokens(mut self, tokens: TokenCounts) -> Self {
        self.tokens = Some(tokens);
        self
    }
}

/// Result of a routed generation request, with provenance metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub text: String,
    pub cached: bool,
    pub backend: BackendKind,
    pub used_fallback: bool,
    pub elapsed_ms: u64,
    pub tokens: TokenCounts,
}
