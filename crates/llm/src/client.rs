//! LLM client abstraction and request/response types.
//!
//! This module defines the core abstractions for interacting with LLM providers.

use coursemate_core::AppResult;
use serde::{Deserialize, Serialize};

/// LLM completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// The prompt text to send to the LLM
    pub prompt: String,

    /// Model identifier (e.g., "llama3.2", "gemini-2.5-flash")
    pub model: String,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Temperature for sampling (0.0 - 2.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// System prompt (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl LlmRequest {
    /// Create a new LLM request with required fields.
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
            system: None,
        }
    }

    /// Set the maximum tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the temperature for sampling.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Why the model stopped generating a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    /// Natural end of output
    Stop,
    /// Output hit the token limit
    MaxTokens,
    /// Blocked by the provider's safety filters
    Safety,
    /// Blocked because the output recited protected material
    Recitation,
    /// Any other provider-specific reason
    Other(String),
}

impl FinishReason {
    /// Map a provider's reason string onto the known reasons.
    pub fn parse(reason: &str) -> Self {
        match reason.to_uppercase().as_str() {
            "STOP" | "END_TURN" => Self::Stop,
            "MAX_TOKENS" | "LENGTH" => Self::MaxTokens,
            "SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST" | "SPII" => Self::Safety,
            "RECITATION" => Self::Recitation,
            _ => Self::Other(reason.to_string()),
        }
    }
}

/// One generated alternative as returned by the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmCandidate {
    /// Text parts in order; empty when the candidate was blocked
    #[serde(default)]
    pub parts: Vec<String>,

    /// Stop reason reported for this candidate
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

impl LlmCandidate {
    /// Concatenated text of all parts.
    pub fn text(&self) -> String {
        self.parts.concat()
    }
}

/// LLM completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// The generated text; empty when nothing usable came back
    pub content: String,

    /// Model that generated the response
    pub model: String,

    /// Usage statistics
    pub usage: LlmUsage,

    /// Whether the response was complete
    #[serde(default = "default_true")]
    pub done: bool,

    /// Raw candidates, first one preferred
    #[serde(default)]
    pub candidates: Vec<LlmCandidate>,
}

fn default_true() -> bool {
    true
}

impl LlmResponse {
    /// Build a single-candidate response from plain text.
    pub fn from_text(content: impl Into<String>, model: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            candidates: vec![LlmCandidate {
                parts: vec![content.clone()],
                finish_reason: Some(FinishReason::Stop),
            }],
            content,
            model: model.into(),
            usage: LlmUsage::default(),
            done: true,
        }
    }

    /// Finish reason of the first candidate, if reported.
    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.candidates
            .first()
            .and_then(|candidate| candidate.finish_reason.as_ref())
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmUsage {
    /// Tokens in the prompt
    #[serde(default)]
    pub prompt_tokens: u32,

    /// Tokens in the completion
    #[serde(default)]
    pub completion_tokens: u32,

    /// Total tokens used
    #[serde(default)]
    pub total_tokens: u32,
}

impl LlmUsage {
    /// Create usage stats from prompt and completion token counts.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Trait for LLM providers.
///
/// Implementations are created once at process start and shared across
/// requests, so they must be `Send + Sync` and must not mutate per call.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Get the provider name (e.g., "ollama", "gemini").
    fn provider_name(&self) -> &str;

    /// Perform a single non-streaming completion.
    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse>;
}
