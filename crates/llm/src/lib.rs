//! LLM integration crate for Coursemate.
//!
//! This crate provides a provider-agnostic abstraction for single-shot
//! prompt-in/text-out calls to a generative model. Responses keep the
//! provider's candidate structure and finish reasons so callers can explain
//! empty, blocked or truncated output instead of failing.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//! - **Gemini**: Google Generative Language API
//!
//! # Example
//! ```no_run
//! use coursemate_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("안녕하세요", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{FinishReason, LlmCandidate, LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::{GeminiClient, OllamaClient};
pub use types::ProviderType;
