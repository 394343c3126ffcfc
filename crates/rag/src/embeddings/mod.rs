//! Embedding providers for queries and review passages.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
pub use providers::{MockProvider, OllamaProvider};
