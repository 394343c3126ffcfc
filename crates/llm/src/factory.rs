//! LLM provider factory.
//!
//! This module creates LLM clients from a provider name, resolving
//! endpoints and secrets supplied by the caller.

use crate::client::LlmClient;
use crate::providers::ollama::DEFAULT_OLLAMA_URL;
use crate::providers::{GeminiClient, OllamaClient};
use crate::types::ProviderType;
use coursemate_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama", "gemini")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - Optional API key (required by Gemini)
/// * `timeout` - Optional HTTP timeout for every request
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown or a required
/// secret is missing.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
    timeout: Option<Duration>,
) -> AppResult<Arc<dyn LlmClient>> {
    let provider_type = ProviderType::parse(provider)
        .ok_or_else(|| AppError::Config(format!("Unknown provider: {}", provider)))?;

    match provider_type {
        ProviderType::Ollama => {
            let base_url = endpoint.unwrap_or(DEFAULT_OLLAMA_URL);
            let client = match timeout {
                Some(timeout) => OllamaClient::with_timeout(base_url, timeout)?,
                None => OllamaClient::with_base_url(base_url),
            };
            Ok(Arc::new(client))
        }
        ProviderType::Gemini => {
            let api_key = api_key.ok_or_else(|| {
                AppError::Config("Gemini provider requires API key".to_string())
            })?;
            let client = match endpoint {
                Some(url) => GeminiClient::with_base_url(url, api_key),
                None => GeminiClient::new(api_key),
            };
            let client = match timeout {
                Some(timeout) => client.with_timeout(timeout)?,
                None => client,
            };
            Ok(Arc::new(client))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_ollama_client() {
        let client = create_client("ollama", None, None, None).unwrap();
        assert_eq!(client.provider_name(), "ollama");
    }

    #[test]
    fn test_create_ollama_with_custom_endpoint_and_timeout() {
        let client = create_client(
            "ollama",
            Some("http://localhost:8080"),
            None,
            Some(Duration::from_secs(5)),
        );
        assert!(client.is_ok());
    }

    #[test]
    fn test_gemini_requires_api_key() {
        match create_client("gemini", None, None, None) {
            Err(err) => assert!(err.to_string().contains("requires API key")),
            Ok(_) => panic!("Expected error for Gemini without API key"),
        }
    }

    #[test]
    fn test_create_gemini_client() {
        let client = create_client("gemini", None, Some("key"), None).unwrap();
        assert_eq!(client.provider_name(), "gemini");
    }

    #[test]
    fn test_unknown_provider() {
        match create_client("unknown", None, None, None) {
            Err(err) => assert!(err.to_string().contains("Unknown provider")),
            Ok(_) => panic!("Expected error for unknown provider"),
        }
    }
}
