//! Error types for Coursemate.
//!
//! This module defines a unified error enum that covers all error categories
//! in the application: configuration, I/O, the three external services
//! (LLM, course store, review index), embeddings, prompts and timeouts.

use thiserror::Error;

/// Unified error type for Coursemate.
///
/// All fallible functions return `Result<T, AppError>`.
/// We never panic: errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Structured course store errors
    #[error("Course store error: {0}")]
    Store(String),

    /// Review vector index errors
    #[error("Review index error: {0}")]
    Index(String),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// An outbound call or the whole request ran past its time budget
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether a retry of the same call has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Io(_)
                | AppError::Llm(_)
                | AppError::Store(_)
                | AppError::Index(_)
                | AppError::Embedding(_)
                | AppError::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AppError::Llm("503".to_string()).is_transient());
        assert!(AppError::Timeout("store".to_string()).is_transient());
        assert!(!AppError::Config("bad".to_string()).is_transient());
        assert!(!AppError::Serialization("bad json".to_string()).is_transient());
    }

    #[test]
    fn test_json_error_conversion() {
        let err: AppError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, AppError::Serialization(_)));
    }
}
