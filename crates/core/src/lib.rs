//! Coursemate Core Library
//!
//! This crate provides the foundational utilities shared by every Coursemate crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management
//! - Retry and timeout handling for outbound calls

pub mod config;
pub mod error;
pub mod logging;
pub mod retry;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use retry::{with_retry, RetryPolicy};
