//! Command handlers for the Coursemate CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod ingest;
pub mod prompts;
pub mod stats;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use ingest::IngestCommand;
pub use prompts::PromptsCommand;
pub use stats::StatsCommand;
