//! Prompt system for Coursemate.
//!
//! This crate provides structured prompt management with:
//! - Built-in YAML prompt definitions compiled into the binary
//! - Workspace overrides under `.coursemate/prompts/`
//! - Handlebars template rendering

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use loader::{
    list_prompts, load_builtin_prompt, load_prompt, ANSWER_PROMPT_ID, INTENT_PROMPT_ID,
};
pub use types::{
    BuiltPrompt, BuiltPromptMetadata, LoadedPrompt, PromptBehavior, PromptDefinition,
    PromptInputSpec, PromptOutputSpec, PromptSource,
};
