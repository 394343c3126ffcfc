//! Prompt types for Coursemate.
//!
//! This module defines the domain entities for the prompt system.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A prompt definition loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Creator identifier
    #[serde(rename = "createdBy", default)]
    pub created_by: String,

    /// Behavioral settings
    pub behavior: PromptBehavior,

    /// Input specification
    #[serde(default)]
    pub input: PromptInputSpec,

    /// Optional system template with Handlebars syntax
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Template string with Handlebars syntax
    pub template: String,

    /// Output specification
    pub output: PromptOutputSpec,
}

/// Behavioral settings for prompt execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptBehavior {
    /// Tone (e.g., "neutral", "friendly")
    pub tone: String,

    /// Style (e.g., "strict-json", "conversational")
    pub style: String,
}

/// Input specification for the prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptInputSpec {
    /// Template variables the caller is expected to supply
    #[serde(default)]
    pub variables: Vec<String>,
}

/// Output specification for the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptOutputSpec {
    /// Output format (e.g., "text", "json")
    pub format: String,
}

/// Where a prompt definition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptSource {
    /// Compiled into the binary
    Builtin,
    /// Loaded from `.coursemate/prompts/` in the workspace
    Workspace,
}

impl fmt::Display for PromptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptSource::Builtin => write!(f, "builtin"),
            PromptSource::Workspace => write!(f, "workspace"),
        }
    }
}

/// A resolved prompt together with its origin.
#[derive(Debug, Clone)]
pub struct LoadedPrompt {
    pub definition: PromptDefinition,
    pub source: PromptSource,
}

/// A fully built prompt ready for LLM execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    /// System message (optional)
    pub system: Option<String>,

    /// User message (required)
    pub user: String,

    /// Metadata about the built prompt
    pub metadata: BuiltPromptMetadata,
}

/// Metadata about a built prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPromptMetadata {
    /// Source prompt ID
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,

    /// Declared variables the caller did not supply
    #[serde(rename = "missingVariables", default)]
    pub missing_variables: Vec<String>,

    /// Template variables that were resolved
    #[serde(rename = "resolvedVariables")]
    pub resolved_variables: HashMap<String, String>,
}

impl BuiltPrompt {
    /// Create a new built prompt.
    pub fn new(
        system: Option<String>,
        user: String,
        source_prompt_id: String,
        missing_variables: Vec<String>,
        resolved_variables: HashMap<String, String>,
    ) -> Self {
        Self {
            system,
            user,
            metadata: BuiltPromptMetadata {
                source_prompt_id,
                missing_variables,
                resolved_variables,
            },
        }
    }
}
