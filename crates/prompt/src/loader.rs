//! Prompt loader for built-in and workspace YAML prompt definitions.

use crate::types::{LoadedPrompt, PromptDefinition, PromptSource};
use coursemate_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

/// Prompt used to turn a question into a filter proposal.
pub const INTENT_PROMPT_ID: &str = "intent.classify";

/// Prompt used to write the final answer.
pub const ANSWER_PROMPT_ID: &str = "answer.synthesize";

const BUILTIN_PROMPTS: &[(&str, &str)] = &[
    (
        INTENT_PROMPT_ID,
        include_str!("../prompts/intent.classify.yml"),
    ),
    (
        ANSWER_PROMPT_ID,
        include_str!("../prompts/answer.synthesize.yml"),
    ),
];

fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(".coursemate/prompts")
}

/// Load a prompt definition by ID.
///
/// A file named `<id>.yml` in `.coursemate/prompts/` takes precedence over
/// the built-in definition with the same ID.
///
/// # Example
/// ```no_run
/// use coursemate_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "intent.classify")?;
/// println!("Loaded prompt: {} ({})", prompt.definition.title, prompt.source);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<LoadedPrompt> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));

    if prompt_file.exists() {
        tracing::debug!("Loading prompt from: {:?}", prompt_file);

        let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
            AppError::Prompt(format!(
                "Failed to read prompt file {:?}: {}",
                prompt_file, e
            ))
        })?;

        let definition = parse_prompt(&contents, &prompt_file.display().to_string())?;
        tracing::info!("Loaded workspace prompt: {} ({})", definition.id, definition.title);

        return Ok(LoadedPrompt {
            definition,
            source: PromptSource::Workspace,
        });
    }

    let definition = load_builtin_prompt(prompt_id)?;
    tracing::debug!("Using built-in prompt: {}", definition.id);

    Ok(LoadedPrompt {
        definition,
        source: PromptSource::Builtin,
    })
}

/// Load a built-in prompt definition, ignoring workspace overrides.
pub fn load_builtin_prompt(prompt_id: &str) -> AppResult<PromptDefinition> {
    let (_, contents) = BUILTIN_PROMPTS
        .iter()
        .find(|(id, _)| *id == prompt_id)
        .ok_or_else(|| AppError::Prompt(format!("Prompt not found: {}", prompt_id)))?;

    parse_prompt(contents, prompt_id)
}

/// List every available prompt ID with the source that would be used.
///
/// Results are sorted by ID.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<(String, PromptSource)>> {
    let mut prompts: Vec<(String, PromptSource)> = BUILTIN_PROMPTS
        .iter()
        .map(|(id, _)| (id.to_string(), PromptSource::Builtin))
        .collect();

    let dir = prompts_dir(workspace_path);
    if dir.exists() {
        for entry in walkdir::WalkDir::new(&dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    match prompts.iter_mut().find(|(id, _)| id == stem) {
                        Some(existing) => existing.1 = PromptSource::Workspace,
                        None => prompts.push((stem.to_string(), PromptSource::Workspace)),
                    }
                }
            }
        }
    }

    prompts.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(prompts)
}

fn parse_prompt(contents: &str, origin: &str) -> AppResult<PromptDefinition> {
    let definition: PromptDefinition = serde_yaml::from_str(contents).map_err(|e| {
        AppError::Prompt(format!("Failed to parse prompt YAML {}: {}", origin, e))
    })?;

    validate_prompt(&definition)?;
    Ok(definition)
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.trim().is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}
