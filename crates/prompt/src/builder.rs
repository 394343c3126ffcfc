//! Prompt builder for rendering templates.

use crate::types::{BuiltPrompt, PromptDefinition};
use coursemate_core::{AppError, AppResult};
use handlebars::Handlebars;
use std::collections::HashMap;

/// Build a prompt from a definition and input variables.
///
/// Both the system and user templates are rendered with Handlebars
/// (HTML escaping disabled). Declared variables that were not supplied
/// render as empty and are reported in the metadata.
///
/// # Example
/// ```no_run
/// use coursemate_prompt::{build_prompt, PromptDefinition};
/// use std::collections::HashMap;
///
/// # fn example(def: PromptDefinition) -> Result<(), Box<dyn std::error::Error>> {
/// let mut vars = HashMap::new();
/// vars.insert("query".to_string(), "자료구조 어때요?".to_string());
///
/// let built = build_prompt(&def, vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    variables: HashMap<String, String>,
) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", definition.id);

    let missing: Vec<String> = definition
        .input
        .variables
        .iter()
        .filter(|name| !variables.contains_key(name.as_str()))
        .cloned()
        .collect();

    if !missing.is_empty() {
        tracing::debug!("Prompt {} missing variables: {:?}", definition.id, missing);
    }

    let user = render_template(&definition.template, &variables)?;
    let system = definition
        .system
        .as_deref()
        .map(|template| render_template(template, &variables))
        .transpose()?
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    Ok(BuiltPrompt::new(
        system,
        user,
        definition.id.clone(),
        missing,
        variables,
    ))
}

/// Render a Handlebars template with variables.
fn render_template(template: &str, variables: &HashMap<String, String>) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Disable HTML escaping for plain text
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    let rendered = handlebars
        .render("prompt", &variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))?;

    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{load_prompt, ANSWER_PROMPT_ID, INTENT_PROMPT_ID};
    use crate::types::{PromptBehavior, PromptInputSpec, PromptOutputSpec};
    use std::path::Path;

    fn create_test_definition(system: Option<&str>) -> PromptDefinition {
        PromptDefinition {
            id: "test.prompt".to_string(),
            title: "Test".to_string(),
            api_version: "1.0".to_string(),
            created_by: "test".to_string(),
            behavior: PromptBehavior {
                tone: "neutral".to_string(),
                style: "concise".to_string(),
            },
            input: PromptInputSpec {
                variables: vec!["query".to_string(), "context".to_string()],
            },
            system: system.map(str::to_string),
            template: "Question: {{query}}".to_string(),
            output: PromptOutputSpec {
                format: "text".to_string(),
            },
        }
    }

    #[test]
    fn test_render_does_not_escape() {
        let mut vars = HashMap::new();
        vars.insert("query".to_string(), "<b>\"A&B\"</b>".to_string());

        let rendered = render_template("Q: {{query}}", &vars).unwrap();
        assert_eq!(rendered, "Q: <b>\"A&B\"</b>");
    }

    #[test]
    fn test_build_prompt_reports_missing_variables() {
        let def = create_test_definition(Some("   "));
        let mut vars = HashMap::new();
        vars.insert("query".to_string(), "Test question".to_string());

        let built = build_prompt(&def, vars).unwrap();
        assert_eq!(built.user, "Question: Test question");
        assert_eq!(built.system, None);
        assert_eq!(built.metadata.missing_variables, vec!["context".to_string()]);
    }

    #[test]
    fn test_intent_prompt_embeds_query() {
        let loaded = load_prompt(Path::new("/nonexistent-workspace"), INTENT_PROMPT_ID).unwrap();
        let mut vars = HashMap::new();
        vars.insert("query".to_string(), "알고리즘 교수님별 차이점 알려줘".to_string());

        let built = build_prompt(&loaded.definition, vars).unwrap();
        assert!(built.user.contains("질문: 알고리즘 교수님별 차이점 알려줘"));
        assert!(built.user.contains("\"comparison_type\": \"professor\""));
        assert!(built.system.is_some());
    }

    #[test]
    fn test_answer_prompt_omits_empty_history() {
        let loaded = load_prompt(Path::new("/nonexistent-workspace"), ANSWER_PROMPT_ID).unwrap();
        let mut vars = HashMap::new();
        vars.insert("history".to_string(), String::new());
        vars.insert("query".to_string(), "추천해줘".to_string());
        vars.insert("context".to_string(), "{\"courses\":[]}".to_string());

        let built = build_prompt(&loaded.definition, vars).unwrap();
        assert!(!built.user.contains("[이전 대화]"));
        assert!(built.user.contains("{\"courses\":[]}"));
    }
}
