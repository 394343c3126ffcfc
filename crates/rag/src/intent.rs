//! Intent classification: question in, `FilterProposal` out.
//!
//! The model is asked for a four-key JSON object. Its reply is validated into
//! strict types: unknown filter fields and null values are dropped, scalar
//! values are stringified, and an unknown comparison type becomes `none`.
//! Anything unparseable yields [`FilterProposal::fallback`].

use crate::context::PipelineContext;
use crate::types::{ComparisonTargets, ComparisonType, FilterField, FilterProposal};
use coursemate_core::{with_retry, AppError, AppResult};
use coursemate_llm::LlmRequest;
use coursemate_prompt::build_prompt;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Classify a non-empty question. Never fails.
pub async fn classify(ctx: &PipelineContext, user_query: &str) -> FilterProposal {
    match try_classify(ctx, user_query).await {
        Ok(proposal) => {
            tracing::info!(
                "Classified query: structured={}, filters={}, comparison={:?}",
                proposal.needs_structured_filter,
                proposal.filters.len(),
                proposal.comparison_targets.comparison_type
            );
            proposal
        }
        Err(e) => {
            tracing::warn!("Intent classification failed, using fallback: {}", e);
            FilterProposal::fallback(user_query)
        }
    }
}

async fn try_classify(ctx: &PipelineContext, user_query: &str) -> AppResult<FilterProposal> {
    let mut variables = HashMap::new();
    variables.insert("query".to_string(), user_query.to_string());
    let built = build_prompt(&ctx.prompts.intent, variables)?;
    if !built.metadata.missing_variables.is_empty() {
        tracing::warn!(
            "Prompt {} rendered without {:?}",
            built.metadata.source_prompt_id,
            built.metadata.missing_variables
        );
    }

    let mut request = LlmRequest::new(built.user, &ctx.model).with_temperature(0.0);
    if let Some(system) = built.system {
        request = request.with_system(system);
    }

    let response = with_retry(&ctx.retry, "llm.classify", || ctx.llm.complete(&request)).await?;

    let raw = if response.content.trim().is_empty() {
        response
            .candidates
            .first()
            .map(|c| c.text())
            .unwrap_or_default()
    } else {
        response.content
    };

    tracing::debug!("Classifier raw output: {}", raw);
    parse_proposal(&raw, user_query)
}

/// Cut the JSON payload out of a model reply.
///
/// The first Markdown fence wins, wherever it sits, with any language tag
/// after the opening backticks skipped. Unfenced replies are narrowed to the
/// span from the first `{` to the last `}`.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(open) = trimmed.find("```") else {
        return object_span(trimmed);
    };

    let after = &trimmed[open + 3..];
    let tag_len = after
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(after.len());
    let body = &after[tag_len..];

    let body = match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    };
    object_span(body.trim())
}

fn object_span(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// Validate the model's reply into a `FilterProposal`.
pub fn parse_proposal(raw: &str, user_query: &str) -> AppResult<FilterProposal> {
    let value: Value = serde_json::from_str(strip_code_fences(raw))?;
    let object = value
        .as_object()
        .ok_or_else(|| AppError::Serialization("classifier output is not a JSON object".to_string()))?;

    let semantic_query = object
        .get("semantic_query")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(user_query)
        .to_string();

    Ok(FilterProposal {
        needs_structured_filter: object
            .get("needs_structured_filter")
            .map(truthy)
            .unwrap_or(false),
        filters: object
            .get("filters")
            .and_then(Value::as_object)
            .map(parse_filters)
            .unwrap_or_default(),
        semantic_query,
        comparison_targets: object
            .get("comparison_targets")
            .and_then(Value::as_object)
            .map(parse_targets)
            .unwrap_or_default(),
    })
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn parse_filters(raw: &Map<String, Value>) -> BTreeMap<FilterField, String> {
    let mut filters = BTreeMap::new();
    for (key, value) in raw {
        let Some(field) = FilterField::parse(key) else {
            tracing::debug!("Ignoring unknown filter field: {}", key);
            continue;
        };
        if let Some(text) = scalar_to_string(value) {
            filters.insert(field, text);
        }
    }
    filters
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    if let Some(items) = value.and_then(Value::as_array) {
        for name in items.iter().filter_map(scalar_to_string) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

fn parse_targets(raw: &Map<String, Value>) -> ComparisonTargets {
    ComparisonTargets {
        course_names: string_list(raw.get("course_names")),
        professors: string_list(raw.get("professors")),
        comparison_type: raw
            .get("comparison_type")
            .and_then(Value::as_str)
            .map(ComparisonType::parse)
            .unwrap_or_default(),
    }
}
