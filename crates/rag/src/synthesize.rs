//! Grounded answer synthesis.
//!
//! This stage always returns a user-readable string. Model failures and
//! unusable responses map to fixed messages instead of errors.

use crate::context::PipelineContext;
use crate::types::{HistoryTurn, MergedContext};
use coursemate_core::{with_retry, AppResult};
use coursemate_llm::{FinishReason, LlmRequest, LlmResponse};
use coursemate_prompt::build_prompt;
use std::collections::HashMap;

pub const NO_INFORMATION_MESSAGE: &str =
    "요청하신 조건에 맞는 강의 정보를 찾지 못했습니다. 강의명이나 교수님 성함을 바꿔서 다시 질문해 주세요.";
pub const SAFETY_BLOCKED_MESSAGE: &str =
    "안전 정책에 따라 답변이 차단되었습니다. 질문을 조금 바꿔서 다시 시도해 주세요.";
pub const TRUNCATED_MESSAGE: &str =
    "답변이 너무 길어져 생성이 중단되었습니다. 질문 범위를 좁혀서 다시 시도해 주세요.";
pub const RECITATION_BLOCKED_MESSAGE: &str =
    "저작권 보호 정책에 따라 답변이 차단되었습니다. 다른 방식으로 질문해 주세요.";
pub const GENERATION_FAILED_MESSAGE: &str =
    "답변을 생성하지 못했습니다. 잠시 후 다시 시도해 주세요.";

/// Write the final answer for `user_query` from the normalized context.
pub async fn synthesize(
    ctx: &PipelineContext,
    user_query: &str,
    context: &MergedContext,
    history: &[HistoryTurn],
) -> String {
    if context.courses.is_empty() {
        tracing::info!("No courses in context, answering without the model");
        return NO_INFORMATION_MESSAGE.to_string();
    }

    match request_answer(ctx, user_query, context, history).await {
        Ok(response) => extract_answer(&response),
        Err(e) => {
            tracing::error!("Answer synthesis failed: {}", e);
            format!("답변 생성 중 오류가 발생했습니다: {}", e)
        }
    }
}

async fn request_answer(
    ctx: &PipelineContext,
    user_query: &str,
    context: &MergedContext,
    history: &[HistoryTurn],
) -> AppResult<LlmResponse> {
    let mut variables = HashMap::new();
    variables.insert(
        "history".to_string(),
        format_history(history, ctx.settings.history_turns),
    );
    variables.insert("query".to_string(), user_query.to_string());
    variables.insert("context".to_string(), serde_json::to_string_pretty(context)?);

    let built = build_prompt(&ctx.prompts.answer, variables)?;
    if !built.metadata.missing_variables.is_empty() {
        tracing::warn!(
            "Prompt {} rendered without {:?}",
            built.metadata.source_prompt_id,
            built.metadata.missing_variables
        );
    }
    let mut request = LlmRequest::new(built.user, &ctx.model);
    if let Some(system) = built.system {
        request = request.with_system(system);
    }

    tracing::debug!(
        "Requesting answer over {} course(s), {} prompt chars",
        context.courses.len(),
        request.prompt.len()
    );

    with_retry(&ctx.retry, "llm.synthesize", || ctx.llm.complete(&request)).await
}

/// Render the last `max_turns` turns; turns missing either side are skipped.
pub fn format_history(history: &[HistoryTurn], max_turns: usize) -> String {
    let start = history.len().saturating_sub(max_turns);
    history[start..]
        .iter()
        .filter_map(|turn| {
            let user = turn.user.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
            let assistant = turn
                .assistant
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())?;
            Some(format!("사용자: {}\n도우미: {}", user, assistant))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pull usable text out of a model response.
///
/// Order: direct content, then a message for a known stop reason on the
/// first candidate, then any candidate with text, then a generic message.
pub fn extract_answer(response: &LlmResponse) -> String {
    let content = response.content.trim();
    if !content.is_empty() {
        return content.to_string();
    }

    match response.finish_reason() {
        Some(FinishReason::Safety) => {
            tracing::warn!("Answer blocked by safety filter");
            return SAFETY_BLOCKED_MESSAGE.to_string();
        }
        Some(FinishReason::MaxTokens) => {
            tracing::warn!("Answer truncated at token limit");
            return TRUNCATED_MESSAGE.to_string();
        }
        Some(FinishReason::Recitation) => {
            tracing::warn!("Answer blocked for recitation");
            return RECITATION_BLOCKED_MESSAGE.to_string();
        }
        Some(FinishReason::Stop) | Some(FinishReason::Other(_)) | None => {}
    }

    if let Some(text) = response
        .candidates
        .iter()
        .map(|c| c.text())
        .find(|t| !t.trim().is_empty())
    {
        tracing::debug!("Recovered answer from candidate parts");
        return text.trim().to_string();
    }

    tracing::warn!("Model returned no usable text");
    GENERATION_FAILED_MESSAGE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursemate_llm::{LlmCandidate, LlmUsage};

    fn response(content: &str, candidates: Vec<LlmCandidate>) -> LlmResponse {
        LlmResponse {
            content: content.to_string(),
            model: "test".to_string(),
            usage: LlmUsage::default(),
            done: true,
            candidates,
        }
    }

    fn candidate(parts: &[&str], reason: Option<FinishReason>) -> LlmCandidate {
        LlmCandidate {
            parts: parts.iter().map(|s| s.to_string()).collect(),
            finish_reason: reason,
        }
    }

    #[test]
    fn test_direct_content_wins() {
        let r = response("  자료구조는 평이 좋아요. ", vec![candidate(&[], Some(FinishReason::Safety))]);
        assert_eq!(extract_answer(&r), "자료구조는 평이 좋아요.");
    }

    #[test]
    fn test_known_finish_reasons_map_to_messages() {
        let cases = [
            (FinishReason::Safety, SAFETY_BLOCKED_MESSAGE),
            (FinishReason::MaxTokens, TRUNCATED_MESSAGE),
            (FinishReason::Recitation, RECITATION_BLOCKED_MESSAGE),
        ];
        for (reason, expected) in cases {
            let r = response("", vec![candidate(&["부분 답변"], Some(reason))]);
            assert_eq!(extract_answer(&r), expected);
        }
    }

    #[test]
    fn test_recovers_from_later_candidate() {
        let r = response(
            "",
            vec![
                candidate(&[], Some(FinishReason::Other("OTHER".to_string()))),
                candidate(&["알고리즘은 ", "과제가 많아요."], Some(FinishReason::Stop)),
            ],
        );
        assert_eq!(extract_answer(&r), "알고리즘은 과제가 많아요.");
    }

    #[test]
    fn test_empty_response_gets_generic_message() {
        assert_eq!(extract_answer(&response("", Vec::new())), GENERATION_FAILED_MESSAGE);
        assert_eq!(
            extract_answer(&response(" ", vec![candidate(&[" "], None)])),
            GENERATION_FAILED_MESSAGE
        );
    }

    #[test]
    fn test_history_keeps_last_complete_turns() {
        let mut history: Vec<HistoryTurn> = (1..=7)
            .map(|i| HistoryTurn::new(format!("질문{}", i), format!("답변{}", i)))
            .collect();
        history[5].assistant = None;

        let rendered = format_history(&history, 5);
        assert!(!rendered.contains("질문2"));
        assert!(rendered.contains("질문3"));
        assert!(!rendered.contains("질문6"));
        assert!(rendered.ends_with("사용자: 질문7\n도우미: 답변7"));
        assert_eq!(rendered.lines().count(), 8);
    }

    #[test]
    fn test_empty_history_renders_empty() {
        assert!(format_history(&[], 5).is_empty());
    }
}
