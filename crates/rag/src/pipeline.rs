//! End-to-end query handling.
//!
//! classify → filter → retrieve → merge → normalize → synthesize.

use crate::context::PipelineContext;
use crate::intent::classify;
use crate::merge::{merge, normalize_with, truncate_excerpt};
use crate::retrieve::retrieve;
use crate::store::filter_courses;
use crate::synthesize::synthesize;
use crate::types::{FilterOutcome, FilterProposal, HistoryTurn, ReviewPassage};
use coursemate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Evidence line returned alongside the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopReview {
    pub course_name: String,
    pub professor: String,
    pub text: String,
    pub rating: f64,
}

/// Diagnostics about how the answer was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub intent: FilterProposal,
    pub structured_candidates: usize,
    pub passage_hits: usize,
}

/// Answer plus evidence summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub top_reviews: Vec<TopReview>,
    pub debug: DebugInfo,
}

/// Runs questions through the pipeline against one shared context.
#[derive(Clone)]
pub struct QueryPipeline {
    ctx: Arc<PipelineContext>,
}

impl QueryPipeline {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Answer one question.
    ///
    /// Stage failures degrade inside the pipeline. The only errors returned
    /// are an empty query and the request-level timeout.
    pub async fn answer(&self, query: &str, history: &[HistoryTurn]) -> AppResult<QueryResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Other("Query must not be empty".to_string()));
        }

        let budget = self.ctx.settings.request_timeout;
        tokio::time::timeout(budget, self.run(query, history))
            .await
            .map_err(|_| AppError::Timeout(format!("Request did not complete within {:?}", budget)))
    }

    #[tracing::instrument(skip(self, history), fields(history_turns = history.len()))]
    async fn run(&self, query: &str, history: &[HistoryTurn]) -> QueryResponse {
        let ctx = self.ctx.as_ref();
        let settings = &ctx.settings;

        let proposal = classify(ctx, query).await;

        let outcome = if proposal.needs_structured_filter {
            filter_courses(ctx, &proposal.filters).await
        } else {
            FilterOutcome::Unconstrained
        };
        let candidates = outcome.candidates();

        let passages = retrieve(
            ctx,
            &proposal.semantic_query,
            &outcome,
            &proposal.comparison_targets,
            settings.top_k,
        )
        .await;

        let context = normalize_with(merge(candidates, &passages), settings.excerpt_chars);

        tracing::info!(
            "Context: {} candidate(s), {} passage(s), {} course view(s)",
            candidates.len(),
            passages.len(),
            context.courses.len()
        );

        let answer = synthesize(ctx, query, &context, history).await;

        QueryResponse {
            answer,
            top_reviews: top_reviews(&passages, settings.top_reviews, settings.excerpt_chars),
            debug: DebugInfo {
                structured_candidates: candidates.len(),
                passage_hits: passages.len(),
                intent: proposal,
            },
        }
    }
}

fn top_reviews(passages: &[ReviewPassage], limit: usize, max_chars: usize) -> Vec<TopReview> {
    passages
        .iter()
        .take(limit)
        .map(|p| TopReview {
            course_name: p.course_name.clone(),
            professor: p.professor.clone(),
            text: truncate_excerpt(&p.text, max_chars),
            rating: p.rating.filter(|r| r.is_finite()).unwrap_or(0.0),
        })
        .collect()
}
