//! Semantic retrieval with guaranteed coverage of named comparison targets.
//!
//! Plain top-k similarity favours whichever course has the most reviews, so
//! a comparison can lose one side entirely. When the question names courses
//! or professors, a guarantee phase first issues one point query per named
//! entity; the general similarity query then fills the remaining slots.

use crate::context::PipelineContext;
use crate::types::{ComparisonTargets, ComparisonType, CourseKey, FilterOutcome, ReviewFilter, ReviewPassage};
use coursemate_core::with_retry;
use futures::future::join_all;
use std::collections::HashSet;

/// One targeted lookup in the guarantee phase.
#[derive(Debug, Clone, PartialEq, Eq)]
enum GuaranteeQuery {
    /// Best single passage for an exact course or professor
    Point(ReviewFilter),
    /// First passage per distinct professor among the best few for a course
    ProfessorSpread(String),
}

fn plan_guarantees(targets: &ComparisonTargets) -> Vec<GuaranteeQuery> {
    if targets.comparison_type == ComparisonType::None {
        return Vec::new();
    }

    let spread_professors =
        targets.comparison_type == ComparisonType::Professor && targets.professors.is_empty();

    let mut plan: Vec<GuaranteeQuery> = targets
        .course_names
        .iter()
        .map(|course| {
            if spread_professors {
                GuaranteeQuery::ProfessorSpread(course.clone())
            } else {
                GuaranteeQuery::Point(ReviewFilter::CourseEq(course.clone()))
            }
        })
        .collect();

    if targets.comparison_type.includes_professors() {
        plan.extend(
            targets
                .professors
                .iter()
                .map(|p| GuaranteeQuery::Point(ReviewFilter::ProfessorEq(p.clone()))),
        );
    }

    plan
}

/// Run one index query; failures are logged and yield no passages.
async fn search_or_empty(
    ctx: &PipelineContext,
    embedding: &[f32],
    filter: &ReviewFilter,
    top_k: usize,
) -> Vec<ReviewPassage> {
    match with_retry(&ctx.retry, "review_index.search", || {
        ctx.index.search(embedding, filter, top_k)
    })
    .await
    {
        Ok(passages) => passages,
        Err(e) => {
            tracing::warn!("Review sub-query {:?} failed, treating as empty: {}", filter, e);
            Vec::new()
        }
    }
}

async fn run_guarantee(
    ctx: &PipelineContext,
    embedding: &[f32],
    query: &GuaranteeQuery,
) -> Vec<ReviewPassage> {
    match query {
        GuaranteeQuery::Point(filter) => search_or_empty(ctx, embedding, filter, 1).await,
        GuaranteeQuery::ProfessorSpread(course) => {
            let filter = ReviewFilter::CourseEq(course.clone());
            let passages =
                search_or_empty(ctx, embedding, &filter, ctx.settings.diversity_fetch).await;

            let mut professors = HashSet::new();
            passages
                .into_iter()
                .filter(|p| professors.insert(p.professor.clone()))
                .collect()
        }
    }
}

/// Retrieve up to `top_k` passages for `semantic_query`.
///
/// Guaranteed passages come first. The general query is restricted to the
/// candidate course names when the filter matched, and drops any passage
/// whose `(course, professor)` key the guarantee phase already covered.
/// Never fails: an embedding failure yields no passages.
pub async fn retrieve(
    ctx: &PipelineContext,
    semantic_query: &str,
    outcome: &FilterOutcome,
    targets: &ComparisonTargets,
    top_k: usize,
) -> Vec<ReviewPassage> {
    if top_k == 0 {
        return Vec::new();
    }

    let embedding = match ctx.embed_query(semantic_query).await {
        Ok(embedding) => embedding,
        Err(e) => {
            tracing::warn!("Could not embed semantic query, skipping retrieval: {}", e);
            return Vec::new();
        }
    };

    let plan = plan_guarantees(targets);
    let guarantee_ran = !plan.is_empty();

    let mut covered: HashSet<CourseKey> = HashSet::new();
    let mut guaranteed: Vec<ReviewPassage> = Vec::new();

    if guarantee_ran {
        // Independent reads; results are consumed in plan order
        let results = join_all(plan.iter().map(|q| run_guarantee(ctx, &embedding, q))).await;

        for passage in results.into_iter().flatten() {
            if covered.insert(passage.key()) {
                guaranteed.push(passage);
            }
        }

        tracing::info!(
            "Guarantee phase: {} sub-quer(ies), {} passage(s) covering {} key(s)",
            plan.len(),
            guaranteed.len(),
            covered.len()
        );
    }

    let mut wanted = top_k.saturating_sub(guaranteed.len());
    if guarantee_ran {
        wanted = wanted.saturating_mul(2);
    }

    let mut general = Vec::new();
    if wanted > 0 {
        let filter = match outcome {
            FilterOutcome::Matched(records) => {
                let mut names: Vec<String> = Vec::new();
                for record in records {
                    if !names.contains(&record.course_name) {
                        names.push(record.course_name.clone());
                    }
                }
                ReviewFilter::CourseIn(names)
            }
            FilterOutcome::Unconstrained | FilterOutcome::NoMatches => ReviewFilter::None,
        };

        general = search_or_empty(ctx, &embedding, &filter, wanted)
            .await
            .into_iter()
            .filter(|p| !covered.contains(&p.key()))
            .collect();
    }

    let mut passages = guaranteed;
    passages.extend(general);
    passages.truncate(top_k);

    tracing::info!("Retrieved {} passage(s) for top-{}", passages.len(), top_k);
    passages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(courses: &[&str], professors: &[&str], kind: ComparisonType) -> ComparisonTargets {
        ComparisonTargets {
            course_names: courses.iter().map(|s| s.to_string()).collect(),
            professors: professors.iter().map(|s| s.to_string()).collect(),
            comparison_type: kind,
        }
    }

    #[test]
    fn test_no_comparison_plans_nothing() {
        assert!(plan_guarantees(&targets(&["알고리즘"], &[], ComparisonType::None)).is_empty());
    }

    #[test]
    fn test_course_comparison_plans_point_queries() {
        let plan = plan_guarantees(&targets(
            &["운영체제", "컴퓨터네트워크"],
            &["이상현"],
            ComparisonType::Course,
        ));
        assert_eq!(
            plan,
            vec![
                GuaranteeQuery::Point(ReviewFilter::CourseEq("운영체제".to_string())),
                GuaranteeQuery::Point(ReviewFilter::CourseEq("컴퓨터네트워크".to_string())),
            ]
        );
    }

    #[test]
    fn test_professor_comparison_without_names_spreads() {
        let plan = plan_guarantees(&targets(&["알고리즘"], &[], ComparisonType::Professor));
        assert_eq!(plan, vec![GuaranteeQuery::ProfessorSpread("알고리즘".to_string())]);
    }

    #[test]
    fn test_both_plans_course_and_professor_points() {
        let plan = plan_guarantees(&targets(&["자료구조"], &["SHAN GAOYANG"], ComparisonType::Both));
        assert_eq!(
            plan,
            vec![
                GuaranteeQuery::Point(ReviewFilter::CourseEq("자료구조".to_string())),
                GuaranteeQuery::Point(ReviewFilter::ProfessorEq("SHAN GAOYANG".to_string())),
            ]
        );
    }
}
