//! Named comparison targets survive review-density bias.

use super::support::{course, Fixture, ProfessorOutageIndex, ScriptedLlm};
use crate::index::SqliteReviewIndex;
use crate::retrieve::retrieve;
use crate::store::SqliteCourseStore;
use crate::types::{ComparisonTargets, ComparisonType, CourseKey, FilterOutcome};
use std::collections::HashSet;
use std::sync::Arc;

async fn lopsided() -> Fixture {
    let fixture = Fixture::new();
    for i in 0..8 {
        fixture
            .add_review(
                "운영체제",
                "이상현",
                3.0,
                &format!("시험 난이도가 높고 시험 범위가 넓어요 {}", i),
            )
            .await;
    }
    fixture
        .add_review("컴퓨터네트워크", "박지훈", 4.0, "팀플 위주로 진행됩니다")
        .await;
    fixture
}

fn course_targets(names: &[&str]) -> ComparisonTargets {
    ComparisonTargets {
        course_names: names.iter().map(|s| s.to_string()).collect(),
        professors: Vec::new(),
        comparison_type: ComparisonType::Course,
    }
}

#[tokio::test]
async fn test_plain_similarity_misses_sparse_course() {
    let fixture = lopsided().await;
    let ctx = fixture.context(ScriptedLlm::texts(&[]));

    let passages = retrieve(
        &ctx,
        "시험 난이도",
        &FilterOutcome::Unconstrained,
        &ComparisonTargets::default(),
        2,
    )
    .await;

    assert_eq!(passages.len(), 2);
    assert!(passages.iter().all(|p| p.course_name == "운영체제"));
}

#[tokio::test]
async fn test_course_comparison_covers_every_named_course() {
    let fixture = lopsided().await;
    let ctx = fixture.context(ScriptedLlm::texts(&[]));

    for top_k in [2, 3, 5] {
        let passages = retrieve(
            &ctx,
            "시험 난이도",
            &FilterOutcome::Unconstrained,
            &course_targets(&["운영체제", "컴퓨터네트워크"]),
            top_k,
        )
        .await;

        let courses: HashSet<&str> = passages.iter().map(|p| p.course_name.as_str()).collect();
        assert!(courses.contains("운영체제"), "top_k={}", top_k);
        assert!(courses.contains("컴퓨터네트워크"), "top_k={}", top_k);
        assert!(passages.len() <= top_k);
    }
}

#[tokio::test]
async fn test_guaranteed_passages_lead_and_keys_are_unique() {
    let fixture = lopsided().await;
    let ctx = fixture.context(ScriptedLlm::texts(&[]));

    let passages = retrieve(
        &ctx,
        "시험 난이도",
        &FilterOutcome::Unconstrained,
        &course_targets(&["컴퓨터네트워크", "운영체제"]),
        10,
    )
    .await;

    assert_eq!(passages[0].course_name, "컴퓨터네트워크");
    assert_eq!(passages[1].course_name, "운영체제");

    let keys: Vec<CourseKey> = passages.iter().map(|p| p.key()).collect();
    let unique: HashSet<&CourseKey> = keys.iter().collect();
    assert_eq!(keys.len(), unique.len());
}

#[tokio::test]
async fn test_matched_candidates_restrict_general_phase() {
    let fixture = lopsided().await;
    let ctx = fixture.context(ScriptedLlm::texts(&[]));

    let outcome = FilterOutcome::Matched(vec![course("컴퓨터네트워크", "박지훈", Some(4.0))]);
    let passages = retrieve(&ctx, "시험 난이도", &outcome, &ComparisonTargets::default(), 5).await;

    assert_eq!(passages.len(), 1);
    assert_eq!(passages[0].course_name, "컴퓨터네트워크");
}

#[tokio::test]
async fn test_failed_sub_query_does_not_sink_retrieval() {
    let fixture = lopsided().await;
    let ctx = fixture.context_with(
        ScriptedLlm::texts(&[]),
        Arc::new(SqliteCourseStore::new(fixture.catalog.clone())),
        Arc::new(ProfessorOutageIndex {
            inner: SqliteReviewIndex::new(fixture.catalog.clone()),
        }),
    );

    let targets = ComparisonTargets {
        course_names: vec!["컴퓨터네트워크".to_string()],
        professors: vec!["이상현".to_string()],
        comparison_type: ComparisonType::Both,
    };
    let passages = retrieve(&ctx, "시험 난이도", &FilterOutcome::Unconstrained, &targets, 3).await;

    assert_eq!(passages[0].course_name, "컴퓨터네트워크");
    assert_eq!(passages.len(), 3);
}

#[tokio::test]
async fn test_zero_top_k_returns_nothing() {
    let fixture = lopsided().await;
    let ctx = fixture.context(ScriptedLlm::texts(&[]));

    let passages = retrieve(
        &ctx,
        "시험 난이도",
        &FilterOutcome::Unconstrained,
        &course_targets(&["운영체제"]),
        0,
    )
    .await;
    assert!(passages.is_empty());
}
