//! Merging structured candidates with retrieved passages.

use crate::types::{CourseRecord, MergedContext, MergedCourseView, ReviewExcerpt, ReviewPassage};
use std::collections::HashMap;

/// Appended to excerpts cut at the length cap.
pub const TRUNCATION_MARKER: &str = "...";

/// Default excerpt length cap in code points.
pub const DEFAULT_EXCERPT_CHARS: usize = 200;

/// Group passages by course name and attach candidate attributes.
///
/// Courses with passages come first, in order of their best passage; candidates
/// without passages follow in store order with an empty review list. A
/// candidate supplies the course attributes when one exists for the name,
/// otherwise the first passage does. Professors sharing a course name share
/// one view; each excerpt keeps its own professor.
pub fn merge(candidates: &[CourseRecord], passages: &[ReviewPassage]) -> MergedContext {
    let mut by_name: HashMap<&str, &CourseRecord> = HashMap::new();
    for record in candidates {
        by_name.entry(record.course_name.as_str()).or_insert(record);
    }

    let mut courses: Vec<MergedCourseView> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();

    for passage in passages {
        let slot = match position.get(&passage.course_name) {
            Some(&i) => i,
            None => {
                let view = match by_name.get(passage.course_name.as_str()) {
                    Some(record) => view_from_record(record),
                    None => MergedCourseView {
                        course_name: passage.course_name.clone(),
                        professor: passage.professor.clone(),
                        department: passage.department.clone(),
                        rating: finite_or_zero(passage.rating),
                        review_count: 0,
                        reviews: Vec::new(),
                    },
                };
                courses.push(view);
                position.insert(passage.course_name.clone(), courses.len() - 1);
                courses.len() - 1
            }
        };

        courses[slot].reviews.push(ReviewExcerpt {
            professor: passage.professor.clone(),
            text: passage.text.clone(),
        });
    }

    for record in candidates {
        if !position.contains_key(&record.course_name) {
            position.insert(record.course_name.clone(), courses.len());
            courses.push(view_from_record(record));
        }
    }

    for view in &mut courses {
        view.review_count = view.reviews.len();
    }

    MergedContext { courses }
}

fn view_from_record(record: &CourseRecord) -> MergedCourseView {
    MergedCourseView {
        course_name: record.course_name.clone(),
        professor: record.professor.clone(),
        department: record.department.clone(),
        rating: finite_or_zero(record.average_rating),
        review_count: 0,
        reviews: Vec::new(),
    }
}

fn finite_or_zero(rating: Option<f64>) -> f64 {
    rating.filter(|r| r.is_finite()).unwrap_or(0.0)
}

/// Normalize with the default excerpt cap.
pub fn normalize(context: MergedContext) -> MergedContext {
    normalize_with(context, DEFAULT_EXCERPT_CHARS)
}

/// Coerce ratings, cap excerpts and recompute review counts. Idempotent.
pub fn normalize_with(mut context: MergedContext, max_chars: usize) -> MergedContext {
    for view in &mut context.courses {
        if !view.rating.is_finite() {
            view.rating = 0.0;
        }

        for excerpt in &mut view.reviews {
            excerpt.text = truncate_excerpt(&excerpt.text, max_chars);
        }

        view.review_count = view.reviews.len();
    }
    context
}

/// Cap `text` at `max_chars` code points plus [`TRUNCATION_MARKER`].
///
/// Text that is already exactly `max_chars` code points followed by the
/// marker is returned unchanged.
pub fn truncate_excerpt(text: &str, max_chars: usize) -> String {
    let length = text.chars().count();
    if length <= max_chars {
        return text.to_string();
    }

    let marker_chars = TRUNCATION_MARKER.chars().count();
    if length == max_chars + marker_chars && text.ends_with(TRUNCATION_MARKER) {
        return text.to_string();
    }

    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str(TRUNCATION_MARKER);
    cut
}
