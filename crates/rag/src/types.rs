//! Core types for the course question pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Course attributes the structured filter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    CourseName,
    Professor,
    Department,
    Semester,
    Credits,
    Schedule,
    TeachingMode,
    Category,
}

impl FilterField {
    pub const ALL: [FilterField; 8] = [
        FilterField::CourseName,
        FilterField::Professor,
        FilterField::Department,
        FilterField::Semester,
        FilterField::Credits,
        FilterField::Schedule,
        FilterField::TeachingMode,
        FilterField::Category,
    ];

    /// Parse a field name as emitted by the classifier. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|field| field.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterField::CourseName => "course_name",
            FilterField::Professor => "professor",
            FilterField::Department => "department",
            FilterField::Semester => "semester",
            FilterField::Credits => "credits",
            FilterField::Schedule => "schedule",
            FilterField::TeachingMode => "teaching_mode",
            FilterField::Category => "category",
        }
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a question compares, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonType {
    Course,
    Professor,
    Both,
    #[default]
    None,
}

impl ComparisonType {
    /// Unknown values collapse to `None`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "course" => ComparisonType::Course,
            "professor" => ComparisonType::Professor,
            "both" => ComparisonType::Both,
            _ => ComparisonType::None,
        }
    }

    /// Whether named professors get their own point queries.
    pub fn includes_professors(&self) -> bool {
        matches!(self, ComparisonType::Professor | ComparisonType::Both)
    }
}

/// Courses and professors explicitly named in a question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonTargets {
    pub course_names: Vec<String>,
    pub professors: Vec<String>,
    pub comparison_type: ComparisonType,
}

/// Structured reading of a user question, produced once per query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterProposal {
    pub needs_structured_filter: bool,
    pub filters: BTreeMap<FilterField, String>,
    pub semantic_query: String,
    pub comparison_targets: ComparisonTargets,
}

impl FilterProposal {
    /// Proposal used when classification fails: no filters, raw query, no comparison.
    pub fn fallback(user_query: &str) -> Self {
        Self {
            needs_structured_filter: false,
            filters: BTreeMap::new(),
            semantic_query: user_query.to_string(),
            comparison_targets: ComparisonTargets::default(),
        }
    }
}

/// A course row from the structured store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseRecord {
    pub course_id: String,
    pub course_name: String,
    pub professor: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub semester: Option<String>,
    #[serde(default)]
    pub credits: Option<u32>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub teaching_mode: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub total_reviews: u32,
    #[serde(default)]
    pub average_rating: Option<f64>,
}

/// One retrieved review with its source metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewPassage {
    pub text: String,
    pub course_name: String,
    pub professor: String,
    #[serde(default)]
    pub department: Option<String>,
    pub rating: Option<f64>,
    pub origin_id: String,
    /// Cosine similarity to the query embedding
    #[serde(default)]
    pub score: f32,
}

impl ReviewPassage {
    pub fn key(&self) -> CourseKey {
        CourseKey::new(&self.course_name, &self.professor)
    }
}

/// Identity of one offering: a course name taught by one professor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CourseKey {
    pub course_name: String,
    pub professor: String,
}

impl CourseKey {
    pub fn new(course_name: impl Into<String>, professor: impl Into<String>) -> Self {
        Self {
            course_name: course_name.into(),
            professor: professor.into(),
        }
    }
}

impl fmt::Display for CourseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.course_name, self.professor)
    }
}

/// Result of the structured filter stage.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    /// No structural constraint was requested, or the store could not be queried
    Unconstrained,
    /// The constraint matched these records, in store order
    Matched(Vec<CourseRecord>),
    /// The constraint was valid but matched nothing
    NoMatches,
}

impl FilterOutcome {
    /// Matched records, empty for the other variants.
    pub fn candidates(&self) -> &[CourseRecord] {
        match self {
            FilterOutcome::Matched(records) => records,
            FilterOutcome::Unconstrained | FilterOutcome::NoMatches => &[],
        }
    }
}

/// Metadata restriction applied to a review index query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewFilter {
    None,
    CourseEq(String),
    ProfessorEq(String),
    CourseIn(Vec<String>),
}

/// A trimmed review as shown to the answer model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewExcerpt {
    pub professor: String,
    pub text: String,
}

/// Everything known about one course name, from both sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedCourseView {
    pub course_name: String,
    pub professor: String,
    pub department: Option<String>,
    /// Average rating; 0.0 when unknown
    pub rating: f64,
    pub review_count: usize,
    pub reviews: Vec<ReviewExcerpt>,
}

/// Merged evidence handed to the synthesizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedContext {
    pub courses: Vec<MergedCourseView>,
}

/// One prior exchange. Either side may be missing in client payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryTurn {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub assistant: Option<String>,
}

impl HistoryTurn {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            assistant: Some(assistant.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_field_parse() {
        assert_eq!(FilterField::parse("course_name"), Some(FilterField::CourseName));
        assert_eq!(FilterField::parse(" Teaching_Mode "), Some(FilterField::TeachingMode));
        assert_eq!(FilterField::parse("year"), None);
    }

    #[test]
    fn test_comparison_type_unknown_is_none() {
        assert_eq!(ComparisonType::parse("professor"), ComparisonType::Professor);
        assert_eq!(ComparisonType::parse("BOTH"), ComparisonType::Both);
        assert_eq!(ComparisonType::parse("department"), ComparisonType::None);
    }

    #[test]
    fn test_proposal_serializes_with_snake_case_keys() {
        let mut proposal = FilterProposal::fallback("q");
        proposal
            .filters
            .insert(FilterField::TeachingMode, "온라인".to_string());

        let json = serde_json::to_value(&proposal).unwrap();
        assert_eq!(json["filters"]["teaching_mode"], "온라인");
        assert_eq!(json["comparison_targets"]["comparison_type"], "none");
    }

    #[test]
    fn test_filter_outcome_candidates() {
        let record = CourseRecord {
            course_name: "알고리즘".to_string(),
            ..Default::default()
        };
        assert_eq!(FilterOutcome::Matched(vec![record]).candidates().len(), 1);
        assert!(FilterOutcome::NoMatches.candidates().is_empty());
        assert!(FilterOutcome::Unconstrained.candidates().is_empty());
    }

    #[test]
    fn test_history_turn_accepts_partial_payload() {
        let turn: HistoryTurn = serde_json::from_str(r#"{"user":"안녕"}"#).unwrap();
        assert_eq!(turn.user.as_deref(), Some("안녕"));
        assert!(turn.assistant.is_none());
    }
}
