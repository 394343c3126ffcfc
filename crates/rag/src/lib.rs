//! Course and professor question answering.
//!
//! A question flows through five stages that share one [`PipelineContext`]:
//! intent classification, structured course filtering, coverage-aware review
//! retrieval, merging with normalization, and grounded answer synthesis.
//! Every stage degrades to a safe default instead of failing the request.

pub mod catalog;
pub mod context;
pub mod embeddings;
pub mod index;
pub mod ingest;
pub mod intent;
pub mod merge;
pub mod pipeline;
pub mod retrieve;
pub mod store;
pub mod synthesize;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use catalog::{Catalog, CatalogStats};
pub use context::{PipelineContext, PipelineSettings, PromptSet};
pub use embeddings::{create_provider, EmbeddingProvider};
pub use index::{ReviewIndex, SqliteReviewIndex};
pub use ingest::{ingest_courses, ingest_reviews, IngestReport};
pub use pipeline::{DebugInfo, QueryPipeline, QueryResponse, TopReview};
pub use store::{CourseStore, SqliteCourseStore};
pub use types::{
    ComparisonTargets, ComparisonType, CourseKey, CourseRecord, FilterField, FilterOutcome,
    FilterProposal, HistoryTurn, MergedContext, MergedCourseView, ReviewExcerpt, ReviewFilter,
    ReviewPassage,
};
