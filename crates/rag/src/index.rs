//! SQLite-backed vector index over review passages.

use crate::catalog::{bytes_to_embedding, count_rows, passage_from_row, Catalog};
use crate::types::{ReviewFilter, ReviewPassage};
use async_trait::async_trait;
use coursemate_core::{AppError, AppResult};
use rusqlite::types::Value;

/// Similarity search over embedded reviews.
#[async_trait]
pub trait ReviewIndex: Send + Sync {
    /// The `top_k` passages most similar to `embedding` that satisfy `filter`,
    /// best first.
    async fn search(
        &self,
        embedding: &[f32],
        filter: &ReviewFilter,
        top_k: usize,
    ) -> AppResult<Vec<ReviewPassage>>;

    /// Total number of indexed passages.
    async fn count(&self) -> AppResult<usize>;
}

/// `ReviewIndex` over the `reviews` table of the catalog.
#[derive(Clone)]
pub struct SqliteReviewIndex {
    catalog: Catalog,
}

impl SqliteReviewIndex {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }
}

fn filter_clause(filter: &ReviewFilter) -> (String, Vec<Value>) {
    match filter {
        ReviewFilter::None => (String::new(), Vec::new()),
        ReviewFilter::CourseEq(name) => (
            "WHERE course_name = ?".to_string(),
            vec![Value::Text(name.clone())],
        ),
        ReviewFilter::ProfessorEq(name) => (
            "WHERE professor = ?".to_string(),
            vec![Value::Text(name.clone())],
        ),
        ReviewFilter::CourseIn(names) => {
            let placeholders = vec!["?"; names.len()].join(", ");
            (
                format!("WHERE course_name IN ({})", placeholders),
                names.iter().cloned().map(Value::Text).collect(),
            )
        }
    }
}

/// Full scan of the filtered reviews, scored against `embedding`.
fn scan_reviews(
    catalog: &Catalog,
    embedding: &[f32],
    filter: &ReviewFilter,
    top_k: usize,
) -> AppResult<Vec<ReviewPassage>> {
    let (clause, values) = filter_clause(filter);
    let sql = format!(
        "SELECT id, course_name, professor, department, rating, text, embedding
         FROM reviews {} ORDER BY rowid",
        clause
    );

    let conn = catalog.lock()?;
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| AppError::Index(format!("Failed to prepare review query: {}", e)))?;

    let rows = stmt
        .query_map(rusqlite::params_from_iter(values), |row| {
            let bytes: Vec<u8> = row.get(6)?;
            let stored = bytes_to_embedding(&bytes)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            passage_from_row(row, cosine_similarity(embedding, &stored))
        })
        .map_err(|e| AppError::Index(format!("Failed to query reviews: {}", e)))?;

    let mut results = rows
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Index(format!("Failed to read review row: {}", e)))?;

    // Stable sort keeps insertion order among equal scores
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(top_k);
    Ok(results)
}

#[async_trait]
impl ReviewIndex for SqliteReviewIndex {
    async fn search(
        &self,
        embedding: &[f32],
        filter: &ReviewFilter,
        top_k: usize,
    ) -> AppResult<Vec<ReviewPassage>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        if let ReviewFilter::CourseIn(names) = filter {
            if names.is_empty() {
                return Ok(Vec::new());
            }
        }

        // The scan holds the connection lock; keep it off the async workers
        let catalog = self.catalog.clone();
        let embedding = embedding.to_vec();
        let owned_filter = filter.clone();
        let results = tokio::task::spawn_blocking(move || {
            scan_reviews(&catalog, &embedding, &owned_filter, top_k)
        })
        .await
        .map_err(|e| AppError::Index(format!("Review search task failed: {}", e)))??;

        tracing::debug!(
            "Retrieved {} passage(s) (requested top-{}, filter {:?})",
            results.len(),
            top_k,
            filter
        );

        Ok(results)
    }

    async fn count(&self) -> AppResult<usize> {
        let catalog = self.catalog.clone();
        tokio::task::spawn_blocking(move || {
            let conn = catalog.lock()?;
            count_rows(&conn, "reviews")
        })
        .await
        .map_err(|e| AppError::Index(format!("Review count task failed: {}", e)))?
    }
}

/// Calculate cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NewReview;

    fn seeded_index() -> SqliteReviewIndex {
        let catalog = Catalog::open_in_memory().unwrap();
        let rows: [(&str, &str, &str, [f32; 3]); 4] = [
            ("알고리즘", "조다정", "과제가 많지만 배우는 게 많음", [1.0, 0.0, 0.0]),
            ("알고리즘", "HAMANDAWANA PRINCE", "영어 강의라 어려움", [0.9, 0.1, 0.0]),
            ("자료구조", "SHAN GAOYANG", "설명이 친절함", [0.0, 1.0, 0.0]),
            ("운영체제", "이상현", "시험이 어려움", [0.0, 0.0, 1.0]),
        ];
        for (course, professor, text, embedding) in rows {
            catalog
                .upsert_review(
                    &NewReview {
                        course_name: course.to_string(),
                        professor: professor.to_string(),
                        department: None,
                        semester: None,
                        rating: Some(4.0),
                        text: text.to_string(),
                    },
                    &embedding,
                )
                .unwrap();
        }
        SqliteReviewIndex::new(catalog)
    }

    #[tokio::test]
    async fn test_search_ranks_by_similarity() {
        let index = seeded_index();
        let results = index
            .search(&[1.0, 0.0, 0.0], &ReviewFilter::None, 2)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].professor, "조다정");
        assert_eq!(results[1].professor, "HAMANDAWANA PRINCE");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_equality_filters() {
        let index = seeded_index();
        let by_course = index
            .search(&[1.0, 0.0, 0.0], &ReviewFilter::CourseEq("자료구조".to_string()), 5)
            .await
            .unwrap();
        let by_professor = index
            .search(&[0.0, 1.0, 0.0], &ReviewFilter::ProfessorEq("이상현".to_string()), 5)
            .await
            .unwrap();

        assert_eq!(by_course.len(), 1);
        assert_eq!(by_course[0].professor, "SHAN GAOYANG");
        assert_eq!(by_professor.len(), 1);
        assert_eq!(by_professor[0].course_name, "운영체제");
    }

    #[tokio::test]
    async fn test_in_set_filter() {
        let index = seeded_index();
        let filter = ReviewFilter::CourseIn(vec!["자료구조".to_string(), "운영체제".to_string()]);
        let results = index.search(&[1.0, 0.0, 0.0], &filter, 10).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|p| p.course_name != "알고리즘"));

        let empty = index
            .search(&[1.0, 0.0, 0.0], &ReviewFilter::CourseIn(Vec::new()), 10)
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_count() {
        assert_eq!(seeded_index().count().await.unwrap(), 4);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 0.001);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
