//! Loading course records and reviews into the catalog.
//!
//! Both inputs are JSON Lines. Malformed lines are logged and skipped.
//! Ingestion is the only writer; query handling never calls into this module.

use crate::catalog::{Catalog, NewReview};
use crate::embeddings::EmbeddingProvider;
use crate::types::CourseRecord;
use coursemate_core::{with_retry, AppError, AppResult, RetryPolicy};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Reviews embedded per provider call.
const EMBED_BATCH_SIZE: usize = 32;

/// Counts reported after an ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub written: usize,
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct CourseDetails {
    #[serde(default)]
    credits: Option<u32>,
    #[serde(default)]
    time_slot: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CourseLine {
    #[serde(default)]
    course_id: Option<String>,
    course_name: String,
    professor: String,
    #[serde(default)]
    department: Option<String>,
    #[serde(default)]
    semester: Option<String>,
    #[serde(default)]
    credits: Option<u32>,
    #[serde(default, alias = "time_slot")]
    schedule: Option<String>,
    #[serde(default)]
    teaching_mode: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    details: Option<CourseDetails>,
    #[serde(default)]
    total_reviews: u32,
    #[serde(default)]
    average_rating: Option<f64>,
}

impl CourseLine {
    fn into_record(self) -> CourseRecord {
        let (detail_credits, detail_slot) = match self.details {
            Some(details) => (details.credits, details.time_slot),
            None => (None, None),
        };

        let course_id = self
            .course_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| derive_course_id(&self.course_name, &self.professor, self.semester.as_deref()));

        CourseRecord {
            course_id,
            course_name: self.course_name,
            professor: self.professor,
            department: self.department,
            semester: self.semester,
            credits: self.credits.or(detail_credits),
            schedule: self.schedule.or(detail_slot),
            teaching_mode: self.teaching_mode,
            category: self.category,
            total_reviews: self.total_reviews,
            average_rating: self.average_rating,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReviewLine {
    course_name: String,
    professor: String,
    #[serde(default)]
    department: Option<String>,
    #[serde(default)]
    semester: Option<String>,
    #[serde(default)]
    rating: Option<f64>,
    text: String,
}

fn derive_course_id(course_name: &str, professor: &str, semester: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(course_name.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(professor.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(semester.unwrap_or("").as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("course_{}", &digest[..16])
}

/// Parse JSON Lines, skipping blank and malformed lines.
fn read_jsonl<T: serde::de::DeserializeOwned>(path: &Path) -> AppResult<(Vec<T>, usize)> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::Config(format!("Failed to read {:?}: {}", path, e))
    })?;

    let mut items = Vec::new();
    let mut skipped = 0;
    for (number, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line) {
            Ok(item) => items.push(item),
            Err(e) => {
                tracing::warn!("Skipping {:?} line {}: {}", path, number + 1, e);
                skipped += 1;
            }
        }
    }

    Ok((items, skipped))
}

/// Load course records from a JSONL file.
pub fn ingest_courses(catalog: &Catalog, path: &Path) -> AppResult<IngestReport> {
    let (lines, mut skipped) = read_jsonl::<CourseLine>(path)?;
    let mut written = 0;

    for line in lines {
        if line.course_name.trim().is_empty() {
            skipped += 1;
            continue;
        }
        catalog.upsert_course(&line.into_record())?;
        written += 1;
    }

    tracing::info!("Ingested {} course(s) from {:?} ({} skipped)", written, path, skipped);
    Ok(IngestReport { written, skipped })
}

/// Embed and load reviews from a JSONL file.
///
/// Review text is embedded with `passage_prefix` prepended.
pub async fn ingest_reviews(
    catalog: &Catalog,
    embedder: &dyn EmbeddingProvider,
    passage_prefix: &str,
    retry: &RetryPolicy,
    path: &Path,
) -> AppResult<IngestReport> {
    let (lines, mut skipped) = read_jsonl::<ReviewLine>(path)?;

    let reviews: Vec<NewReview> = lines
        .into_iter()
        .filter_map(|line| {
            let text = line.text.trim().to_string();
            if text.is_empty() || line.course_name.trim().is_empty() {
                skipped += 1;
                return None;
            }
            Some(NewReview {
                course_name: line.course_name,
                professor: line.professor,
                department: line.department,
                semester: line.semester,
                rating: line.rating,
                text,
            })
        })
        .collect();

    let mut written = 0;
    for batch in reviews.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<String> = batch
            .iter()
            .map(|r| format!("{}{}", passage_prefix, r.text))
            .collect();

        let embeddings = with_retry(retry, "embedder.embed_batch", || embedder.embed_batch(&texts)).await?;
        if embeddings.len() != batch.len() {
            return Err(AppError::Embedding(format!(
                "Provider returned {} embeddings for {} reviews",
                embeddings.len(),
                batch.len()
            )));
        }

        for (review, embedding) in batch.iter().zip(&embeddings) {
            catalog.upsert_review(review, embedding)?;
            written += 1;
        }

        tracing::debug!("Embedded {}/{} reviews", written, reviews.len());
    }

    tracing::info!("Ingested {} review(s) from {:?} ({} skipped)", written, path, skipped);
    Ok(IngestReport { written, skipped })
}
