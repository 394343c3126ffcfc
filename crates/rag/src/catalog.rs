//! SQLite catalog holding course records and embedded reviews.
//!
//! One database file backs both the structured course store and the review
//! index. Query paths only read; writes happen during ingestion.

use crate::types::{CourseRecord, ReviewPassage};
use chrono::Utc;
use coursemate_core::{AppError, AppResult};
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS courses (
    course_id TEXT PRIMARY KEY,
    course_name TEXT NOT NULL,
    professor TEXT NOT NULL,
    department TEXT,
    semester TEXT,
    credits INTEGER,
    schedule TEXT,
    teaching_mode TEXT,
    category TEXT,
    total_reviews INTEGER NOT NULL DEFAULT 0,
    average_rating REAL
);

CREATE TABLE IF NOT EXISTS reviews (
    id TEXT PRIMARY KEY,
    course_name TEXT NOT NULL,
    professor TEXT NOT NULL,
    department TEXT,
    semester TEXT,
    rating REAL,
    text TEXT NOT NULL,
    embedding BLOB NOT NULL,
    ingested_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reviews_course ON reviews(course_name);
CREATE INDEX IF NOT EXISTS idx_reviews_professor ON reviews(professor);
"#;

/// Row counts reported by `coursemate stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CatalogStats {
    pub courses: usize,
    pub reviews: usize,
}

/// A review ready to be written, with its semester for identity hashing.
#[derive(Debug, Clone)]
pub struct NewReview {
    pub course_name: String,
    pub professor: String,
    pub department: Option<String>,
    pub semester: Option<String>,
    pub rating: Option<f64>,
    pub text: String,
}

impl NewReview {
    /// Stable ID so re-ingesting the same review replaces it.
    pub fn origin_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.course_name.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(self.professor.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(self.semester.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"\x1f");
        hasher.update(self.text.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        format!("review_{}", &digest[..16])
    }
}

/// Shared handle to the catalog database.
#[derive(Clone)]
pub struct Catalog {
    conn: Arc<Mutex<Connection>>,
}

impl Catalog {
    /// Open (and create if needed) the catalog at `db_path`.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Store(format!("Failed to create catalog directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Store(format!("Failed to open SQLite catalog: {}", e)))?;

        tracing::debug!("Opened catalog at {:?}", db_path);
        Self::init(conn)
    }

    /// Open a private in-memory catalog.
    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Store(format!("Failed to open in-memory catalog: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| AppError::Store(format!("Failed to create tables: {}", e)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Store("Catalog connection lock poisoned".to_string()))
    }

    /// Insert or replace a course record.
    pub fn upsert_course(&self, course: &CourseRecord) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO courses (course_id, course_name, professor, department, semester,
                credits, schedule, teaching_mode, category, total_reviews, average_rating)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                course.course_id,
                course.course_name,
                course.professor,
                course.department,
                course.semester,
                course.credits,
                course.schedule,
                course.teaching_mode,
                course.category,
                course.total_reviews,
                course.average_rating,
            ],
        )
        .map_err(|e| AppError::Store(format!("Failed to insert course: {}", e)))?;

        Ok(())
    }

    /// Insert or replace a review with its embedding. Returns the origin ID.
    pub fn upsert_review(&self, review: &NewReview, embedding: &[f32]) -> AppResult<String> {
        let id = review.origin_id();
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO reviews (id, course_name, professor, department, semester,
                rating, text, embedding, ingested_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                review.course_name,
                review.professor,
                review.department,
                review.semester,
                review.rating,
                review.text,
                embedding_to_bytes(embedding),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| AppError::Index(format!("Failed to insert review: {}", e)))?;

        Ok(id)
    }

    /// Delete every course and review.
    pub fn reset(&self) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM reviews", [])
            .map_err(|e| AppError::Index(format!("Failed to delete reviews: {}", e)))?;
        conn.execute("DELETE FROM courses", [])
            .map_err(|e| AppError::Store(format!("Failed to delete courses: {}", e)))?;

        tracing::info!("Reset course catalog");
        Ok(())
    }

    pub fn stats(&self) -> AppResult<CatalogStats> {
        let conn = self.lock()?;
        Ok(CatalogStats {
            courses: count_rows(&conn, "courses")?,
            reviews: count_rows(&conn, "reviews")?,
        })
    }
}

pub(crate) fn count_rows(conn: &Connection, table: &str) -> AppResult<usize> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get::<_, i64>(0)
    })
    .map(|n| n.max(0) as usize)
    .map_err(|e| AppError::Store(format!("Failed to count {}: {}", table, e)))
}

/// Convert embedding vector to little-endian bytes for storage.
pub(crate) fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to an embedding vector.
pub(crate) fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Index(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Map a `reviews` row (id, course_name, professor, department, rating, text) to a passage.
pub(crate) fn passage_from_row(row: &rusqlite::Row<'_>, score: f32) -> rusqlite::Result<ReviewPassage> {
    Ok(ReviewPassage {
        origin_id: row.get(0)?,
        course_name: row.get(1)?,
        professor: row.get(2)?,
        department: row.get(3)?,
        rating: row.get(4)?,
        text: row.get(5)?,
        score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn review(text: &str) -> NewReview {
        NewReview {
            course_name: "자료구조".to_string(),
            professor: "SHAN GAOYANG".to_string(),
            department: Some("소프트웨어학과".to_string()),
            semester: Some("2024-2".to_string()),
            rating: Some(5.0),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_open_creates_file_and_tables() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/catalog.sqlite");
        let catalog = Catalog::open(&path).unwrap();

        assert!(path.exists());
        assert_eq!(catalog.stats().unwrap(), CatalogStats { courses: 0, reviews: 0 });
    }

    #[test]
    fn test_reingesting_same_review_replaces_it() {
        let catalog = Catalog::open_in_memory().unwrap();
        let first = catalog.upsert_review(&review("설명이 친절함"), &[1.0, 0.0]).unwrap();
        let second = catalog.upsert_review(&review("설명이 친절함"), &[0.0, 1.0]).unwrap();
        catalog.upsert_review(&review("과제가 많음"), &[0.5, 0.5]).unwrap();

        assert_eq!(first, second);
        assert!(first.starts_with("review_"));
        assert_eq!(catalog.stats().unwrap().reviews, 2);
    }

    #[test]
    fn test_reset_clears_both_tables() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog
            .upsert_course(&CourseRecord {
                course_id: "CSE201".to_string(),
                course_name: "자료구조".to_string(),
                professor: "SHAN GAOYANG".to_string(),
                ..Default::default()
            })
            .unwrap();
        catalog.upsert_review(&review("좋아요"), &[1.0]).unwrap();

        catalog.reset().unwrap();
        assert_eq!(catalog.stats().unwrap(), CatalogStats { courses: 0, reviews: 0 });
    }

    #[test]
    fn test_embedding_bytes_roundtrip() {
        let embedding = vec![0.25_f32, -1.5, 3.0];
        let bytes = embedding_to_bytes(&embedding);
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes_to_embedding(&bytes).unwrap(), embedding);
        assert!(bytes_to_embedding(&bytes[..5]).is_err());
    }
}
