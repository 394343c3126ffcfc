//! Structured course store and the filter stage built on it.

use crate::catalog::{count_rows, Catalog};
use crate::context::PipelineContext;
use crate::types::{CourseRecord, FilterField, FilterOutcome};
use async_trait::async_trait;
use coursemate_core::{with_retry, AppError, AppResult};
use rusqlite::types::Value;
use std::collections::BTreeMap;

/// Read access to course records.
#[async_trait]
pub trait CourseStore: Send + Sync {
    /// Records matching every filter, in store order, at most `limit`.
    async fn find(
        &self,
        filters: &BTreeMap<FilterField, String>,
        limit: usize,
    ) -> AppResult<Vec<CourseRecord>>;

    /// Total number of records.
    async fn count(&self) -> AppResult<usize>;
}

/// `CourseStore` over the `courses` table of the catalog.
#[derive(Clone)]
pub struct SqliteCourseStore {
    catalog: Catalog,
}

impl SqliteCourseStore {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }
}

fn column(field: FilterField) -> &'static str {
    match field {
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

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Build the WHERE clause and its parameters for a conjunctive filter.
fn build_predicate(filters: &BTreeMap<FilterField, String>) -> (String, Vec<Value>) {
    let mut clauses = Vec::with_capacity(filters.len());
    let mut values = Vec::with_capacity(filters.len());

    for (field, raw) in filters {
        let value = raw.trim();
        match field {
            FilterField::Credits => {
                // "3학점" and "3" both mean three credits
                let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
                clauses.push("CAST(credits AS TEXT) = ?".to_string());
                values.push(Value::Text(if digits.is_empty() {
                    value.to_string()
                } else {
                    digits
                }));
            }
            _ => {
                clauses.push(format!(
                    "LOWER({}) LIKE '%' || LOWER(?) || '%' ESCAPE '\\'",
                    column(*field)
                ));
                values.push(Value::Text(escape_like(value)));
            }
        }
    }

    let clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    (clause, values)
}

fn query_courses(
    catalog: &Catalog,
    filters: &BTreeMap<FilterField, String>,
    limit: usize,
) -> AppResult<Vec<CourseRecord>> {
    let (clause, mut values) = build_predicate(filters);
    values.push(Value::Integer(limit.min(i64::MAX as usize) as i64));

    let sql = format!(
        "SELECT course_id, course_name, professor, department, semester, credits, schedule,
                teaching_mode, category, total_reviews, average_rating
         FROM courses {} ORDER BY rowid LIMIT ?",
        clause
    );

    let conn = catalog.lock()?;
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| AppError::Store(format!("Failed to prepare course query: {}", e)))?;

    let rows = stmt
        .query_map(rusqlite::params_from_iter(values), |row| {
            Ok(CourseRecord {
                course_id: row.get(0)?,
                course_name: row.get(1)?,
                professor: row.get(2)?,
                department: row.get(3)?,
                semester: row.get(4)?,
                credits: row.get(5)?,
                schedule: row.get(6)?,
                teaching_mode: row.get(7)?,
                category: row.get(8)?,
                total_reviews: row.get(9)?,
                average_rating: row.get(10)?,
            })
        })
        .map_err(|e| AppError::Store(format!("Failed to query courses: {}", e)))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Store(format!("Failed to read course row: {}", e)))
}

#[async_trait]
impl CourseStore for SqliteCourseStore {
    async fn find(
        &self,
        filters: &BTreeMap<FilterField, String>,
        limit: usize,
    ) -> AppResult<Vec<CourseRecord>> {
        let catalog = self.catalog.clone();
        let filters = filters.clone();
        let records = tokio::task::spawn_blocking(move || query_courses(&catalog, &filters, limit))
            .await
            .map_err(|e| AppError::Store(format!("Course query task failed: {}", e)))??;

        tracing::debug!("Course store matched {} record(s)", records.len());
        Ok(records)
    }

    async fn count(&self) -> AppResult<usize> {
        let catalog = self.catalog.clone();
        tokio::task::spawn_blocking(move || {
            let conn = catalog.lock()?;
            count_rows(&conn, "courses")
        })
        .await
        .map_err(|e| AppError::Store(format!("Course count task failed: {}", e)))?
    }
}

/// Run the structured filter stage.
///
/// Empty filters yield `Unconstrained` without touching the store. A store
/// failure is logged and also yields `Unconstrained`, so the pipeline falls
/// back to pure semantic search.
pub async fn filter_courses(
    ctx: &PipelineContext,
    filters: &BTreeMap<FilterField, String>,
) -> FilterOutcome {
    if filters.is_empty() {
        return FilterOutcome::Unconstrained;
    }

    let limit = ctx.settings.filter_limit;
    let result = with_retry(&ctx.retry, "course_store.find", || {
        ctx.store.find(filters, limit)
    })
    .await;

    match result {
        Ok(records) if records.is_empty() => {
            tracing::info!("Structured filter matched no courses: {:?}", filters);
            FilterOutcome::NoMatches
        }
        Ok(records) => {
            tracing::info!("Structured filter matched {} course(s)", records.len());
            FilterOutcome::Matched(records)
        }
        Err(e) => {
            tracing::warn!("Course store query failed, continuing unconstrained: {}", e);
            FilterOutcome::Unconstrained
        }
    }
}
