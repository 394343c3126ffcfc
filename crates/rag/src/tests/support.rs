//! Shared fixtures: a scripted model, a seeded catalog and failing backends.

use crate::catalog::{Catalog, NewReview};
use crate::context::{PipelineContext, PipelineSettings};
use crate::embeddings::{EmbeddingProvider, MockProvider};
use crate::index::{ReviewIndex, SqliteReviewIndex};
use crate::store::{CourseStore, SqliteCourseStore};
use crate::types::{CourseRecord, FilterField, ReviewFilter, ReviewPassage};
use async_trait::async_trait;
use coursemate_core::{AppError, AppResult, RetryPolicy};
use coursemate_llm::{LlmClient, LlmRequest, LlmResponse};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DIMENSIONS: usize = 128;

/// Model that replays queued replies and records every prompt it sees.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<AppResult<LlmResponse>>>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<AppResult<LlmResponse>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
            delay: None,
        })
    }

    pub fn texts(replies: &[&str]) -> Arc<Self> {
        Self::new(
            replies
                .iter()
                .map(|r| Ok(LlmResponse::from_text(*r, "scripted")))
                .collect(),
        )
    }

    pub fn slow(delay: Duration, replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(
                replies
                    .iter()
                    .map(|r| Ok(LlmResponse::from_text(*r, "scripted")))
                    .collect(),
            ),
            prompts: Mutex::new(Vec::new()),
            delay: Some(delay),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::Llm("script exhausted".to_string())))
    }
}

/// Course store whose backend is always down.
pub struct UnavailableStore;

#[async_trait]
impl CourseStore for UnavailableStore {
    async fn find(
        &self,
        _filters: &BTreeMap<FilterField, String>,
        _limit: usize,
    ) -> AppResult<Vec<CourseRecord>> {
        Err(AppError::Store("connection refused".to_string()))
    }

    async fn count(&self) -> AppResult<usize> {
        Err(AppError::Store("connection refused".to_string()))
    }
}

/// Review index that fails professor lookups and delegates everything else.
pub struct ProfessorOutageIndex {
    pub inner: SqliteReviewIndex,
}

#[async_trait]
impl ReviewIndex for ProfessorOutageIndex {
    async fn search(
        &self,
        embedding: &[f32],
        filter: &ReviewFilter,
        top_k: usize,
    ) -> AppResult<Vec<ReviewPassage>> {
        if let ReviewFilter::ProfessorEq(_) = filter {
            return Err(AppError::Index("shard offline".to_string()));
        }
        self.inner.search(embedding, filter, top_k).await
    }

    async fn count(&self) -> AppResult<usize> {
        self.inner.count().await
    }
}

pub fn course(name: &str, professor: &str, rating: Option<f64>) -> CourseRecord {
    CourseRecord {
        course_id: format!("{}:{}", name, professor),
        course_name: name.to_string(),
        professor: professor.to_string(),
        department: Some("소프트웨어학과".to_string()),
        semester: Some("2024-2".to_string()),
        credits: Some(3),
        average_rating: rating,
        ..Default::default()
    }
}

/// In-memory catalog with courses and embedded reviews.
pub struct Fixture {
    pub catalog: Catalog,
    embedder: MockProvider,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            catalog: Catalog::open_in_memory().unwrap(),
            embedder: MockProvider::new(DIMENSIONS),
        }
    }

    pub fn with_courses(self, courses: &[CourseRecord]) -> Self {
        for record in courses {
            self.catalog.upsert_course(record).unwrap();
        }
        self
    }

    pub async fn add_review(&self, course_name: &str, professor: &str, rating: f64, text: &str) {
        let review = NewReview {
            course_name: course_name.to_string(),
            professor: professor.to_string(),
            department: Some("소프트웨어학과".to_string()),
            semester: Some("2024-2".to_string()),
            rating: Some(rating),
            text: text.to_string(),
        };
        let embedding = self
            .embedder
            .embed(&format!("passage: {}", text))
            .await
            .unwrap();
        self.catalog.upsert_review(&review, &embedding).unwrap();
    }

    pub fn context(&self, llm: Arc<ScriptedLlm>) -> PipelineContext {
        let store: Arc<dyn CourseStore> = Arc::new(SqliteCourseStore::new(self.catalog.clone()));
        let index: Arc<dyn ReviewIndex> = Arc::new(SqliteReviewIndex::new(self.catalog.clone()));
        self.context_with(llm, store, index)
    }

    pub fn context_with(
        &self,
        llm: Arc<ScriptedLlm>,
        store: Arc<dyn CourseStore>,
        index: Arc<dyn ReviewIndex>,
    ) -> PipelineContext {
        PipelineContext::new(
            llm,
            Arc::new(MockProvider::new(DIMENSIONS)),
            store,
            index,
            "scripted-model",
        )
        .unwrap()
        .with_retry_policy(RetryPolicy::no_retry(Duration::from_secs(5)))
        .with_settings(PipelineSettings {
            query_prefix: "query: ".to_string(),
            ..PipelineSettings::default()
        })
    }
}

/// Hold the catalog connection from another thread for `hold`.
///
/// Returns once the lock is taken; join the handle to wait for release.
pub fn hold_catalog(catalog: &Catalog, hold: Duration) -> std::thread::JoinHandle<()> {
    let catalog = catalog.clone();
    let (locked_tx, locked_rx) = std::sync::mpsc::channel();
    let handle = std::thread::spawn(move || {
        let _conn = catalog.lock().unwrap();
        locked_tx.send(()).unwrap();
        std::thread::sleep(hold);
    });
    locked_rx.recv().unwrap();
    handle
}

/// Classifier reply in the four-key shape the intent prompt asks for.
pub fn classification(
    needs_structured_filter: bool,
    filters: serde_json::Value,
    semantic_query: &str,
    course_names: &[&str],
    professors: &[&str],
    comparison_type: &str,
) -> String {
    serde_json::json!({
        "needs_structured_filter": needs_structured_filter,
        "filters": filters,
        "semantic_query": semantic_query,
        "comparison_targets": {
            "course_names": course_names,
            "professors": professors,
            "comparison_type": comparison_type,
        }
    })
    .to_string()
}
