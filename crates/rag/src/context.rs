//! Long-lived dependencies shared by every query.
//!
//! The entry point builds one `PipelineContext` at startup and hands it to
//! each stage. Nothing in it changes per request.

use crate::catalog::Catalog;
use crate::embeddings::{create_provider, EmbeddingProvider};
use crate::index::{ReviewIndex, SqliteReviewIndex};
use crate::store::{CourseStore, SqliteCourseStore};
use coursemate_core::{with_retry, AppConfig, AppError, AppResult, RetryPolicy};
use coursemate_llm::{create_client, LlmClient};
use coursemate_prompt::{
    load_builtin_prompt, load_prompt, PromptDefinition, ANSWER_PROMPT_ID, INTENT_PROMPT_ID,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// The two prompts the pipeline renders.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub intent: PromptDefinition,
    pub answer: PromptDefinition,
}

impl PromptSet {
    /// Prompts compiled into the binary.
    pub fn builtin() -> AppResult<Self> {
        Ok(Self {
            intent: load_builtin_prompt(INTENT_PROMPT_ID)?,
            answer: load_builtin_prompt(ANSWER_PROMPT_ID)?,
        })
    }

    /// Prompts with workspace overrides applied.
    pub fn load(workspace: &Path) -> AppResult<Self> {
        Ok(Self {
            intent: load_prompt(workspace, INTENT_PROMPT_ID)?.definition,
            answer: load_prompt(workspace, ANSWER_PROMPT_ID)?.definition,
        })
    }
}

/// Tunables read by the pipeline stages.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub top_k: usize,
    pub filter_limit: usize,
    pub excerpt_chars: usize,
    pub history_turns: usize,
    pub diversity_fetch: usize,
    pub top_reviews: usize,
    pub query_prefix: String,
    pub request_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let retrieval = &config.retrieval;
        Self {
            top_k: retrieval.top_k,
            filter_limit: retrieval.filter_limit,
            excerpt_chars: retrieval.excerpt_chars,
            history_turns: retrieval.history_turns,
            diversity_fetch: retrieval.diversity_fetch,
            top_reviews: retrieval.top_reviews,
            query_prefix: config.embedding.query_prefix.clone(),
            request_timeout: config.resilience.request_timeout(),
        }
    }
}

/// Handles to the generative model, embedder, course store and review index.
pub struct PipelineContext {
    pub llm: Arc<dyn LlmClient>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub store: Arc<dyn CourseStore>,
    pub index: Arc<dyn ReviewIndex>,
    pub model: String,
    pub prompts: PromptSet,
    pub settings: PipelineSettings,
    pub retry: RetryPolicy,
}

impl PipelineContext {
    /// Assemble a context with built-in prompts and default settings.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn CourseStore>,
        index: Arc<dyn ReviewIndex>,
        model: impl Into<String>,
    ) -> AppResult<Self> {
        Ok(Self {
            llm,
            embedder,
            store,
            index,
            model: model.into(),
            prompts: PromptSet::builtin()?,
            settings: PipelineSettings::default(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    /// Build every dependency from configuration.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        config.validate()?;

        let provider = config.provider.to_lowercase();
        let endpoint = config
            .get_provider_config(&provider)
            .and_then(|p| p.endpoint())
            .map(str::to_string);
        let api_key = config.resolve_api_key(&provider);
        let retry = config.resilience.retry_policy();

        let llm = create_client(
            &provider,
            endpoint.as_deref(),
            api_key.as_deref(),
            Some(retry.call_timeout),
        )?;

        let embedder = create_provider(&config.embedding)?;

        let catalog = Catalog::open(&config.catalog_path())?;

        tracing::info!(
            "Pipeline ready: llm={}/{}, embeddings={}/{}, catalog={:?}",
            llm.provider_name(),
            config.model,
            embedder.provider_name(),
            embedder.model_name(),
            config.catalog_path()
        );

        Ok(Self {
            llm,
            embedder,
            store: Arc::new(SqliteCourseStore::new(catalog.clone())),
            index: Arc::new(SqliteReviewIndex::new(catalog)),
            model: config.model.clone(),
            prompts: PromptSet::load(&config.workspace)?,
            settings: PipelineSettings::from_config(config),
            retry,
        })
    }

    /// Embed a search query, applying the query prefix.
    pub async fn embed_query(&self, query: &str) -> AppResult<Vec<f32>> {
        let text = format!("{}{}", self.settings.query_prefix, query);
        let embedding = with_retry(&self.retry, "embedder.embed", || self.embedder.embed(&text)).await?;

        if embedding.len() != self.embedder.dimensions() {
            return Err(AppError::Embedding(format!(
                "Query embedding has {} dimensions, expected {}",
                embedding.len(),
                self.embedder.dimensions()
            )));
        }

        Ok(embedding)
    }
}
