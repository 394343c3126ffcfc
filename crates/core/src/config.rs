//! Configuration management for Coursemate.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - Config file (.coursemate/config.yaml)
//! - Environment variables
//! - Command-line flags
//!
//! The configuration is workspace-centric: the catalog database, prompt
//! overrides and config file all live under `.coursemate/`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::logging::LogFormat;
use crate::retry::RetryPolicy;

/// Providers the LLM factory knows how to build.
pub const KNOWN_PROVIDERS: [&str; 2] = ["ollama", "gemini"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .coursemate/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Active LLM provider ("ollama", "gemini")
    pub provider: String,

    /// Model identifier for the active provider
    pub model: String,

    /// Explicit API key (COURSEMATE_API_KEY)
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Log line format
    #[serde(skip)]
    pub log_format: LogFormat,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// LLM provider configurations
    pub llm: Option<LlmConfig>,

    /// Embedding settings
    pub embedding: EmbeddingSettings,

    /// Catalog storage settings
    pub storage: StorageConfig,

    /// Retrieval and answer-shaping knobs
    pub retrieval: RetrievalConfig,

    /// Retry and timeout budgets for outbound calls
    pub resilience: ResilienceConfig,
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    Gemini {
        #[serde(rename = "apiKeyEnv")]
        api_key_env: String,
        model: String,
        endpoint: Option<String>,
    },
    Ollama {
        endpoint: String,
        model: String,
        timeout: Option<u64>,
    },
}

impl ProviderConfig {
    /// Model name configured for this provider.
    pub fn model(&self) -> &str {
        match self {
            Self::Gemini { model, .. } | Self::Ollama { model, .. } => model,
        }
    }

    /// Endpoint override, if any.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::Gemini { endpoint, .. } => endpoint.as_deref(),
            Self::Ollama { endpoint, .. } => Some(endpoint.as_str()),
        }
    }
}

/// Embedding settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingSettings {
    /// Provider name: "mock" or "ollama"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Ollama endpoint for the "ollama" provider
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Prefix prepended to queries before embedding (E5-style models)
    #[serde(rename = "queryPrefix", default)]
    pub query_prefix: String,

    /// Prefix prepended to review passages before embedding
    #[serde(rename = "passagePrefix", default)]
    pub passage_prefix: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "ngram-v1".to_string(),
            dimensions: 384,
            endpoint: None,
            query_prefix: "query: ".to_string(),
            passage_prefix: "passage: ".to_string(),
        }
    }
}

/// Catalog storage settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// SQLite catalog path, relative to the workspace unless absolute
    #[serde(rename = "catalogPath")]
    pub catalog_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from(".coursemate/catalog.sqlite"),
        }
    }
}

/// Retrieval and answer-shaping settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RetrievalConfig {
    /// Passages handed to the merger
    #[serde(rename = "topK", default = "default_top_k")]
    pub top_k: usize,

    /// Maximum course records from a structured filter
    #[serde(rename = "filterLimit", default = "default_filter_limit")]
    pub filter_limit: usize,

    /// Excerpt length cap in code points
    #[serde(rename = "excerptChars", default = "default_excerpt_chars")]
    pub excerpt_chars: usize,

    /// Conversation turns included in the synthesis prompt
    #[serde(rename = "historyTurns", default = "default_history_turns")]
    pub history_turns: usize,

    /// Passages fetched when diversifying professors for one course
    #[serde(rename = "diversityFetch", default = "default_diversity_fetch")]
    pub diversity_fetch: usize,

    /// Reviews echoed back in the response evidence summary
    #[serde(rename = "topReviews", default = "default_top_reviews")]
    pub top_reviews: usize,
}

fn default_top_k() -> usize {
    10
}

fn default_filter_limit() -> usize {
    100
}

fn default_excerpt_chars() -> usize {
    200
}

fn default_history_turns() -> usize {
    5
}

fn default_diversity_fetch() -> usize {
    10
}

fn default_top_reviews() -> usize {
    5
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            filter_limit: default_filter_limit(),
            excerpt_chars: default_excerpt_chars(),
            history_turns: default_history_turns(),
            diversity_fetch: default_diversity_fetch(),
            top_reviews: default_top_reviews(),
        }
    }
}

/// Retry and timeout budgets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ResilienceConfig {
    #[serde(rename = "maxAttempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(rename = "initialBackoffMs", default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(rename = "callTimeoutSecs", default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    #[serde(rename = "requestTimeoutSecs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    crate::retry::DEFAULT_MAX_ATTEMPTS
}

fn default_initial_backoff_ms() -> u64 {
    crate::retry::DEFAULT_INITIAL_BACKOFF_MS
}

fn default_call_timeout_secs() -> u64 {
    crate::retry::DEFAULT_CALL_TIMEOUT_SECS
}

fn default_request_timeout_secs() -> u64 {
    90
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            call_timeout_secs: default_call_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ResilienceConfig {
    /// Per-call retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
        }
    }

    /// Budget for one whole request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmConfig>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    embedding: Option<EmbeddingSettings>,
    storage: Option<StorageConfig>,
    retrieval: Option<RetrievalConfig>,
    resilience: Option<ResilienceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    format: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            api_key: None,
            log_level: None,
            log_format: LogFormat::Pretty,
            verbose: false,
            no_color: false,
            llm: None,
            embedding: EmbeddingSettings::default(),
            storage: StorageConfig::default(),
            retrieval: RetrievalConfig::default(),
            resilience: ResilienceConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, the config file and defaults.
    ///
    /// Environment variables:
    /// - `COURSEMATE_WORKSPACE`: Override workspace path
    /// - `COURSEMATE_CONFIG`: Path to config file
    /// - `COURSEMATE_PROVIDER`: LLM provider
    /// - `COURSEMATE_MODEL`: Model identifier
    /// - `COURSEMATE_API_KEY`: API key
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use coursemate_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("COURSEMATE_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("COURSEMATE_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.workspace.join(".coursemate/config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("COURSEMATE_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("COURSEMATE_MODEL") {
            config.model = model;
        }

        if let Ok(key) = std::env::var("COURSEMATE_API_KEY") {
            config.api_key = Some(key);
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge an explicitly chosen config file, e.g. from `--config`.
    pub fn with_config_file(mut self, path: &Path) -> AppResult<Self> {
        self = self.merge_yaml(path)?;
        self.config_file = Some(path.to_path_buf());
        Ok(self)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        self.merge_yaml_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file {:?}: {}", path, e)))
    }

    fn merge_yaml_str(&self, contents: &str) -> AppResult<Self> {
        let config_file: ConfigFile = serde_yaml::from_str(contents)?;
        let mut result = self.clone();

        if let Some(path) = config_file.workspace.and_then(|ws| ws.path) {
            result.workspace = PathBuf::from(path);
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(format) = logging.format {
                result.log_format = LogFormat::parse(&format);
            }
        }

        if let Some(llm) = config_file.llm {
            result.provider = llm.active_provider.clone();
            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                result.model = provider_config.model().to_string();
            }
            result.llm = Some(llm);
        }

        if let Some(embedding) = config_file.embedding {
            result.embedding = embedding;
        }
        if let Some(storage) = config_file.storage {
            result.storage = storage;
        }
        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = retrieval;
        }
        if let Some(resilience) = config_file.resilience {
            result.resilience = resilience;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .coursemate directory.
    pub fn coursemate_dir(&self) -> PathBuf {
        self.workspace.join(".coursemate")
    }

    /// Ensure the .coursemate directory exists.
    pub fn ensure_coursemate_dir(&self) -> AppResult<()> {
        let dir = self.coursemate_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create .coursemate directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Absolute path of the SQLite catalog.
    pub fn catalog_path(&self) -> PathBuf {
        if self.storage.catalog_path.is_absolute() {
            self.storage.catalog_path.clone()
        } else {
            self.workspace.join(&self.storage.catalog_path)
        }
    }

    /// Get the configuration block for a provider.
    pub fn get_provider_config(&self, provider: &str) -> Option<&ProviderConfig> {
        self.llm.as_ref().and_then(|llm| llm.providers.get(provider))
    }

    /// Resolve the API key for a provider.
    ///
    /// `COURSEMATE_API_KEY` wins; otherwise the provider's `apiKeyEnv` is read.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        match self.get_provider_config(provider) {
            Some(ProviderConfig::Gemini { api_key_env, .. }) => std::env::var(api_key_env).ok(),
            _ => None,
        }
    }

    /// Validate configuration for the active provider.
    pub fn validate(&self) -> AppResult<()> {
        let provider = self.provider.to_lowercase();

        if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if provider == "gemini" && self.resolve_api_key(&provider).is_none() {
            return Err(AppError::Config(
                "Gemini provider requires an API key (COURSEMATE_API_KEY or apiKeyEnv)".to_string(),
            ));
        }

        let counts = [
            ("topK", self.retrieval.top_k),
            ("filterLimit", self.retrieval.filter_limit),
            ("diversityFetch", self.retrieval.diversity_fetch),
            ("topReviews", self.retrieval.top_reviews),
        ];
        if let Some((key, _)) = counts.iter().find(|(_, value)| *value == 0) {
            return Err(AppError::Config(format!("retrieval.{} must be at least 1", key)));
        }

        if self.resilience.call_timeout_secs > self.resilience.request_timeout_secs {
            return Err(AppError::Config(format!(
                "resilience.callTimeoutSecs ({}) exceeds requestTimeoutSecs ({})",
                self.resilience.call_timeout_secs, self.resilience.request_timeout_secs
            )));
        }

        Ok(())
    }
}
