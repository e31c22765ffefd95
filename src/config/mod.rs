//! Configuration management for webrag
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::embed::known_model_dimension;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Web search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Page fetching configuration
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Text extraction and passage segmentation
    #[serde(default)]
    pub extract: ExtractConfig,

    /// Embedding model configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Generation model configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Run budgets
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Supported web search providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProviderKind {
    #[serde(alias = "ddg")]
    DuckDuckGo,
    Searxng,
}

/// Web search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Which provider to query
    #[serde(default = "default_search_provider")]
    pub provider: SearchProviderKind,

    /// Provider endpoint override
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Maximum results kept after deduplication
    #[serde(default = "default_search_max_results")]
    pub max_results: usize,

    /// Attempts per search before giving up
    #[serde(default = "default_search_attempts")]
    pub attempts: u32,

    /// Base backoff between attempts, doubled each retry (milliseconds)
    #[serde(default = "default_search_backoff_ms")]
    pub backoff_ms: u64,

    /// Request timeout in seconds
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,

    /// User agent string
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl SearchConfig {
    /// Endpoint for the configured provider
    pub fn resolved_endpoint(&self) -> String {
        match (&self.endpoint, self.provider) {
            (Some(endpoint), _) => endpoint.clone(),
            (None, SearchProviderKind::DuckDuckGo) => default_duckduckgo_url(),
            (None, SearchProviderKind::Searxng) => default_searxng_url(),
        }
    }
}

/// Page fetching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Timeout for a single fetch attempt in seconds
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Maximum simultaneous fetches
    #[serde(default = "default_fetch_concurrency")]
    pub concurrency: usize,

    /// Attempts per URL for transient failures
    #[serde(default = "default_fetch_attempts")]
    pub attempts: u32,

    /// Backoff between attempts (milliseconds)
    #[serde(default = "default_fetch_backoff_ms")]
    pub backoff_ms: u64,

    /// Requests per second per host
    #[serde(default = "default_fetch_rate_limit")]
    pub rate_limit_per_host: f64,

    /// User agent string
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Pages with less visible text than this are rendered with a browser
    #[serde(default = "default_render_threshold_chars")]
    pub render_threshold_chars: usize,

    /// Escalate to JavaScript rendering when the static page looks empty
    #[serde(default = "default_js_rendering")]
    pub js_rendering: bool,

    /// Time to wait for page load when JS rendering (milliseconds)
    #[serde(default = "default_js_page_load_timeout")]
    pub js_page_load_timeout_ms: u64,

    /// Time to wait after load for dynamic content (milliseconds)
    #[serde(default = "default_js_render_wait")]
    pub js_render_wait_ms: u64,

    /// Disable browser sandbox (required in some Docker/CI environments)
    #[serde(default)]
    pub js_no_sandbox: bool,
}

/// Text extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Maximum characters per passage
    #[serde(default = "default_max_passage_chars")]
    pub max_passage_chars: usize,

    /// Passages shorter than this are dropped as noise
    #[serde(default = "default_min_passage_chars")]
    pub min_passage_chars: usize,
}

/// Embedding backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// In-process fastembed model
    Local,
    /// Ollama or OpenAI-compatible embedding endpoint
    Http,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_backend")]
    pub backend: EmbeddingBackend,

    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Batch size for embedding
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Base URL of the HTTP backend
    #[serde(default = "default_ollama_url")]
    pub endpoint: String,

    /// HTTP backend timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// HTTP backend retries
    #[serde(default = "default_embedding_retries")]
    pub retries: usize,
}

/// Generation backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationBackend {
    /// Ollama `/api/generate`
    Ollama,
    /// Any server exposing `/v1/chat/completions`
    #[serde(alias = "openai-compatible")]
    OpenAi,
}

/// Generation model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_backend")]
    pub backend: GenerationBackend,

    /// Model name/identifier
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Base URL of the inference server
    #[serde(default = "default_ollama_url")]
    pub endpoint: String,

    /// Environment variable name for the API key (OpenAI-compatible only)
    #[serde(default = "default_generation_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Request timeout in seconds
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,

    /// Attempts per request; timeouts, connection errors and 5xx responses are retried
    #[serde(default = "default_generation_attempts")]
    pub attempts: u32,

    /// Delay between attempts (milliseconds)
    #[serde(default = "default_generation_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Per-run budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Passages retrieved from the index
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Characters of passage text allowed in the prompt
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    /// Passages indexed per run
    #[serde(default = "default_max_passages")]
    pub max_passages: usize,

    /// End-to-end deadline in seconds
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    /// Share of the deadline searching and fetching may use. What is left
    /// is reserved for embedding and synthesis.
    #[serde(default = "default_gather_share")]
    pub gather_share: f64,

    /// Retrieved passages scoring below this are not sent to the model
    #[serde(default)]
    pub min_score: Option<f32>,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for webrag data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            endpoint: None,
            max_results: default_search_max_results(),
            attempts: default_search_attempts(),
            backoff_ms: default_search_backoff_ms(),
            timeout_secs: default_search_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            concurrency: default_fetch_concurrency(),
            attempts: default_fetch_attempts(),
            backoff_ms: default_fetch_backoff_ms(),
            rate_limit_per_host: default_fetch_rate_limit(),
            user_agent: default_user_agent(),
            render_threshold_chars: default_render_threshold_chars(),
            js_rendering: default_js_rendering(),
            js_page_load_timeout_ms: default_js_page_load_timeout(),
            js_render_wait_ms: default_js_render_wait(),
            js_no_sandbox: false,
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_passage_chars: default_max_passage_chars(),
            min_passage_chars: default_min_passage_chars(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_embedding_backend(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
            endpoint: default_ollama_url(),
            timeout_secs: default_embedding_timeout(),
            retries: default_embedding_retries(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: default_generation_backend(),
            model: default_generation_model(),
            endpoint: default_ollama_url(),
            api_key_env: default_generation_api_key_env(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_generation_timeout(),
            attempts: default_generation_attempts(),
            retry_delay_ms: default_generation_retry_delay_ms(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_context_chars: default_max_context_chars(),
            max_passages: default_max_passages(),
            deadline_secs: default_deadline_secs(),
            gather_share: default_gather_share(),
            min_score: None,
        }
    }
}

impl Config {
    /// Get the default base directory for webrag (~/.webrag)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".webrag")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Create a config rooted at `base_dir` without touching the filesystem
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        let mut config = Config::default();
        config.init_paths(Some(base_dir));
        config
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.extract.max_passage_chars == 0 {
            return Err(Error::Config(
                "extract.max_passage_chars must be positive".to_string(),
            ));
        }

        if self.extract.max_passage_chars < self.extract.min_passage_chars {
            return Err(Error::Config(
                "extract.max_passage_chars must be >= extract.min_passage_chars".to_string(),
            ));
        }

        if self.fetch.concurrency == 0 {
            return Err(Error::Config("fetch.concurrency must be at least 1".to_string()));
        }

        if self.fetch.attempts == 0 || self.search.attempts == 0 || self.generation.attempts == 0
        {
            return Err(Error::Config("attempt counts must be at least 1".to_string()));
        }

        if self.fetch.rate_limit_per_host <= 0.0 {
            return Err(Error::Config(
                "fetch.rate_limit_per_host must be positive".to_string(),
            ));
        }

        if self.embedding.dimension == 0 || self.embedding.batch_size == 0 {
            return Err(Error::Config(
                "embedding.dimension and embedding.batch_size must be positive".to_string(),
            ));
        }

        if let Some(known) = known_model_dimension(&self.embedding.model) {
            if known != self.embedding.dimension {
                return Err(Error::Config(format!(
                    "embedding.dimension is {} but model '{}' produces {}-dimensional vectors",
                    self.embedding.dimension, self.embedding.model, known
                )));
            }
        }

        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(Error::Config(
                "generation.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.generation.top_p) {
            return Err(Error::Config(
                "generation.top_p must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.pipeline.deadline_secs == 0 {
            return Err(Error::Config("pipeline.deadline_secs must be positive".to_string()));
        }

        if !(self.pipeline.gather_share > 0.0 && self.pipeline.gather_share < 1.0) {
            return Err(Error::Config(
                "pipeline.gather_share must be between 0.0 and 1.0 (exclusive)".to_string(),
            ));
        }

        if let Some(min_score) = self.pipeline.min_score {
            if !(-1.0..=1.0).contains(&min_score) {
                return Err(Error::Config(
                    "pipeline.min_score must be between -1.0 and 1.0".to_string(),
                ));
            }
        }

        Ok(())
    }
}
