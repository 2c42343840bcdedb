/// Configuration system for pdf-rag
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
use crate::error::{ConfigError, RagError};
use crate::paths::{DataLayout, PlatformPaths};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "pdf-rag.toml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Where pipeline artifacts are stored
    pub data: DataConfig,

    /// Scraping and download behaviour
    pub fetch: FetchConfig,

    /// Text chunking
    pub chunking: ChunkingConfig,

    /// Embedding model configuration
    pub embedding: EmbeddingConfig,

    /// Vector database configuration
    pub vector_db: VectorDbConfig,

    /// Retrieval defaults
    pub search: SearchConfig,

    /// Hosted language model used to answer questions
    pub llm: LlmConfig,

    /// Query service
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Root directory for manifest, PDFs, extracted text and the vector store
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Site root, used to resolve relative links and scope the age cookie
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Listing page URL; `{n}` is replaced by the dataset number
    #[serde(default = "default_dataset_page_template")]
    pub dataset_page_template: String,

    #[serde(default = "default_first_dataset")]
    pub first_dataset: u32,

    #[serde(default = "default_last_dataset")]
    pub last_dataset: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Cookie sent to bypass the site's age gate (empty disables it)
    #[serde(default = "default_age_cookie")]
    pub age_verification_cookie: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Pause after each attempted download, in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Pause between listing pages while scraping, in milliseconds
    #[serde(default = "default_scrape_delay_ms")]
    pub scrape_delay_ms: u64,

    /// Existing files larger than this many bytes are not downloaded again
    #[serde(default = "default_min_existing_size")]
    pub min_existing_size: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff between retries, in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// "recursive" or "fixed"
    #[serde(default = "default_chunk_strategy")]
    pub strategy: String,

    /// Maximum chunk length in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

/// Embedding model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name (e.g., "all-MiniLM-L6-v2", "BAAI/bge-small-en-v1.5")
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Batch size for embedding generation
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Timeout in seconds for one embedding batch
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Where downloaded model files are cached
    #[serde(default = "default_model_cache_dir")]
    pub cache_dir: PathBuf,
}

/// Vector database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDbConfig {
    /// Table holding chunk embeddings
    #[serde(default = "default_table_name")]
    pub table_name: String,
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default number of chunks retrieved per query
    #[serde(default = "default_k")]
    pub default_k: usize,

    /// Upper bound accepted from clients
    #[serde(default = "default_max_k")]
    pub max_k: usize,

    /// Minimum similarity score (0.0 to 1.0)
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    /// Fuse vector and BM25 keyword rankings by default
    #[serde(default)]
    pub hybrid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai" (any OpenAI-compatible API) or "ollama"
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API key; falls back to OPENAI_API_KEY when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Corpus name interpolated into the answer prompt
    #[serde(default = "default_corpus_name")]
    pub corpus_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Message returned by `GET /`
    #[serde(default = "default_title")]
    pub title: String,
}

// Default value functions
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_base_url() -> String {
    "https://www.justice.gov".to_string()
}

fn default_dataset_page_template() -> String {
    "https://www.justice.gov/epstein/doj-disclosures/data-set-{n}-files".to_string()
}

fn default_first_dataset() -> u32 {
    1
}

fn default_last_dataset() -> u32 {
    12
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36".to_string()
}

fn default_age_cookie() -> String {
    "age_verified=1".to_string()
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_delay_ms() -> u64 {
    500
}

fn default_scrape_delay_ms() -> u64 {
    1000
}

fn default_min_existing_size() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    2
}

/// Backoff doubles per attempt, so keep the worst case finite
pub const MAX_RETRIES_LIMIT: u32 = 10;

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_chunk_strategy() -> String {
    "recursive".to_string()
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_embedding_timeout() -> u64 {
    60
}

fn default_model_cache_dir() -> PathBuf {
    PlatformPaths::default_model_cache_dir()
}

fn default_table_name() -> String {
    "document_chunks".to_string()
}

fn default_k() -> usize {
    5
}

fn default_max_k() -> usize {
    50
}

fn default_min_score() -> f32 {
    0.0
}

fn default_llm_provider() -> String {
    "openai".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-5.2".to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_corpus_name() -> String {
    "Epstein investigation".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_title() -> String {
    "Epstein Files RAG API".to_string()
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            dataset_page_template: default_dataset_page_template(),
            first_dataset: default_first_dataset(),
            last_dataset: default_last_dataset(),
            user_agent: default_user_agent(),
            age_verification_cookie: default_age_cookie(),
            timeout_secs: default_fetch_timeout(),
            delay_ms: default_delay_ms(),
            scrape_delay_ms: default_scrape_delay_ms(),
            min_existing_size: default_min_existing_size(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: default_chunk_strategy(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout(),
            cache_dir: default_model_cache_dir(),
        }
    }
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            table_name: default_table_name(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            max_k: default_max_k(),
            min_score: default_min_score(),
            hybrid: false,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key: None,
            temperature: 0.0,
            timeout_secs: default_llm_timeout(),
            max_retries: default_max_retries(),
            corpus_name: default_corpus_name(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            title: default_title(),
        }
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> RagError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
    .into()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, RagError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from `./pdf-rag.toml`, then the platform config path, else defaults
    pub fn load_or_default() -> Result<Self, RagError> {
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            tracing::info!("Loading config from: {}", local.display());
            return Self::from_file(&local);
        }

        let config_path = PlatformPaths::default_config_path();
        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), RagError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = self.to_toml()?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, RagError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)).into())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), RagError> {
        if !self.fetch.dataset_page_template.contains("{n}") {
            return Err(invalid(
                "fetch.dataset_page_template",
                "must contain the {n} placeholder",
            ));
        }

        if self.fetch.first_dataset > self.fetch.last_dataset {
            return Err(invalid(
                "fetch.first_dataset",
                format!(
                    "must not exceed fetch.last_dataset ({} > {})",
                    self.fetch.first_dataset, self.fetch.last_dataset
                ),
            ));
        }

        if self.fetch.timeout_secs == 0 {
            return Err(invalid("fetch.timeout_secs", "must be greater than 0"));
        }

        if self.chunking.chunk_size == 0 {
            return Err(invalid("chunking.chunk_size", "must be greater than 0"));
        }

        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(invalid(
                "chunking.chunk_overlap",
                format!(
                    "must be smaller than chunking.chunk_size ({} >= {})",
                    self.chunking.chunk_overlap, self.chunking.chunk_size
                ),
            ));
        }

        if self.chunking.strategy != "recursive" && self.chunking.strategy != "fixed" {
            return Err(invalid(
                "chunking.strategy",
                format!(
                    "must be 'recursive' or 'fixed', got '{}'",
                    self.chunking.strategy
                ),
            ));
        }

        if self.fetch.max_retries > MAX_RETRIES_LIMIT {
            return Err(invalid(
                "fetch.max_retries",
                format!(
                    "must be at most {}, got {}",
                    MAX_RETRIES_LIMIT, self.fetch.max_retries
                ),
            ));
        }

        if self.llm.max_retries > MAX_RETRIES_LIMIT {
            return Err(invalid(
                "llm.max_retries",
                format!(
                    "must be at most {}, got {}",
                    MAX_RETRIES_LIMIT, self.llm.max_retries
                ),
            ));
        }

        if self.embedding.batch_size == 0 {
            return Err(invalid("embedding.batch_size", "must be greater than 0"));
        }

        if self.vector_db.table_name.trim().is_empty() {
            return Err(invalid("vector_db.table_name", "must not be empty"));
        }

        if !(0.0..=1.0).contains(&self.search.min_score) {
            return Err(invalid(
                "search.min_score",
                format!("must be between 0.0 and 1.0, got {}", self.search.min_score),
            ));
        }

        if self.search.default_k == 0 || self.search.max_k < self.search.default_k {
            return Err(invalid(
                "search.default_k",
                format!(
                    "must be between 1 and search.max_k ({}), got {}",
                    self.search.max_k, self.search.default_k
                ),
            ));
        }

        if self.llm.provider != "openai" && self.llm.provider != "ollama" {
            return Err(invalid(
                "llm.provider",
                format!("must be 'openai' or 'ollama', got '{}'", self.llm.provider),
            ));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(invalid(
                "llm.temperature",
                format!("must be between 0.0 and 2.0, got {}", self.llm.temperature),
            ));
        }

        if self.server.port == 0 {
            return Err(invalid("server.port", "must be between 1-65535"));
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("PDF_RAG_DATA_DIR") {
            self.data.dir = PathBuf::from(dir);
        }

        if let Ok(model) = std::env::var("PDF_RAG_MODEL") {
            self.embedding.model_name = model;
        }

        if let Ok(batch_size) = std::env::var("PDF_RAG_BATCH_SIZE")
            && let Ok(size) = batch_size.parse()
        {
            self.embedding.batch_size = size;
        }

        if let Ok(delay) = std::env::var("PDF_RAG_FETCH_DELAY_MS")
            && let Ok(ms) = delay.parse()
        {
            self.fetch.delay_ms = ms;
        }

        if let Ok(provider) = std::env::var("PDF_RAG_LLM_PROVIDER") {
            self.llm.provider = provider;
        }

        if let Ok(url) = std::env::var("PDF_RAG_LLM_BASE_URL") {
            self.llm.base_url = url;
        }

        if let Ok(model) = std::env::var("PDF_RAG_LLM_MODEL") {
            self.llm.model = model;
        }

        if let Ok(port) = std::env::var("PDF_RAG_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
        }
    }

    /// Load from an explicit file (or the default lookup) and apply env overrides
    pub fn load(path: Option<&Path>) -> Result<Self, RagError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::load_or_default()?,
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Create a new Config with defaults and environment overrides
    pub fn new() -> Result<Self, RagError> {
        Self::load(None)
    }

    /// Paths of all pipeline artifacts
    pub fn layout(&self) -> DataLayout {
        DataLayout::new(&self.data.dir)
    }
}
