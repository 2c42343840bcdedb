/// Centralized error types for pdf-rag using thiserror
///
/// Every pipeline stage has its own error enum; `RagError` wraps them so the
/// CLI and the HTTP layer can report a single type.
use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Main error type for the RAG system
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector database error: {0}")]
    VectorDb(#[from] VectorDbError),

    #[error("Indexing error: {0}")]
    Indexing(#[from] IndexingError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors raised while downloading documents or scraping listing pages
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request to {url} failed: {reason}")]
    RequestFailed { url: String, reason: String },

    #[error("Request to {0} timed out")]
    Timeout(String),

    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Not a PDF: {url} (got {content_type})")]
    NotPdf { url: String, content_type: String },

    #[error("Downloaded file is too small: {url} ({size} bytes)")]
    TooSmall { url: String, size: u64 },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to write '{path}': {reason}")]
    WriteFailed { path: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// Errors related to the document link manifest
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Manifest not found at {0}. Run `pdf-rag scrape` first.")]
    NotFound(String),

    #[error("Failed to read manifest '{path}': {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("Failed to parse manifest: {0}")]
    ParseFailed(String),

    #[error("Failed to write manifest '{path}': {reason}")]
    WriteFailed { path: String, reason: String },
}

/// Errors related to PDF text extraction
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("PDF directory not found: {0}. Run `pdf-rag fetch` first.")]
    DirectoryNotFound(String),

    #[error("Failed to read PDF '{file}': {reason}")]
    ReadFailed { file: String, reason: String },

    #[error("Failed to parse PDF '{file}': {reason}")]
    ParseFailed { file: String, reason: String },

    #[error("No text could be extracted from {0}")]
    NoText(String),

    #[error("Processed documents not found at {0}. Run `pdf-rag extract` first.")]
    DocumentsNotFound(String),

    #[error("Failed to write processed documents '{path}': {reason}")]
    WriteFailed { path: String, reason: String },
}

/// Errors related to text chunking
#[derive(Error, Debug)]
pub enum ChunkingError {
    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(String),

    #[error("Unknown chunking strategy: {0}")]
    UnknownStrategy(String),
}

/// Errors related to embedding generation
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Failed to initialize embedding model: {0}")]
    InitializationFailed(String),

    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),

    #[error("Embedding generation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Model lock was poisoned: {0}")]
    LockPoisoned(String),
}

/// Errors related to vector database operations
#[derive(Error, Debug)]
pub enum VectorDbError {
    #[error("Vector store not found at {0}. Run `pdf-rag index` first.")]
    StoreNotFound(String),

    #[error("Failed to initialize vector database: {0}")]
    InitializationFailed(String),

    #[error("Failed to store embeddings: {0}")]
    StoreFailed(String),

    #[error("Failed to search embeddings: {0}")]
    SearchFailed(String),

    #[error("Failed to delete embeddings: {0}")]
    DeleteFailed(String),

    #[error("Failed to get statistics: {0}")]
    StatisticsFailed(String),

    #[error("Failed to clear database: {0}")]
    ClearFailed(String),
}

/// Errors related to building the index
#[derive(Error, Debug)]
pub enum IndexingError {
    #[error("Another indexing run holds the lock on {0}")]
    Locked(String),

    #[error("No documents to index")]
    NoDocuments,

    #[error("Failed to load index cache from '{path}': {reason}")]
    CacheLoadFailed { path: String, reason: String },

    #[error("Failed to save index cache to '{path}': {reason}")]
    CacheSaveFailed { path: String, reason: String },

    #[error("Indexing was cancelled")]
    Cancelled,
}

/// Errors related to LLM calls
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    RequestFailed(String),

    #[error("LLM returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Failed to parse LLM response: {0}")]
    InvalidResponse(String),

    #[error("Missing API key for provider '{0}'")]
    MissingApiKey(String),

    #[error("Unknown LLM provider: {0}")]
    UnknownProvider(String),
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

/// Errors related to input validation
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Empty {0}")]
    Empty(String),

    #[error("{field} must be {constraint}, got {actual}")]
    ConstraintViolation {
        field: String,
        constraint: String,
        actual: String,
    },

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Result alias used across the crate's public API
pub type Result<T> = std::result::Result<T, RagError>;

// Conversion from anyhow::Error to RagError
impl From<anyhow::Error> for RagError {
    fn from(err: anyhow::Error) -> Self {
        RagError::Other(format!("{:#}", err))
    }
}

// Malformed request bodies and query strings answer with the same JSON error
// shape as handler errors
impl From<JsonRejection> for RagError {
    fn from(rejection: JsonRejection) -> Self {
        ValidationError::InvalidValue("request body".to_string(), rejection.body_text()).into()
    }
}

impl From<QueryRejection> for RagError {
    fn from(rejection: QueryRejection) -> Self {
        ValidationError::InvalidValue("query string".to_string(), rejection.body_text()).into()
    }
}

impl FetchError {
    /// Check if retrying the same request could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::RequestFailed { .. } | FetchError::Timeout(_) => true,
            FetchError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl LlmError {
    /// Transport failures, rate limits and server errors are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RequestFailed(_) => true,
            LlmError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

// Helper methods for RagError
impl RagError {
    /// Create a new error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        RagError::Other(msg.into())
    }

    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            RagError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            RagError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            RagError::VectorDb(VectorDbError::StoreNotFound(_)) => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            RagError::VectorDb(_) => (StatusCode::INTERNAL_SERVER_ERROR, "vector_db_error"),
            RagError::Embedding(_) => (StatusCode::INTERNAL_SERVER_ERROR, "embedding_error"),
            RagError::Llm(LlmError::HttpStatus { .. }) => (StatusCode::BAD_GATEWAY, "llm_error"),
            RagError::Llm(_) => (StatusCode::SERVICE_UNAVAILABLE, "llm_error"),
            RagError::Fetch(_) => (StatusCode::BAD_GATEWAY, "http_error"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for RagError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = Json(json!({
            "error": {
                "type": kind,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
