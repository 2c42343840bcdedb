use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Longest question accepted by the query endpoints, in bytes
pub const MAX_QUESTION_LENGTH: usize = 10_000;

/// Characters of chunk text echoed back in `/query` sources
pub const QUERY_PREVIEW_CHARS: usize = 200;

/// Characters of chunk text echoed back in `/search` results
pub const SEARCH_PREVIEW_CHARS: usize = 300;

/// One entry of the document manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLink {
    /// Filename without the `.pdf` suffix
    pub id: String,
    /// Absolute download URL
    pub url: String,
    /// Dataset number the document was listed under
    pub dataset: u32,
    /// Last path segment of the URL
    pub filename: String,
}

impl DocumentLink {
    /// Build a link from an absolute URL; `None` when the URL has no file name
    pub fn from_url(url: &str, dataset: u32) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let filename = path.rsplit('/').next()?.trim();
        if filename.is_empty() {
            return None;
        }

        Some(Self {
            id: document_id(filename),
            url: url.to_string(),
            dataset,
            filename: filename.to_string(),
        })
    }

    /// Where the downloaded file is stored: `<pdfs_dir>/dataset-<N>/<filename>`
    pub fn output_path(&self, pdfs_dir: &Path) -> PathBuf {
        pdfs_dir
            .join(format!("dataset-{}", self.dataset))
            .join(&self.filename)
    }
}

/// Strip a trailing `.pdf` (any case) from a file name
pub fn document_id(filename: &str) -> String {
    let lower = filename.to_ascii_lowercase();
    match lower.strip_suffix(".pdf") {
        Some(stem) => filename[..stem.len()].to_string(),
        None => filename.to_string(),
    }
}

/// Metadata captured at extraction time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub num_pages: usize,
    pub filename: String,
    /// Parent directory name with the `dataset-` prefix removed
    pub dataset: String,
    /// SHA256 of the PDF bytes
    #[serde(default)]
    pub file_hash: String,
}

/// Extracted text of one PDF
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub id: String,
    /// Every page's text, each followed by a newline
    pub text: String,
    pub metadata: DocumentMetadata,
    /// RFC 3339 timestamp
    #[serde(default)]
    pub processed_at: String,
}

/// Metadata stored with each text chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Id of the source document
    pub doc_id: String,
    pub filename: String,
    pub dataset: String,
    pub num_pages: usize,
    /// 0-based position of the chunk within its document
    pub chunk_index: usize,
    /// SHA256 hash of the source PDF
    pub file_hash: String,
    /// Timestamp when indexed
    pub indexed_at: i64,
}

/// A single search result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub doc_id: String,
    pub filename: String,
    pub dataset: String,
    pub chunk_index: usize,
    /// The chunk text
    pub content: String,
    /// Combined similarity score (0.0 to 1.0)
    pub score: f32,
    /// Vector similarity score (0.0 to 1.0)
    pub vector_score: f32,
    /// Keyword match score - only present in hybrid search
    pub keyword_score: Option<f32>,
}

/// Outcome of a scrape run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeSummary {
    pub datasets_scraped: usize,
    pub datasets_failed: usize,
    /// Unique links written to the manifest
    pub links_found: usize,
}

/// Outcome of a download run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSummary {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    /// The run stopped early on Ctrl-C
    pub cancelled: bool,
}

/// Outcome of a text extraction run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractSummary {
    /// PDFs found on disk
    pub found: usize,
    /// Documents written to documents.json
    pub extracted: usize,
    /// PDFs that could not be parsed
    pub failed: usize,
    /// PDFs that parsed but yielded no text
    pub empty: usize,
}

/// Response from indexing operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexResponse {
    /// Documents chunked and embedded in this run
    pub documents_indexed: usize,
    /// Documents left alone because their hash did not change
    pub documents_skipped: usize,
    /// Documents removed because they are no longer on disk
    pub documents_removed: usize,
    /// Number of text chunks created
    pub chunks_created: usize,
    /// Number of embeddings generated
    pub embeddings_generated: usize,
    /// Time taken in milliseconds
    pub duration_ms: u64,
    /// Any errors encountered (non-fatal)
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Body of `POST /query`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    /// Chunks retrieved as context (default: `search.default_k`)
    #[serde(default)]
    pub num_results: Option<usize>,
}

impl QueryRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_question(&self.question)
    }
}

/// One cited chunk in a `/query` answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub doc_id: String,
    pub filename: String,
    pub dataset: String,
    pub chunk_index: usize,
    /// Leading characters of the chunk followed by "..."
    pub text: String,
}

impl From<&SearchResult> for SourceDocument {
    fn from(result: &SearchResult) -> Self {
        Self {
            doc_id: result.doc_id.clone(),
            filename: result.filename.clone(),
            dataset: result.dataset.clone(),
            chunk_index: result.chunk_index,
            text: preview(&result.content, QUERY_PREVIEW_CHARS),
        }
    }
}

/// Response of `POST /query`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<SourceDocument>,
}

/// Query string of `GET /search`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    pub q: String,
    /// Number of hits (default: `search.default_k`)
    #[serde(default)]
    pub k: Option<usize>,
    /// Fuse vector and keyword rankings
    #[serde(default)]
    pub hybrid: bool,
    /// Restrict hits to one dataset
    #[serde(default)]
    pub dataset: Option<String>,
}

impl SearchParams {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_question(&self.q)
    }
}

/// One hit of `GET /search`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub doc_id: String,
    pub filename: String,
    pub dataset: String,
    /// Leading characters of the chunk followed by "..."
    pub text: String,
}

impl From<&SearchResult> for SearchHit {
    fn from(result: &SearchResult) -> Self {
        Self {
            doc_id: result.doc_id.clone(),
            filename: result.filename.clone(),
            dataset: result.dataset.clone(),
            text: preview(&result.content, SEARCH_PREVIEW_CHARS),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
}

/// Body of `GET /`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetStats {
    pub dataset: String,
    pub chunk_count: usize,
}

/// Statistics about the vector store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub vector_store_ready: bool,
    pub message: String,
    pub total_chunks: usize,
    /// Distinct documents with at least one chunk
    pub total_documents: usize,
    /// Chunk counts per dataset, largest first
    pub dataset_breakdown: Vec<DatasetStats>,
}

/// Index statistics as reported by a vector database
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStatistics {
    pub total_chunks: usize,
    pub total_documents: usize,
    pub dataset_breakdown: Vec<DatasetStats>,
}

/// First `max_chars` characters of `text` followed by "..."
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

fn validate_question(question: &str) -> Result<(), ValidationError> {
    if question.trim().is_empty() {
        return Err(ValidationError::Empty("question".to_string()));
    }

    if question.len() > MAX_QUESTION_LENGTH {
        return Err(ValidationError::ConstraintViolation {
            field: "question".to_string(),
            constraint: format!("at most {} bytes", MAX_QUESTION_LENGTH),
            actual: question.len().to_string(),
        });
    }

    Ok(())
}
