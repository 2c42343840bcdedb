// LanceDB is the embedded vector database (no external server)
pub mod lance_client;
pub use lance_client::LanceVectorDB;

use crate::types::{ChunkMetadata, IndexStatistics, SearchResult};
use anyhow::Result;

/// Trait for vector database operations
#[async_trait::async_trait]
pub trait VectorDatabase: Send + Sync {
    /// Initialize the database and create the chunk table if needed
    async fn initialize(&self, dimension: usize) -> Result<()>;

    /// Whether the chunk table exists
    async fn is_initialized(&self) -> Result<bool>;

    /// Store embeddings with metadata and chunk text
    async fn store_embeddings(
        &self,
        embeddings: Vec<Vec<f32>>,
        metadata: Vec<ChunkMetadata>,
        contents: Vec<String>,
    ) -> Result<usize>;

    /// Search for similar chunks, optionally restricted to one dataset
    async fn search(
        &self,
        query_vector: Vec<f32>,
        query_text: &str,
        limit: usize,
        min_score: f32,
        dataset: Option<String>,
        hybrid: bool,
    ) -> Result<Vec<SearchResult>>;

    /// Delete every chunk of a document
    async fn delete_by_document(&self, doc_id: &str) -> Result<()>;

    /// Clear all embeddings
    async fn clear(&self) -> Result<()>;

    /// Get statistics
    async fn get_statistics(&self) -> Result<IndexStatistics>;
}
