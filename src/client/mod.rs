//! Core library client for pdf-rag
//!
//! [`RagClient`] owns the embedding model, the vector store and the index cache,
//! and exposes indexing, search, question answering and statistics. The CLI and
//! the HTTP server are thin wrappers around it.

mod extraction;
mod fs_lock;
mod indexing;

pub use extraction::{extract_directory, extract_documents};
pub use fs_lock::FsLockGuard;

use crate::cache::IndexCache;
use crate::config::Config;
use crate::embedding::{EmbeddingProvider, FastEmbedManager};
use crate::error::{EmbeddingError, IndexingError, RagError, VectorDbError};
use crate::generation::{LlmProvider, PromptTemplate};
use crate::indexer::TextChunker;
use crate::manifest::DocumentStore;
use crate::paths::DataLayout;
use crate::types::*;
use crate::vector_db::{LanceVectorDB, VectorDatabase};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Message reported by `stats` when the store is usable
pub const OPERATIONAL_MESSAGE: &str = "RAG system is operational";

/// Main client for the RAG system
///
/// # Example
///
/// ```no_run
/// use pdf_rag::{Config, RagClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), pdf_rag::RagError> {
///     let client = RagClient::open_existing(Config::default()).await?;
///
///     for hit in client.search("flight logs", 5, false).await? {
///         println!("{} [{}]: {:.2}", hit.filename, hit.dataset, hit.score);
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct RagClient {
    pub(crate) embedding_provider: Arc<dyn EmbeddingProvider>,
    pub(crate) vector_db: Arc<dyn VectorDatabase>,
    pub(crate) chunker: Arc<TextChunker>,
    // Document hashes from the last indexing run
    pub(crate) index_cache: Arc<RwLock<IndexCache>>,
    pub(crate) layout: DataLayout,
    pub(crate) config: Arc<Config>,
}

impl RagClient {
    /// Create a client from the default configuration sources
    pub async fn new() -> Result<Self, RagError> {
        let config = Config::new()?;
        Self::with_config(config).await
    }

    /// Load the embedding model and open (creating if needed) the vector store
    pub async fn with_config(config: Config) -> Result<Self, RagError> {
        config.validate()?;
        let layout = config.layout();

        tracing::info!("Initializing RAG client");
        tracing::debug!("Embedding model: {}", config.embedding.model_name);
        tracing::debug!(
            "Chunking: {} (size {}, overlap {})",
            config.chunking.strategy,
            config.chunking.chunk_size,
            config.chunking.chunk_overlap
        );

        let embedding_provider = Self::load_embedding_model(&config)?;

        let vector_db = LanceVectorDB::with_path(
            &layout.vectorstore_dir(),
            &config.vector_db.table_name,
        )
        .await
        .map_err(|e| VectorDbError::InitializationFailed(format!("{:#}", e)))?;

        Self::with_components(config, embedding_provider, Arc::new(vector_db))
    }

    /// Open a store that has already been indexed; used by the query paths
    pub async fn open_existing(config: Config) -> Result<Self, RagError> {
        config.validate()?;
        let layout = config.layout();
        let store_dir = layout.vectorstore_dir();
        let not_found = || VectorDbError::StoreNotFound(store_dir.display().to_string());

        if !store_dir.is_dir() {
            return Err(not_found().into());
        }

        let vector_db = LanceVectorDB::with_path(&store_dir, &config.vector_db.table_name)
            .await
            .map_err(|e| VectorDbError::InitializationFailed(format!("{:#}", e)))?;

        if !vector_db.is_initialized().await? {
            return Err(not_found().into());
        }

        let embedding_provider = Self::load_embedding_model(&config)?;
        Self::with_components(config, embedding_provider, Arc::new(vector_db))
    }

    /// Assemble a client from an explicit embedding provider and vector store
    pub fn with_components(
        config: Config,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_db: Arc<dyn VectorDatabase>,
    ) -> Result<Self, RagError> {
        let layout = config.layout();
        let chunker = TextChunker::from_config(&config.chunking)?;

        let cache_path = layout.index_cache_path();
        let index_cache = IndexCache::load(&cache_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load index cache: {}, starting fresh", e);
            IndexCache::default()
        });

        Ok(Self {
            embedding_provider,
            vector_db,
            chunker: Arc::new(chunker),
            index_cache: Arc::new(RwLock::new(index_cache)),
            layout,
            config: Arc::new(config),
        })
    }

    fn load_embedding_model(config: &Config) -> Result<Arc<dyn EmbeddingProvider>, RagError> {
        let manager = FastEmbedManager::from_name(
            &config.embedding.model_name,
            Some(config.embedding.cache_dir.as_path()),
        )
        .map_err(|e| EmbeddingError::InitializationFailed(format!("{:#}", e)))?;
        Ok(Arc::new(manager))
    }

    /// Index `documents`, skipping those whose hash has not changed
    pub async fn index_documents(
        &self,
        documents: DocumentStore,
        rebuild: bool,
        cancel_token: CancellationToken,
    ) -> Result<IndexResponse, RagError> {
        indexing::do_index(self, documents.documents, rebuild, cancel_token).await
    }

    /// Index the documents previously written by the extractor
    pub async fn index_from_disk(
        &self,
        rebuild: bool,
        cancel_token: CancellationToken,
    ) -> Result<IndexResponse, RagError> {
        let documents = DocumentStore::load(&self.layout.documents_path())?;
        self.index_documents(documents, rebuild, cancel_token).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.embedding_provider
            .embed_batch(vec![text.to_string()])
            .map_err(|e| EmbeddingError::GenerationFailed(format!("{:#}", e)))?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::GenerationFailed("No embedding generated".into()).into())
    }

    /// Clamp a requested result count to `1..=search.max_k`
    pub fn clamp_k(&self, k: usize) -> usize {
        k.clamp(1, self.config.search.max_k.max(1))
    }

    /// Requested result count, or `search.default_k` when none was given, clamped
    pub fn resolve_k(&self, k: Option<usize>) -> usize {
        self.clamp_k(k.unwrap_or(self.config.search.default_k))
    }

    /// Top `limit` chunks for `query`
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        hybrid: bool,
    ) -> Result<Vec<SearchResult>, RagError> {
        self.search_filtered(query, limit, hybrid, None).await
    }

    /// Like [`search`](Self::search), restricted to one dataset when `dataset` is set
    pub async fn search_filtered(
        &self,
        query: &str,
        limit: usize,
        hybrid: bool,
        dataset: Option<String>,
    ) -> Result<Vec<SearchResult>, RagError> {
        if query.trim().is_empty() {
            return Err(crate::error::ValidationError::Empty("query".into()).into());
        }

        let limit = self.clamp_k(limit);
        let query_vector = self.embed_query(query).await?;

        let results = self
            .vector_db
            .search(
                query_vector,
                query,
                limit,
                self.config.search.min_score,
                dataset,
                hybrid,
            )
            .await
            .map_err(|e| VectorDbError::SearchFailed(format!("{:#}", e)))?;

        tracing::debug!("Search '{}' returned {} results", query, results.len());
        Ok(results)
    }

    /// Retrieve context for the question and have the LLM answer it
    pub async fn ask(
        &self,
        llm: &dyn LlmProvider,
        request: &QueryRequest,
    ) -> Result<QueryResponse, RagError> {
        request.validate()?;

        let results = self
            .search(
                &request.question,
                self.resolve_k(request.num_results),
                self.config.search.hybrid,
            )
            .await?;

        let prompt =
            PromptTemplate::new(&self.config.llm.corpus_name).render(&request.question, &results);
        let answer = llm.complete(&prompt).await?;

        Ok(QueryResponse {
            answer,
            sources: results.iter().map(SourceDocument::from).collect(),
        })
    }

    /// Chunk and document counts of the vector store
    pub async fn stats(&self) -> Result<StatsResponse, RagError> {
        let ready = self.vector_db.is_initialized().await?;
        if !ready {
            return Ok(StatsResponse {
                vector_store_ready: false,
                message: "Vector store is empty. Run `pdf-rag index` first.".to_string(),
                total_chunks: 0,
                total_documents: 0,
                dataset_breakdown: vec![],
            });
        }

        let stats = self
            .vector_db
            .get_statistics()
            .await
            .map_err(|e| VectorDbError::StatisticsFailed(format!("{:#}", e)))?;

        Ok(StatsResponse {
            vector_store_ready: true,
            message: OPERATIONAL_MESSAGE.to_string(),
            total_chunks: stats.total_chunks,
            total_documents: stats.total_documents,
            dataset_breakdown: stats.dataset_breakdown,
        })
    }

    /// Drop every stored chunk and forget all indexed hashes
    pub async fn clear_index(&self) -> Result<(), RagError> {
        self.vector_db
            .clear()
            .await
            .map_err(|e| VectorDbError::ClearFailed(format!("{:#}", e)))?;

        let mut cache = self.index_cache.write().await;
        cache.clear();
        let cache_path = self.layout.index_cache_path();
        cache
            .save(&cache_path)
            .map_err(|e| IndexingError::CacheSaveFailed {
                path: cache_path.display().to_string(),
                reason: format!("{:#}", e),
            })?;
        Ok(())
    }

    /// Get the configuration used by this client
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Get the embedding dimension used by this client
    pub fn embedding_dimension(&self) -> usize {
        self.embedding_provider.dimension()
    }
}
