use super::{FsLockGuard, RagClient};
use crate::error::{EmbeddingError, IndexingError, RagError, VectorDbError};
use crate::indexer::DocumentChunk;
use crate::types::{IndexResponse, ProcessedDocument};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Helper macro to check for cancellation and return early if cancelled
macro_rules! check_cancelled {
    ($cancel_token:expr) => {
        if $cancel_token.is_cancelled() {
            tracing::info!("Indexing operation cancelled");
            return Err(IndexingError::Cancelled.into());
        }
    };
}

/// Result of embedding generation
struct EmbeddingResult {
    embeddings: Vec<Vec<f32>>,
    successful_chunks: Vec<DocumentChunk>,
    /// Documents with at least one chunk that could not be embedded
    failed_documents: HashSet<String>,
    errors: Vec<String>,
}

/// Embed chunks batch by batch on the blocking pool, with a timeout per batch
///
/// A batch that fails or times out is recorded in `errors` and skipped.
async fn generate_embeddings(
    client: &RagClient,
    chunks: Vec<DocumentChunk>,
    cancel_token: &CancellationToken,
) -> Result<EmbeddingResult, RagError> {
    let batch_size = client.config.embedding.batch_size.max(1);
    let timeout_secs = client.config.embedding.timeout_secs;

    let mut embeddings = Vec::with_capacity(chunks.len());
    let mut successful_chunks = Vec::with_capacity(chunks.len());
    let mut failed_documents = HashSet::new();
    let mut errors = Vec::new();

    let total_batches = chunks.len().div_ceil(batch_size);

    for (batch_idx, batch) in chunks.chunks(batch_size).enumerate() {
        check_cancelled!(cancel_token);

        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let provider = client.embedding_provider.clone();
        let embed_future = tokio::task::spawn_blocking(move || provider.embed_batch(texts));

        let failure = match tokio::time::timeout(Duration::from_secs(timeout_secs), embed_future)
            .await
        {
            Ok(Ok(Ok(batch_embeddings))) if batch_embeddings.len() == batch.len() => {
                embeddings.extend(batch_embeddings);
                successful_chunks.extend(batch.iter().cloned());
                None
            }
            Ok(Ok(Ok(batch_embeddings))) => Some(format!(
                "Embedding batch {} returned {} vectors for {} chunks",
                batch_idx,
                batch_embeddings.len(),
                batch.len()
            )),
            Ok(Ok(Err(e))) => Some(format!(
                "Failed to generate embeddings for batch {}: {:#}",
                batch_idx, e
            )),
            Ok(Err(e)) => Some(format!("Embedding task panicked: {}", e)),
            Err(_) => Some(EmbeddingError::Timeout(timeout_secs).to_string()),
        };

        if let Some(message) = failure {
            tracing::warn!("{}", message);
            errors.push(message);
            failed_documents.extend(batch.iter().map(|c| c.metadata.doc_id.clone()));
        }

        if (batch_idx + 1) % 10 == 0 || batch_idx + 1 == total_batches {
            tracing::info!(
                "Embedded {}/{} batches ({} chunks)",
                batch_idx + 1,
                total_batches,
                successful_chunks.len()
            );
        }
    }

    Ok(EmbeddingResult {
        embeddings,
        successful_chunks,
        failed_documents,
        errors,
    })
}

/// Keep the first document per id
fn dedup_documents(documents: Vec<ProcessedDocument>) -> Vec<ProcessedDocument> {
    let mut seen = HashSet::new();
    documents
        .into_iter()
        .filter(|doc| {
            let first = seen.insert(doc.id.clone());
            if !first {
                tracing::warn!(
                    "Duplicate document id {} ({}), keeping the first",
                    doc.id,
                    doc.metadata.filename
                );
            }
            first
        })
        .collect()
}

/// Index `documents` incrementally under the filesystem index lock
pub(crate) async fn do_index(
    client: &RagClient,
    documents: Vec<ProcessedDocument>,
    rebuild: bool,
    cancel_token: CancellationToken,
) -> Result<IndexResponse, RagError> {
    let start = Instant::now();

    if documents.is_empty() {
        return Err(IndexingError::NoDocuments.into());
    }

    let lock_path = client.layout.index_lock_path();
    let lock = {
        let lock_path = lock_path.clone();
        tokio::task::spawn_blocking(move || FsLockGuard::try_acquire(&lock_path))
            .await
            .map_err(|e| RagError::other(format!("Lock task failed: {}", e)))??
    };
    let Some(_lock) = lock else {
        return Err(IndexingError::Locked(lock_path.display().to_string()).into());
    };

    let documents = dedup_documents(documents);
    let model_name = client.embedding_provider.model_name().to_string();
    let cache_path = client.layout.index_cache_path();
    let mut cache = client.index_cache.write().await;

    let model_changed = cache
        .model_name
        .as_deref()
        .is_some_and(|cached| cached != model_name);
    if model_changed {
        tracing::warn!(
            "Embedding model changed from {:?} to {}, rebuilding index",
            cache.model_name,
            model_name
        );
    }

    if rebuild || model_changed {
        tracing::info!("Clearing vector store before rebuild");
        client
            .vector_db
            .clear()
            .await
            .map_err(|e| VectorDbError::ClearFailed(format!("{:#}", e)))?;
        cache.clear();
    }

    client
        .vector_db
        .initialize(client.embedding_provider.dimension())
        .await
        .map_err(|e| VectorDbError::InitializationFailed(format!("{:#}", e)))?;

    let current: HashMap<String, String> = documents
        .iter()
        .map(|doc| (doc.id.clone(), doc.metadata.file_hash.clone()))
        .collect();
    let plan = cache.plan(&current);

    tracing::info!(
        "Index plan: {} new, {} changed, {} unchanged, {} removed",
        plan.added.len(),
        plan.changed.len(),
        plan.unchanged.len(),
        plan.removed.len()
    );

    for doc_id in plan.removed.iter().chain(plan.changed.iter()) {
        check_cancelled!(cancel_token);
        client
            .vector_db
            .delete_by_document(doc_id)
            .await
            .map_err(|e| VectorDbError::DeleteFailed(format!("{}: {:#}", doc_id, e)))?;
        cache.remove(doc_id);
    }

    let pending_ids: HashSet<&String> = plan.added.iter().chain(plan.changed.iter()).collect();
    let pending: Vec<ProcessedDocument> = documents
        .iter()
        .filter(|doc| pending_ids.contains(&doc.id))
        .cloned()
        .collect();
    let pending_hashes: HashMap<String, String> = pending
        .iter()
        .map(|doc| (doc.id.clone(), doc.metadata.file_hash.clone()))
        .collect();

    check_cancelled!(cancel_token);

    // Chunking is CPU bound
    let chunker = client.chunker.clone();
    let chunks: Vec<DocumentChunk> = tokio::task::spawn_blocking(move || {
        pending
            .par_iter()
            .flat_map_iter(|doc| chunker.chunk_document(doc))
            .collect()
    })
    .await
    .map_err(|e| RagError::other(format!("Chunking task failed: {}", e)))?;

    let chunks_created = chunks.len();
    tracing::info!(
        "Created {} chunks from {} documents",
        chunks_created,
        pending_hashes.len()
    );

    let result = generate_embeddings(client, chunks, &cancel_token).await?;
    let mut errors = result.errors;

    // Documents with a failed batch are stored not at all, so the next run retries them whole
    let mut embeddings = Vec::with_capacity(result.embeddings.len());
    let mut metadata = Vec::with_capacity(result.embeddings.len());
    let mut contents = Vec::with_capacity(result.embeddings.len());
    for (embedding, chunk) in result.embeddings.into_iter().zip(result.successful_chunks) {
        if result.failed_documents.contains(&chunk.metadata.doc_id) {
            continue;
        }
        embeddings.push(embedding);
        metadata.push(chunk.metadata);
        contents.push(chunk.content);
    }

    check_cancelled!(cancel_token);

    let embeddings_generated = if embeddings.is_empty() {
        0
    } else {
        client
            .vector_db
            .store_embeddings(embeddings, metadata, contents)
            .await
            .map_err(|e| VectorDbError::StoreFailed(format!("{:#}", e)))?
    };

    let mut documents_indexed = 0;
    for (doc_id, hash) in pending_hashes {
        if result.failed_documents.contains(&doc_id) {
            continue;
        }
        cache.insert(doc_id, hash);
        documents_indexed += 1;
    }
    cache.model_name = Some(model_name);

    if let Err(e) = cache.save(&cache_path) {
        let message = IndexingError::CacheSaveFailed {
            path: cache_path.display().to_string(),
            reason: format!("{:#}", e),
        }
        .to_string();
        tracing::warn!("{}", message);
        errors.push(message);
    }

    let response = IndexResponse {
        documents_indexed,
        documents_skipped: plan.unchanged.len(),
        documents_removed: plan.removed.len(),
        chunks_created,
        embeddings_generated,
        duration_ms: start.elapsed().as_millis() as u64,
        errors,
    };

    tracing::info!(
        "Indexed {} documents ({} skipped, {} removed): {} chunks, {} embeddings in {} ms",
        response.documents_indexed,
        response.documents_skipped,
        response.documents_removed,
        response.chunks_created,
        response.embeddings_generated,
        response.duration_ms
    );

    Ok(response)
}
