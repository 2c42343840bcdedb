use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{Index, IndexWriter, ReloadPolicy, TantivyDocument, doc};

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// BM25-based keyword search using Tantivy
pub struct BM25Search {
    index: Index,
    id_field: Field,
    doc_id_field: Field,
    content_field: Field,
    /// Path to the index directory (needed for lock cleanup)
    index_path: PathBuf,
    /// Mutex to ensure only one IndexWriter is created at a time
    writer_lock: Mutex<()>,
}

/// Search result from BM25
#[derive(Debug, Clone)]
pub struct BM25Result {
    /// Chunk id, `<doc_id>:<chunk_index>`
    pub id: String,
    pub score: f32,
}

/// One chunk to add to the keyword index
#[derive(Debug, Clone)]
pub struct BM25Document {
    pub id: String,
    pub doc_id: String,
    pub content: String,
}

impl BM25Search {
    /// Create or open a BM25 index in `index_path`
    pub fn new<P: AsRef<Path>>(index_path: P) -> Result<Self> {
        let index_path = index_path.as_ref().to_path_buf();

        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let doc_id_field = schema_builder.add_text_field("doc_id", STRING);
        let content_field = schema_builder.add_text_field("content", TEXT);
        let schema = schema_builder.build();

        std::fs::create_dir_all(&index_path).context("Failed to create BM25 index directory")?;

        let index = if index_path.join("meta.json").exists() {
            Index::open_in_dir(&index_path).context("Failed to open existing BM25 index")?
        } else {
            Index::create_in_dir(&index_path, schema).context("Failed to create BM25 index")?
        };

        Ok(Self {
            index,
            id_field,
            doc_id_field,
            content_field,
            index_path,
            writer_lock: Mutex::new(()),
        })
    }

    /// Check if a lock file is stale (older than 5 minutes)
    fn is_lock_stale(lock_path: &Path) -> bool {
        if let Ok(metadata) = std::fs::metadata(lock_path)
            && let Ok(modified) = metadata.modified()
            && let Ok(elapsed) = modified.elapsed()
        {
            return elapsed.as_secs() > 300;
        }

        false
    }

    /// Remove Tantivy lock files left behind by a crashed process
    fn try_cleanup_stale_locks(index_path: &Path) -> Result<bool> {
        let mut cleaned = false;

        for name in [".tantivy-writer.lock", ".tantivy-meta.lock"] {
            let lock = index_path.join(name);
            if Self::is_lock_stale(&lock) {
                tracing::warn!("Removing stale Tantivy lock file (>5min old): {:?}", lock);
                std::fs::remove_file(&lock)
                    .with_context(|| format!("Failed to remove stale lock file {:?}", lock))?;
                cleaned = true;
            }
        }

        Ok(cleaned)
    }

    fn writer(&self) -> Result<IndexWriter<TantivyDocument>> {
        match self.index.writer(WRITER_HEAP_BYTES) {
            Ok(writer) => Ok(writer),
            Err(e) if e.to_string().to_lowercase().contains("lock") => {
                tracing::warn!("Index writer creation failed (possibly locked), checking for stale locks");

                if Self::try_cleanup_stale_locks(&self.index_path)? {
                    tracing::info!("Stale locks cleaned up, retrying writer creation");
                    self.index
                        .writer(WRITER_HEAP_BYTES)
                        .context("Failed to create index writer after cleaning stale locks")
                } else {
                    Err(anyhow::anyhow!(
                        "BM25 index is currently being used by another process: {}",
                        e
                    ))
                }
            }
            Err(e) => Err(e).context("Failed to create index writer"),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.writer_lock
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to acquire writer lock: {}", e))
    }

    /// Add chunks to the index and commit
    pub fn add_documents(&self, documents: Vec<BM25Document>) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let _guard = self.lock()?;
        let mut index_writer = self.writer()?;

        for document in documents {
            let doc = doc!(
                self.id_field => document.id,
                self.doc_id_field => document.doc_id,
                self.content_field => document.content,
            );
            index_writer
                .add_document(doc)
                .context("Failed to add document")?;
        }

        index_writer
            .commit()
            .context("Failed to commit documents")?;

        Ok(())
    }

    /// Search the index with BM25 scoring
    pub fn search(&self, query_text: &str, limit: usize) -> Result<Vec<BM25Result>> {
        let reader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .context("Failed to create index reader")?;

        let searcher = reader.searcher();

        // Lenient parsing so stray quotes or colons in questions don't fail the query
        let query_parser = QueryParser::for_index(&self.index, vec![self.content_field]);
        let (query, _errors) = query_parser.parse_query_lenient(query_text);

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit.max(1)))
            .context("Failed to execute search")?;

        let mut results = Vec::new();
        for (score, doc_address) in top_docs {
            let retrieved_doc: TantivyDocument = searcher
                .doc(doc_address)
                .context("Failed to retrieve document")?;

            if let Some(id_value) = retrieved_doc.get_first(self.id_field)
                && let Some(id) = id_value.as_str()
            {
                results.push(BM25Result {
                    id: id.to_string(),
                    score,
                });
            }
        }

        Ok(results)
    }

    /// Delete every chunk belonging to `doc_id`
    pub fn delete_by_document(&self, doc_id: &str) -> Result<()> {
        let _guard = self.lock()?;
        let mut index_writer = self.writer()?;

        let term = Term::from_field_text(self.doc_id_field, doc_id);
        index_writer.delete_term(term);

        index_writer
            .commit()
            .context("Failed to commit document deletion")?;

        Ok(())
    }

    /// Clear the entire index
    pub fn clear(&self) -> Result<()> {
        let _guard = self.lock()?;
        let mut index_writer = self.writer()?;

        index_writer
            .delete_all_documents()
            .context("Failed to delete all documents")?;

        index_writer.commit().context("Failed to commit clear")?;

        Ok(())
    }

    /// Get index statistics
    pub fn get_stats(&self) -> Result<BM25Stats> {
        let reader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .context("Failed to create index reader")?;

        Ok(BM25Stats {
            total_documents: reader.searcher().num_docs() as usize,
        })
    }
}

/// Statistics about the BM25 index
#[derive(Debug, Clone)]
pub struct BM25Stats {
    pub total_documents: usize,
}

/// Standard RRF constant (60.0 is the commonly used value from the RRF paper)
pub const RRF_K_CONSTANT: f32 = 60.0;

/// Reciprocal Rank Fusion (RRF) for combining ranked lists
///
/// Each list contributes `1 / (k + rank)` for every id it contains; ids are
/// returned by combined score, highest first. Equal scores keep the order in
/// which the ids were first seen, so earlier lists win ties.
pub fn reciprocal_rank_fusion<T, I, L>(ranked_lists: I, limit: usize) -> Vec<(T, f32)>
where
    T: Eq + std::hash::Hash + Clone,
    I: IntoIterator<Item = L>,
    L: IntoIterator<Item = (T, f32)>,
{
    // id -> (combined score, first-seen position)
    let mut score_map: HashMap<T, (f32, usize)> = HashMap::new();

    for list in ranked_lists {
        for (rank, (id, _score)) in list.into_iter().enumerate() {
            let rrf_score = 1.0 / (RRF_K_CONSTANT + (rank + 1) as f32);
            let seen = score_map.len();
            score_map.entry(id).or_insert((0.0, seen)).0 += rrf_score;
        }
    }

    let mut combined: Vec<(T, (f32, usize))> = score_map.into_iter().collect();
    combined.sort_by(|a, b| {
        b.1.0
            .partial_cmp(&a.1.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.1.cmp(&b.1.1))
    });
    combined.truncate(limit);

    combined
        .into_iter()
        .map(|(id, (score, _))| (id, score))
        .collect()
}
