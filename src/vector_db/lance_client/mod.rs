//! LanceDB vector database client
//!
//! Chunks live in a single LanceDB table next to a Tantivy BM25 index in the
//! `bm25/` subdirectory of the same store. Both are keyed by the chunk id
//! `<doc_id>:<chunk_index>` so hybrid search can join their rankings.

use crate::bm25_search::{BM25Document, BM25Search, reciprocal_rank_fusion};
use crate::types::{ChunkMetadata, DatasetStats, IndexStatistics, SearchResult};
use crate::vector_db::VectorDatabase;
use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray, UInt32Array, types::Float32Type,
};
use arrow_schema::{DataType, Field, Schema};
use futures::stream::TryStreamExt;
use lancedb::Table;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Columns read back for search results
const RESULT_COLUMNS: [&str; 6] = ["id", "doc_id", "filename", "dataset", "chunk_index", "content"];

/// LanceDB vector database implementation (embedded, no server required)
/// with BM25 hybrid search support using Tantivy
pub struct LanceVectorDB {
    connection: Connection,
    table_name: String,
    db_path: PathBuf,
    bm25: BM25Search,
}

/// One chunk row as read back from the table
#[derive(Debug, Clone)]
struct StoredChunk {
    id: String,
    doc_id: String,
    filename: String,
    dataset: String,
    chunk_index: usize,
    content: String,
}

impl StoredChunk {
    fn into_result(self, score: f32, vector_score: f32, keyword_score: Option<f32>) -> SearchResult {
        SearchResult {
            doc_id: self.doc_id,
            filename: self.filename,
            dataset: self.dataset,
            chunk_index: self.chunk_index,
            content: self.content,
            score,
            vector_score,
            keyword_score,
        }
    }
}

/// Quote a value for use in a LanceDB SQL filter
fn sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Stable chunk id shared by the vector table and the keyword index
pub fn chunk_id(doc_id: &str, chunk_index: usize) -> String {
    format!("{}:{}", doc_id, chunk_index)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .with_context(|| format!("Missing {} column", name))?
        .as_any()
        .downcast_ref::<StringArray>()
        .with_context(|| format!("Invalid {} type", name))
}

fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array> {
    batch
        .column_by_name(name)
        .with_context(|| format!("Missing {} column", name))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .with_context(|| format!("Invalid {} type", name))
}

fn read_chunks(batch: &RecordBatch) -> Result<Vec<StoredChunk>> {
    let ids = string_column(batch, "id")?;
    let doc_ids = string_column(batch, "doc_id")?;
    let filenames = string_column(batch, "filename")?;
    let datasets = string_column(batch, "dataset")?;
    let chunk_indexes = u32_column(batch, "chunk_index")?;
    let contents = string_column(batch, "content")?;

    Ok((0..batch.num_rows())
        .map(|i| StoredChunk {
            id: ids.value(i).to_string(),
            doc_id: doc_ids.value(i).to_string(),
            filename: filenames.value(i).to_string(),
            dataset: datasets.value(i).to_string(),
            chunk_index: chunk_indexes.value(i) as usize,
            content: contents.value(i).to_string(),
        })
        .collect())
}

fn read_scores(batch: &RecordBatch) -> Result<Vec<f32>> {
    let distance_array = batch
        .column_by_name("_distance")
        .context("Missing _distance column")?
        .as_any()
        .downcast_ref::<Float32Array>()
        .context("Invalid _distance type")?;

    Ok((0..batch.num_rows())
        .map(|i| 1.0 / (1.0 + distance_array.value(i)))
        .collect())
}

impl LanceVectorDB {
    /// Open (or create) a store at `db_path` using `table_name` for chunks
    pub async fn with_path(db_path: &Path, table_name: &str) -> Result<Self> {
        tracing::info!("Connecting to LanceDB at: {}", db_path.display());

        let connection = lancedb::connect(&db_path.to_string_lossy())
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        let bm25 = BM25Search::new(db_path.join("bm25"))
            .context("Failed to initialize BM25 index")?;

        Ok(Self {
            connection,
            table_name: table_name.to_string(),
            db_path: db_path.to_path_buf(),
            bm25,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Create schema for the chunk table
    fn create_schema(dimension: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension as i32,
                ),
                false,
            ),
            Field::new("id", DataType::Utf8, false),
            Field::new("doc_id", DataType::Utf8, false),
            Field::new("filename", DataType::Utf8, false),
            Field::new("dataset", DataType::Utf8, false),
            Field::new("num_pages", DataType::UInt32, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("file_hash", DataType::Utf8, false),
            Field::new("indexed_at", DataType::Int64, false),
            Field::new("content", DataType::Utf8, false),
        ]))
    }

    async fn get_table(&self) -> Result<Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .context("Failed to open table")
    }

    async fn table_exists(&self) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .context("Failed to list tables")?;

        Ok(table_names.contains(&self.table_name))
    }

    /// Convert embeddings and metadata to a RecordBatch
    fn create_record_batch(
        embeddings: Vec<Vec<f32>>,
        metadata: &[ChunkMetadata],
        contents: &[String],
        schema: Arc<Schema>,
    ) -> Result<RecordBatch> {
        let dimension = embeddings[0].len();

        let vector_array = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
            embeddings
                .into_iter()
                .map(|v| Some(v.into_iter().map(Some))),
            dimension as i32,
        );

        let id_array = StringArray::from(
            metadata
                .iter()
                .map(|m| chunk_id(&m.doc_id, m.chunk_index))
                .collect::<Vec<_>>(),
        );
        let doc_id_array = StringArray::from(
            metadata
                .iter()
                .map(|m| m.doc_id.as_str())
                .collect::<Vec<_>>(),
        );
        let filename_array = StringArray::from(
            metadata
                .iter()
                .map(|m| m.filename.as_str())
                .collect::<Vec<_>>(),
        );
        let dataset_array = StringArray::from(
            metadata
                .iter()
                .map(|m| m.dataset.as_str())
                .collect::<Vec<_>>(),
        );
        let num_pages_array = UInt32Array::from(
            metadata
                .iter()
                .map(|m| m.num_pages as u32)
                .collect::<Vec<_>>(),
        );
        let chunk_index_array = UInt32Array::from(
            metadata
                .iter()
                .map(|m| m.chunk_index as u32)
                .collect::<Vec<_>>(),
        );
        let file_hash_array = StringArray::from(
            metadata
                .iter()
                .map(|m| m.file_hash.as_str())
                .collect::<Vec<_>>(),
        );
        let indexed_at_array =
            Int64Array::from(metadata.iter().map(|m| m.indexed_at).collect::<Vec<_>>());
        let content_array =
            StringArray::from(contents.iter().map(|s| s.as_str()).collect::<Vec<_>>());

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(vector_array),
                Arc::new(id_array),
                Arc::new(doc_id_array),
                Arc::new(filename_array),
                Arc::new(dataset_array),
                Arc::new(num_pages_array),
                Arc::new(chunk_index_array),
                Arc::new(file_hash_array),
                Arc::new(indexed_at_array),
                Arc::new(content_array),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    /// Nearest chunks by vector distance, with their similarity scores
    async fn vector_search(
        &self,
        table: &Table,
        query_vector: Vec<f32>,
        limit: usize,
        filter: Option<&str>,
    ) -> Result<Vec<(StoredChunk, f32)>> {
        let mut query = table
            .vector_search(query_vector)
            .context("Failed to create vector search")?
            .limit(limit);

        if let Some(filter) = filter {
            query = query.only_if(filter);
        }

        let batches: Vec<RecordBatch> = query
            .execute()
            .await
            .context("Failed to execute search")?
            .try_collect()
            .await
            .context("Failed to collect search results")?;

        let mut hits = Vec::new();
        for batch in &batches {
            let chunks = read_chunks(batch)?;
            let scores = read_scores(batch)?;
            hits.extend(chunks.into_iter().zip(scores));
        }

        Ok(hits)
    }

    /// Fetch chunk rows by id (used for keyword-only hits in hybrid search)
    async fn fetch_chunks(
        &self,
        table: &Table,
        ids: &[String],
        filter: Option<&str>,
    ) -> Result<Vec<StoredChunk>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let id_list = ids
            .iter()
            .map(|id| sql_string(id))
            .collect::<Vec<_>>()
            .join(", ");
        let mut predicate = format!("id IN ({})", id_list);
        if let Some(filter) = filter {
            predicate = format!("{} AND {}", predicate, filter);
        }

        let batches: Vec<RecordBatch> = table
            .query()
            .select(Select::Columns(
                RESULT_COLUMNS.iter().map(|c| c.to_string()).collect(),
            ))
            .only_if(predicate)
            .execute()
            .await
            .context("Failed to query chunks by id")?
            .try_collect()
            .await
            .context("Failed to collect chunks")?;

        let mut chunks = Vec::new();
        for batch in &batches {
            chunks.extend(read_chunks(batch)?);
        }
        Ok(chunks)
    }

    async fn hybrid_search(
        &self,
        table: &Table,
        query_vector: Vec<f32>,
        query_text: &str,
        limit: usize,
        min_score: f32,
        filter: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        // Over-fetch from both sources so fusion has something to combine
        let search_limit = limit * 3;

        let vector_hits = self
            .vector_search(table, query_vector, search_limit, filter)
            .await?;
        let keyword_hits = self
            .bm25
            .search(query_text, search_limit)
            .context("Failed to search BM25 index")?;

        let vector_ranking: Vec<(String, f32)> = vector_hits
            .iter()
            .map(|(chunk, score)| (chunk.id.clone(), *score))
            .collect();
        let mut keyword_ranking: Vec<(String, f32)> = keyword_hits
            .iter()
            .map(|hit| (hit.id.clone(), hit.score))
            .collect();

        let keyword_scores: HashMap<String, f32> = keyword_ranking.iter().cloned().collect();
        let mut chunks: HashMap<String, (StoredChunk, f32)> = vector_hits
            .into_iter()
            .map(|(chunk, score)| (chunk.id.clone(), (chunk, score)))
            .collect();

        let missing: Vec<String> = keyword_ranking
            .iter()
            .filter(|(id, _)| !chunks.contains_key(id))
            .map(|(id, _)| id.clone())
            .collect();
        for chunk in self.fetch_chunks(table, &missing, filter).await? {
            chunks.insert(chunk.id.clone(), (chunk, 0.0));
        }

        // The BM25 index is not dataset aware; keyword hits outside the filter
        // were never fetched and must not take a fused slot
        keyword_ranking.retain(|(id, _)| chunks.contains_key(id));

        let combined = reciprocal_rank_fusion(vec![vector_ranking, keyword_ranking], limit);

        let mut results = Vec::with_capacity(combined.len());
        for (id, combined_score) in combined {
            let Some((chunk, vector_score)) = chunks.remove(&id) else {
                continue;
            };
            let keyword_score = keyword_scores.get(&id).copied();

            // Accept if either the vector or the keyword score meets the threshold
            let passes_filter =
                vector_score >= min_score || keyword_score.is_some_and(|k| k >= min_score);
            if passes_filter {
                results.push(chunk.into_result(combined_score, vector_score, keyword_score));
            }
        }

        Ok(results)
    }
}

#[async_trait::async_trait]
impl VectorDatabase for LanceVectorDB {
    async fn initialize(&self, dimension: usize) -> Result<()> {
        tracing::info!(
            "Initializing LanceDB with dimension {} at {}",
            dimension,
            self.db_path.display()
        );

        if self.table_exists().await? {
            tracing::info!("Table '{}' already exists", self.table_name);
            return Ok(());
        }

        let schema = Self::create_schema(dimension);
        let empty_batch = RecordBatch::new_empty(schema.clone());
        let batches =
            RecordBatchIterator::new(vec![empty_batch].into_iter().map(Ok), schema.clone());

        self.connection
            .create_table(&self.table_name, Box::new(batches))
            .execute()
            .await
            .context("Failed to create table")?;

        tracing::info!("Created table '{}'", self.table_name);
        Ok(())
    }

    async fn is_initialized(&self) -> Result<bool> {
        self.table_exists().await
    }

    async fn store_embeddings(
        &self,
        embeddings: Vec<Vec<f32>>,
        metadata: Vec<ChunkMetadata>,
        contents: Vec<String>,
    ) -> Result<usize> {
        if embeddings.is_empty() {
            return Ok(0);
        }

        if embeddings.len() != metadata.len() || embeddings.len() != contents.len() {
            anyhow::bail!(
                "Mismatched batch: {} embeddings, {} metadata, {} contents",
                embeddings.len(),
                metadata.len(),
                contents.len()
            );
        }

        let dimension = embeddings[0].len();
        let schema = Self::create_schema(dimension);
        let table = self.get_table().await?;

        let batch = Self::create_record_batch(embeddings, &metadata, &contents, schema.clone())?;
        let count = batch.num_rows();
        let batches = RecordBatchIterator::new(vec![batch].into_iter().map(Ok), schema);

        table
            .add(Box::new(batches))
            .execute()
            .await
            .context("Failed to add records to table")?;

        let bm25_docs = metadata
            .iter()
            .zip(contents)
            .map(|(m, content)| BM25Document {
                id: chunk_id(&m.doc_id, m.chunk_index),
                doc_id: m.doc_id.clone(),
                content,
            })
            .collect();
        self.bm25
            .add_documents(bm25_docs)
            .context("Failed to add documents to BM25 index")?;

        tracing::debug!("Stored {} embeddings with BM25 indexing", count);
        Ok(count)
    }

    async fn search(
        &self,
        query_vector: Vec<f32>,
        query_text: &str,
        limit: usize,
        min_score: f32,
        dataset: Option<String>,
        hybrid: bool,
    ) -> Result<Vec<SearchResult>> {
        let table = self.get_table().await?;
        let filter = dataset.as_deref().map(|d| format!("dataset = {}", sql_string(d)));

        if hybrid {
            return self
                .hybrid_search(
                    &table,
                    query_vector,
                    query_text,
                    limit,
                    min_score,
                    filter.as_deref(),
                )
                .await;
        }

        let hits = self
            .vector_search(&table, query_vector, limit, filter.as_deref())
            .await?;

        Ok(hits
            .into_iter()
            .filter(|(_, score)| *score >= min_score)
            .map(|(chunk, score)| chunk.into_result(score, score, None))
            .collect())
    }

    async fn delete_by_document(&self, doc_id: &str) -> Result<()> {
        self.bm25
            .delete_by_document(doc_id)
            .context("Failed to delete from BM25 index")?;

        if !self.table_exists().await? {
            return Ok(());
        }

        let table = self.get_table().await?;
        table
            .delete(&format!("doc_id = {}", sql_string(doc_id)))
            .await
            .context("Failed to delete records")?;

        tracing::debug!("Deleted embeddings for document: {}", doc_id);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        if self.table_exists().await? {
            self.connection
                .drop_table(&self.table_name, &[])
                .await
                .context("Failed to drop table")?;
        }

        self.bm25.clear().context("Failed to clear BM25 index")?;

        tracing::info!("Cleared all embeddings and the BM25 index");
        Ok(())
    }

    async fn get_statistics(&self) -> Result<IndexStatistics> {
        if !self.table_exists().await? {
            return Ok(IndexStatistics::default());
        }

        let table = self.get_table().await?;
        let total_chunks = table
            .count_rows(None)
            .await
            .context("Failed to count rows")?;

        let batches: Vec<RecordBatch> = table
            .query()
            .select(Select::Columns(vec![
                "doc_id".to_string(),
                "dataset".to_string(),
            ]))
            .execute()
            .await
            .context("Failed to query datasets")?
            .try_collect()
            .await
            .context("Failed to collect dataset data")?;

        let mut documents: HashSet<String> = HashSet::new();
        let mut dataset_counts: HashMap<String, usize> = HashMap::new();

        for batch in &batches {
            let doc_ids = string_column(batch, "doc_id")?;
            let datasets = string_column(batch, "dataset")?;

            for i in 0..batch.num_rows() {
                documents.insert(doc_ids.value(i).to_string());
                *dataset_counts
                    .entry(datasets.value(i).to_string())
                    .or_insert(0) += 1;
            }
        }

        let mut dataset_breakdown: Vec<DatasetStats> = dataset_counts
            .into_iter()
            .map(|(dataset, chunk_count)| DatasetStats {
                dataset,
                chunk_count,
            })
            .collect();
        dataset_breakdown.sort_by(|a, b| {
            b.chunk_count
                .cmp(&a.chunk_count)
                .then_with(|| a.dataset.cmp(&b.dataset))
        });

        Ok(IndexStatistics {
            total_chunks,
            total_documents: documents.len(),
            dataset_breakdown,
        })
    }
}
