//! # pdf-rag - Retrieval-augmented question answering over a public PDF release
//!
//! pdf-rag collects the PDF documents of a public records release, extracts
//! their text, indexes it in a local vector store and answers questions about
//! it through an LLM, citing the documents it used.
//!
//! ## Pipeline
//!
//! ```text
//!  listing pages ──scrape──▶ document-links.json ──fetch──▶ pdfs/dataset-N/*.pdf
//!                                                                │
//!                                                             extract
//!                                                                ▼
//!  HTTP /query ◀──serve── LanceDB + BM25 ◀──index──── processed/documents.json
//! ```
//!
//! Every stage reads the previous stage's files from the data directory
//! (see [`paths::DataLayout`]), so stages can be rerun independently.
//! Downloads skip files already on disk and indexing skips documents whose
//! content hash has not changed.
//!
//! ## Modules
//!
//! - [`fetcher`]: listing page scraping and rate-limited PDF downloads
//! - [`indexer`]: PDF discovery, text extraction and chunking
//! - [`embedding`]: embedding generation using FastEmbed
//! - [`vector_db`]: LanceDB vector store with optional BM25 hybrid search
//! - [`bm25_search`]: BM25 keyword search using Tantivy
//! - [`generation`]: prompt construction and LLM clients
//! - [`client`]: [`RagClient`], the entry point tying the stages together
//! - [`server`]: axum HTTP service
//! - [`cache`]: persistent document hash cache for incremental indexing
//! - [`manifest`]: on-disk manifest and document store
//! - [`config`]: configuration file and environment overrides
//!
//! ## Usage Example
//!
//! ```no_run
//! use pdf_rag::{Config, RagClient};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pdf_rag::RagError> {
//!     let client = RagClient::with_config(Config::new()?).await?;
//!
//!     let response = client.index_from_disk(false, CancellationToken::new()).await?;
//!     println!("Indexed {} documents", response.documents_indexed);
//!
//!     for hit in client.search("flight logs", 5, true).await? {
//!         println!("{} ({:.2})", hit.filename, hit.score);
//!     }
//!     Ok(())
//! }
//! ```

/// BM25 keyword search using Tantivy for hybrid search
pub mod bm25_search;

/// Persistent hash cache for tracking document changes across runs
pub mod cache;

/// Client API tying extraction, indexing, search and answering together
pub mod client;

/// Configuration management with environment variable overrides
pub mod config;

/// Embedding generation using FastEmbed (all-MiniLM-L6-v2)
pub mod embedding;

/// Error types and utilities
pub mod error;

/// Listing page scraper and PDF downloader
pub mod fetcher;

/// LLM clients and the answer prompt
pub mod generation;

/// PDF discovery, text extraction and chunking
pub mod indexer;

/// Manifest and processed document files
pub mod manifest;

/// Platform directories and the data directory layout
pub mod paths;

/// HTTP query service
pub mod server;

/// Request/response and pipeline data types
pub mod types;

/// Vector database abstraction backed by LanceDB
pub mod vector_db;

#[cfg(test)]
mod test_support;

pub use client::RagClient;
pub use config::Config;
pub use error::RagError;
pub use server::RagServer;
