/// Path computation for the pipeline's flat-file layout and per-user directories
///
/// Pipeline artifacts live under a single data directory (default `./data`):
///
/// ```text
/// data/
/// ├── document-links.json      manifest written by `scrape`
/// ├── pdfs/dataset-<N>/*.pdf   downloads written by `fetch`
/// ├── processed/documents.json extracted text written by `extract`
/// └── vectorstore/             LanceDB table, BM25 index and index cache
/// ```
use std::path::{Path, PathBuf};

const APP_DIR: &str = "pdf-rag";

/// Platform-agnostic user directories
pub struct PlatformPaths;

impl PlatformPaths {
    /// Get the appropriate config directory for the current platform
    ///
    /// - Windows: %APPDATA%
    /// - macOS: ~/Library/Application Support
    /// - Linux/Unix: $XDG_CONFIG_HOME or ~/.config
    pub fn config_dir() -> PathBuf {
        dirs::config_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Get the appropriate cache directory for the current platform
    pub fn cache_dir() -> PathBuf {
        dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Get default config file path
    ///
    /// Returns: {config_dir}/pdf-rag/config.toml
    pub fn default_config_path() -> PathBuf {
        Self::config_dir().join(APP_DIR).join("config.toml")
    }

    /// Get default directory for downloaded embedding models
    ///
    /// Returns: {cache_dir}/pdf-rag/models
    pub fn default_model_cache_dir() -> PathBuf {
        Self::cache_dir().join(APP_DIR).join("models")
    }
}

/// Locations of every pipeline artifact below one data root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// JSON array of document links
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("document-links.json")
    }

    /// Directory holding `dataset-<N>/` subdirectories of PDFs
    pub fn pdfs_dir(&self) -> PathBuf {
        self.root.join("pdfs")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.root.join("processed")
    }

    /// JSON array of extracted documents
    pub fn documents_path(&self) -> PathBuf {
        self.processed_dir().join("documents.json")
    }

    /// LanceDB database directory
    pub fn vectorstore_dir(&self) -> PathBuf {
        self.root.join("vectorstore")
    }

    /// Tantivy keyword index inside the vector store
    pub fn bm25_dir(&self) -> PathBuf {
        self.vectorstore_dir().join("bm25")
    }

    /// doc_id -> file hash map used for incremental indexing
    pub fn index_cache_path(&self) -> PathBuf {
        self.vectorstore_dir().join("index_cache.json")
    }

    /// Lock file held for the duration of an indexing run
    pub fn index_lock_path(&self) -> PathBuf {
        self.vectorstore_dir().join(".index.lock")
    }
}

impl Default for DataLayout {
    fn default() -> Self {
        Self::new("data")
    }
}
