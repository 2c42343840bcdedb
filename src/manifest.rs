//! Flat JSON files that carry work from one pipeline stage to the next
//!
//! The scraper writes a [`Manifest`] of document links that the fetcher reads;
//! the extractor writes a [`DocumentStore`] that the indexer reads.

use crate::error::{ExtractionError, ManifestError, RagError};
use crate::types::{DocumentLink, ProcessedDocument};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// List of document links, stored as a JSON array
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub links: Vec<DocumentLink>,
}

impl Manifest {
    pub fn new(links: Vec<DocumentLink>) -> Self {
        Self { links }
    }

    /// Load the manifest, failing with a hint when it has not been scraped yet
    pub fn load(path: &Path) -> Result<Self, RagError> {
        if !path.exists() {
            return Err(ManifestError::NotFound(path.display().to_string()).into());
        }

        let content = fs::read_to_string(path).map_err(|e| ManifestError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let manifest: Manifest = serde_json::from_str(&content)
            .map_err(|e| ManifestError::ParseFailed(e.to_string()))?;

        tracing::info!(
            "Loaded {} document links from {}",
            manifest.len(),
            path.display()
        );
        Ok(manifest)
    }

    /// Write the manifest as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), RagError> {
        let write_failed = |reason: String| ManifestError::WriteFailed {
            path: path.display().to_string(),
            reason,
        };

        write_json(path, self).map_err(write_failed)?;
        tracing::info!("Saved {} document links to {}", self.len(), path.display());
        Ok(())
    }

    /// Drop repeated URLs, keeping the first occurrence; returns how many were removed
    pub fn dedup(&mut self) -> usize {
        let before = self.links.len();
        let mut seen = HashSet::new();
        self.links.retain(|link| seen.insert(link.url.clone()));
        before - self.links.len()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// The first `limit` links, or all of them
    pub fn take(&self, limit: Option<usize>) -> &[DocumentLink] {
        match limit {
            Some(n) => &self.links[..n.min(self.links.len())],
            None => &self.links,
        }
    }
}

/// Extracted documents, stored as a JSON array
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentStore {
    pub documents: Vec<ProcessedDocument>,
}

impl DocumentStore {
    pub fn new(documents: Vec<ProcessedDocument>) -> Self {
        Self { documents }
    }

    pub fn load(path: &Path) -> Result<Self, RagError> {
        if !path.exists() {
            return Err(ExtractionError::DocumentsNotFound(path.display().to_string()).into());
        }

        let content = fs::read_to_string(path)?;
        let store: DocumentStore = serde_json::from_str(&content).map_err(|e| {
            RagError::other(format!(
                "Failed to parse processed documents '{}': {}",
                path.display(),
                e
            ))
        })?;

        tracing::info!(
            "Loaded {} processed documents from {}",
            store.documents.len(),
            path.display()
        );
        Ok(store)
    }

    pub fn save(&self, path: &Path) -> Result<(), RagError> {
        write_json(path, self).map_err(|reason| ExtractionError::WriteFailed {
            path: path.display().to_string(),
            reason,
        })?;

        tracing::info!(
            "Saved {} processed documents to {}",
            self.documents.len(),
            path.display()
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), String> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }

    let content = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    fs::write(path, content).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentMetadata;
    use tempfile::TempDir;

    fn link(url: &str, dataset: u32) -> DocumentLink {
        DocumentLink::from_url(url, dataset).unwrap()
    }

    #[test]
    fn test_manifest_save_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("document-links.json");

        let manifest = Manifest::new(vec![
            link("https://example.com/a.pdf", 1),
            link("https://example.com/b.pdf", 2),
        ]);
        manifest.save(&path).unwrap();

        let loaded = Manifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn test_manifest_is_plain_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("document-links.json");

        Manifest::new(vec![link("https://example.com/a.pdf", 1)])
            .save(&path)
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.is_array());
        assert_eq!(raw[0]["id"], "a");
        assert_eq!(raw[0]["dataset"], 1);
        // Pretty printed with two-space indent
        assert!(fs::read_to_string(&path).unwrap().contains("\n    \"id\""));
    }

    #[test]
    fn test_manifest_missing() {
        let result = Manifest::load(Path::new("/nonexistent/document-links.json"));
        assert!(matches!(
            result.unwrap_err(),
            RagError::Manifest(ManifestError::NotFound(_))
        ));
    }

    #[test]
    fn test_manifest_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("document-links.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            Manifest::load(&path).unwrap_err(),
            RagError::Manifest(ManifestError::ParseFailed(_))
        ));
    }

    #[test]
    fn test_dedup_keeps_first() {
        let mut manifest = Manifest::new(vec![
            link("https://example.com/a.pdf", 1),
            link("https://example.com/b.pdf", 1),
            link("https://example.com/a.pdf", 2),
        ]);

        assert_eq!(manifest.dedup(), 1);
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.links[0].dataset, 1);
        assert_eq!(manifest.links[1].id, "b");
    }

    #[test]
    fn test_take_limit() {
        let manifest = Manifest::new(vec![
            link("https://example.com/a.pdf", 1),
            link("https://example.com/b.pdf", 1),
        ]);

        assert_eq!(manifest.take(Some(1)).len(), 1);
        assert_eq!(manifest.take(Some(10)).len(), 2);
        assert_eq!(manifest.take(None).len(), 2);
        assert!(manifest.take(Some(0)).is_empty());
    }

    #[test]
    fn test_document_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processed").join("documents.json");

        let store = DocumentStore::new(vec![ProcessedDocument {
            id: "a".to_string(),
            text: "hello\n".to_string(),
            metadata: DocumentMetadata {
                num_pages: 1,
                filename: "a.pdf".to_string(),
                dataset: "1".to_string(),
                file_hash: "h".to_string(),
            },
            processed_at: String::new(),
        }]);
        store.save(&path).unwrap();

        let loaded = DocumentStore::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.documents[0].metadata, store.documents[0].metadata);
    }

    #[test]
    fn test_document_store_missing() {
        let result = DocumentStore::load(Path::new("/nonexistent/documents.json"));
        assert!(matches!(
            result.unwrap_err(),
            RagError::Extraction(ExtractionError::DocumentsNotFound(_))
        ));
    }
}
