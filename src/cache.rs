use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Cache of document hashes to support incremental indexing
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IndexCache {
    /// Embedding model the stored vectors were produced with
    #[serde(default)]
    pub model_name: Option<String>,
    /// Map of document id -> SHA256 of the source PDF
    #[serde(default)]
    pub documents: HashMap<String, String>,
}

/// What an indexing run has to do for the current set of documents
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IndexPlan {
    /// Not in the cache yet
    pub added: Vec<String>,
    /// In the cache with a different hash
    pub changed: Vec<String>,
    /// In the cache with the same hash
    pub unchanged: Vec<String>,
    /// In the cache but no longer present
    pub removed: Vec<String>,
}

impl IndexCache {
    /// Load cache from disk
    pub fn load(cache_path: &Path) -> Result<Self> {
        if !cache_path.exists() {
            tracing::debug!("Cache file not found, starting with empty cache");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(cache_path).context("Failed to read cache file")?;

        let cache: IndexCache =
            serde_json::from_str(&content).context("Failed to parse cache file")?;

        tracing::info!("Loaded cache with {} indexed documents", cache.documents.len());
        Ok(cache)
    }

    /// Save cache to disk
    pub fn save(&self, cache_path: &Path) -> Result<()> {
        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent).context("Failed to create cache directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize cache")?;

        fs::write(cache_path, content).context("Failed to write cache file")?;

        tracing::debug!("Saved cache to {:?}", cache_path);
        Ok(())
    }

    pub fn get(&self, doc_id: &str) -> Option<&String> {
        self.documents.get(doc_id)
    }

    pub fn insert(&mut self, doc_id: String, hash: String) {
        self.documents.insert(doc_id, hash);
    }

    pub fn remove(&mut self, doc_id: &str) {
        self.documents.remove(doc_id);
    }

    pub fn clear(&mut self) {
        self.documents.clear();
        self.model_name = None;
    }

    /// Compare `current` (doc id -> hash) with what was indexed last time
    pub fn plan(&self, current: &HashMap<String, String>) -> IndexPlan {
        let mut plan = IndexPlan::default();

        for (doc_id, hash) in current {
            match self.documents.get(doc_id) {
                None => plan.added.push(doc_id.clone()),
                Some(old) if old != hash => plan.changed.push(doc_id.clone()),
                Some(_) => plan.unchanged.push(doc_id.clone()),
            }
        }

        plan.removed = self
            .documents
            .keys()
            .filter(|doc_id| !current.contains_key(*doc_id))
            .cloned()
            .collect();

        plan.added.sort();
        plan.changed.sort();
        plan.unchanged.sort();
        plan.removed.sort();
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_cache_save_load() {
        let temp_file = NamedTempFile::new().unwrap();
        let cache_path = temp_file.path().to_path_buf();

        let mut cache = IndexCache::default();
        cache.insert("EFTA00001".to_string(), "hash1".to_string());
        cache.model_name = Some("all-MiniLM-L6-v2".to_string());

        cache.save(&cache_path).unwrap();

        let loaded = IndexCache::load(&cache_path).unwrap();
        assert_eq!(loaded.documents, cache.documents);
        assert_eq!(loaded.model_name.as_deref(), Some("all-MiniLM-L6-v2"));
    }

    #[test]
    fn test_cache_operations() {
        let mut cache = IndexCache::default();

        cache.insert("a".to_string(), "hash1".to_string());
        assert_eq!(cache.get("a").map(String::as_str), Some("hash1"));
        assert!(cache.get("missing").is_none());

        cache.remove("a");
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_plan_classifies_documents() {
        let mut cache = IndexCache::default();
        cache.insert("same".to_string(), "h1".to_string());
        cache.insert("edited".to_string(), "h2".to_string());
        cache.insert("gone".to_string(), "h3".to_string());

        let mut current = HashMap::new();
        current.insert("same".to_string(), "h1".to_string());
        current.insert("edited".to_string(), "h2-new".to_string());
        current.insert("fresh".to_string(), "h4".to_string());

        let plan = cache.plan(&current);
        assert_eq!(plan.added, vec!["fresh".to_string()]);
        assert_eq!(plan.changed, vec!["edited".to_string()]);
        assert_eq!(plan.unchanged, vec!["same".to_string()]);
        assert_eq!(plan.removed, vec!["gone".to_string()]);
    }

    #[test]
    fn test_plan_empty_cache_adds_everything() {
        let cache = IndexCache::default();
        let mut current = HashMap::new();
        current.insert("b".to_string(), "h".to_string());
        current.insert("a".to_string(), "h".to_string());

        let plan = cache.plan(&current);
        assert_eq!(plan.added, vec!["a".to_string(), "b".to_string()]);
        assert!(plan.removed.is_empty());
    }

    #[test]
    fn test_load_nonexistent_cache() {
        let result = IndexCache::load(Path::new("/nonexistent/path/cache.json"));
        assert!(result.is_ok());
        assert!(result.unwrap().documents.is_empty());
    }

    #[test]
    fn test_load_corrupt_cache() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "not json").unwrap();
        assert!(IndexCache::load(temp_file.path()).is_err());
    }
}
