use super::EmbeddingProvider;
use crate::error::EmbeddingError;
use anyhow::{Context, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::Path;
use std::sync::Mutex;

/// FastEmbed-based embedding provider running a local ONNX model
pub struct FastEmbedManager {
    model: Mutex<TextEmbedding>,
    dimension: usize,
    model_name: String,
}

/// Map a configured model name to a fastembed model and its dimension
pub fn resolve_model(name: &str) -> Option<(EmbeddingModel, usize)> {
    let model = match name {
        "all-MiniLM-L6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => {
            (EmbeddingModel::AllMiniLML6V2, 384)
        }
        "all-MiniLM-L12-v2" | "sentence-transformers/all-MiniLM-L12-v2" => {
            (EmbeddingModel::AllMiniLML12V2, 384)
        }
        "bge-small-en-v1.5" | "BAAI/bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
        "bge-base-en-v1.5" | "BAAI/bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
        "bge-large-en-v1.5" | "BAAI/bge-large-en-v1.5" => (EmbeddingModel::BGELargeENV15, 1024),
        _ => return None,
    };
    Some(model)
}

impl FastEmbedManager {
    /// Create a new FastEmbedManager with the default model (all-MiniLM-L6-v2)
    pub fn new() -> Result<Self> {
        Self::from_name("all-MiniLM-L6-v2", None)
    }

    /// Create a manager for a model chosen by name, caching downloads in `cache_dir`
    pub fn from_name(name: &str, cache_dir: Option<&Path>) -> Result<Self> {
        let (model, dimension) = resolve_model(name).ok_or_else(|| {
            EmbeddingError::InitializationFailed(format!("Unsupported embedding model: {}", name))
        })?;

        tracing::info!("Initializing FastEmbed model: {} ({} dims)", name, dimension);

        let mut options = InitOptions::default();
        options.model_name = model;
        options.show_download_progress = true;
        if let Some(dir) = cache_dir {
            options.cache_dir = dir.to_path_buf();
        }

        let embedding_model =
            TextEmbedding::try_new(options).context("Failed to initialize FastEmbed model")?;

        Ok(Self {
            model: Mutex::new(embedding_model),
            dimension,
            model_name: name.to_string(),
        })
    }
}

impl EmbeddingProvider for FastEmbedManager {
    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        tracing::debug!("Generating embeddings for {} texts", texts.len());

        let mut model = self
            .model
            .lock()
            .map_err(|e| EmbeddingError::LockPoisoned(e.to_string()))?;

        let embeddings = model
            .embed(texts, None)
            .context("Failed to generate embeddings")?;

        if let Some(first) = embeddings.first()
            && first.len() != self.dimension
        {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: first.len(),
            }
            .into());
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_models() {
        assert_eq!(resolve_model("all-MiniLM-L6-v2").map(|m| m.1), Some(384));
        assert_eq!(resolve_model("BAAI/bge-base-en-v1.5").map(|m| m.1), Some(768));
        assert_eq!(resolve_model("bge-large-en-v1.5").map(|m| m.1), Some(1024));
    }

    #[test]
    fn test_resolve_unknown_model() {
        assert!(resolve_model("text-embedding-3-small").is_none());
    }

    #[test]
    fn test_unknown_model_fails_before_download() {
        let result = FastEmbedManager::from_name("no-such-model", None);
        assert!(result.is_err());
    }

    #[test]
    #[ignore = "downloads the ONNX model"]
    fn test_embedding_generation() {
        let manager = FastEmbedManager::new().unwrap();
        let texts = vec![
            "Flight logs from 2002".to_string(),
            "Deposition transcript, page 14".to_string(),
        ];

        let embeddings = manager.embed_batch(texts).unwrap();
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].len(), 384);
        assert_eq!(embeddings[1].len(), 384);
    }

    #[test]
    #[ignore = "downloads the ONNX model"]
    fn test_empty_batch() {
        let manager = FastEmbedManager::new().unwrap();
        let embeddings = manager.embed_batch(vec![]).unwrap();
        assert_eq!(embeddings.len(), 0);
    }

    #[test]
    #[ignore = "downloads the ONNX model"]
    fn test_model_name_and_dimension() {
        let manager = FastEmbedManager::new().unwrap();
        assert_eq!(manager.model_name(), "all-MiniLM-L6-v2");
        assert_eq!(manager.dimension(), 384);
    }
}
