//! Fixtures shared by unit tests

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

/// Build a PDF with one line of Courier text per page
pub fn make_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// Deterministic bag-of-words embedder: each word is hashed into one of `DIM` buckets
pub struct HashEmbedder {
    pub fail_on: Option<String>,
}

impl HashEmbedder {
    pub const DIM: usize = 32;

    pub fn new() -> Self {
        Self { fail_on: None }
    }

    /// Fails any batch containing a text with `marker` in it
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_on: Some(marker.to_string()),
        }
    }

    pub fn embed(text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};

        let mut vector = vec![0.0f32; Self::DIM];
        for word in text.split_whitespace() {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if word.is_empty() {
                continue;
            }
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            word.hash(&mut hasher);
            vector[(hasher.finish() % Self::DIM as u64) as usize] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        } else {
            vector[0] = 1.0;
        }
        vector
    }
}

impl crate::embedding::EmbeddingProvider for HashEmbedder {
    fn embed_batch(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
        if let Some(marker) = &self.fail_on
            && texts.iter().any(|t| t.contains(marker.as_str()))
        {
            anyhow::bail!("refusing to embed text containing {}", marker);
        }
        Ok(texts.iter().map(|t| Self::embed(t)).collect())
    }

    fn dimension(&self) -> usize {
        Self::DIM
    }

    fn model_name(&self) -> &str {
        "hash-embedder"
    }
}

/// LLM stand-in that records the last prompt and answers with a fixed string
#[derive(Default)]
pub struct RecordingLlm {
    pub last_prompt: std::sync::Mutex<Option<String>>,
}

#[async_trait::async_trait]
impl crate::generation::LlmProvider for RecordingLlm {
    async fn complete(&self, prompt: &str) -> Result<String, crate::error::LlmError> {
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        Ok("The flight logs are in EFTA00001.".to_string())
    }

    fn model_name(&self) -> &str {
        "recording"
    }
}

/// A processed document with a synthetic hash derived from its text
pub fn document(id: &str, dataset: &str, text: &str) -> crate::types::ProcessedDocument {
    crate::types::ProcessedDocument {
        id: id.to_string(),
        text: text.to_string(),
        metadata: crate::types::DocumentMetadata {
            num_pages: 1,
            filename: format!("{}.pdf", id),
            dataset: dataset.to_string(),
            file_hash: crate::indexer::hash_bytes(text.as_bytes()),
        },
        processed_at: String::new(),
    }
}
