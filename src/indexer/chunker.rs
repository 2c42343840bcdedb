use super::DocumentChunk;
use crate::config::ChunkingConfig;
use crate::error::ChunkingError;
use crate::types::{ChunkMetadata, ProcessedDocument};
use std::collections::VecDeque;

/// Separators tried in order by the recursive splitter; `""` splits into chars
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Strategy for chunking text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    /// Split on paragraph, line, word and finally character boundaries
    Recursive { size: usize, overlap: usize },
    /// Sliding window over characters
    FixedWindow { size: usize, overlap: usize },
}

impl ChunkStrategy {
    pub fn from_config(config: &ChunkingConfig) -> Result<Self, ChunkingError> {
        let size = config.chunk_size;
        let overlap = config.chunk_overlap;
        match config.strategy.as_str() {
            "recursive" => Ok(Self::Recursive { size, overlap }),
            "fixed" => Ok(Self::FixedWindow { size, overlap }),
            other => Err(ChunkingError::UnknownStrategy(other.to_string())),
        }
    }

    fn size_and_overlap(&self) -> (usize, usize) {
        match *self {
            Self::Recursive { size, overlap } | Self::FixedWindow { size, overlap } => {
                (size, overlap)
            }
        }
    }
}

/// Splits document text into overlapping chunks measured in characters
#[derive(Debug, Clone)]
pub struct TextChunker {
    strategy: ChunkStrategy,
    size: usize,
    overlap: usize,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split `text` on `separator`, keeping each separator at the start of the
/// piece that follows it. Empty pieces are dropped.
fn split_keep_start<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

impl TextChunker {
    pub fn new(strategy: ChunkStrategy) -> Result<Self, ChunkingError> {
        let (size, overlap) = strategy.size_and_overlap();

        if size == 0 {
            return Err(ChunkingError::InvalidChunkSize(
                "chunk size must be greater than 0".to_string(),
            ));
        }
        if overlap >= size {
            return Err(ChunkingError::InvalidChunkSize(format!(
                "overlap ({}) must be smaller than chunk size ({})",
                overlap, size
            )));
        }

        Ok(Self {
            strategy,
            size,
            overlap,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self, ChunkingError> {
        Self::new(ChunkStrategy::from_config(config)?)
    }

    pub fn strategy(&self) -> ChunkStrategy {
        self.strategy
    }

    /// Split raw text into chunks; whitespace-only chunks are never returned
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        match self.strategy {
            ChunkStrategy::Recursive { .. } => self.split_recursive(text, &SEPARATORS, &mut chunks),
            ChunkStrategy::FixedWindow { .. } => self.split_window(text, &mut chunks),
        }
        chunks.retain(|c| !c.trim().is_empty());
        chunks
    }

    /// Chunk a document, tagging each chunk with the document metadata
    pub fn chunk_document(&self, document: &ProcessedDocument) -> Vec<DocumentChunk> {
        let indexed_at = chrono::Utc::now().timestamp();

        self.split_text(&document.text)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, content)| DocumentChunk {
                content,
                metadata: ChunkMetadata {
                    doc_id: document.id.clone(),
                    filename: document.metadata.filename.clone(),
                    dataset: document.metadata.dataset.clone(),
                    num_pages: document.metadata.num_pages,
                    chunk_index,
                    file_hash: document.metadata.file_hash.clone(),
                    indexed_at,
                },
            })
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[&str], out: &mut Vec<String>) {
        // The first separator present in the text wins; later ones are for recursion
        let mut separator = "";
        let mut remaining: &[&str] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                break;
            }
            if text.contains(candidate) {
                separator = candidate;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut good_splits: Vec<&str> = Vec::new();
        for piece in split_keep_start(text, separator) {
            if char_len(piece) < self.size {
                good_splits.push(piece);
                continue;
            }

            if !good_splits.is_empty() {
                self.merge_splits(&good_splits, out);
                good_splits.clear();
            }

            if remaining.is_empty() {
                out.push(piece.to_string());
            } else {
                self.split_recursive(piece, remaining, out);
            }
        }

        if !good_splits.is_empty() {
            self.merge_splits(&good_splits, out);
        }
    }

    /// Greedily pack pieces into chunks, carrying up to `overlap` characters
    /// from the end of one chunk into the next
    fn merge_splits(&self, splits: &[&str], out: &mut Vec<String>) {
        let mut current: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0;

        for &piece in splits {
            let len = char_len(piece);

            if total + len > self.size && !current.is_empty() {
                Self::push_joined(&current, out);

                while total > self.overlap || (total + len > self.size && total > 0) {
                    match current.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }

            current.push_back((piece, len));
            total += len;
        }

        Self::push_joined(&current, out);
    }

    fn push_joined(pieces: &VecDeque<(&str, usize)>, out: &mut Vec<String>) {
        let joined: String = pieces.iter().map(|(piece, _)| *piece).collect();
        let trimmed = joined.trim();
        if !trimmed.is_empty() {
            out.push(trimmed.to_string());
        }
    }

    fn split_window(&self, text: &str, out: &mut Vec<String>) {
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return;
        }

        let step = self.size - self.overlap;
        let mut start = 0;

        while start < chars.len() {
            let end = (start + self.size).min(chars.len());
            out.push(chars[start..end].iter().collect());

            if end >= chars.len() {
                break;
            }
            start += step;
        }
    }
}

impl Default for TextChunker {
    /// 1000-character chunks with 200 characters of overlap
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::Recursive {
                size: 1000,
                overlap: 200,
            },
            size: 1000,
            overlap: 200,
        }
    }
}
