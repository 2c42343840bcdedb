//! PDF discovery, text extraction and chunking
//!
//! Turns the downloaded PDF tree into per-page text and splits that text into
//! overlapping chunks ready for embedding.

mod chunker;
mod pdf_extractor;
mod pdf_walker;

pub use chunker::{ChunkStrategy, TextChunker};
pub use pdf_extractor::{ExtractedPdf, extract_pdf, extract_pdf_bytes, hash_bytes, normalize_page};
pub use pdf_walker::{PdfWalker, dataset_label, document_stem};

use crate::types::ChunkMetadata;

/// A chunk of document text ready for embedding
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    /// The chunk text
    pub content: String,
    /// Source document, dataset and position of this chunk
    pub metadata: ChunkMetadata,
}
