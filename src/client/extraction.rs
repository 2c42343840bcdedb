//! PDF tree -> `documents.json`

use crate::error::{ExtractionError, IndexingError, RagError};
use crate::indexer::{PdfWalker, dataset_label, document_stem, extract_pdf};
use crate::manifest::DocumentStore;
use crate::paths::DataLayout;
use crate::types::{DocumentMetadata, ExtractSummary, ProcessedDocument};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

enum Outcome {
    Extracted(ProcessedDocument),
    Empty,
    Failed,
    Cancelled,
}

fn extract_one(path: &Path, cancelled: &AtomicBool) -> Outcome {
    if cancelled.load(Ordering::Relaxed) {
        return Outcome::Cancelled;
    }

    let id = match document_stem(path) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!("{}", e);
            return Outcome::Failed;
        }
    };

    let pdf = match extract_pdf(path) {
        Ok(pdf) => pdf,
        Err(e) => {
            tracing::warn!("Skipping {}: {}", path.display(), e);
            return Outcome::Failed;
        }
    };

    if pdf.is_empty() {
        tracing::warn!("{}", ExtractionError::NoText(path.display().to_string()));
        return Outcome::Empty;
    }

    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    Outcome::Extracted(ProcessedDocument {
        id,
        text: pdf.text(),
        metadata: DocumentMetadata {
            num_pages: pdf.num_pages,
            filename,
            dataset: dataset_label(path),
            file_hash: pdf.file_hash,
        },
        processed_at: chrono::Utc::now().to_rfc3339(),
    })
}

/// Extract every PDF below `pdfs_dir` in parallel; output keeps sorted path order
pub fn extract_directory(
    pdfs_dir: &Path,
    cancelled: Arc<AtomicBool>,
) -> Result<(DocumentStore, ExtractSummary), RagError> {
    if !pdfs_dir.is_dir() {
        return Err(ExtractionError::DirectoryNotFound(pdfs_dir.display().to_string()).into());
    }

    let paths: Vec<PathBuf> = PdfWalker::new(pdfs_dir)
        .with_cancellation_flag(cancelled.clone())
        .walk()?;

    let outcomes: Vec<Outcome> = paths
        .par_iter()
        .map(|path| extract_one(path, &cancelled))
        .collect();

    if cancelled.load(Ordering::Relaxed) {
        return Err(IndexingError::Cancelled.into());
    }

    let mut summary = ExtractSummary {
        found: paths.len(),
        ..ExtractSummary::default()
    };
    let mut documents = Vec::with_capacity(paths.len());

    for outcome in outcomes {
        match outcome {
            Outcome::Extracted(doc) => {
                summary.extracted += 1;
                documents.push(doc);
            }
            Outcome::Empty => summary.empty += 1,
            Outcome::Failed => summary.failed += 1,
            Outcome::Cancelled => {}
        }
    }

    Ok((DocumentStore::new(documents), summary))
}

/// Extract `data/pdfs` into `data/processed/documents.json` on the blocking pool
pub async fn extract_documents(
    layout: &DataLayout,
    cancel_token: CancellationToken,
) -> Result<(DocumentStore, ExtractSummary), RagError> {
    let start = Instant::now();
    let pdfs_dir = layout.pdfs_dir();

    let cancelled_flag = Arc::new(AtomicBool::new(false));
    let watcher = {
        let flag = cancelled_flag.clone();
        let token = cancel_token.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            flag.store(true, Ordering::Relaxed);
        })
    };

    let result = tokio::task::spawn_blocking(move || extract_directory(&pdfs_dir, cancelled_flag))
        .await
        .map_err(|e| RagError::other(format!("Extraction task failed: {}", e)));
    watcher.abort();

    let (store, summary) = result??;
    store.save(&layout.documents_path())?;

    tracing::info!(
        "Extracted {}/{} PDFs ({} failed, {} empty) in {:?}",
        summary.extracted,
        summary.found,
        summary.failed,
        summary.empty,
        start.elapsed()
    );
    Ok((store, summary))
}
