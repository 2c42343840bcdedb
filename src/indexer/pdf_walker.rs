//! Directory traversal for downloaded PDFs

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use walkdir::WalkDir;

/// Prefix of the per-dataset download directories
pub const DATASET_DIR_PREFIX: &str = "dataset-";

pub struct PdfWalker {
    root: PathBuf,
    /// Optional cancellation flag - if set to true, walk() will exit early
    cancelled: Option<Arc<AtomicBool>>,
}

impl PdfWalker {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            cancelled: None,
        }
    }

    pub fn with_cancellation_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = Some(cancelled);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Every `*.pdf` file below the root (extension matched case-insensitively), sorted by path
    pub fn walk(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            anyhow::bail!("PDF directory not found: {}", self.root.display());
        }

        let mut pdfs = Vec::new();

        for entry in WalkDir::new(&self.root).follow_links(false) {
            if self.is_cancelled() {
                tracing::info!("PDF walk cancelled after {} files", pdfs.len());
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if entry.file_type().is_file() && is_pdf(entry.path()) {
                pdfs.push(entry.into_path());
            }
        }

        pdfs.sort();
        tracing::info!("Found {} PDFs under {}", pdfs.len(), self.root.display());
        Ok(pdfs)
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Dataset label for a PDF: its parent directory name without the `dataset-` prefix
pub fn dataset_label(path: &Path) -> String {
    let parent = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    parent
        .strip_prefix(DATASET_DIR_PREFIX)
        .map(str::to_string)
        .unwrap_or(parent)
}

/// Document id for a PDF: its file stem
pub fn document_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .with_context(|| format!("PDF path has no file name: {}", path.display()))
}
