use crate::error::ExtractionError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Page separator emitted by pdf-extract
const FORM_FEED: char = '\u{c}';

/// Text pulled out of one PDF, page by page
#[derive(Debug, Clone)]
pub struct ExtractedPdf {
    /// Normalised text of each page, in page order
    pub pages: Vec<String>,
    /// Page count reported by the PDF structure when it could be read
    pub num_pages: usize,
    /// SHA256 of the raw file bytes
    pub file_hash: String,
}

impl ExtractedPdf {
    /// Every page's text followed by a newline
    pub fn text(&self) -> String {
        let mut text = String::new();
        for page in &self.pages {
            text.push_str(page);
            text.push('\n');
        }
        text
    }

    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(|page| page.trim().is_empty())
    }
}

/// SHA256 hex digest of `bytes`
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Extract per-page text from a PDF on disk
pub fn extract_pdf(path: &Path) -> Result<ExtractedPdf, ExtractionError> {
    let bytes = std::fs::read(path).map_err(|e| ExtractionError::ReadFailed {
        file: path.display().to_string(),
        reason: e.to_string(),
    })?;

    extract_pdf_bytes(&bytes, &path.display().to_string())
}

/// Extract per-page text from PDF bytes; `label` names the file in errors and logs
///
/// lopdf is tried first because it exposes pages individually. When it cannot
/// load the file, or finds no text on any page, pdf-extract is used on the
/// whole document and its output is split on form feeds.
pub fn extract_pdf_bytes(bytes: &[u8], label: &str) -> Result<ExtractedPdf, ExtractionError> {
    let file_hash = hash_bytes(bytes);

    let structural_pages = match lopdf::Document::load_mem(bytes) {
        Ok(doc) => {
            let pages = extract_with_lopdf(&doc, label);
            if pages.iter().any(|page| !page.trim().is_empty()) {
                let num_pages = pages.len();
                return Ok(ExtractedPdf {
                    pages,
                    num_pages,
                    file_hash,
                });
            }
            Some(pages.len())
        }
        Err(e) => {
            tracing::debug!("lopdf could not load {}: {}", label, e);
            None
        }
    };

    match extract_with_pdf_extract(bytes) {
        Ok(pages) => {
            let num_pages = structural_pages.unwrap_or(pages.len());
            Ok(ExtractedPdf {
                pages,
                num_pages,
                file_hash,
            })
        }
        // lopdf parsed the file, it just has no text layer
        Err(_) if structural_pages.is_some() => Ok(ExtractedPdf {
            pages: vec![],
            num_pages: structural_pages.unwrap_or(0),
            file_hash,
        }),
        Err(reason) => Err(ExtractionError::ParseFailed {
            file: label.to_string(),
            reason,
        }),
    }
}

fn extract_with_lopdf(doc: &lopdf::Document, label: &str) -> Vec<String> {
    doc.get_pages()
        .keys()
        .map(|&page_number| match doc.extract_text(&[page_number]) {
            Ok(text) => normalize_page(&text),
            Err(e) => {
                tracing::debug!("No text on page {} of {}: {}", page_number, label, e);
                String::new()
            }
        })
        .collect()
}

fn extract_with_pdf_extract(bytes: &[u8]) -> Result<Vec<String>, String> {
    // pdf-extract panics on some malformed inputs
    let text = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| "pdf-extract panicked while parsing".to_string())?
        .map_err(|e| e.to_string())?;

    let mut pages: Vec<String> = text.split(FORM_FEED).map(normalize_page).collect();
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    Ok(pages)
}

/// Trim trailing whitespace on every line and collapse runs of three or more
/// blank lines into a single blank line
pub fn normalize_page(text: &str) -> String {
    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());

    let mut i = 0;
    while i < lines.len() {
        if !lines[i].is_empty() {
            out.push(lines[i]);
            i += 1;
            continue;
        }

        let run_start = i;
        while i < lines.len() && lines[i].is_empty() {
            i += 1;
        }
        let run = i - run_start;
        let keep = if run >= 3 { 1 } else { run };
        out.extend(std::iter::repeat_n("", keep));
    }

    out.join("\n").trim_end().to_string()
}
