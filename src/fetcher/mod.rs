//! Document download and link scraping
//!
//! Downloads run strictly one at a time with a fixed pause after each request,
//! which keeps the load on the source site predictable.

mod scrape;

pub use scrape::{LinkScraper, extract_links};

use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::types::{DocumentLink, FetchSummary};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use url::{Host, Url};

/// Media type every downloaded document must be served as
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Build the shared HTTP client: user agent, `Accept` header, timeout and the
/// age-verification cookie for the source site
pub fn build_http_client(config: &FetchConfig, accept: &str) -> Result<Client, FetchError> {
    let mut headers = HeaderMap::new();
    let accept = HeaderValue::from_str(accept)
        .map_err(|e| FetchError::ClientBuild(format!("Invalid Accept header: {}", e)))?;
    headers.insert(ACCEPT, accept);

    let jar = Arc::new(Jar::default());
    if !config.age_verification_cookie.is_empty() {
        let base = Url::parse(&config.base_url).map_err(|e| FetchError::InvalidUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        jar.add_cookie_str(&age_cookie(&config.age_verification_cookie, &base), &base);
    }

    Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .cookie_provider(jar)
        .timeout(Duration::from_secs(config.timeout_secs))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| FetchError::ClientBuild(e.to_string()))
}

/// Scope the cookie to the registrable domain (`www.example.gov` -> `.example.gov`)
/// so it also covers sibling hosts; IP hosts get a host-only cookie
fn age_cookie(cookie: &str, base: &Url) -> String {
    match base.host() {
        Some(Host::Domain(domain)) if domain.contains('.') => {
            let scope = domain.strip_prefix("www.").unwrap_or(domain);
            format!("{}; Domain=.{}; Path=/", cookie, scope)
        }
        _ => format!("{}; Path=/", cookie),
    }
}

fn request_error(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(url.to_string())
    } else {
        FetchError::RequestFailed {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

/// `<path>.part`, where a download is streamed before being moved into place
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Result of handling one manifest entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// File written, with its size in bytes
    Downloaded(u64),
    /// A large enough file was already on disk
    Skipped,
}

/// Sequential, rate-limited PDF downloader
pub struct PdfFetcher {
    client: Client,
    config: FetchConfig,
    pdfs_dir: PathBuf,
    show_progress: bool,
    cancel_token: CancellationToken,
}

impl PdfFetcher {
    pub fn new(config: &FetchConfig, pdfs_dir: impl Into<PathBuf>) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_http_client(config, PDF_CONTENT_TYPE)?,
            config: config.clone(),
            pdfs_dir: pdfs_dir.into(),
            show_progress: false,
            cancel_token: CancellationToken::new(),
        })
    }

    /// Show an indicatif progress bar while downloading
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Download every link in order; failures are logged and counted, never fatal
    pub async fn fetch_all(&self, links: &[DocumentLink]) -> FetchSummary {
        let mut summary = FetchSummary::default();
        let delay = Duration::from_millis(self.config.delay_ms);

        let progress = if self.show_progress {
            let bar = ProgressBar::new(links.len() as u64);
            bar.set_style(
                ProgressStyle::with_template(
                    "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        tracing::info!(
            "Downloading {} documents into {}",
            links.len(),
            self.pdfs_dir.display()
        );

        for link in links {
            if self.cancel_token.is_cancelled() {
                tracing::info!("Download cancelled");
                summary.cancelled = true;
                break;
            }

            progress.set_message(link.filename.clone());

            match self.fetch_one(link).await {
                Ok(FetchOutcome::Skipped) => {
                    tracing::debug!("Already downloaded: {}", link.filename);
                    summary.skipped += 1;
                    progress.inc(1);
                    // Skips cost no request, so no pause either
                    continue;
                }
                Ok(FetchOutcome::Downloaded(size)) => {
                    tracing::debug!("Downloaded {} ({} bytes)", link.filename, size);
                    summary.success += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to download {}: {}", link.url, e);
                    summary.failed += 1;
                }
            }
            progress.inc(1);

            tokio::select! {
                _ = self.cancel_token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if self.cancel_token.is_cancelled() {
            summary.cancelled = true;
        }

        progress.finish_and_clear();
        tracing::info!(
            "Download finished: {} succeeded, {} failed, {} skipped",
            summary.success,
            summary.failed,
            summary.skipped
        );
        summary
    }

    /// Skip the link if it is already on disk, otherwise download it with retries
    pub async fn fetch_one(&self, link: &DocumentLink) -> Result<FetchOutcome, FetchError> {
        let path = link.output_path(&self.pdfs_dir);

        if self.already_downloaded(&path).await {
            return Ok(FetchOutcome::Skipped);
        }

        let mut attempt = 0;
        loop {
            match self.download(&link.url, &path).await {
                Ok(size) => return Ok(FetchOutcome::Downloaded(size)),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(
                        self.config
                            .retry_backoff_ms
                            .saturating_mul(2u64.saturating_pow(attempt)),
                    );
                    tracing::warn!(
                        "{} (attempt {}/{}), retrying in {:?}",
                        e,
                        attempt + 1,
                        self.config.max_retries + 1,
                        delay
                    );
                    tokio::select! {
                        _ = self.cancel_token.cancelled() => return Err(e),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn already_downloaded(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|meta| meta.is_file() && meta.len() > self.config.min_existing_size)
            .unwrap_or(false)
    }

    /// One download attempt; nothing is left at `path` unless it succeeds
    async fn download(&self, url: &str, path: &Path) -> Result<u64, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.to_ascii_lowercase().contains(PDF_CONTENT_TYPE) {
            return Err(FetchError::NotPdf {
                url: url.to_string(),
                content_type,
            });
        }

        let part = partial_path(path);
        let result = Self::stream_to_file(url, response, path, &part).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(&part).await;
        }
        result
    }

    async fn stream_to_file(
        url: &str,
        response: reqwest::Response,
        path: &Path,
        part: &Path,
    ) -> Result<u64, FetchError> {
        let write_failed = |e: std::io::Error| FetchError::WriteFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(write_failed)?;
        }

        let mut file = tokio::fs::File::create(part).await.map_err(write_failed)?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| request_error(url, e))?;
            file.write_all(&chunk).await.map_err(write_failed)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(write_failed)?;
        drop(file);

        if written == 0 {
            return Err(FetchError::TooSmall {
                url: url.to_string(),
                size: 0,
            });
        }

        tokio::fs::rename(part, path).await.map_err(write_failed)?;
        Ok(written)
    }
}
