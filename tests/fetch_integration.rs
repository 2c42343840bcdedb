/// Scraping and downloading against a local mock of the document site
mod common;

use anyhow::Result;
use common::{AGE_COOKIE, site_config, start_site};
use pdf_rag::error::FetchError;
use pdf_rag::fetcher::{FetchOutcome, LinkScraper, PdfFetcher};
use pdf_rag::manifest::Manifest;
use pdf_rag::types::DocumentLink;
use std::sync::atomic::Ordering;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn link(addr: std::net::SocketAddr, path: &str, dataset: u32) -> DocumentLink {
    DocumentLink::from_url(&format!("http://{}{}", addr, path), dataset).unwrap()
}

#[tokio::test]
async fn test_scrape_writes_manifest() -> Result<()> {
    let (addr, _) = start_site().await;
    let dir = TempDir::new()?;
    let config = site_config(addr, dir.path());
    let layout = config.layout();

    let summary = LinkScraper::new(&config.fetch)?
        .scrape_to(&layout.manifest_path())
        .await?;

    assert_eq!(summary.datasets_scraped, 2);
    assert_eq!(summary.datasets_failed, 0);
    assert_eq!(summary.links_found, 3);

    let manifest = Manifest::load(&layout.manifest_path())?;
    let ids: Vec<&str> = manifest.links.iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids, vec!["EFTA00001", "EFTA00002", "EFTA00003"]);
    assert_eq!(manifest.links[2].dataset, 2);
    assert_eq!(
        manifest.links[0].url,
        format!("http://{}/files/EFTA00001.pdf", addr)
    );
    Ok(())
}

#[tokio::test]
async fn test_scrape_counts_missing_listing() -> Result<()> {
    let (addr, _) = start_site().await;
    let dir = TempDir::new()?;
    let mut config = site_config(addr, dir.path());
    config.fetch.last_dataset = 3;

    let (manifest, summary) = LinkScraper::new(&config.fetch)?.scrape_all().await;

    assert_eq!(summary.datasets_scraped, 2);
    assert_eq!(summary.datasets_failed, 1);
    assert_eq!(manifest.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_fetch_downloads_then_skips() -> Result<()> {
    let (addr, site) = start_site().await;
    let dir = TempDir::new()?;
    let config = site_config(addr, dir.path());
    let pdfs_dir = config.layout().pdfs_dir();

    let links = vec![
        link(addr, "/files/EFTA00001.pdf", 1),
        link(addr, "/files/EFTA00003.pdf", 2),
    ];
    let fetcher = PdfFetcher::new(&config.fetch, &pdfs_dir)?;

    let first = fetcher.fetch_all(&links).await;
    assert_eq!(first.success, 2);
    assert_eq!(first.failed, 0);
    assert!(!first.cancelled);

    let saved = std::fs::read(pdfs_dir.join("dataset-2/EFTA00003.pdf"))?;
    assert!(saved.starts_with(b"%PDF"));
    assert!(!pdfs_dir.join("dataset-2/EFTA00003.pdf.part").exists());

    let second = fetcher.fetch_all(&links).await;
    assert_eq!(second.success, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(site.downloads.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_fetch_without_age_cookie_is_rejected() -> Result<()> {
    let (addr, _) = start_site().await;
    let dir = TempDir::new()?;
    let mut config = site_config(addr, dir.path());
    config.fetch.age_verification_cookie = String::new();
    let pdfs_dir = config.layout().pdfs_dir();

    let fetcher = PdfFetcher::new(&config.fetch, &pdfs_dir)?;
    let result = fetcher.fetch_one(&link(addr, "/files/EFTA00001.pdf", 1)).await;

    assert!(matches!(result, Err(FetchError::NotPdf { .. })));
    assert!(!pdfs_dir.join("dataset-1/EFTA00001.pdf").exists());
    Ok(())
}

#[tokio::test]
async fn test_fetch_sends_age_cookie() -> Result<()> {
    let (addr, _) = start_site().await;
    let dir = TempDir::new()?;
    let config = site_config(addr, dir.path());
    assert_eq!(config.fetch.age_verification_cookie, AGE_COOKIE);

    let fetcher = PdfFetcher::new(&config.fetch, config.layout().pdfs_dir())?;
    let outcome = fetcher.fetch_one(&link(addr, "/files/EFTA00002.pdf", 1)).await?;
    assert!(matches!(outcome, FetchOutcome::Downloaded(size) if size > 0));
    Ok(())
}

#[tokio::test]
async fn test_fetch_rejects_html_and_empty_bodies() -> Result<()> {
    let (addr, _) = start_site().await;
    let dir = TempDir::new()?;
    let config = site_config(addr, dir.path());
    let pdfs_dir = config.layout().pdfs_dir();
    let fetcher = PdfFetcher::new(&config.fetch, &pdfs_dir)?;

    let html = fetcher.fetch_one(&link(addr, "/page.pdf", 1)).await;
    assert!(matches!(html, Err(FetchError::NotPdf { .. })));

    let empty = fetcher.fetch_one(&link(addr, "/empty.pdf", 1)).await;
    assert!(matches!(empty, Err(FetchError::TooSmall { .. })));
    assert!(!pdfs_dir.join("dataset-1/empty.pdf").exists());
    assert!(!pdfs_dir.join("dataset-1/empty.pdf.part").exists());
    Ok(())
}

#[tokio::test]
async fn test_fetch_retries_server_errors() -> Result<()> {
    let (addr, site) = start_site().await;
    let dir = TempDir::new()?;
    let config = site_config(addr, dir.path());
    site.flaky_failures.store(2, Ordering::SeqCst);

    let fetcher = PdfFetcher::new(&config.fetch, config.layout().pdfs_dir())?;
    let outcome = fetcher.fetch_one(&link(addr, "/flaky.pdf", 1)).await?;
    assert!(matches!(outcome, FetchOutcome::Downloaded(_)));
    Ok(())
}

#[tokio::test]
async fn test_fetch_gives_up_after_max_retries() -> Result<()> {
    let (addr, site) = start_site().await;
    let dir = TempDir::new()?;
    let mut config = site_config(addr, dir.path());
    config.fetch.max_retries = 1;
    site.flaky_failures.store(5, Ordering::SeqCst);

    let fetcher = PdfFetcher::new(&config.fetch, config.layout().pdfs_dir())?;
    let result = fetcher.fetch_one(&link(addr, "/flaky.pdf", 1)).await;

    assert!(matches!(
        result,
        Err(FetchError::HttpStatus { status: 503, .. })
    ));
    assert_eq!(site.flaky_failures.load(Ordering::SeqCst), 3);
    Ok(())
}

#[tokio::test]
async fn test_fetch_failures_are_counted() -> Result<()> {
    let (addr, _) = start_site().await;
    let dir = TempDir::new()?;
    let config = site_config(addr, dir.path());

    let links = vec![
        link(addr, "/page.pdf", 1),
        link(addr, "/files/EFTA00001.pdf", 1),
    ];
    let summary = PdfFetcher::new(&config.fetch, config.layout().pdfs_dir())?
        .fetch_all(&links)
        .await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.success, 1);
    Ok(())
}

#[tokio::test]
async fn test_fetch_cancelled_before_start() -> Result<()> {
    let (addr, site) = start_site().await;
    let dir = TempDir::new()?;
    let config = site_config(addr, dir.path());
    let token = CancellationToken::new();
    token.cancel();

    let summary = PdfFetcher::new(&config.fetch, config.layout().pdfs_dir())?
        .with_cancellation(token)
        .fetch_all(&[link(addr, "/files/EFTA00001.pdf", 1)])
        .await;

    assert!(summary.cancelled);
    assert_eq!(summary.success, 0);
    assert_eq!(site.downloads.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_fetch_redownloads_files_not_larger_than_threshold() -> Result<()> {
    let (addr, site) = start_site().await;
    let dir = TempDir::new()?;
    let mut config = site_config(addr, dir.path());
    config.fetch.min_existing_size = 1000;
    let pdfs_dir = config.layout().pdfs_dir();

    std::fs::create_dir_all(pdfs_dir.join("dataset-1"))?;
    std::fs::write(pdfs_dir.join("dataset-1/EFTA00001.pdf"), vec![b'x'; 500])?;
    // Exactly at the threshold still counts as incomplete
    std::fs::write(pdfs_dir.join("dataset-1/EFTA00002.pdf"), vec![b'x'; 1000])?;

    let links = vec![
        link(addr, "/files/EFTA00001.pdf", 1),
        link(addr, "/files/EFTA00002.pdf", 1),
    ];
    let summary = PdfFetcher::new(&config.fetch, &pdfs_dir)?
        .fetch_all(&links)
        .await;

    assert_eq!(summary.success, 2);
    assert_eq!(summary.skipped, 0);
    assert_eq!(site.downloads.load(Ordering::SeqCst), 2);
    let saved = std::fs::read(pdfs_dir.join("dataset-1/EFTA00001.pdf"))?;
    assert!(saved.starts_with(b"%PDF"));
    Ok(())
}

#[tokio::test]
async fn test_fetch_delay_applies_only_after_downloads() -> Result<()> {
    let (addr, site) = start_site().await;
    let dir = TempDir::new()?;
    let mut config = site_config(addr, dir.path());
    config.fetch.delay_ms = 400;
    config.fetch.min_existing_size = 100;
    let pdfs_dir = config.layout().pdfs_dir();

    std::fs::create_dir_all(pdfs_dir.join("dataset-1"))?;
    for name in ["EFTA00001.pdf", "EFTA00002.pdf", "skip.pdf"] {
        std::fs::write(pdfs_dir.join("dataset-1").join(name), vec![b'x'; 500])?;
    }

    let links = vec![
        link(addr, "/files/EFTA00001.pdf", 1),
        link(addr, "/files/EFTA00002.pdf", 1),
        link(addr, "/skip.pdf", 1),
        link(addr, "/files/EFTA00003.pdf", 2),
    ];
    let started = std::time::Instant::now();
    let summary = PdfFetcher::new(&config.fetch, &pdfs_dir)?
        .fetch_all(&links)
        .await;
    let elapsed = started.elapsed();

    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.success, 1);
    assert_eq!(site.downloads.load(Ordering::SeqCst), 1);
    // One pause for the single download; paused skips would add 1.2s more
    assert!(elapsed >= std::time::Duration::from_millis(400), "{:?}", elapsed);
    assert!(elapsed < std::time::Duration::from_millis(1200), "{:?}", elapsed);
    Ok(())
}

#[tokio::test]
async fn test_fetch_retry_backoff_stops_on_cancel() -> Result<()> {
    let (addr, site) = start_site().await;
    let dir = TempDir::new()?;
    let mut config = site_config(addr, dir.path());
    config.fetch.max_retries = 3;
    config.fetch.retry_backoff_ms = 60_000;
    site.flaky_failures.store(5, Ordering::SeqCst);

    let token = CancellationToken::new();
    let fetcher = PdfFetcher::new(&config.fetch, config.layout().pdfs_dir())?
        .with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        token.cancel();
    });

    let result = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        fetcher.fetch_one(&link(addr, "/flaky.pdf", 1)),
    )
    .await?;
    canceller.await?;

    assert!(matches!(
        result,
        Err(FetchError::HttpStatus { status: 503, .. })
    ));
    assert_eq!(site.flaky_failures.load(Ordering::SeqCst), 4);
    Ok(())
}
