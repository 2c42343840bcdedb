//! Listing-page scraper that builds the document manifest

use super::{build_http_client, request_error};
use crate::config::FetchConfig;
use crate::error::{FetchError, RagError};
use crate::manifest::Manifest;
use crate::types::{DocumentLink, ScrapeSummary};
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml";

/// Anchors whose target mentions a PDF
const PDF_LINK_SELECTOR: &str = r#"a[href*=".pdf"]"#;

/// Collect PDF links from one listing page, resolved against `page_url`
///
/// Hrefs that cannot be resolved or carry no file name are dropped, as are
/// repeats within the page.
pub fn extract_links(html: &str, page_url: &Url, dataset: u32) -> Vec<DocumentLink> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(PDF_LINK_SELECTOR) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };

        let absolute = match page_url.join(href.trim()) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Skipping unresolvable link '{}': {}", href, e);
                continue;
            }
        };

        if let Some(link) = DocumentLink::from_url(absolute.as_str(), dataset)
            && seen.insert(link.url.clone())
        {
            links.push(link);
        }
    }

    links
}

/// Walks the numbered dataset listing pages and gathers their PDF links
pub struct LinkScraper {
    client: Client,
    config: FetchConfig,
    cancel_token: CancellationToken,
}

impl LinkScraper {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_http_client(config, HTML_ACCEPT)?,
            config: config.clone(),
            cancel_token: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Listing page URL for dataset `n`
    pub fn dataset_url(&self, n: u32) -> String {
        self.config
            .dataset_page_template
            .replace("{n}", &n.to_string())
    }

    /// Fetch one listing page and return its PDF links
    pub async fn scrape_dataset(&self, n: u32) -> Result<Vec<DocumentLink>, FetchError> {
        let page = self.dataset_url(n);
        let page_url = Url::parse(&page).map_err(|e| FetchError::InvalidUrl {
            url: page.clone(),
            reason: e.to_string(),
        })?;

        let response = self
            .client
            .get(page_url.clone())
            .send()
            .await
            .map_err(|e| request_error(&page, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: page,
            });
        }

        let html = response.text().await.map_err(|e| request_error(&page, e))?;
        Ok(extract_links(&html, &page_url, n))
    }

    /// Scrape every configured dataset page; failed pages are logged and counted
    pub async fn scrape_all(&self) -> (Manifest, ScrapeSummary) {
        let mut summary = ScrapeSummary::default();
        let mut manifest = Manifest::default();
        let delay = Duration::from_millis(self.config.scrape_delay_ms);

        for n in self.config.first_dataset..=self.config.last_dataset {
            if self.cancel_token.is_cancelled() {
                tracing::info!("Scrape cancelled before dataset {}", n);
                break;
            }

            match self.scrape_dataset(n).await {
                Ok(links) => {
                    tracing::info!("Dataset {}: {} PDF links", n, links.len());
                    summary.datasets_scraped += 1;
                    manifest.links.extend(links);
                }
                Err(e) => {
                    tracing::error!("Dataset {}: {}", n, e);
                    summary.datasets_failed += 1;
                }
            }

            if n < self.config.last_dataset {
                tokio::select! {
                    _ = self.cancel_token.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        let removed = manifest.dedup();
        if removed > 0 {
            tracing::debug!("Dropped {} duplicate links", removed);
        }
        summary.links_found = manifest.len();

        (manifest, summary)
    }

    /// Scrape everything and write the manifest to `path`
    pub async fn scrape_to(&self, path: &Path) -> Result<ScrapeSummary, RagError> {
        let (manifest, summary) = self.scrape_all().await;
        manifest.save(path)?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <a href="/epstein/files/DataSet%201/EFTA00001.pdf">EFTA00001</a>
          <a href="https://www.justice.gov/epstein/files/DataSet%201/EFTA00002.pdf">EFTA00002</a>
          <a href="EFTA00003.pdf?download=1">EFTA00003</a>
          <a href="/epstein/files/DataSet%201/EFTA00001.pdf">again</a>
          <a href="/about">About</a>
          <a>no href</a>
        </body></html>
    "#;

    #[test]
    fn test_extract_links_resolves_and_dedups() {
        let page = Url::parse("https://www.justice.gov/epstein/doj-disclosures/data-set-1-files")
            .unwrap();
        let links = extract_links(LISTING, &page, 1);

        assert_eq!(links.len(), 3);
        assert_eq!(
            links[0].url,
            "https://www.justice.gov/epstein/files/DataSet%201/EFTA00001.pdf"
        );
        assert_eq!(links[0].id, "EFTA00001");
        assert_eq!(links[0].filename, "EFTA00001.pdf");
        assert_eq!(links[0].dataset, 1);

        assert_eq!(links[1].id, "EFTA00002");

        assert_eq!(
            links[2].url,
            "https://www.justice.gov/epstein/doj-disclosures/EFTA00003.pdf?download=1"
        );
        assert_eq!(links[2].filename, "EFTA00003.pdf");
    }

    #[test]
    fn test_extract_links_empty_page() {
        let page = Url::parse("https://example.gov/list").unwrap();
        assert!(extract_links("<html></html>", &page, 3).is_empty());
    }

    #[test]
    fn test_dataset_url() {
        let config = FetchConfig {
            dataset_page_template: "https://example.gov/data-set-{n}-files".to_string(),
            ..FetchConfig::default()
        };
        let scraper = LinkScraper::new(&config).unwrap();
        assert_eq!(scraper.dataset_url(7), "https://example.gov/data-set-7-files");
    }

    #[tokio::test]
    async fn test_scrape_all_counts_unreachable_pages() {
        let config = FetchConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            dataset_page_template: "http://127.0.0.1:9/data-set-{n}".to_string(),
            first_dataset: 1,
            last_dataset: 2,
            scrape_delay_ms: 0,
            timeout_secs: 2,
            ..FetchConfig::default()
        };
        let scraper = LinkScraper::new(&config).unwrap();
        let (manifest, summary) = scraper.scrape_all().await;

        assert!(manifest.is_empty());
        assert_eq!(summary.datasets_scraped, 0);
        assert_eq!(summary.datasets_failed, 2);
        assert_eq!(summary.links_found, 0);
    }
}
