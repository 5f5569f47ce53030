use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};
use wreq::Client;
use wreq_util::Profile;

use crate::config::{ScrapeConfig, SiteConfig, ScrapingConfig};
use crate::error::{PipelineError, Result};
use crate::fetcher::ListingParser;
use crate::models::RawListing;

/// Anything that can hand back the HTML of a results page
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<String>;
}

/// Fetches pages over HTTP with browser emulation
pub struct HttpPageSource {
    client: Client,
    user_agent: Option<String>,
}

impl HttpPageSource {
    pub fn new(site: &SiteConfig, scraping: &ScrapingConfig) -> Result<Self> {
        let client = Client::builder()
            .emulation(Profile::Firefox136)
            .timeout(Duration::from_secs(scraping.timeout_seconds))
            .build()
            .map_err(|e| PipelineError::Fetch(e.to_string()))?;

        Ok(HttpPageSource {
            client,
            user_agent: site.user_agent.clone(),
        })
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self, url: &str) -> Result<String> {
        let mut request = self.client.get(url);
        if let Some(user_agent) = &self.user_agent {
            request = request.header("User-Agent", user_agent.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::Fetch(format!("network error for {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(PipelineError::Fetch(format!(
                "HTTP {} for {}",
                response.status(),
                url
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| PipelineError::Fetch(format!("failed to read body of {url}: {e}")))?;

        if html.is_empty() {
            return Err(PipelineError::Fetch(format!("empty response from {url}")));
        }

        info!("Fetched {} characters from {}", html.len(), url);
        Ok(html)
    }
}

fn jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..max_ms)
    }
}

/// Walks the paginated results from the configured start URL
pub struct ListingScraper<S> {
    source: S,
    parser: ListingParser,
    config: ScrapeConfig,
}

impl<S: PageSource> ListingScraper<S> {
    pub fn new(source: S, config: ScrapeConfig) -> Result<Self> {
        let parser = ListingParser::new(&config.selectors)?;
        Ok(Self {
            source,
            parser,
            config,
        })
    }

    /// Follow "next" links up to `max_pages`. A page that keeps failing
    /// ends the walk; only a failure on the first page is an error.
    pub async fn scrape(&self) -> Result<Vec<RawListing>> {
        let scraping = &self.config.scraping;
        let mut listings = Vec::new();
        let mut skipped = 0;
        let mut next_url = Some(self.config.site.start_url.clone());
        let mut page = 0;

        while let Some(url) = next_url.take() {
            if page >= scraping.max_pages {
                info!("Reached page limit of {}, stopping", scraping.max_pages);
                break;
            }
            page += 1;
            info!("Scraping page {}: {}", page, url);

            let html = match self.fetch_with_retry(&url).await {
                Ok(html) => html,
                Err(e) if page == 1 => return Err(e),
                Err(e) => {
                    error!("Giving up on page {}: {}", page, e);
                    break;
                }
            };

            let parsed = self.parser.parse_listings(&html);
            skipped += parsed.skipped;
            listings.extend(parsed.listings);

            next_url = self.parser.next_page_url(&html, &self.config.site.base_url);
            if next_url.is_some() {
                let delay = scraping.delay_between_requests_ms
                    + jitter_ms(scraping.delay_between_requests_ms);
                sleep(Duration::from_millis(delay)).await;
            }
        }

        info!(
            "✅ Scrape summary: {} listings from {} pages, {} rows skipped",
            listings.len(),
            page,
            skipped
        );
        Ok(listings)
    }

    /// Exponential backoff with jitter between attempts
    async fn fetch_with_retry(&self, url: &str) -> Result<String> {
        let max_retries = self.config.scraping.max_retries.max(1);
        let backoff_ms = self.config.scraping.retry_backoff_ms;
        let mut attempts = 0;

        loop {
            match self.source.fetch_page(url).await {
                Ok(html) => return Ok(html),
                Err(e) => {
                    attempts += 1;
                    if attempts >= max_retries {
                        return Err(PipelineError::Fetch(format!(
                            "{url} failed after {attempts} attempts: {e}"
                        )));
                    }
                    let delay = Duration::from_millis(
                        backoff_ms * 2_u64.pow(attempts as u32) + jitter_ms(backoff_ms),
                    );
                    warn!(
                        "Attempt {} failed for {}, retrying in {:?}: {}",
                        attempts, url, delay, e
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
