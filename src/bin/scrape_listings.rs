use anyhow::{Context, Result};
use rent_pipeline::config::ScrapeConfig;
use rent_pipeline::fetcher::{HttpPageSource, ListingScraper};
use rent_pipeline::processor::ListingLoader;
use std::env;
use std::path::Path;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/scrape.toml".to_string());
    let config = if Path::new(&config_path).exists() {
        ScrapeConfig::from_file(&config_path)
            .with_context(|| format!("Failed to load scrape configuration from {config_path}"))?
    } else {
        warn!("{} not found, using built-in scrape settings", config_path);
        ScrapeConfig::default()
    };

    info!("🚀 Scraping {} starting at {}", config.site.name, config.site.start_url);

    let source = HttpPageSource::new(&config.site, &config.scraping)
        .context("Failed to create HTTP client")?;
    let output_path = config.output_path.clone();
    let scraper = ListingScraper::new(source, config)?;

    let listings = scraper.scrape().await.context("Scrape failed")?;
    if listings.is_empty() {
        warn!("No listings were scraped, nothing written");
        return Ok(());
    }

    ListingLoader::new()
        .write_csv(&listings, &output_path)
        .with_context(|| format!("Failed to write {output_path}"))?;
    info!("✅ Saved {} listings to {}", listings.len(), output_path);

    Ok(())
}
