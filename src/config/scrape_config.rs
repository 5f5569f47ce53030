use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Configuration for scraping listing pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub site: SiteConfig,
    pub scraping: ScrapingConfig,
    pub selectors: SelectorConfig,
    pub output_path: String,
}

/// Basic site information
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub name: String,
    /// Joined with the relative href of the next-page link
    pub base_url: String,
    pub start_url: String,
    pub user_agent: Option<String>,
}

/// Scraping behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    pub delay_between_requests_ms: u64,
    pub max_pages: usize,
    pub max_retries: usize,
    /// Base of the exponential backoff between retries
    pub retry_backoff_ms: u64,
    pub timeout_seconds: u64,
}

/// CSS selectors for the listing markup. One building block holds the
/// shared fields and a row per rentable unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub building: String,
    pub building_name: String,
    pub address: String,
    pub transportation: String,
    /// Container whose first two `div`s are age and floors
    pub age_and_floors: String,
    pub unit_row: String,
    pub rent: String,
    pub admin_fee: String,
    pub deposit: String,
    pub gratuity: String,
    pub layout: String,
    pub area: String,
    /// Link text of the pagination anchor
    pub next_page_text: String,
}

impl ScrapeConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let config: ScrapeConfig =
            toml::from_str(&content).map_err(|e| PipelineError::Config(e.to_string()))?;
        Ok(config)
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            scraping: ScrapingConfig::default(),
            selectors: SelectorConfig::default(),
            output_path: "data/suumo_data.csv".to_string(),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: "suumo".to_string(),
            base_url: "https://suumo.jp".to_string(),
            start_url: "https://suumo.jp/jj/chintai/ichiran/FR301FC001/?ar=030&bs=040&ta=13&sc=13101&cb=0.0&ct=9999999&mb=0&mt=9999999&et=9999999&cn=9999999&shkr1=03&shkr2=03&shkr3=03&shkr4=03&sngz=&po1=25&pc=50".to_string(),
            user_agent: None,
        }
    }
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            delay_between_requests_ms: 1000,
            max_pages: 3,
            max_retries: 3,
            retry_backoff_ms: 1000,
            timeout_seconds: 30,
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            building: "div.cassetteitem".to_string(),
            building_name: "div.cassetteitem_content-title".to_string(),
            address: "li.cassetteitem_detail-col1".to_string(),
            transportation: "div.cassetteitem_detail-text".to_string(),
            age_and_floors: "li.cassetteitem_detail-col3".to_string(),
            unit_row: "tr.js-cassette_link".to_string(),
            rent: "span.cassetteitem_price--rent".to_string(),
            admin_fee: "span.cassetteitem_price--administration".to_string(),
            deposit: "span.cassetteitem_price--deposit".to_string(),
            gratuity: "span.cassetteitem_price--gratuity".to_string(),
            layout: "span.cassetteitem_madori".to_string(),
            area: "span.cassetteitem_menseki".to_string(),
            next_page_text: "次へ".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs() {
        let scraping_config = ScrapingConfig::default();
        assert_eq!(scraping_config.delay_between_requests_ms, 1000);
        assert_eq!(scraping_config.max_pages, 3);

        let selector_config = SelectorConfig::default();
        assert_eq!(selector_config.building, "div.cassetteitem");
        assert_eq!(selector_config.next_page_text, "次へ");
    }

    #[test]
    fn test_site_override_keeps_selector_defaults() {
        let config: ScrapeConfig = toml::from_str(
            r#"
            output_path = "data/listings.csv"

            [site]
            start_url = "https://example.com/list"

            [scraping]
            max_pages = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.site.start_url, "https://example.com/list");
        assert_eq!(config.site.base_url, "https://suumo.jp");
        assert_eq!(config.scraping.max_pages, 10);
        assert_eq!(config.scraping.max_retries, 3);
        assert_eq!(config.selectors.unit_row, "tr.js-cassette_link");
        assert_eq!(config.output_path, "data/listings.csv");
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = ScrapeConfig::from_file("config/scrape.toml").unwrap();
        assert_eq!(config.scraping.retry_backoff_ms, 1000);
        assert_eq!(config.selectors.rent, "span.cassetteitem_price--rent");
    }
}
