use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::config::SelectorConfig;
use crate::error::{PipelineError, Result};
use crate::models::RawListing;

/// Listings parsed from one results page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub listings: Vec<RawListing>,
    /// Unit rows or whole buildings that could not be read
    pub skipped: usize,
}

/// Building-level text shared by every unit row in one block
struct BuildingFields {
    building_name: String,
    address: String,
    transportations: Vec<String>,
    age: String,
    floors: String,
}

/// Compiled selectors for the listing markup
pub struct ListingParser {
    building: Selector,
    building_name: Selector,
    address: Selector,
    transportation: Selector,
    age_and_floors: Selector,
    div: Selector,
    unit_row: Selector,
    rent: Selector,
    admin_fee: Selector,
    deposit: Selector,
    gratuity: Selector,
    layout: Selector,
    area: Selector,
    anchor: Selector,
    next_page_text: String,
    non_numeric: Regex,
}

fn compile(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| PipelineError::Config(format!("invalid selector {selector:?}: {e:?}")))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_text(parent: ElementRef<'_>, selector: &Selector) -> Option<String> {
    parent.select(selector).next().map(element_text)
}

impl ListingParser {
    pub fn new(selectors: &SelectorConfig) -> Result<Self> {
        Ok(Self {
            building: compile(&selectors.building)?,
            building_name: compile(&selectors.building_name)?,
            address: compile(&selectors.address)?,
            transportation: compile(&selectors.transportation)?,
            age_and_floors: compile(&selectors.age_and_floors)?,
            div: compile("div")?,
            unit_row: compile(&selectors.unit_row)?,
            rent: compile(&selectors.rent)?,
            admin_fee: compile(&selectors.admin_fee)?,
            deposit: compile(&selectors.deposit)?,
            gratuity: compile(&selectors.gratuity)?,
            layout: compile(&selectors.layout)?,
            area: compile(&selectors.area)?,
            anchor: compile("a[href]")?,
            next_page_text: selectors.next_page_text.clone(),
            non_numeric: Regex::new(r"[^0-9.]")?,
        })
    }

    /// One [`RawListing`] per unit row, building fields copied onto each
    pub fn parse_listings(&self, html: &str) -> ParsedPage {
        let document = Html::parse_document(html);
        let mut page = ParsedPage::default();

        for building in document.select(&self.building) {
            let Some(fields) = self.building_fields(building) else {
                warn!("Skipping building block without name, address or age/floors");
                page.skipped += 1;
                continue;
            };

            for (row_index, row) in building.select(&self.unit_row).enumerate() {
                match self.unit_listing(&fields, row) {
                    Some(listing) => page.listings.push(listing),
                    None => {
                        debug!("Skipping unit row {} of {}", row_index, fields.building_name);
                        page.skipped += 1;
                    }
                }
            }
        }

        info!(
            "Parsed page: {} listings, {} skipped",
            page.listings.len(),
            page.skipped
        );
        page
    }

    /// Absolute URL of the pagination link, if the page has one
    pub fn next_page_url(&self, html: &str, base_url: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let href = document
            .select(&self.anchor)
            .find(|a| element_text(*a) == self.next_page_text)?
            .value()
            .attr("href")?;

        if href.starts_with("http://") || href.starts_with("https://") {
            return Some(href.to_string());
        }
        let base = base_url.trim_end_matches('/');
        if href.starts_with('/') {
            Some(format!("{base}{href}"))
        } else {
            Some(format!("{base}/{href}"))
        }
    }

    fn building_fields(&self, building: ElementRef<'_>) -> Option<BuildingFields> {
        let building_name = first_text(building, &self.building_name)?;
        let address = first_text(building, &self.address)?;
        let transportations = building
            .select(&self.transportation)
            .map(element_text)
            .filter(|text| !text.is_empty())
            .collect();

        let age_and_floors = building.select(&self.age_and_floors).next()?;
        let mut divs = age_and_floors.select(&self.div).map(element_text);
        let age = divs.next()?;
        let floors = divs.next()?;

        Some(BuildingFields {
            building_name,
            address,
            transportations,
            age,
            floors,
        })
    }

    fn unit_listing(&self, fields: &BuildingFields, row: ElementRef<'_>) -> Option<RawListing> {
        let rent = self.number(&first_text(row, &self.rent)?)?;
        let admin_fee = self.fee(&first_text(row, &self.admin_fee)?)?;
        let deposit = self.fee(&first_text(row, &self.deposit)?)?;
        let gratuity = self.fee(&first_text(row, &self.gratuity)?)?;
        let layout = first_text(row, &self.layout)?;
        let area = first_text(row, &self.area)?.replace("m2", "");

        let transportation = |i: usize| fields.transportations.get(i).cloned();

        Some(RawListing {
            building_name: fields.building_name.clone(),
            address: fields.address.clone(),
            transportation_1: transportation(0),
            transportation_2: transportation(1),
            transportation_3: transportation(2),
            age: fields.age.clone(),
            floors: fields.floors.clone(),
            rent,
            admin_fee,
            deposit,
            gratuity,
            layout,
            area: area.trim().to_string(),
        })
    }

    /// "8.5万円" -> 8.5
    fn number(&self, text: &str) -> Option<f64> {
        self.non_numeric.replace_all(text, "").parse().ok()
    }

    /// "-" means no fee
    fn fee(&self, text: &str) -> Option<f64> {
        if text == "-" {
            Some(0.0)
        } else {
            self.number(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
    <html><body>
      <div class="cassetteitem">
        <div class="cassetteitem_content-title">メゾン渋谷</div>
        <ul>
          <li class="cassetteitem_detail-col1">東京都渋谷区神南1</li>
          <li class="cassetteitem_detail-col2">
            <div class="cassetteitem_detail-text">ＪＲ山手線/渋谷駅 歩5分</div>
            <div class="cassetteitem_detail-text">東京メトロ銀座線/渋谷駅 歩7分</div>
          </li>
          <li class="cassetteitem_detail-col3"><div>築5年</div><div>10階建</div></li>
        </ul>
        <table>
          <tr class="js-cassette_link">
            <td><span class="cassetteitem_price--rent">15.5万円</span></td>
            <td><span class="cassetteitem_price--administration">10000円</span></td>
            <td><span class="cassetteitem_price--deposit">-</span></td>
            <td><span class="cassetteitem_price--gratuity">15.5万円</span></td>
            <td><span class="cassetteitem_madori">2LDK</span></td>
            <td><span class="cassetteitem_menseki">40.5m<sup>2</sup></span></td>
          </tr>
          <tr class="js-cassette_link">
            <td><span class="cassetteitem_price--rent">9万円</span></td>
            <td><span class="cassetteitem_price--administration">-</span></td>
            <td><span class="cassetteitem_price--deposit">9万円</span></td>
            <td><span class="cassetteitem_price--gratuity">-</span></td>
            <td><span class="cassetteitem_madori">1K</span></td>
            <td><span class="cassetteitem_menseki">20m<sup>2</sup></span></td>
          </tr>
          <tr class="js-cassette_link">
            <td><span class="cassetteitem_price--rent">お問い合わせ</span></td>
          </tr>
        </table>
      </div>
      <div class="cassetteitem">
        <div class="cassetteitem_content-title">名無し</div>
      </div>
      <div class="pagination"><a href="/jj/chintai/ichiran/?page=2">次へ</a></div>
    </body></html>
    "#;

    fn parser() -> ListingParser {
        ListingParser::new(&SelectorConfig::default()).unwrap()
    }

    #[test]
    fn test_units_inherit_building_fields() {
        let page = parser().parse_listings(PAGE);

        assert_eq!(page.listings.len(), 2);
        // one unreadable unit row and one building without details
        assert_eq!(page.skipped, 2);

        let first = &page.listings[0];
        assert_eq!(first.building_name, "メゾン渋谷");
        assert_eq!(first.address, "東京都渋谷区神南1");
        assert_eq!(first.transportation_1.as_deref(), Some("ＪＲ山手線/渋谷駅 歩5分"));
        assert_eq!(first.transportation_3, None);
        assert_eq!(first.age, "築5年");
        assert_eq!(first.floors, "10階建");
        assert_eq!(first.rent, 15.5);
        assert_eq!(first.admin_fee, 10000.0);
        assert_eq!(first.deposit, 0.0);
        assert_eq!(first.gratuity, 15.5);
        assert_eq!(first.area, "40.5");

        let second = &page.listings[1];
        assert_eq!(second.building_name, "メゾン渋谷");
        assert_eq!(second.rent, 9.0);
        assert_eq!(second.admin_fee, 0.0);
        assert_eq!(second.layout, "1K");
        assert_eq!(second.area, "20");
    }

    #[test]
    fn test_next_page_link_is_joined_to_base() {
        assert_eq!(
            parser().next_page_url(PAGE, "https://suumo.jp/"),
            Some("https://suumo.jp/jj/chintai/ichiran/?page=2".to_string())
        );
    }

    #[test]
    fn test_last_page_has_no_next_link() {
        let html = r#"<html><body><a href="/prev">前へ</a></body></html>"#;
        assert_eq!(parser().next_page_url(html, "https://suumo.jp"), None);
    }

    #[test]
    fn test_invalid_selector_is_a_config_error() {
        let selectors = SelectorConfig {
            rent: "span[".to_string(),
            ..SelectorConfig::default()
        };
        assert!(matches!(
            ListingParser::new(&selectors),
            Err(PipelineError::Config(_))
        ));
    }
}
