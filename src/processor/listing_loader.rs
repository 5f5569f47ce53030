use polars::prelude::*;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::models::{RAW_COLUMNS, RawListing};
use crate::storage::LocalStorage;

/// Converts between raw listing tables and [`RawListing`] records
pub struct ListingLoader;

impl ListingLoader {
    pub fn new() -> Self {
        ListingLoader
    }

    /// Read a listings CSV and convert every row
    pub fn load_csv(&self, path: &str) -> Result<Vec<RawListing>> {
        let df = LocalStorage::read_csv(path)?;
        self.listings_from_dataframe(&df, path)
    }

    pub fn write_csv(&self, listings: &[RawListing], path: &str) -> Result<()> {
        let mut df = self.listings_to_dataframe(listings)?;
        LocalStorage::write_csv(&mut df, path)
    }

    /// Every raw column must exist; cell-level problems only degrade the row
    pub fn listings_from_dataframe(
        &self,
        df: &DataFrame,
        source_name: &str,
    ) -> Result<Vec<RawListing>> {
        let mut text_columns: Vec<Vec<Option<String>>> = Vec::with_capacity(RAW_COLUMNS.len());
        for column_name in RAW_COLUMNS {
            let column = df
                .column(column_name)
                .map_err(|_| PipelineError::missing_column(column_name, source_name))?
                .cast(&DataType::String)?;
            let values = column
                .str()?
                .into_iter()
                .map(|value| value.map(str::to_string))
                .collect();
            text_columns.push(values);
        }

        let mut listings = Vec::with_capacity(df.height());
        let mut degraded_count = 0;

        for row in 0..df.height() {
            let cell = |column: usize| {
                text_columns[column][row]
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
            };
            let text = |column: usize| cell(column).unwrap_or_default().to_string();

            let rent = match cell(7).and_then(parse_amount) {
                Some(rent) => rent,
                None => {
                    warn!("Row {} has unparseable rent {:?}, using 0", row, cell(7));
                    degraded_count += 1;
                    0.0
                }
            };

            listings.push(RawListing {
                building_name: text(0),
                address: text(1),
                transportation_1: cell(2).map(str::to_string),
                transportation_2: cell(3).map(str::to_string),
                transportation_3: cell(4).map(str::to_string),
                age: text(5),
                floors: text(6),
                rent,
                admin_fee: parse_fee(cell(8)),
                deposit: parse_fee(cell(9)),
                gratuity: parse_fee(cell(10)),
                layout: text(11),
                area: text(12),
            });
        }

        info!(
            "Listing conversion summary: {} rows from {}, {} with unusable rent",
            listings.len(),
            source_name,
            degraded_count
        );

        Ok(listings)
    }

    /// Same column order as the scraper has always written
    pub fn listings_to_dataframe(&self, listings: &[RawListing]) -> Result<DataFrame> {
        let text = |f: fn(&RawListing) -> &str| -> Vec<String> {
            listings.iter().map(|l| f(l).to_string()).collect()
        };
        let optional = |f: fn(&RawListing) -> Option<&str>| -> Vec<Option<String>> {
            listings.iter().map(|l| f(l).map(str::to_string)).collect()
        };
        let number = |f: fn(&RawListing) -> f64| -> Vec<f64> { listings.iter().map(f).collect() };

        let columns = vec![
            Column::new("building_name".into(), text(|l| l.building_name.as_str())),
            Column::new("address".into(), text(|l| l.address.as_str())),
            Column::new("transportation_1".into(), optional(|l| l.transportation_1.as_deref())),
            Column::new("transportation_2".into(), optional(|l| l.transportation_2.as_deref())),
            Column::new("transportation_3".into(), optional(|l| l.transportation_3.as_deref())),
            Column::new("age".into(), text(|l| l.age.as_str())),
            Column::new("floors".into(), text(|l| l.floors.as_str())),
            Column::new("rent".into(), number(|l| l.rent)),
            Column::new("admin_fee".into(), number(|l| l.admin_fee)),
            Column::new("deposit".into(), number(|l| l.deposit)),
            Column::new("gratuity".into(), number(|l| l.gratuity)),
            Column::new("layout".into(), text(|l| l.layout.as_str())),
            Column::new("area".into(), text(|l| l.area.as_str())),
        ];

        Ok(DataFrame::new(columns)?)
    }
}

impl Default for ListingLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain numeric text, tolerating thousands separators
fn parse_amount(text: &str) -> Option<f64> {
    text.replace(',', "")
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Fees use "-" or an empty cell for "none"
fn parse_fee(text: Option<&str>) -> f64 {
    match text {
        None | Some("-") => 0.0,
        Some(value) => parse_amount(value).unwrap_or(0.0),
    }
}
