use polars::prelude::*;
use serde::Serialize;
use std::fmt;

use crate::error::{PipelineError, Result};
use crate::models::{PredictionRecord, RawListing};
use crate::storage::LocalStorage;

pub const REPORT_COLUMNS: [&str; 9] = [
    "address",
    "building_name",
    "age",
    "floors",
    "layout",
    "area",
    "actual_rent",
    "predicted_rent",
    "discount_rate",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BargainRow {
    pub address: String,
    pub building_name: String,
    pub age: String,
    pub floors: String,
    pub layout: String,
    pub area: String,
    pub actual_rent: f64,
    pub predicted_rent: f64,
    pub discount_rate: f64,
}

/// Top of a bargain ranking joined back to the listing text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BargainReport {
    pub rows: Vec<BargainRow>,
}

impl BargainReport {
    /// Keep the first `top_n` ranked records. Every record must point into
    /// `listings`.
    pub fn from_ranking(
        ranking: &[PredictionRecord],
        listings: &[RawListing],
        top_n: usize,
    ) -> Result<Self> {
        let rows = ranking
            .iter()
            .filter_map(|record| record.discount_rate.map(|rate| (record, rate)))
            .take(top_n)
            .map(|(record, discount_rate)| {
                let listing = listings.get(record.listing_index).ok_or_else(|| {
                    PipelineError::SchemaMismatch {
                        expected: format!("listing index below {}", listings.len()),
                        actual: format!("listing index {}", record.listing_index),
                    }
                })?;
                Ok(BargainRow {
                    address: listing.address.clone(),
                    building_name: listing.building_name.clone(),
                    age: listing.age.clone(),
                    floors: listing.floors.clone(),
                    layout: listing.layout.clone(),
                    area: listing.area.clone(),
                    actual_rent: record.actual_rent,
                    predicted_rent: record.predicted_rent,
                    discount_rate,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let text = |f: fn(&BargainRow) -> &str| -> Vec<String> {
            self.rows.iter().map(|r| f(r).to_string()).collect()
        };
        let number = |f: fn(&BargainRow) -> f64| -> Vec<f64> { self.rows.iter().map(f).collect() };

        let columns = vec![
            Column::new(REPORT_COLUMNS[0].into(), text(|r| r.address.as_str())),
            Column::new(REPORT_COLUMNS[1].into(), text(|r| r.building_name.as_str())),
            Column::new(REPORT_COLUMNS[2].into(), text(|r| r.age.as_str())),
            Column::new(REPORT_COLUMNS[3].into(), text(|r| r.floors.as_str())),
            Column::new(REPORT_COLUMNS[4].into(), text(|r| r.layout.as_str())),
            Column::new(REPORT_COLUMNS[5].into(), text(|r| r.area.as_str())),
            Column::new(REPORT_COLUMNS[6].into(), number(|r| r.actual_rent)),
            Column::new(REPORT_COLUMNS[7].into(), number(|r| r.predicted_rent)),
            Column::new(REPORT_COLUMNS[8].into(), number(|r| r.discount_rate)),
        ];

        Ok(DataFrame::new(columns)?)
    }

    pub fn write_csv(&self, path: &str) -> Result<()> {
        let mut df = self.to_dataframe()?;
        LocalStorage::write_csv(&mut df, path)
    }
}

/// Pads by character count, so wide CJK text will not line up perfectly
fn pad(text: &str, width: usize) -> String {
    let shown: String = if text.chars().count() > width {
        text.chars().take(width.saturating_sub(1)).chain(['…']).collect()
    } else {
        text.to_string()
    };
    let fill = width.saturating_sub(shown.chars().count());
    format!("{}{}", shown, " ".repeat(fill))
}

impl fmt::Display for BargainReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>4}  {}  {}  {}  {}  {}  {}  {:>8}  {:>8}  {:>8}",
            "#",
            pad("address", 24),
            pad("building_name", 20),
            pad("age", 6),
            pad("floors", 8),
            pad("layout", 6),
            pad("area", 6),
            "actual",
            "predict",
            "discount"
        )?;
        for (rank, row) in self.rows.iter().enumerate() {
            writeln!(
                f,
                "{:>4}  {}  {}  {}  {}  {}  {}  {:>8.2}  {:>8.2}  {:>8.3}",
                rank + 1,
                pad(&row.address, 24),
                pad(&row.building_name, 20),
                pad(&row.age, 6),
                pad(&row.floors, 8),
                pad(&row.layout, 6),
                pad(&row.area, 6),
                row.actual_rent,
                row.predicted_rent,
                row.discount_rate
            )?;
        }
        Ok(())
    }
}
