use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::config::FeatureConfig;
use crate::error::{PipelineError, Result};
use crate::models::RawListing;
use crate::processor::field_extractor::{FieldExtractor, LayoutFlags};
use crate::processor::vocabulary::Vocabulary;

/// Numeric feature columns, in matrix order, ahead of the one-hot block
pub const NUMERIC_FEATURES: [&str; 13] = [
    "admin_fee",
    "deposit",
    "gratuity",
    "age_years",
    "total_floors",
    "walk_minutes",
    "area_m2",
    "has_L",
    "has_D",
    "has_K",
    "has_S",
    "has_R",
    "layout_rooms",
];

/// Columns whose gaps are filled with the batch median
pub const IMPUTED_COLUMNS: [&str; 4] = ["age_years", "total_floors", "walk_minutes", "area_m2"];

pub const RENT_COLUMN: &str = "rent";
pub const RENT_LOG_COLUMN: &str = "rent_log";

/// ln(1 + rent)
pub fn rent_log(rent: f64) -> f64 {
    rent.ln_1p()
}

/// Inverse of [`rent_log`]
pub fn rent_from_log(log_rent: f64) -> f64 {
    log_rent.exp_m1()
}

/// Typed features of one listing. Imputed fields stay `None` until
/// [`MedianImputer::apply`] runs.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub admin_fee: f64,
    pub deposit: f64,
    pub gratuity: f64,
    pub age_years: Option<f64>,
    pub total_floors: Option<f64>,
    pub walk_minutes: Option<f64>,
    pub area_m2: Option<f64>,
    pub layout_flags: LayoutFlags,
    pub layout_rooms: f64,
    pub city: String,
    pub line: String,
    pub rent: f64,
}

impl FeatureRow {
    pub fn rent_log(&self) -> f64 {
        rent_log(self.rent)
    }

    fn imputed_mut(&mut self) -> [&mut Option<f64>; 4] {
        [
            &mut self.age_years,
            &mut self.total_floors,
            &mut self.walk_minutes,
            &mut self.area_m2,
        ]
    }

    fn imputed(&self) -> [Option<f64>; 4] {
        [self.age_years, self.total_floors, self.walk_minutes, self.area_m2]
    }

    /// Numeric block in [`NUMERIC_FEATURES`] order. Gaps left after
    /// imputation become NaN.
    fn numeric_values(&self) -> [f64; 13] {
        let flag = |set: bool| if set { 1.0 } else { 0.0 };
        let flags = self.layout_flags;
        [
            self.admin_fee,
            self.deposit,
            self.gratuity,
            self.age_years.unwrap_or(f64::NAN),
            self.total_floors.unwrap_or(f64::NAN),
            self.walk_minutes.unwrap_or(f64::NAN),
            self.area_m2.unwrap_or(f64::NAN),
            flag(flags.has_l),
            flag(flags.has_d),
            flag(flags.has_k),
            flag(flags.has_s),
            flag(flags.has_r),
            self.layout_rooms,
        ]
    }
}

/// Median of the non-null values; the mean of the middle pair for even counts
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Per-batch medians of [`IMPUTED_COLUMNS`]
#[derive(Debug, Clone, PartialEq)]
pub struct MedianImputer {
    medians: [Option<f64>; 4],
}

impl MedianImputer {
    pub fn fit(rows: &[FeatureRow]) -> Self {
        let mut medians = [None; 4];
        for (slot, median_slot) in medians.iter_mut().enumerate() {
            let observed: Vec<f64> = rows.iter().filter_map(|row| row.imputed()[slot]).collect();
            *median_slot = median(&observed);
        }
        Self { medians }
    }

    pub fn median_of(&self, column: &str) -> Option<f64> {
        IMPUTED_COLUMNS
            .iter()
            .position(|c| *c == column)
            .and_then(|slot| self.medians[slot])
    }

    /// Fill gaps in place and return how many were filled. A column with no
    /// observed value at all falls back to 0.
    pub fn apply(&self, rows: &mut [FeatureRow]) -> usize {
        for (slot, median) in self.medians.iter().enumerate() {
            if median.is_none() && rows.iter().any(|row| row.imputed()[slot].is_none()) {
                warn!(
                    "Column {} has no observed values in this batch, filling with 0",
                    IMPUTED_COLUMNS[slot]
                );
            }
        }

        let mut filled = 0;
        for row in rows.iter_mut() {
            for (slot, value) in row.imputed_mut().into_iter().enumerate() {
                if value.is_none() {
                    *value = Some(self.medians[slot].unwrap_or(0.0));
                    filled += 1;
                }
            }
        }
        filled
    }
}

/// Model-ready matrix (row-major) with the rent targets kept aside
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
    rent: Vec<f64>,
    rent_log: Vec<f64>,
}

impl FeatureTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>, rent: Vec<f64>) -> Result<Self> {
        if let Some(bad) = rows.iter().find(|row| row.len() != columns.len()) {
            return Err(PipelineError::SchemaMismatch {
                expected: format!("{} columns", columns.len()),
                actual: format!("row of {} values", bad.len()),
            });
        }
        if rent.len() != rows.len() {
            return Err(PipelineError::SchemaMismatch {
                expected: format!("{} rent values", rows.len()),
                actual: format!("{} rent values", rent.len()),
            });
        }
        let rent_log = rent.iter().copied().map(rent_log).collect();
        Ok(Self {
            columns,
            rows,
            rent,
            rent_log,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rent(&self) -> &[f64] {
        &self.rent
    }

    pub fn rent_log(&self) -> &[f64] {
        &self.rent_log
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[index]).collect())
    }

    /// Sub-table with the given rows, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> FeatureTable {
        FeatureTable {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
            rent: indices.iter().map(|&i| self.rent[i]).collect(),
            rent_log: indices.iter().map(|&i| self.rent_log[i]).collect(),
        }
    }

    /// Feature columns followed by `rent` and `rent_log`. Indicator columns
    /// are written as integers.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut columns: Vec<Column> = Vec::with_capacity(self.columns.len() + 2);

        for (index, name) in self.columns.iter().enumerate() {
            let values: Vec<f64> = self.rows.iter().map(|row| row[index]).collect();
            let column = if is_indicator(name) {
                let ints: Vec<i32> = values.iter().map(|v| *v as i32).collect();
                Column::new(name.as_str().into(), ints)
            } else {
                Column::new(name.as_str().into(), values)
            };
            columns.push(column);
        }

        columns.push(Column::new(RENT_COLUMN.into(), self.rent.clone()));
        columns.push(Column::new(RENT_LOG_COLUMN.into(), self.rent_log.clone()));

        Ok(DataFrame::new(columns)?)
    }
}

fn is_indicator(column: &str) -> bool {
    column.starts_with("has_")
        || column.starts_with(crate::processor::vocabulary::CITY_PREFIX)
        || column.starts_with(crate::processor::vocabulary::LINE_PREFIX)
}

/// Turns a batch of raw listings into a [`FeatureTable`]
pub struct FeatureBuilder {
    extractor: FieldExtractor,
    prefecture: String,
}

impl FeatureBuilder {
    pub fn new(config: &FeatureConfig) -> Result<Self> {
        Ok(Self {
            extractor: FieldExtractor::new(&config.prefecture)?,
            prefecture: config.prefecture.clone(),
        })
    }

    /// Run the field extractor over every listing independently
    pub fn extract_rows(&self, listings: &[RawListing]) -> Vec<FeatureRow> {
        let mut degraded_rows = 0;
        let mut degraded_fields = 0;

        let rows: Vec<FeatureRow> = listings
            .iter()
            .enumerate()
            .map(|(index, listing)| {
                let (fields, degraded) = self.extractor.extract_listing(listing);
                if !degraded.is_empty() {
                    degraded_rows += 1;
                    degraded_fields += degraded.len();
                    debug!("Listing {} degraded fields: {:?}", index, degraded);
                }
                FeatureRow {
                    admin_fee: listing.admin_fee,
                    deposit: listing.deposit,
                    gratuity: listing.gratuity,
                    age_years: fields.age_years,
                    total_floors: fields.total_floors,
                    walk_minutes: fields.walk_minutes,
                    area_m2: fields.area_m2,
                    layout_flags: fields.layout_flags,
                    layout_rooms: fields.layout_rooms,
                    city: fields.city,
                    line: fields.line,
                    rent: listing.rent,
                }
            })
            .collect();

        info!(
            "Field extraction summary: {} clean, {} degraded ({} fields) out of {} total",
            listings.len() - degraded_rows,
            degraded_rows,
            degraded_fields,
            listings.len()
        );

        rows
    }

    /// Build features and fit the one-hot vocabulary on this batch
    pub fn build_features(&self, listings: &[RawListing]) -> Result<(FeatureTable, Vocabulary)> {
        if listings.is_empty() {
            return Err(PipelineError::EmptyBatch("feature build".to_string()));
        }

        let rows = self.extract_rows(listings);
        let vocabulary = Vocabulary::fit(
            &self.prefecture,
            rows.iter().map(|row| row.city.as_str()),
            rows.iter().map(|row| row.line.as_str()),
        );
        info!(
            "Fitted vocabulary: {} cities, {} lines",
            vocabulary.cities.len(),
            vocabulary.lines.len()
        );

        let table = self.assemble(rows, &vocabulary)?;
        Ok((table, vocabulary))
    }

    /// Build features against an existing vocabulary; unseen categories land
    /// in the `*_other` columns.
    pub fn build_features_with(
        &self,
        listings: &[RawListing],
        vocabulary: &Vocabulary,
    ) -> Result<FeatureTable> {
        if listings.is_empty() {
            return Err(PipelineError::EmptyBatch("feature build".to_string()));
        }
        if vocabulary.prefecture != self.prefecture {
            return Err(PipelineError::Config(format!(
                "vocabulary was built for prefecture {} but features use {}",
                vocabulary.prefecture, self.prefecture
            )));
        }

        let rows = self.extract_rows(listings);
        let unseen = rows
            .iter()
            .filter(|row| !vocabulary.knows_city(&row.city) || !vocabulary.knows_line(&row.line))
            .count();
        if unseen > 0 {
            info!("{} listings carry categories outside the vocabulary", unseen);
        }

        self.assemble(rows, vocabulary)
    }

    fn assemble(&self, mut rows: Vec<FeatureRow>, vocabulary: &Vocabulary) -> Result<FeatureTable> {
        let imputer = MedianImputer::fit(&rows);
        for column in IMPUTED_COLUMNS {
            if let Some(value) = imputer.median_of(column) {
                debug!("Batch median of {} is {}", column, value);
            }
        }
        let filled = imputer.apply(&mut rows);
        info!("Imputed {} missing values with batch medians", filled);

        let mut columns: Vec<String> = NUMERIC_FEATURES.iter().map(|c| c.to_string()).collect();
        columns.extend(vocabulary.columns());

        let matrix: Vec<Vec<f64>> = rows
            .iter()
            .map(|row| {
                let mut values = row.numeric_values().to_vec();
                values.extend(vocabulary.encode_city(&row.city));
                values.extend(vocabulary.encode_line(&row.line));
                values
            })
            .collect();
        let rent = rows.iter().map(|row| row.rent).collect();

        FeatureTable::new(columns, matrix, rent)
    }
}
