use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

use crate::error::{PipelineError, Result};

/// Bucket for categories that were not seen when the vocabulary was fit
pub const OTHER: &str = "other";

pub const CITY_PREFIX: &str = "city_";
pub const LINE_PREFIX: &str = "line_";

/// Category sets behind the one-hot columns. Fit once on a training batch
/// and handed to every later feature build so the column schema stays put.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub prefecture: String,
    pub cities: Vec<String>,
    pub lines: Vec<String>,
    pub built_at: DateTime<Utc>,
}

impl Vocabulary {
    /// Sorted, de-duplicated labels. "unknown" is a regular label here.
    pub fn fit<'a>(
        prefecture: &str,
        cities: impl IntoIterator<Item = &'a str>,
        lines: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            prefecture: prefecture.to_string(),
            cities: sorted_labels(cities),
            lines: sorted_labels(lines),
            built_at: Utc::now(),
        }
    }

    pub fn city_columns(&self) -> Vec<String> {
        one_hot_columns(CITY_PREFIX, &self.cities)
    }

    pub fn line_columns(&self) -> Vec<String> {
        one_hot_columns(LINE_PREFIX, &self.lines)
    }

    /// City indicators followed by line indicators
    pub fn columns(&self) -> Vec<String> {
        let mut columns = self.city_columns();
        columns.extend(self.line_columns());
        columns
    }

    pub fn encode_city(&self, city: &str) -> Vec<f64> {
        one_hot(&self.cities, city)
    }

    pub fn encode_line(&self, line: &str) -> Vec<f64> {
        one_hot(&self.lines, line)
    }

    pub fn knows_city(&self, city: &str) -> bool {
        self.cities.binary_search_by(|c| c.as_str().cmp(city)).is_ok()
    }

    pub fn knows_line(&self, line: &str) -> bool {
        self.lines.binary_search_by(|l| l.as_str().cmp(line)).is_ok()
    }

    pub fn save(&self, path: &str) -> Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(path, e))?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| PipelineError::io(path, e))?;
        info!(
            "Saved vocabulary ({} cities, {} lines) to {}",
            self.cities.len(),
            self.lines.len(),
            path
        );
        Ok(())
    }

    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let mut vocabulary: Vocabulary = serde_json::from_str(&content)?;
        // hand-edited files may be unsorted; encoding relies on binary search
        vocabulary.cities.sort();
        vocabulary.cities.dedup();
        vocabulary.lines.sort();
        vocabulary.lines.dedup();
        Ok(vocabulary)
    }
}

fn sorted_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    labels
        .into_iter()
        .filter(|label| *label != OTHER)
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn one_hot_columns(prefix: &str, labels: &[String]) -> Vec<String> {
    labels
        .iter()
        .map(|label| format!("{}{}", prefix, label))
        .chain(std::iter::once(format!("{}{}", prefix, OTHER)))
        .collect()
}

/// One slot per label plus the trailing `other` slot
fn one_hot(labels: &[String], value: &str) -> Vec<f64> {
    let mut encoded = vec![0.0; labels.len() + 1];
    match labels.binary_search_by(|label| label.as_str().cmp(value)) {
        Ok(index) => encoded[index] = 1.0,
        Err(_) => encoded[labels.len()] = 1.0,
    }
    encoded
}
