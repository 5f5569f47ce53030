use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PipelineError, Result};

/// Prefix for environment overrides, e.g. `RENT_PIPELINE__REPORT__TOP_N=50`
pub const ENV_PREFIX: &str = "RENT_PIPELINE";

/// Configuration for the feature/model/bargain pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub features: FeatureConfig,
    pub model: ModelConfig,
    pub report: ReportConfig,
    pub evaluation: EvaluationConfig,
}

/// Input and output locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub raw_listings: String,
    /// `.parquet` writes Parquet, anything else CSV
    pub cleaned_features: String,
    pub bargain_report: String,
    /// Overwritten with the vocabulary of every training build
    pub vocabulary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Only addresses under this prefecture yield a city
    pub prefecture: String,
}

/// Random forest parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub n_trees: usize,
    pub max_depth: Option<u16>,
    pub min_samples_leaf: usize,
    pub min_samples_split: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub top_n: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub test_ratio: f64,
    pub n_splits: usize,
    pub seed: u64,
}

impl PipelineConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let config: PipelineConfig =
            toml::from_str(&content).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Layer the TOML file (optional) with `RENT_PIPELINE__*` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            tracing::warn!("Config file {} not found, using defaults plus environment", path);
        }

        let settings = config::Config::builder()
            .add_source(config::File::new(path, config::FileFormat::Toml).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let config: PipelineConfig = settings
            .try_deserialize()
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PipelineError::Config(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.report.top_n == 0 {
            return Err(PipelineError::Config("report.top_n must be at least 1".to_string()));
        }
        if self.model.n_trees == 0 {
            return Err(PipelineError::Config("model.n_trees must be at least 1".to_string()));
        }
        if !(self.evaluation.test_ratio > 0.0 && self.evaluation.test_ratio < 1.0) {
            return Err(PipelineError::Config(format!(
                "evaluation.test_ratio must be in (0, 1), got {}",
                self.evaluation.test_ratio
            )));
        }
        if self.evaluation.n_splits < 2 {
            return Err(PipelineError::Config("evaluation.n_splits must be at least 2".to_string()));
        }
        Ok(())
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_listings: "data/suumo_data.csv".to_string(),
            cleaned_features: "data/suumo_data_cleaned.csv".to_string(),
            bargain_report: "data/bargain_report.csv".to_string(),
            vocabulary: None,
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            prefecture: "東京都".to_string(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_leaf: 1,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { top_n: 20 }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            test_ratio: 0.2,
            n_splits: 5,
            seed: 42,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs() {
        let config = PipelineConfig::default();
        assert_eq!(config.report.top_n, 20);
        assert_eq!(config.features.prefecture, "東京都");
        assert_eq!(config.model.seed, 42);
        assert_eq!(config.evaluation.n_splits, 5);
        assert!(config.paths.vocabulary.is_none());
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [report]
            top_n = 5

            [paths]
            vocabulary = "data/vocabulary.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.report.top_n, 5);
        assert_eq!(config.paths.vocabulary.as_deref(), Some("data/vocabulary.json"));
        assert_eq!(config.paths.raw_listings, "data/suumo_data.csv");
        assert_eq!(config.model.n_trees, 100);
    }

    #[test]
    fn test_validation_rejects_zero_top_n() {
        let mut config = PipelineConfig::default();
        config.report.top_n = 0;
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_toml_roundtrip_of_defaults() {
        let config = PipelineConfig::default();
        let text = config.to_toml_string().unwrap();
        let parsed: PipelineConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = PipelineConfig::from_file("config/pipeline.toml").unwrap();
        assert_eq!(config.paths.vocabulary.as_deref(), Some("data/vocabulary.json"));
        assert_eq!(config.report.top_n, 20);
    }
}
