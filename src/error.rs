//! Error types for the rent pipeline

use polars::prelude::PolarsError;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Batch-level failures. A single malformed field never ends up here; it
/// degrades to `Extracted::Unmatched` instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Required column '{column}' missing from {source_name}")]
    MissingColumn { column: String, source_name: String },

    #[error("Schema mismatch: expected {expected}, got {actual}")]
    SchemaMismatch { expected: String, actual: String },

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Empty batch at stage {0}")]
    EmptyBatch(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fetch error: {0}")]
    Fetch(String),
}

impl PipelineError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn missing_column(column: &str, source_name: &str) -> Self {
        PipelineError::MissingColumn {
            column: column.to_string(),
            source_name: source_name.to_string(),
        }
    }
}
