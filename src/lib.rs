//! Rental listing bargain finder: scrape listings, turn their free-text
//! fields into features, fit a rent model and rank listings by how far
//! their rent sits from the model's estimate.

pub mod config;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod models;
pub mod pipeline;
pub mod processor;
pub mod scoring;
pub mod storage;

pub use error::{PipelineError, Result};
