use anyhow::{Context, Result};
use rent_pipeline::config::PipelineConfig;
use rent_pipeline::pipeline::BargainPipeline;
use rent_pipeline::processor::FeatureBuilder;
use std::env;
use tracing::info;

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/pipeline.toml".to_string());
    let config = PipelineConfig::load(&config_path)
        .with_context(|| format!("Failed to load pipeline configuration from {config_path}"))?;

    let builder = FeatureBuilder::new(&config.features)?;
    let built = BargainPipeline::from_csv(&config.paths.raw_listings)
        .context("Failed to load raw listings")?
        .build_features_and_save(&builder, config.paths.vocabulary.as_deref())
        .context("Failed to build features")?;

    built
        .write_features(&config.paths.cleaned_features)
        .context("Failed to write cleaned features")?;

    let table = built.table();
    info!(
        "✅ Preprocessed {} listings into {} features ({} cities, {} lines) -> {}",
        table.n_rows(),
        table.columns().len(),
        built.vocabulary().cities.len(),
        built.vocabulary().lines.len(),
        config.paths.cleaned_features
    );

    Ok(())
}
