use anyhow::{Context, Result};
use rent_pipeline::config::PipelineConfig;
use rent_pipeline::model::ForestModel;
use rent_pipeline::pipeline::BargainPipeline;
use rent_pipeline::processor::FeatureBuilder;
use std::env;
use tracing::info;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load environment variables
    dotenv::dotenv().ok();

    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/pipeline.toml".to_string());
    let config = PipelineConfig::load(&config_path)
        .with_context(|| format!("Failed to load pipeline configuration from {config_path}"))?;

    info!("🚀 Starting rent bargain pipeline");
    info!("Raw listings: {}", config.paths.raw_listings);

    let builder = FeatureBuilder::new(&config.features).context("Failed to build field extractor")?;

    let built = BargainPipeline::from_csv(&config.paths.raw_listings)
        .context("Failed to load raw listings")?
        .build_features_and_save(&builder, config.paths.vocabulary.as_deref())
        .context("Failed to build features")?;

    built
        .write_features(&config.paths.cleaned_features)
        .context("Failed to write cleaned features")?;

    let ranked = built
        .fit(ForestModel::new(config.model.clone()))
        .context("Failed to fit pricing model")?
        .score()
        .context("Failed to score listings")?
        .rank();

    let report = ranked
        .report(config.report.top_n)
        .context("Failed to assemble bargain report")?;
    report
        .write_csv(&config.paths.bargain_report)
        .context("Failed to write bargain report")?;

    info!(
        "✅ Run {} complete: {} listings ranked, report written to {}",
        ranked.run_id(),
        ranked.ranking().len(),
        config.paths.bargain_report
    );

    println!("\n🏷️  Top {} bargains (most negative discount rate first)\n", report.len());
    println!("{report}");

    Ok(())
}
