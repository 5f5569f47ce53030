use anyhow::{Context, Result, bail};
use rent_pipeline::config::PipelineConfig;
use rent_pipeline::model::{ForestModel, holdout_rmse, kfold_rmse};
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
        .build_features(&builder)
        .context("Failed to build features")?;

    // listings without a rent cannot be scored against
    let priced: Vec<usize> = built
        .table()
        .rent()
        .iter()
        .enumerate()
        .filter(|(_, rent)| **rent > 0.0)
        .map(|(index, _)| index)
        .collect();
    if priced.is_empty() {
        bail!("No listing in {} has a positive rent", config.paths.raw_listings);
    }
    let table = built.table().select_rows(&priced);
    info!("Evaluating on {} priced listings", table.n_rows());

    let make_model = || ForestModel::new(config.model.clone());
    let evaluation = &config.evaluation;

    let holdout = holdout_rmse(&table, make_model, evaluation.test_ratio, evaluation.seed)
        .context("Holdout evaluation failed")?;
    let cv = kfold_rmse(&table, make_model, evaluation.n_splits, evaluation.seed)
        .context("Cross validation failed")?;

    println!("\n📊 Model evaluation ({} listings)", table.n_rows());
    println!(
        "Holdout RMSE: {:.4} ({} train / {} test)",
        holdout.rmse, holdout.train_rows, holdout.test_rows
    );
    for (fold, rmse) in cv.fold_rmse.iter().enumerate() {
        println!("Fold {}: RMSE {:.4}", fold + 1, rmse);
    }
    println!(
        "{}-fold RMSE: {:.4} ± {:.4}",
        evaluation.n_splits, cv.mean_rmse, cv.std_rmse
    );

    Ok(())
}
