use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::model::PricingModel;
use crate::processor::{FeatureTable, rent_from_log};

/// Root mean squared error. Both slices must have the same length.
pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let sum: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    (sum / actual.len() as f64).sqrt()
}

fn shuffled_indices(n: usize, seed: u64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    indices
}

/// Shuffled (train, test) split. The test side gets `ceil(n * test_ratio)` rows.
pub fn train_test_split(n: usize, test_ratio: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let indices = shuffled_indices(n, seed);
    let n_test = ((n as f64) * test_ratio).ceil() as usize;
    let n_test = n_test.min(n);
    let (test, train) = indices.split_at(n_test);
    (train.to_vec(), test.to_vec())
}

/// Shuffled k-fold (train, test) pairs. The first `n % k` folds take one
/// extra row.
pub fn kfold_indices(n: usize, n_splits: usize, seed: u64) -> Vec<(Vec<usize>, Vec<usize>)> {
    let indices = shuffled_indices(n, seed);
    let base = n / n_splits;
    let extra = n % n_splits;

    let mut folds = Vec::with_capacity(n_splits);
    let mut start = 0;
    for fold in 0..n_splits {
        let size = base + usize::from(fold < extra);
        let test = indices[start..start + size].to_vec();
        let train = indices[..start]
            .iter()
            .chain(&indices[start + size..])
            .copied()
            .collect();
        folds.push((train, test));
        start += size;
    }
    folds
}

#[derive(Debug, Clone, Serialize)]
pub struct HoldoutReport {
    pub train_rows: usize,
    pub test_rows: usize,
    /// RMSE in rent units, after undoing the log transform
    pub rmse: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrossValidationReport {
    pub fold_rmse: Vec<f64>,
    pub mean_rmse: f64,
    /// Population standard deviation across folds
    pub std_rmse: f64,
}

impl CrossValidationReport {
    fn from_folds(fold_rmse: Vec<f64>) -> Self {
        let n = fold_rmse.len().max(1) as f64;
        let mean_rmse = fold_rmse.iter().sum::<f64>() / n;
        let variance = fold_rmse
            .iter()
            .map(|r| (r - mean_rmse).powi(2))
            .sum::<f64>()
            / n;
        Self {
            fold_rmse,
            mean_rmse,
            std_rmse: variance.sqrt(),
        }
    }
}

fn score_split<M, F>(table: &FeatureTable, train: &[usize], test: &[usize], make_model: &F) -> Result<f64>
where
    M: PricingModel,
    F: Fn() -> M,
{
    if train.is_empty() || test.is_empty() {
        return Err(PipelineError::EmptyBatch(format!(
            "split with {} train and {} test rows",
            train.len(),
            test.len()
        )));
    }

    let train_table = table.select_rows(train);
    let test_table = table.select_rows(test);

    let mut model = make_model();
    model.fit(&train_table, train_table.rent_log())?;
    let predicted: Vec<f64> = model
        .predict(&test_table)?
        .into_iter()
        .map(rent_from_log)
        .collect();

    Ok(rmse(test_table.rent(), &predicted))
}

/// Fit on a shuffled train split, report RMSE on the held-out rows
pub fn holdout_rmse<M, F>(table: &FeatureTable, make_model: F, test_ratio: f64, seed: u64) -> Result<HoldoutReport>
where
    M: PricingModel,
    F: Fn() -> M,
{
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(PipelineError::Config(format!(
            "test_ratio must be in (0, 1), got {test_ratio}"
        )));
    }

    let (train, test) = train_test_split(table.n_rows(), test_ratio, seed);
    let rmse = score_split(table, &train, &test, &make_model)?;

    info!(
        "📏 Holdout RMSE {:.4} ({} train / {} test rows)",
        rmse,
        train.len(),
        test.len()
    );

    Ok(HoldoutReport {
        train_rows: train.len(),
        test_rows: test.len(),
        rmse,
    })
}

/// Shuffled k-fold cross validation
pub fn kfold_rmse<M, F>(table: &FeatureTable, make_model: F, n_splits: usize, seed: u64) -> Result<CrossValidationReport>
where
    M: PricingModel,
    F: Fn() -> M,
{
    if n_splits < 2 {
        return Err(PipelineError::Config(format!(
            "n_splits must be at least 2, got {n_splits}"
        )));
    }
    if table.n_rows() < n_splits {
        return Err(PipelineError::EmptyBatch(format!(
            "{} rows cannot be split into {} folds",
            table.n_rows(),
            n_splits
        )));
    }

    let mut fold_rmse = Vec::with_capacity(n_splits);
    for (fold, (train, test)) in kfold_indices(table.n_rows(), n_splits, seed)
        .into_iter()
        .enumerate()
    {
        let rmse = score_split(table, &train, &test, &make_model)?;
        info!("Fold {}/{}: RMSE {:.4}", fold + 1, n_splits, rmse);
        fold_rmse.push(rmse);
    }

    let report = CrossValidationReport::from_folds(fold_rmse);
    info!(
        "📏 {}-fold RMSE {:.4} ± {:.4}",
        n_splits, report.mean_rmse, report.std_rmse
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    /// Predicts the mean log-rent of its training rows
    struct MeanModel {
        mean: f64,
        columns: Option<Vec<String>>,
    }

    impl MeanModel {
        fn new() -> Self {
            Self {
                mean: 0.0,
                columns: None,
            }
        }
    }

    impl PricingModel for MeanModel {
        fn fit(&mut self, x: &FeatureTable, y: &[f64]) -> Result<()> {
            self.mean = y.iter().sum::<f64>() / y.len() as f64;
            self.columns = Some(x.columns().to_vec());
            Ok(())
        }

        fn predict(&self, x: &FeatureTable) -> Result<Vec<f64>> {
            Ok(vec![self.mean; x.n_rows()])
        }

        fn schema(&self) -> Option<&[String]> {
            self.columns.as_deref()
        }
    }

    fn constant_table(n: usize, rent: f64) -> FeatureTable {
        let rows = (0..n).map(|i| vec![i as f64]).collect();
        FeatureTable::new(vec!["area_m2".to_string()], rows, vec![rent; n]).unwrap()
    }

    #[test]
    fn test_rmse() {
        assert_eq!(rmse(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
        assert!((rmse(&[0.0, 0.0], &[3.0, 4.0]) - 12.5_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_split_sizes_and_disjointness() {
        let (train, test) = train_test_split(10, 0.2, 42);
        assert_eq!(test.len(), 2);
        assert_eq!(train.len(), 8);

        let all: BTreeSet<usize> = train.iter().chain(&test).copied().collect();
        assert_eq!(all.len(), 10);
    }

    #[test]
    fn test_split_is_seeded() {
        assert_eq!(train_test_split(50, 0.2, 7), train_test_split(50, 0.2, 7));
    }

    #[test]
    fn test_kfold_covers_each_row_once() {
        let folds = kfold_indices(11, 5, 42);
        assert_eq!(folds.len(), 5);

        let sizes: Vec<usize> = folds.iter().map(|(_, test)| test.len()).collect();
        assert_eq!(sizes, vec![3, 2, 2, 2, 2]);

        let mut seen: Vec<usize> = folds.iter().flat_map(|(_, test)| test.clone()).collect();
        seen.sort();
        assert_eq!(seen, (0..11).collect::<Vec<_>>());

        for (train, test) in &folds {
            assert_eq!(train.len() + test.len(), 11);
        }
    }

    #[test]
    fn test_constant_rent_scores_zero_error() {
        let table = constant_table(20, 8.5);

        let holdout = holdout_rmse(&table, MeanModel::new, 0.2, 42).unwrap();
        assert!(holdout.rmse < 1e-9);
        assert_eq!(holdout.test_rows, 4);

        let cv = kfold_rmse(&table, MeanModel::new, 5, 42).unwrap();
        assert_eq!(cv.fold_rmse.len(), 5);
        assert!(cv.mean_rmse < 1e-9);
        assert!(cv.std_rmse < 1e-9);
    }

    #[test]
    fn test_too_few_rows_for_folds() {
        let table = constant_table(3, 8.5);
        assert!(matches!(
            kfold_rmse(&table, MeanModel::new, 5, 42),
            Err(PipelineError::EmptyBatch(_))
        ));
    }

    #[test]
    fn test_invalid_ratio_rejected() {
        let table = constant_table(10, 8.5);
        assert!(holdout_rmse(&table, MeanModel::new, 1.0, 42).is_err());
    }

    #[test]
    fn test_population_std() {
        let report = CrossValidationReport::from_folds(vec![1.0, 3.0]);
        assert_eq!(report.mean_rmse, 2.0);
        assert_eq!(report.std_rmse, 1.0);
    }
}
