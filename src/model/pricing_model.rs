use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use tracing::info;

use crate::config::ModelConfig;
use crate::error::{PipelineError, Result};
use crate::processor::FeatureTable;

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Regressor over a feature table. `predict` must see the same columns,
/// in the same order, as `fit` did.
pub trait PricingModel {
    /// Train on `x` against log-scale rent `y`
    fn fit(&mut self, x: &FeatureTable, y: &[f64]) -> Result<()>;

    /// Log-scale predictions, one per row of `x`
    fn predict(&self, x: &FeatureTable) -> Result<Vec<f64>>;

    /// Columns seen at fit time, `None` before fitting
    fn schema(&self) -> Option<&[String]>;
}

/// Random forest regressor from smartcore. Stands in for a gradient-boosted
/// regressor behind the same fit/predict contract on log rent.
pub struct ForestModel {
    params: ModelConfig,
    columns: Option<Vec<String>>,
    forest: Option<Forest>,
}

impl ForestModel {
    pub fn new(params: ModelConfig) -> Self {
        Self {
            params,
            columns: None,
            forest: None,
        }
    }

    fn parameters(&self) -> RandomForestRegressorParameters {
        let mut parameters = RandomForestRegressorParameters::default()
            .with_n_trees(self.params.n_trees)
            .with_min_samples_leaf(self.params.min_samples_leaf)
            .with_min_samples_split(self.params.min_samples_split)
            .with_seed(self.params.seed);
        if let Some(max_depth) = self.params.max_depth {
            parameters = parameters.with_max_depth(max_depth);
        }
        parameters
    }
}

impl PricingModel for ForestModel {
    fn fit(&mut self, x: &FeatureTable, y: &[f64]) -> Result<()> {
        if x.is_empty() {
            return Err(PipelineError::EmptyBatch("model fit".to_string()));
        }
        if x.n_rows() != y.len() {
            return Err(PipelineError::Model(format!(
                "{} feature rows but {} targets",
                x.n_rows(),
                y.len()
            )));
        }
        ensure_finite(x)?;

        info!(
            "Fitting random forest ({} trees) on {} rows x {} features",
            self.params.n_trees,
            x.n_rows(),
            x.columns().len()
        );

        let matrix = DenseMatrix::from_2d_vec(&x.rows().to_vec());
        let forest = RandomForestRegressor::fit(&matrix, &y.to_vec(), self.parameters())
            .map_err(|e| PipelineError::Model(e.to_string()))?;

        self.columns = Some(x.columns().to_vec());
        self.forest = Some(forest);
        Ok(())
    }

    fn predict(&self, x: &FeatureTable) -> Result<Vec<f64>> {
        let (Some(forest), Some(columns)) = (&self.forest, &self.columns) else {
            return Err(PipelineError::Model("model has not been fitted".to_string()));
        };
        check_schema(columns, x.columns())?;
        if x.is_empty() {
            return Ok(Vec::new());
        }
        ensure_finite(x)?;

        let matrix = DenseMatrix::from_2d_vec(&x.rows().to_vec());
        forest
            .predict(&matrix)
            .map_err(|e| PipelineError::Model(e.to_string()))
    }

    fn schema(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }
}

/// Exact column list equality, reporting the first difference
pub fn check_schema(expected: &[String], actual: &[String]) -> Result<()> {
    if expected == actual {
        return Ok(());
    }

    let first_difference = expected
        .iter()
        .zip(actual.iter())
        .position(|(e, a)| e != a)
        .unwrap_or(expected.len().min(actual.len()));

    Err(PipelineError::SchemaMismatch {
        expected: format!(
            "{} columns (column {} = {:?})",
            expected.len(),
            first_difference,
            expected.get(first_difference)
        ),
        actual: format!(
            "{} columns (column {} = {:?})",
            actual.len(),
            first_difference,
            actual.get(first_difference)
        ),
    })
}

fn ensure_finite(x: &FeatureTable) -> Result<()> {
    for (row_index, row) in x.rows().iter().enumerate() {
        if let Some(col_index) = row.iter().position(|v| !v.is_finite()) {
            return Err(PipelineError::Model(format!(
                "non-finite value in row {} column {}",
                row_index,
                x.columns()[col_index]
            )));
        }
    }
    Ok(())
}
