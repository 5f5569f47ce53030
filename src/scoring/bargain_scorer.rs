use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::models::PredictionRecord;
use crate::processor::rent_from_log;

/// Turns model output into discount rates and a bargain ranking
pub struct BargainScorer;

impl BargainScorer {
    /// Score one listing against its log-scale prediction
    pub fn score(listing_index: usize, actual_rent: f64, predicted_rent_log: f64) -> PredictionRecord {
        let predicted_rent = rent_from_log(predicted_rent_log);
        let difference = actual_rent - predicted_rent;

        let discount_rate = if actual_rent > 0.0 {
            Some(difference / actual_rent).filter(|rate| rate.is_finite())
        } else {
            None
        };

        PredictionRecord {
            listing_index,
            actual_rent,
            predicted_rent,
            difference,
            discount_rate,
        }
    }

    /// Score a batch; `actual` and `predicted_log` are aligned by position
    pub fn score_batch(actual: &[f64], predicted_log: &[f64]) -> Result<Vec<PredictionRecord>> {
        if actual.len() != predicted_log.len() {
            return Err(PipelineError::SchemaMismatch {
                expected: format!("{} predictions", actual.len()),
                actual: format!("{} predictions", predicted_log.len()),
            });
        }

        let records: Vec<PredictionRecord> = actual
            .iter()
            .zip(predicted_log)
            .enumerate()
            .map(|(index, (&rent, &log))| Self::score(index, rent, log))
            .collect();

        let unscored = records.iter().filter(|r| r.discount_rate.is_none()).count();
        if unscored > 0 {
            warn!("{} listings have no usable discount rate", unscored);
        }
        info!(
            "Scoring summary: {} scored, {} without a rate",
            records.len() - unscored,
            unscored
        );

        Ok(records)
    }

    /// Drop records without a discount rate, then sort ascending. The sort
    /// is stable so equal rates keep their input order.
    pub fn rank(records: &[PredictionRecord]) -> Vec<PredictionRecord> {
        let mut ranked: Vec<PredictionRecord> = records
            .iter()
            .filter(|record| record.actual_rent > 0.0 && record.discount_rate.is_some())
            .cloned()
            .collect();

        ranked.sort_by(|a, b| {
            let a = a.discount_rate.unwrap_or(f64::INFINITY);
            let b = b.discount_rate.unwrap_or(f64::INFINITY);
            a.total_cmp(&b)
        });

        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::rent_log;

    #[test]
    fn test_overpriced_listing_has_negative_rate() {
        let record = BargainScorer::score(0, 10.0, rent_log(12.0));
        assert!((record.predicted_rent - 12.0).abs() < 1e-9);
        assert!((record.difference + 2.0).abs() < 1e-9);
        assert!((record.discount_rate.unwrap() + 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_underpriced_listing_has_positive_rate() {
        let record = BargainScorer::score(1, 10.0, rent_log(8.0));
        assert!((record.difference - 2.0).abs() < 1e-9);
        assert!((record.discount_rate.unwrap() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_zero_rent_has_no_rate() {
        let record = BargainScorer::score(0, 0.0, rent_log(8.0));
        assert_eq!(record.discount_rate, None);
        assert!(BargainScorer::rank(&[record]).is_empty());
    }

    #[test]
    fn test_rank_orders_ascending_and_keeps_ties_in_input_order() {
        let actual = [10.0, 10.0, 0.0, 10.0, 10.0];
        let predicted = [
            rent_log(12.0),
            rent_log(8.0),
            rent_log(5.0),
            rent_log(12.0),
            rent_log(15.0),
        ];
        let records = BargainScorer::score_batch(&actual, &predicted).unwrap();
        let ranked = BargainScorer::rank(&records);

        let order: Vec<usize> = ranked.iter().map(|r| r.listing_index).collect();
        assert_eq!(order, vec![4, 0, 3, 1]);
    }

    #[test]
    fn test_ranking_is_reproducible() {
        let actual: Vec<f64> = (1..50).map(|i| i as f64 * 0.7).collect();
        let predicted: Vec<f64> = (1..50).map(|i| rent_log((i % 7) as f64 + 3.0)).collect();

        let first = BargainScorer::rank(&BargainScorer::score_batch(&actual, &predicted).unwrap());
        let second = BargainScorer::rank(&BargainScorer::score_batch(&actual, &predicted).unwrap());
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        assert!(matches!(
            BargainScorer::score_batch(&[1.0, 2.0], &[1.0]),
            Err(PipelineError::SchemaMismatch { .. })
        ));
    }
}
