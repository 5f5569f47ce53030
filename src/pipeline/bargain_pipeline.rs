use std::fmt;
use std::time::Instant;

use tracing::info;
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::model::PricingModel;
use crate::models::{PredictionRecord, RawListing};
use crate::processor::{FeatureBuilder, FeatureTable, ListingLoader, Vocabulary};
use crate::scoring::{BargainReport, BargainScorer};
use crate::storage::LocalStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Loaded,
    FeaturesBuilt,
    ModelFit,
    Scored,
    Ranked,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Loaded => "loaded",
            PipelineStage::FeaturesBuilt => "features_built",
            PipelineStage::ModelFit => "model_fit",
            PipelineStage::Scored => "scored",
            PipelineStage::Ranked => "ranked",
        };
        f.write_str(name)
    }
}

pub trait PipelineState {
    const STAGE: PipelineStage;
}

pub struct Loaded {
    listings: Vec<RawListing>,
}

pub struct FeaturesBuilt {
    listings: Vec<RawListing>,
    table: FeatureTable,
    vocabulary: Vocabulary,
}

pub struct ModelFit<M> {
    listings: Vec<RawListing>,
    table: FeatureTable,
    vocabulary: Vocabulary,
    model: M,
}

pub struct Scored<M> {
    listings: Vec<RawListing>,
    table: FeatureTable,
    vocabulary: Vocabulary,
    model: M,
    records: Vec<PredictionRecord>,
}

pub struct Ranked<M> {
    listings: Vec<RawListing>,
    table: FeatureTable,
    vocabulary: Vocabulary,
    model: M,
    records: Vec<PredictionRecord>,
    ranking: Vec<PredictionRecord>,
}

impl PipelineState for Loaded {
    const STAGE: PipelineStage = PipelineStage::Loaded;
}
impl PipelineState for FeaturesBuilt {
    const STAGE: PipelineStage = PipelineStage::FeaturesBuilt;
}
impl<M> PipelineState for ModelFit<M> {
    const STAGE: PipelineStage = PipelineStage::ModelFit;
}
impl<M> PipelineState for Scored<M> {
    const STAGE: PipelineStage = PipelineStage::Scored;
}
impl<M> PipelineState for Ranked<M> {
    const STAGE: PipelineStage = PipelineStage::Ranked;
}

/// One bargain-finding run. Every transition consumes the pipeline, so a
/// stage can neither be repeated nor skipped, and a failed transition
/// leaves nothing behind to report from.
pub struct BargainPipeline<S> {
    run_id: Uuid,
    started: Instant,
    state: S,
}

impl<S: PipelineState> BargainPipeline<S> {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn stage(&self) -> PipelineStage {
        S::STAGE
    }

    fn into_parts(self) -> (Uuid, Instant, S) {
        (self.run_id, self.started, self.state)
    }
}

fn transition<T: PipelineState>(
    run_id: Uuid,
    started: Instant,
    from: PipelineStage,
    state: T,
) -> BargainPipeline<T> {
    info!(
        "[run {}] {} -> {} ({:.2?} elapsed)",
        run_id,
        from,
        T::STAGE,
        started.elapsed()
    );
    BargainPipeline {
        run_id,
        started,
        state,
    }
}

impl BargainPipeline<Loaded> {
    pub fn load(listings: Vec<RawListing>) -> Result<Self> {
        if listings.is_empty() {
            return Err(PipelineError::EmptyBatch("load".to_string()));
        }
        let run_id = Uuid::new_v4();
        info!("[run {}] 🚀 Loaded {} listings", run_id, listings.len());
        Ok(Self {
            run_id,
            started: Instant::now(),
            state: Loaded { listings },
        })
    }

    pub fn from_csv(path: &str) -> Result<Self> {
        let listings = ListingLoader::new().load_csv(path)?;
        Self::load(listings)
    }

    pub fn listings(&self) -> &[RawListing] {
        &self.state.listings
    }

    /// Build features and fit a fresh vocabulary on this batch
    pub fn build_features(self, builder: &FeatureBuilder) -> Result<BargainPipeline<FeaturesBuilt>> {
        let (table, vocabulary) = builder.build_features(&self.state.listings)?;
        Ok(self.into_features(table, vocabulary))
    }

    /// Build features against a vocabulary from an earlier run
    pub fn build_features_with(
        self,
        builder: &FeatureBuilder,
        vocabulary: Vocabulary,
    ) -> Result<BargainPipeline<FeaturesBuilt>> {
        let table = builder.build_features_with(&self.state.listings, &vocabulary)?;
        Ok(self.into_features(table, vocabulary))
    }

    /// Training entry point: fit the vocabulary on this batch and, when
    /// `vocabulary_path` is set, overwrite the file there with it
    pub fn build_features_and_save(
        self,
        builder: &FeatureBuilder,
        vocabulary_path: Option<&str>,
    ) -> Result<BargainPipeline<FeaturesBuilt>> {
        let built = self.build_features(builder)?;
        if let Some(path) = vocabulary_path {
            built.vocabulary().save(path)?;
            info!("[run {}] Saved vocabulary to {}", built.run_id(), path);
        }
        Ok(built)
    }

    fn into_features(self, table: FeatureTable, vocabulary: Vocabulary) -> BargainPipeline<FeaturesBuilt> {
        info!(
            "[run {}] Feature table: {} rows x {} columns",
            self.run_id,
            table.n_rows(),
            table.columns().len()
        );
        let (run_id, started, Loaded { listings }) = self.into_parts();
        transition(
            run_id,
            started,
            PipelineStage::Loaded,
            FeaturesBuilt {
                listings,
                table,
                vocabulary,
            },
        )
    }
}

impl BargainPipeline<FeaturesBuilt> {
    pub fn listings(&self) -> &[RawListing] {
        &self.state.listings
    }

    pub fn table(&self) -> &FeatureTable {
        &self.state.table
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.state.vocabulary
    }

    /// Write the cleaned feature table, CSV or Parquet by extension
    pub fn write_features(&self, path: &str) -> Result<()> {
        let mut df = self.state.table.to_dataframe()?;
        LocalStorage::write_table(&mut df, path)
    }

    /// Fit on the rows with a positive rent. Rows without one stay in the
    /// table and are scored, but never ranked.
    pub fn fit<M: PricingModel>(self, mut model: M) -> Result<BargainPipeline<ModelFit<M>>> {
        let trainable: Vec<usize> = self
            .state
            .table
            .rent()
            .iter()
            .enumerate()
            .filter(|(_, rent)| **rent > 0.0)
            .map(|(index, _)| index)
            .collect();
        if trainable.is_empty() {
            return Err(PipelineError::EmptyBatch(
                "model fit: no listing has a positive rent".to_string(),
            ));
        }

        let skipped = self.state.table.n_rows() - trainable.len();
        if skipped > 0 {
            info!(
                "[run {}] Excluding {} listings without rent from training",
                self.run_id, skipped
            );
        }

        let training = self.state.table.select_rows(&trainable);
        model.fit(&training, training.rent_log())?;

        let (run_id, started, state) = self.into_parts();
        Ok(transition(
            run_id,
            started,
            PipelineStage::FeaturesBuilt,
            ModelFit {
                listings: state.listings,
                table: state.table,
                vocabulary: state.vocabulary,
                model,
            },
        ))
    }
}

impl<M: PricingModel> BargainPipeline<ModelFit<M>> {
    pub fn model(&self) -> &M {
        &self.state.model
    }

    pub fn table(&self) -> &FeatureTable {
        &self.state.table
    }

    /// Predict every row of this run's table and compute discount rates
    pub fn score(self) -> Result<BargainPipeline<Scored<M>>> {
        let predicted_log = self.state.model.predict(&self.state.table)?;
        let records = BargainScorer::score_batch(self.state.table.rent(), &predicted_log)?;

        let (run_id, started, state) = self.into_parts();
        Ok(transition(
            run_id,
            started,
            PipelineStage::ModelFit,
            Scored {
                listings: state.listings,
                table: state.table,
                vocabulary: state.vocabulary,
                model: state.model,
                records,
            },
        ))
    }
}

impl<M: PricingModel> BargainPipeline<Scored<M>> {
    /// One record per listing, in input order
    pub fn records(&self) -> &[PredictionRecord] {
        &self.state.records
    }

    pub fn rank(self) -> BargainPipeline<Ranked<M>> {
        let ranking = BargainScorer::rank(&self.state.records);
        info!(
            "[run {}] Ranked {} of {} listings",
            self.run_id,
            ranking.len(),
            self.state.records.len()
        );

        let (run_id, started, state) = self.into_parts();
        transition(
            run_id,
            started,
            PipelineStage::Scored,
            Ranked {
                listings: state.listings,
                table: state.table,
                vocabulary: state.vocabulary,
                model: state.model,
                records: state.records,
                ranking,
            },
        )
    }
}

impl<M: PricingModel> BargainPipeline<Ranked<M>> {
    pub fn listings(&self) -> &[RawListing] {
        &self.state.listings
    }

    pub fn table(&self) -> &FeatureTable {
        &self.state.table
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.state.vocabulary
    }

    pub fn model(&self) -> &M {
        &self.state.model
    }

    pub fn records(&self) -> &[PredictionRecord] {
        &self.state.records
    }

    /// Best bargain first
    pub fn ranking(&self) -> &[PredictionRecord] {
        &self.state.ranking
    }

    pub fn report(&self, top_n: usize) -> Result<BargainReport> {
        BargainReport::from_ranking(&self.state.ranking, &self.state.listings, top_n)
    }

    pub fn into_ranking(self) -> Vec<PredictionRecord> {
        self.state.ranking
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureConfig;

    /// Predicts a fixed rent for every row
    struct FlatModel {
        rent: f64,
        columns: Option<Vec<String>>,
    }

    impl FlatModel {
        fn new(rent: f64) -> Self {
            Self { rent, columns: None }
        }
    }

    impl PricingModel for FlatModel {
        fn fit(&mut self, x: &FeatureTable, y: &[f64]) -> Result<()> {
            assert_eq!(x.n_rows(), y.len());
            self.columns = Some(x.columns().to_vec());
            Ok(())
        }

        fn predict(&self, x: &FeatureTable) -> Result<Vec<f64>> {
            if let Some(columns) = &self.columns {
                crate::model::check_schema(columns, x.columns())?;
            }
            Ok(vec![crate::processor::rent_log(self.rent); x.n_rows()])
        }

        fn schema(&self) -> Option<&[String]> {
            self.columns.as_deref()
        }
    }

    fn listing(address: &str, rent: f64) -> RawListing {
        RawListing {
            building_name: format!("{address}ハイツ"),
            address: address.to_string(),
            transportation_1: Some("ＪＲ山手線/渋谷駅 歩5分".to_string()),
            transportation_2: None,
            transportation_3: None,
            age: "築5年".to_string(),
            floors: "5階建".to_string(),
            rent,
            admin_fee: 5000.0,
            deposit: 1.0,
            gratuity: 1.0,
            layout: "1K".to_string(),
            area: "25.0".to_string(),
        }
    }

    fn builder() -> FeatureBuilder {
        FeatureBuilder::new(&FeatureConfig::default()).unwrap()
    }

    #[test]
    fn test_stages_advance_in_order() {
        let listings = vec![
            listing("東京都渋谷区神南1", 12.0),
            listing("東京都新宿区西新宿2", 8.0),
            listing("東京都港区六本木3", 0.0),
        ];

        let loaded = BargainPipeline::load(listings).unwrap();
        assert_eq!(loaded.stage(), PipelineStage::Loaded);
        let run_id = loaded.run_id();

        let built = loaded.build_features(&builder()).unwrap();
        assert_eq!(built.stage(), PipelineStage::FeaturesBuilt);

        let fitted = built.fit(FlatModel::new(10.0)).unwrap();
        assert_eq!(fitted.stage(), PipelineStage::ModelFit);
        assert_eq!(fitted.model().schema().unwrap(), fitted.table().columns());

        let scored = fitted.score().unwrap();
        assert_eq!(scored.records().len(), 3);

        let ranked = scored.rank();
        assert_eq!(ranked.stage(), PipelineStage::Ranked);
        assert_eq!(ranked.run_id(), run_id);

        // zero-rent listing is scored but not ranked
        let order: Vec<usize> = ranked.ranking().iter().map(|r| r.listing_index).collect();
        assert_eq!(order, vec![1, 0]);

        let report = ranked.report(20).unwrap();
        assert_eq!(report.rows[0].address, "東京都新宿区西新宿2");
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        assert!(matches!(
            BargainPipeline::load(Vec::new()),
            Err(PipelineError::EmptyBatch(_))
        ));
    }

    #[test]
    fn test_fit_needs_a_positive_rent() {
        let pipeline = BargainPipeline::load(vec![listing("東京都渋谷区神南1", 0.0)])
            .unwrap()
            .build_features(&builder())
            .unwrap();
        assert!(matches!(
            pipeline.fit(FlatModel::new(10.0)),
            Err(PipelineError::EmptyBatch(_))
        ));
    }

    #[test]
    fn test_second_training_run_learns_new_wards() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocabulary.json");
        let path = path.to_str().unwrap();

        let first = vec![
            listing("東京都港区六本木1", 12.0),
            listing("東京都港区麻布2", 11.0),
        ];
        BargainPipeline::load(first)
            .unwrap()
            .build_features_and_save(&builder(), Some(path))
            .unwrap();
        assert_eq!(Vocabulary::load(path).unwrap().cities, vec!["港区".to_string()]);

        let second = vec![
            listing("東京都目黒区中目黒3", 9.0),
            listing("東京都世田谷区三軒茶屋4", 8.0),
        ];
        let fitted = BargainPipeline::load(second)
            .unwrap()
            .build_features_and_save(&builder(), Some(path))
            .unwrap()
            .fit(FlatModel::new(9.0))
            .unwrap();

        let table = fitted.table();
        assert_eq!(table.column("city_目黒区"), Some(vec![1.0, 0.0]));
        assert_eq!(table.column("city_世田谷区"), Some(vec![0.0, 1.0]));
        assert_eq!(table.column("city_other"), Some(vec![0.0, 0.0]));
        assert!(table.column("city_港区").is_none());

        let schema = fitted.model().schema().unwrap();
        assert!(schema.iter().any(|c| c == "city_目黒区"));
        assert!(schema.iter().any(|c| c == "city_世田谷区"));

        let mut saved = Vocabulary::load(path).unwrap().cities;
        saved.sort();
        let mut expected = vec!["世田谷区".to_string(), "目黒区".to_string()];
        expected.sort();
        assert_eq!(saved, expected);
    }

    #[test]
    fn test_loaded_vocabulary_maps_unseen_ward_to_other() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocabulary.json");
        let path = path.to_str().unwrap();

        let training = vec![
            listing("東京都渋谷区神南1", 12.0),
            listing("東京都新宿区西新宿2", 8.0),
        ];
        let trained = BargainPipeline::load(training)
            .unwrap()
            .build_features_and_save(&builder(), Some(path))
            .unwrap();

        let later = vec![listing("東京都目黒区中目黒3", 9.0)];
        let inferred = BargainPipeline::load(later)
            .unwrap()
            .build_features_with(&builder(), Vocabulary::load(path).unwrap())
            .unwrap();

        assert_eq!(trained.table().columns(), inferred.table().columns());
        assert_eq!(inferred.table().column("city_other"), Some(vec![1.0]));
    }

    #[test]
    fn test_features_written_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cleaned.csv");
        let path = path.to_str().unwrap();

        let built = BargainPipeline::load(vec![listing("東京都渋谷区神南1", 12.0)])
            .unwrap()
            .build_features(&builder())
            .unwrap();
        built.write_features(path).unwrap();

        let df = LocalStorage::read_csv(path).unwrap();
        assert_eq!(df.height(), 1);
        assert!(df.column("rent_log").is_ok());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(PipelineStage::FeaturesBuilt.to_string(), "features_built");
        assert_eq!(PipelineStage::Ranked.to_string(), "ranked");
    }
}
