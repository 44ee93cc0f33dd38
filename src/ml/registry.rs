use crate::ml::classifier::{HazardClassifier, TrainedModel};
use crate::ml::error::{MlError, MlResult};
use crate::ml::features::{FeatureScaler, ScalerState};
use crate::ml::hazard::HazardType;
use crate::ml::models::{
    FeatureVector, ForestConfig, ForestOverrides, ModelMetadata, PredictionResult, RawFeatures,
    TrainingDataset, TrainingReport,
};
use crate::ml::severity::SeverityBucketer;
use crate::ml::snapshot::SnapshotStore;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use strum::IntoEnumIterator;
use tracing::{debug, info, warn};

/// Scaler, ensemble and metadata for one hazard, replaced as a unit
#[derive(Debug, Clone, PartialEq)]
pub struct HazardModel {
    pub scaler: ScalerState,
    pub model: TrainedModel,
    pub metadata: ModelMetadata,
}

impl HazardModel {
    /// Fit the scaler on raw data, then the ensemble on the scaled matrix
    pub fn fit(dataset: &TrainingDataset, config: &ForestConfig) -> MlResult<Self> {
        let hazard = dataset.hazard();
        let scaler = FeatureScaler::fit(dataset)?;
        let scaled = TrainingDataset::new(
            hazard,
            scaler.transform_matrix(dataset.features())?,
            dataset.labels().to_vec(),
        )?;
        let (model, accuracy) = HazardClassifier::fit(&scaled, config)?;

        let metadata = ModelMetadata {
            hazard,
            trained_at: Utc::now(),
            n_training_samples: dataset.n_samples(),
            n_features: dataset.n_features(),
            training_accuracy: accuracy,
            forest: config.clone(),
        };

        Ok(Self {
            scaler,
            model,
            metadata,
        })
    }

    /// Score a raw (unscaled) feature vector
    pub fn predict(&self, raw: &FeatureVector) -> MlResult<PredictionResult> {
        let scaled = self.scaler.transform(raw)?;
        let probability = self.model.predict_vector(&scaled)?;
        Ok(PredictionResult {
            disaster_type: self.model.hazard(),
            probability,
            severity: SeverityBucketer::label(probability),
        })
    }
}

/// Result of trying to load one hazard's snapshot at startup
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded,
    Missing,
    Failed(MlError),
}

/// Per-hazard model registry.
///
/// Entries are `Arc`s swapped whole on retrain. A predict call clones the
/// `Arc` it found and keeps scoring against it even if a newer entry lands
/// meanwhile.
pub struct ModelRegistry {
    entries: DashMap<HazardType, Arc<HazardModel>>,
    store: Option<SnapshotStore>,
    overrides: ForestOverrides,
}

impl ModelRegistry {
    /// Registry that never reads or writes snapshots
    pub fn in_memory() -> Self {
        Self {
            entries: DashMap::new(),
            store: None,
            overrides: ForestOverrides::default(),
        }
    }

    /// Registry backed by a snapshot directory
    pub fn with_store(store: SnapshotStore) -> Self {
        Self {
            store: Some(store),
            ..Self::in_memory()
        }
    }

    pub fn with_overrides(mut self, overrides: ForestOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn store(&self) -> Option<&SnapshotStore> {
        self.store.as_ref()
    }

    /// Effective forest settings for a hazard
    pub fn forest_config(&self, hazard: HazardType) -> ForestConfig {
        self.overrides.apply(hazard.schema().default_forest())
    }

    /// Train with the hazard's effective forest settings
    pub fn train(&self, hazard: HazardType, dataset: &TrainingDataset) -> MlResult<TrainingReport> {
        self.train_with_config(hazard, dataset, &self.forest_config(hazard))
    }

    pub fn train_named(&self, hazard: &str, dataset: &TrainingDataset) -> MlResult<TrainingReport> {
        self.train(HazardType::parse(hazard)?, dataset)
    }

    /// Fit a fresh entry, persist it, then swap it in.
    ///
    /// A failed write leaves the previous entry in place.
    pub fn train_with_config(
        &self,
        hazard: HazardType,
        dataset: &TrainingDataset,
        config: &ForestConfig,
    ) -> MlResult<TrainingReport> {
        if dataset.hazard() != hazard {
            return Err(MlError::InvalidDataset {
                hazard,
                reason: format!("dataset was built for '{}'", dataset.hazard()),
            });
        }

        info!(
            hazard = %hazard,
            samples = dataset.n_samples(),
            trees = config.tree_count,
            "Training hazard model"
        );
        let entry = HazardModel::fit(dataset, config)?;

        let persisted = match &self.store {
            Some(store) => {
                store.save(&entry)?;
                true
            }
            None => false,
        };

        let report = TrainingReport {
            hazard,
            accuracy: entry.metadata.training_accuracy,
            n_samples: entry.metadata.n_training_samples,
            tree_count: entry.model.trees().len(),
            persisted,
        };
        self.entries.insert(hazard, Arc::new(entry));

        info!(
            hazard = %hazard,
            accuracy = report.accuracy,
            persisted,
            "✅ Hazard model trained"
        );
        Ok(report)
    }

    /// Predict from named raw features
    pub fn predict(&self, hazard: HazardType, features: &RawFeatures) -> MlResult<PredictionResult> {
        let vector = FeatureVector::from_named(hazard, features)?;
        self.predict_vector(&vector)
    }

    pub fn predict_named(&self, hazard: &str, features: &RawFeatures) -> MlResult<PredictionResult> {
        self.predict(HazardType::parse(hazard)?, features)
    }

    /// Predict from raw values already in schema order
    pub fn predict_vector(&self, vector: &FeatureVector) -> MlResult<PredictionResult> {
        let entry = self.entry(vector.hazard())?;
        let result = entry.predict(vector)?;
        debug!(
            hazard = %result.disaster_type,
            probability = result.probability,
            severity = %result.severity,
            "Scored hazard risk"
        );
        Ok(result)
    }

    /// Current entry, lazily loading a snapshot on first use
    pub fn entry(&self, hazard: HazardType) -> MlResult<Arc<HazardModel>> {
        if let Some(entry) = self.entries.get(&hazard) {
            return Ok(Arc::clone(entry.value()));
        }

        let Some(store) = &self.store else {
            return Err(MlError::ModelNotTrained(hazard));
        };
        match store.load(hazard) {
            Ok(Some(loaded)) => {
                info!(hazard = %hazard, "Loaded model snapshot on demand");
                // a concurrent train may have won the race; keep its entry
                let entry = self.entries.entry(hazard).or_insert(Arc::new(loaded));
                Ok(Arc::clone(entry.value()))
            }
            Ok(None) => Err(MlError::ModelNotTrained(hazard)),
            Err(e) => {
                warn!(hazard = %hazard, error = %e, code = e.error_code(), "Snapshot unusable, treating model as untrained");
                Err(MlError::ModelNotTrained(hazard))
            }
        }
    }

    /// Load one hazard's snapshot, replacing any in-memory entry.
    ///
    /// Returns `false` when no snapshot exists. Version and decoding
    /// failures are returned as-is and leave the registry unchanged.
    pub fn load(&self, hazard: HazardType) -> MlResult<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        match store.load(hazard)? {
            Some(loaded) => {
                info!(
                    hazard = %hazard,
                    trees = loaded.model.trees().len(),
                    trained_at = %loaded.metadata.trained_at,
                    "Loaded model snapshot"
                );
                self.entries.insert(hazard, Arc::new(loaded));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Try every supported hazard's snapshot
    pub fn load_all(&self) -> Vec<(HazardType, LoadOutcome)> {
        HazardType::iter()
            .map(|hazard| {
                let outcome = match self.load(hazard) {
                    Ok(true) => LoadOutcome::Loaded,
                    Ok(false) => {
                        debug!(hazard = %hazard, "No snapshot to load");
                        LoadOutcome::Missing
                    }
                    Err(e) => {
                        warn!(hazard = %hazard, error = %e, code = e.error_code(), "Skipping unusable snapshot");
                        LoadOutcome::Failed(e)
                    }
                };
                (hazard, outcome)
            })
            .collect()
    }

    pub fn is_trained(&self, hazard: HazardType) -> bool {
        self.entries.contains_key(&hazard)
    }

    /// Hazards with an in-memory entry, in declaration order
    pub fn trained_hazards(&self) -> Vec<HazardType> {
        HazardType::iter().filter(|h| self.is_trained(*h)).collect()
    }

    pub fn metadata(&self) -> Vec<ModelMetadata> {
        self.trained_hazards()
            .into_iter()
            .filter_map(|h| self.entries.get(&h).map(|e| e.metadata.clone()))
            .collect()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::severity::RiskSeverity;
    use crate::ml::snapshot::SnapshotFormat;
    use crate::ml::synthetic;

    fn small_forest() -> ForestOverrides {
        ForestOverrides {
            tree_count: Some(8),
            ..Default::default()
        }
    }

    fn flood_features(values: [f64; 5]) -> RawFeatures {
        HazardType::Flood
            .feature_names()
            .into_iter()
            .zip(values)
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }

    #[test]
    fn test_predict_before_train() {
        let registry = ModelRegistry::in_memory();
        let err = registry
            .predict(HazardType::Flood, &flood_features([1.0; 5]))
            .unwrap_err();
        assert!(matches!(err, MlError::ModelNotTrained(HazardType::Flood)));
    }

    #[test]
    fn test_unknown_hazard_does_not_touch_state() {
        let registry = ModelRegistry::in_memory().with_overrides(small_forest());
        let dataset = synthetic::generate(HazardType::Flood, 100, 1).unwrap();
        registry.train(HazardType::Flood, &dataset).unwrap();
        let before = registry.metadata();

        let err = registry.train_named("tsunami", &dataset).unwrap_err();
        assert!(matches!(err, MlError::UnknownHazardType(ref name) if name == "tsunami"));
        let err = registry
            .predict_named("tsunami", &flood_features([1.0; 5]))
            .unwrap_err();
        assert!(matches!(err, MlError::UnknownHazardType(_)));

        assert_eq!(registry.metadata(), before);
        assert_eq!(registry.trained_hazards(), vec![HazardType::Flood]);
    }

    #[test]
    fn test_train_then_predict() {
        let registry = ModelRegistry::in_memory().with_overrides(small_forest());
        let dataset = synthetic::generate(HazardType::Flood, 200, 42).unwrap();

        let report = registry.train(HazardType::Flood, &dataset).unwrap();
        assert_eq!(report.tree_count, 8);
        assert_eq!(report.n_samples, 200);
        assert!(!report.persisted);
        assert!((0.0..=1.0).contains(&report.accuracy));

        let prediction = registry
            .predict_named("FLOOD", &flood_features([150.0, 10.0, 60.0, 25.0, 80.0]))
            .unwrap();
        assert_eq!(prediction.disaster_type, HazardType::Flood);
        assert!((0.0..=1.0).contains(&prediction.probability));
        assert_eq!(
            prediction.severity,
            SeverityBucketer::label(prediction.probability)
        );
    }

    #[test]
    fn test_dataset_for_other_hazard_rejected() {
        let registry = ModelRegistry::in_memory();
        let dataset = synthetic::generate(HazardType::Avalanche, 50, 3).unwrap();
        assert!(matches!(
            registry.train(HazardType::Earthquake, &dataset),
            Err(MlError::InvalidDataset { .. })
        ));
        assert!(registry.trained_hazards().is_empty());
    }

    #[test]
    fn test_wrong_feature_names_rejected() {
        let registry = ModelRegistry::in_memory().with_overrides(small_forest());
        let dataset = synthetic::generate(HazardType::Flood, 60, 5).unwrap();
        registry.train(HazardType::Flood, &dataset).unwrap();

        let mut features = flood_features([1.0; 5]);
        features.remove("humidity");
        assert!(matches!(
            registry.predict(HazardType::Flood, &features),
            Err(MlError::FeatureDimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_non_finite_features_rejected() {
        let registry = ModelRegistry::in_memory().with_overrides(small_forest());
        let dataset = synthetic::generate(HazardType::Flood, 100, 7).unwrap();
        registry.train(HazardType::Flood, &dataset).unwrap();

        let err = registry
            .predict(HazardType::Flood, &flood_features([f64::NAN; 5]))
            .unwrap_err();
        assert!(matches!(err, MlError::NonFiniteFeature { hazard: HazardType::Flood, .. }));
        assert_eq!(err.error_code(), "NON_FINITE_FEATURE");

        let err = registry
            .predict(
                HazardType::Flood,
                &flood_features([100.0, f64::INFINITY, 50.0, 20.0, 60.0]),
            )
            .unwrap_err();
        assert!(matches!(err, MlError::NonFiniteFeature { ref feature, .. } if feature == "river_level"));
    }

    #[test]
    fn test_retraining_is_deterministic() {
        let dataset = synthetic::generate(HazardType::Cloudburst, 150, 9).unwrap();
        let features: RawFeatures = [
            ("rainfall_rate", 120.0),
            ("duration", 30.0),
            ("cloud_water_content", 25.0),
            ("temp_diff", 8.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let a = ModelRegistry::in_memory().with_overrides(small_forest());
        let b = ModelRegistry::in_memory().with_overrides(small_forest());
        a.train(HazardType::Cloudburst, &dataset).unwrap();
        b.train(HazardType::Cloudburst, &dataset).unwrap();

        assert_eq!(
            a.predict(HazardType::Cloudburst, &features).unwrap(),
            b.predict(HazardType::Cloudburst, &features).unwrap()
        );
    }

    #[test]
    fn test_forest_config_applies_overrides() {
        let registry = ModelRegistry::in_memory().with_overrides(ForestOverrides {
            random_seed: Some(7),
            ..Default::default()
        });
        let config = registry.forest_config(HazardType::Flood);
        assert_eq!(config.tree_count, 100);
        assert_eq!(config.max_depth, Some(10));
        assert_eq!(config.random_seed, 7);
    }

    #[test]
    fn test_lazy_load_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path(), SnapshotFormat::Json);
        let dataset = synthetic::generate(HazardType::Avalanche, 120, 4).unwrap();
        let features: RawFeatures = [
            ("snow_depth", 200.0),
            ("slope_angle", 40.0),
            ("temperature", -5.0),
            ("wind_speed", 20.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let writer = ModelRegistry::with_store(store.clone()).with_overrides(small_forest());
        assert!(writer.train(HazardType::Avalanche, &dataset).unwrap().persisted);
        let expected = writer.predict(HazardType::Avalanche, &features).unwrap();

        let reader = ModelRegistry::with_store(store);
        assert!(!reader.is_trained(HazardType::Avalanche));
        assert_eq!(reader.predict(HazardType::Avalanche, &features).unwrap(), expected);
        assert!(reader.is_trained(HazardType::Avalanche));
    }

    #[test]
    fn test_concurrent_predicts_during_retrain() {
        let registry = Arc::new(ModelRegistry::in_memory().with_overrides(small_forest()));
        let first = synthetic::generate(HazardType::Flood, 150, 1).unwrap();
        let second = synthetic::generate(HazardType::Flood, 150, 2).unwrap();
        registry.train(HazardType::Flood, &first).unwrap();

        let readers: Vec<_> = (0..4)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let features = flood_features([10.0 * i as f64, 5.0, 50.0, 25.0, 70.0]);
                    for _ in 0..50 {
                        let result = registry.predict(HazardType::Flood, &features).unwrap();
                        assert!((0.0..=1.0).contains(&result.probability));
                        assert!(matches!(
                            result.severity,
                            RiskSeverity::Low
                                | RiskSeverity::Medium
                                | RiskSeverity::High
                                | RiskSeverity::Critical
                        ));
                    }
                })
            })
            .collect();

        registry.train(HazardType::Flood, &second).unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(registry.metadata()[0].n_training_samples, 150);
    }
}
