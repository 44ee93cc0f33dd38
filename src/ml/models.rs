use crate::ml::error::{MlError, MlResult};
use crate::ml::hazard::HazardType;
use crate::ml::severity::RiskSeverity;
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Named raw observations as supplied by callers
pub type RawFeatures = HashMap<String, f64>;

/// Forest training configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Number of trees in the ensemble
    pub tree_count: usize,

    /// Maximum tree depth (unbounded when absent)
    pub max_depth: Option<usize>,

    /// Seed for bootstrap sampling and feature selection
    pub random_seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            tree_count: 100,
            max_depth: None,
            random_seed: 42,
        }
    }
}

impl ForestConfig {
    pub fn validate(&self) -> MlResult<()> {
        if self.tree_count == 0 {
            return Err(MlError::InvalidConfig(
                "tree_count must be at least 1".to_string(),
            ));
        }
        if self.max_depth == Some(0) {
            return Err(MlError::InvalidConfig(
                "max_depth must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Deployment-wide overrides applied on top of a hazard's default forest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestOverrides {
    pub tree_count: Option<usize>,

    /// Depth cap; unset keeps the hazard's default
    pub max_depth: Option<usize>,

    /// Grow trees without a depth cap, even where the hazard has one
    pub unbounded_depth: bool,

    pub random_seed: Option<u64>,
}

impl ForestOverrides {
    pub fn apply(&self, base: ForestConfig) -> ForestConfig {
        let max_depth = if self.unbounded_depth {
            None
        } else {
            self.max_depth.or(base.max_depth)
        };
        ForestConfig {
            tree_count: self.tree_count.unwrap_or(base.tree_count),
            max_depth,
            random_seed: self.random_seed.unwrap_or(base.random_seed),
        }
    }
}

/// Ordered feature values for one hazard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    hazard: HazardType,
    values: Vec<f64>,
}

impl FeatureVector {
    /// Build from values already in schema order
    pub fn new(hazard: HazardType, values: Vec<f64>) -> MlResult<Self> {
        let expected = hazard.n_features();
        if values.len() != expected {
            return Err(MlError::FeatureDimensionMismatch {
                hazard,
                expected,
                actual: values.len(),
                detail: "positional feature count differs from schema".to_string(),
            });
        }
        Self::ensure_finite(hazard, &values)?;
        Ok(Self { hazard, values })
    }

    /// Build from named fields; names must match the schema exactly
    pub fn from_named(hazard: HazardType, features: &RawFeatures) -> MlResult<Self> {
        let schema = hazard.schema();
        let expected = schema.features.len();

        let unknown: Vec<&str> = features
            .keys()
            .map(String::as_str)
            .filter(|name| schema.position(name).is_none())
            .collect();
        let missing: Vec<&str> = schema
            .features
            .iter()
            .map(|f| f.name)
            .filter(|name| !features.contains_key(*name))
            .collect();

        if !unknown.is_empty() || !missing.is_empty() {
            let mut unknown = unknown;
            unknown.sort_unstable();
            return Err(MlError::FeatureDimensionMismatch {
                hazard,
                expected,
                actual: features.len(),
                detail: format!("missing {:?}, unexpected {:?}", missing, unknown),
            });
        }

        let values: Vec<f64> = schema.features.iter().map(|f| features[f.name]).collect();
        Self::ensure_finite(hazard, &values)?;
        Ok(Self { hazard, values })
    }

    fn ensure_finite(hazard: HazardType, values: &[f64]) -> MlResult<()> {
        match values.iter().position(|v| !v.is_finite()) {
            Some(idx) => Err(MlError::NonFiniteFeature {
                hazard,
                feature: hazard.schema().features[idx].name.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn hazard(&self) -> HazardType {
        self.hazard
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Training dataset for one hazard
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    hazard: HazardType,

    /// Feature matrix (n_samples × n_features), schema column order
    features: Array2<f64>,

    /// Binary occurrence labels, one per row
    labels: Vec<u8>,
}

impl TrainingDataset {
    pub fn new(hazard: HazardType, features: Array2<f64>, labels: Vec<u8>) -> MlResult<Self> {
        let invalid = |reason: String| MlError::InvalidDataset { hazard, reason };

        let (n_samples, n_features) = features.dim();
        if n_features != hazard.n_features() {
            return Err(MlError::FeatureDimensionMismatch {
                hazard,
                expected: hazard.n_features(),
                actual: n_features,
                detail: "training matrix column count differs from schema".to_string(),
            });
        }
        if n_samples == 0 {
            return Err(invalid("dataset is empty".to_string()));
        }
        if labels.len() != n_samples {
            return Err(invalid(format!(
                "{} labels for {} samples",
                labels.len(),
                n_samples
            )));
        }
        if let Some(label) = labels.iter().find(|&&l| l > 1) {
            return Err(invalid(format!("label {} is not binary", label)));
        }
        if let Some(((row, col), _)) = features.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(invalid(format!(
                "non-finite value at row {} column '{}'",
                row,
                hazard.schema().features[col].name
            )));
        }

        Ok(Self {
            hazard,
            features,
            labels,
        })
    }

    /// Build from named tabular records carrying every feature column and
    /// the hazard's label column
    pub fn from_records(hazard: HazardType, records: &[RawFeatures]) -> MlResult<Self> {
        let schema = hazard.schema();
        let n_features = schema.features.len();
        let mut features = Array2::zeros((records.len(), n_features));
        let mut labels = Vec::with_capacity(records.len());

        for (row, record) in records.iter().enumerate() {
            for (col, spec) in schema.features.iter().enumerate() {
                let value = record.get(spec.name).ok_or_else(|| {
                    MlError::FeatureDimensionMismatch {
                        hazard,
                        expected: n_features,
                        actual: record.len().saturating_sub(1),
                        detail: format!("record {} is missing column '{}'", row, spec.name),
                    }
                })?;
                features[[row, col]] = *value;
            }

            let label = record
                .get(schema.label_column)
                .ok_or_else(|| MlError::InvalidDataset {
                    hazard,
                    reason: format!(
                        "record {} is missing label column '{}'",
                        row, schema.label_column
                    ),
                })?;
            labels.push(match *label {
                l if l == 0.0 => 0,
                l if l == 1.0 => 1,
                other => {
                    return Err(MlError::InvalidDataset {
                        hazard,
                        reason: format!("record {} has non-binary label {}", row, other),
                    })
                }
            });
        }

        Self::new(hazard, features, labels)
    }

    /// Read a JSON array of records
    pub fn from_json_file(hazard: HazardType, path: impl AsRef<Path>) -> MlResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| MlError::InvalidDataset {
            hazard,
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        let records: Vec<RawFeatures> =
            serde_json::from_slice(&bytes).map_err(|e| MlError::InvalidDataset {
                hazard,
                reason: format!("cannot parse {}: {}", path.display(), e),
            })?;
        Self::from_records(hazard, &records)
    }

    pub fn hazard(&self) -> HazardType {
        self.hazard
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Fraction of rows labelled as an occurrence
    pub fn positive_rate(&self) -> f64 {
        let positives = self.labels.iter().filter(|&&l| l == 1).count();
        positives as f64 / self.labels.len() as f64
    }
}

/// Risk prediction for one hazard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub disaster_type: HazardType,

    /// Class-1 probability (0.0 - 1.0)
    pub probability: f64,

    pub severity: RiskSeverity,
}

/// Model metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub hazard: HazardType,

    /// Training timestamp
    pub trained_at: DateTime<Utc>,

    /// Number of training samples
    pub n_training_samples: usize,

    /// Number of features
    pub n_features: usize,

    /// In-sample accuracy of the fitted ensemble
    pub training_accuracy: f64,

    /// Configuration the forest was trained with
    pub forest: ForestConfig,
}

/// Summary returned by a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub hazard: HazardType,
    pub accuracy: f64,
    pub n_samples: usize,
    pub tree_count: usize,

    /// Whether a snapshot was written
    pub persisted: bool,
}
