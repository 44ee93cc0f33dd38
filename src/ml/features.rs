use crate::ml::error::{MlError, MlResult};
use crate::ml::hazard::HazardType;
use crate::ml::models::{FeatureVector, TrainingDataset};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Standard deviations within a few ulps of the mean's magnitude count as zero
const DEGENERATE_STD_TOLERANCE: f64 = 10.0 * f64::EPSILON;

/// Per-feature standardization parameters for one hazard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    hazard: HazardType,

    /// Per-feature mean
    means: Vec<f64>,

    /// Per-feature population standard deviation
    std_devs: Vec<f64>,
}

impl ScalerState {
    /// Rebuild from persisted parameters
    pub fn from_parts(hazard: HazardType, means: Vec<f64>, std_devs: Vec<f64>) -> MlResult<Self> {
        let expected = hazard.n_features();
        if means.len() != expected || std_devs.len() != expected {
            return Err(MlError::CorruptSnapshot {
                hazard,
                reason: format!(
                    "scaler has {} means and {} std devs, schema has {} features",
                    means.len(),
                    std_devs.len(),
                    expected
                ),
            });
        }
        if let Some(idx) = std_devs.iter().position(|s| !s.is_finite() || *s <= 0.0) {
            return Err(MlError::CorruptSnapshot {
                hazard,
                reason: format!("scaler std dev for feature {} is not positive", idx),
            });
        }
        Ok(Self {
            hazard,
            means,
            std_devs,
        })
    }

    pub fn hazard(&self) -> HazardType {
        self.hazard
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn std_devs(&self) -> &[f64] {
        &self.std_devs
    }

    /// Standardize one feature vector
    pub fn transform(&self, vector: &FeatureVector) -> MlResult<FeatureVector> {
        if vector.hazard() != self.hazard || vector.len() != self.means.len() {
            return Err(MlError::FeatureDimensionMismatch {
                hazard: self.hazard,
                expected: self.means.len(),
                actual: vector.len(),
                detail: format!("vector built for '{}'", vector.hazard()),
            });
        }

        let scaled = vector
            .values()
            .iter()
            .zip(self.means.iter().zip(&self.std_devs))
            .map(|(x, (mean, std))| (x - mean) / std)
            .collect();

        FeatureVector::new(self.hazard, scaled)
    }

    /// Standardize every row of a feature matrix
    pub fn transform_matrix(&self, features: &Array2<f64>) -> MlResult<Array2<f64>> {
        if features.ncols() != self.means.len() {
            return Err(MlError::FeatureDimensionMismatch {
                hazard: self.hazard,
                expected: self.means.len(),
                actual: features.ncols(),
                detail: "matrix column count differs from scaler".to_string(),
            });
        }

        let mut scaled = features.clone();
        for mut row in scaled.rows_mut() {
            for (j, value) in row.iter_mut().enumerate() {
                *value = (*value - self.means[j]) / self.std_devs[j];
            }
        }
        Ok(scaled)
    }
}

/// Fits [`ScalerState`]s from training data
pub struct FeatureScaler;

impl FeatureScaler {
    /// Compute per-feature mean and population standard deviation.
    ///
    /// Fails on the first feature whose spread is numerically zero rather
    /// than producing an undefined scale.
    pub fn fit(dataset: &TrainingDataset) -> MlResult<ScalerState> {
        let hazard = dataset.hazard();
        let features = dataset.features();

        let means = features
            .mean_axis(Axis(0))
            .ok_or_else(|| MlError::InvalidDataset {
                hazard,
                reason: "cannot fit scaler on an empty dataset".to_string(),
            })?;
        let std_devs = features.std_axis(Axis(0), 0.0);

        for (idx, (mean, std)) in means.iter().zip(std_devs.iter()).enumerate() {
            if !(*std > DEGENERATE_STD_TOLERANCE * mean.abs().max(1.0)) {
                return Err(MlError::DegenerateFeature {
                    hazard,
                    feature: hazard.schema().features[idx].name.to_string(),
                });
            }
        }

        Ok(ScalerState {
            hazard,
            means: means.to_vec(),
            std_devs: std_devs.to_vec(),
        })
    }
}
