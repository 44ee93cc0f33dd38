//! Error types for hazard model training, inference and persistence

use crate::ml::hazard::HazardType;

/// Result type for ML operations
pub type MlResult<T> = std::result::Result<T, MlError>;

/// Errors raised by the prediction pipeline.
///
/// Every variant is deterministic given its input; none is worth retrying.
#[derive(Debug, thiserror::Error)]
pub enum MlError {
    /// Hazard name outside the supported set
    #[error("Unknown hazard type: {0}")]
    UnknownHazardType(String),

    /// No trained entry and no loadable snapshot
    #[error("No trained model for hazard '{0}'")]
    ModelNotTrained(HazardType),

    /// Feature count or names do not match the hazard schema
    #[error("Feature dimension mismatch for '{hazard}': expected {expected}, got {actual} ({detail})")]
    FeatureDimensionMismatch {
        hazard: HazardType,
        expected: usize,
        actual: usize,
        detail: String,
    },

    /// NaN or infinite value supplied for prediction
    #[error("Non-finite value for feature '{feature}' of '{hazard}'")]
    NonFiniteFeature { hazard: HazardType, feature: String },

    /// Zero-variance feature in a training set
    #[error("Degenerate feature '{feature}' for '{hazard}': standard deviation is zero")]
    DegenerateFeature { hazard: HazardType, feature: String },

    /// Snapshot written by an incompatible format version
    #[error("Incompatible snapshot version for '{hazard}': found {found}, expected {expected}")]
    IncompatibleSnapshotVersion {
        hazard: HazardType,
        found: u32,
        expected: u32,
    },

    /// Snapshot decoded but structurally invalid
    #[error("Corrupt snapshot for '{hazard}': {reason}")]
    CorruptSnapshot { hazard: HazardType, reason: String },

    /// Training data rejected before fitting
    #[error("Invalid dataset for '{hazard}': {reason}")]
    InvalidDataset { hazard: HazardType, reason: String },

    /// Forest configuration out of range
    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),

    /// Snapshot could not be read or written
    #[error("Snapshot persistence failed for '{hazard}': {reason}")]
    Persistence { hazard: HazardType, reason: String },
}

impl MlError {
    /// Stable machine-readable code
    pub fn error_code(&self) -> &'static str {
        match self {
            MlError::UnknownHazardType(_) => "UNKNOWN_HAZARD_TYPE",
            MlError::ModelNotTrained(_) => "MODEL_NOT_TRAINED",
            MlError::FeatureDimensionMismatch { .. } => "FEATURE_DIMENSION_MISMATCH",
            MlError::NonFiniteFeature { .. } => "NON_FINITE_FEATURE",
            MlError::DegenerateFeature { .. } => "DEGENERATE_FEATURE",
            MlError::IncompatibleSnapshotVersion { .. } => "INCOMPATIBLE_SNAPSHOT_VERSION",
            MlError::CorruptSnapshot { .. } => "CORRUPT_SNAPSHOT",
            MlError::InvalidDataset { .. } => "INVALID_DATASET",
            MlError::InvalidConfig(_) => "INVALID_MODEL_CONFIG",
            MlError::Persistence { .. } => "SNAPSHOT_PERSISTENCE",
        }
    }

    /// Hazard the failure refers to, when one is known
    pub fn hazard(&self) -> Option<HazardType> {
        match self {
            MlError::UnknownHazardType(_) | MlError::InvalidConfig(_) => None,
            MlError::ModelNotTrained(hazard) => Some(*hazard),
            MlError::FeatureDimensionMismatch { hazard, .. }
            | MlError::NonFiniteFeature { hazard, .. }
            | MlError::DegenerateFeature { hazard, .. }
            | MlError::IncompatibleSnapshotVersion { hazard, .. }
            | MlError::CorruptSnapshot { hazard, .. }
            | MlError::InvalidDataset { hazard, .. }
            | MlError::Persistence { hazard, .. } => Some(*hazard),
        }
    }
}
