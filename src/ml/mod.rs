/// Hazard risk prediction
///
/// This module provides per-hazard risk scoring:
/// - Hazard schemas (feature columns, label columns, default forests)
/// - Feature standardization
/// - Random forest training and probability estimation
/// - Probability to severity bucketing
/// - A model registry with versioned on-disk snapshots

pub mod classifier;
pub mod error;
pub mod features;
pub mod hazard;
pub mod models;
pub mod registry;
pub mod severity;
pub mod snapshot;
pub mod synthetic;

pub use classifier::{Classifier, DecisionTree, HazardClassifier, TrainedModel, TreeNode};
pub use error::{MlError, MlResult};
pub use features::{FeatureScaler, ScalerState};
pub use hazard::{FeatureSpec, HazardSchema, HazardType};
pub use models::{
    FeatureVector, ForestConfig, ForestOverrides, ModelMetadata, PredictionResult, RawFeatures,
    TrainingDataset, TrainingReport,
};
pub use registry::{HazardModel, LoadOutcome, ModelRegistry};
pub use severity::{RiskSeverity, SeverityBucketer, SEVERITY_THRESHOLDS};
pub use snapshot::{ModelSnapshot, SnapshotFormat, SnapshotStore, SNAPSHOT_FORMAT_VERSION};
