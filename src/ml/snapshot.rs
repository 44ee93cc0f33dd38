//! Versioned on-disk schema for trained hazard models.
//!
//! A snapshot holds the scaler parameters, every tree of the ensemble as a
//! flat node list, and the training configuration. `format_version` is the
//! first field in both encodings and is checked before the body is decoded.

use crate::ml::classifier::{DecisionTree, TrainedModel, TreeNode};
use crate::ml::error::{MlError, MlResult};
use crate::ml::features::ScalerState;
use crate::ml::hazard::HazardType;
use crate::ml::models::{ForestConfig, ModelMetadata};
use crate::ml::registry::HazardModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strum::{Display, EnumString};
use tracing::{debug, info};

/// Current snapshot layout version
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Snapshot file encoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SnapshotFormat {
    #[default]
    Json,
    Binary,
}

impl SnapshotFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SnapshotFormat::Json => "json",
            SnapshotFormat::Binary => "bin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    /// Must stay the first field
    pub format_version: u32,
    pub hazard: HazardType,
    pub feature_names: Vec<String>,
    pub scaler: ScalerSnapshot,
    pub forest: ForestSnapshot,
    pub config: ForestConfig,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerSnapshot {
    pub means: Vec<f64>,
    pub std_devs: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestSnapshot {
    pub tree_count: usize,
    pub trees: Vec<TreeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub trained_at: DateTime<Utc>,
    pub n_training_samples: usize,
    pub training_accuracy: f64,
}

impl ModelSnapshot {
    pub fn from_model(entry: &HazardModel) -> Self {
        let hazard = entry.model.hazard();
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            hazard,
            feature_names: hazard.feature_names().into_iter().map(String::from).collect(),
            scaler: ScalerSnapshot {
                means: entry.scaler.means().to_vec(),
                std_devs: entry.scaler.std_devs().to_vec(),
            },
            forest: ForestSnapshot {
                tree_count: entry.model.trees().len(),
                trees: entry
                    .model
                    .trees()
                    .iter()
                    .map(|tree| TreeSnapshot {
                        nodes: tree.nodes().to_vec(),
                    })
                    .collect(),
            },
            config: entry.model.config().clone(),
            metadata: SnapshotMetadata {
                trained_at: entry.metadata.trained_at,
                n_training_samples: entry.metadata.n_training_samples,
                training_accuracy: entry.metadata.training_accuracy,
            },
        }
    }

    /// Validate and rebuild the in-memory model
    pub fn into_model(self, expected: HazardType) -> MlResult<HazardModel> {
        let corrupt = |reason: String| MlError::CorruptSnapshot {
            hazard: expected,
            reason,
        };

        if self.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(MlError::IncompatibleSnapshotVersion {
                hazard: expected,
                found: self.format_version,
                expected: SNAPSHOT_FORMAT_VERSION,
            });
        }
        if self.hazard != expected {
            return Err(corrupt(format!("snapshot belongs to '{}'", self.hazard)));
        }
        let schema_names = expected.feature_names();
        if self.feature_names != schema_names {
            return Err(corrupt(format!(
                "feature columns {:?} differ from schema {:?}",
                self.feature_names, schema_names
            )));
        }
        if self.forest.tree_count != self.forest.trees.len() {
            return Err(corrupt(format!(
                "declares {} trees, holds {}",
                self.forest.tree_count,
                self.forest.trees.len()
            )));
        }

        let n_features = schema_names.len();
        let trees = self
            .forest
            .trees
            .into_iter()
            .enumerate()
            .map(|(idx, tree)| {
                DecisionTree::from_nodes(n_features, tree.nodes)
                    .map_err(|reason| corrupt(format!("tree {}: {}", idx, reason)))
            })
            .collect::<MlResult<Vec<_>>>()?;

        let scaler = ScalerState::from_parts(expected, self.scaler.means, self.scaler.std_devs)?;
        let model = TrainedModel::from_parts(expected, trees, self.config.clone())?;
        let metadata = ModelMetadata {
            hazard: expected,
            trained_at: self.metadata.trained_at,
            n_training_samples: self.metadata.n_training_samples,
            n_features,
            training_accuracy: self.metadata.training_accuracy,
            forest: self.config,
        };

        Ok(HazardModel {
            scaler,
            model,
            metadata,
        })
    }

    pub fn encode(&self, format: SnapshotFormat) -> MlResult<Vec<u8>> {
        let failed = |reason: String| MlError::Persistence {
            hazard: self.hazard,
            reason,
        };
        match format {
            SnapshotFormat::Json => serde_json::to_vec_pretty(self).map_err(|e| failed(e.to_string())),
            SnapshotFormat::Binary => bincode::serialize(self).map_err(|e| failed(e.to_string())),
        }
    }

    /// Decode a snapshot, rejecting other format versions before the body is read
    pub fn decode(hazard: HazardType, bytes: &[u8], format: SnapshotFormat) -> MlResult<Self> {
        let corrupt = |reason: String| MlError::CorruptSnapshot { hazard, reason };
        let check_version = |found: u32| {
            if found == SNAPSHOT_FORMAT_VERSION {
                Ok(())
            } else {
                Err(MlError::IncompatibleSnapshotVersion {
                    hazard,
                    found,
                    expected: SNAPSHOT_FORMAT_VERSION,
                })
            }
        };

        match format {
            SnapshotFormat::Json => {
                let value: serde_json::Value =
                    serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;
                let found = value
                    .get("format_version")
                    .and_then(serde_json::Value::as_u64)
                    .ok_or_else(|| corrupt("missing format_version".to_string()))?;
                check_version(u32::try_from(found).unwrap_or(u32::MAX))?;
                serde_json::from_value(value).map_err(|e| corrupt(e.to_string()))
            }
            SnapshotFormat::Binary => {
                // legacy bincode entry points tolerate trailing bytes
                let found: u32 = bincode::deserialize(bytes).map_err(|e| corrupt(e.to_string()))?;
                check_version(found)?;
                bincode::deserialize(bytes).map_err(|e| corrupt(e.to_string()))
            }
        }
    }
}

/// Directory of per-hazard snapshot files
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    format: SnapshotFormat,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, format: SnapshotFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> SnapshotFormat {
        self.format
    }

    /// `<dir>/<hazard>_model.<ext>`
    pub fn path_for(&self, hazard: HazardType) -> PathBuf {
        self.dir
            .join(format!("{}_model.{}", hazard, self.format.extension()))
    }

    /// Write through a temporary file so readers never see a partial snapshot
    pub fn save(&self, entry: &HazardModel) -> MlResult<PathBuf> {
        let hazard = entry.model.hazard();
        let failed = |reason: String| MlError::Persistence { hazard, reason };

        let bytes = ModelSnapshot::from_model(entry).encode(self.format)?;
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| failed(format!("cannot create {}: {}", self.dir.display(), e)))?;

        let path = self.path_for(hazard);
        let tmp = path.with_extension(format!("{}.tmp", self.format.extension()));
        std::fs::write(&tmp, &bytes)
            .map_err(|e| failed(format!("cannot write {}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| failed(format!("cannot replace {}: {}", path.display(), e)))?;

        info!(hazard = %hazard, path = %path.display(), bytes = bytes.len(), "Persisted model snapshot");
        Ok(path)
    }

    /// `Ok(None)` when no snapshot file exists
    pub fn load(&self, hazard: HazardType) -> MlResult<Option<HazardModel>> {
        let path = self.path_for(hazard);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(hazard = %hazard, path = %path.display(), "No snapshot on disk");
                return Ok(None);
            }
            Err(e) => {
                return Err(MlError::Persistence {
                    hazard,
                    reason: format!("cannot read {}: {}", path.display(), e),
                })
            }
        };

        let snapshot = ModelSnapshot::decode(hazard, &bytes, self.format)?;
        snapshot.into_model(hazard).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::synthetic;

    fn trained(hazard: HazardType) -> HazardModel {
        let dataset = synthetic::generate(hazard, 80, 11).unwrap();
        let config = ForestConfig {
            tree_count: 4,
            max_depth: Some(4),
            random_seed: 11,
        };
        HazardModel::fit(&dataset, &config).unwrap()
    }

    #[test]
    fn test_snapshot_carries_schema_fields() {
        let entry = trained(HazardType::Cloudburst);
        let snapshot = ModelSnapshot::from_model(&entry);

        assert_eq!(snapshot.format_version, SNAPSHOT_FORMAT_VERSION);
        assert_eq!(snapshot.forest.tree_count, 4);
        assert_eq!(snapshot.scaler.means.len(), 4);
        assert_eq!(snapshot.config.max_depth, Some(4));
        assert_eq!(snapshot.feature_names[0], "rainfall_rate");
    }

    #[test]
    fn test_json_and_binary_decode_to_same_model() {
        let entry = trained(HazardType::Flood);
        let snapshot = ModelSnapshot::from_model(&entry);

        for format in [SnapshotFormat::Json, SnapshotFormat::Binary] {
            let bytes = snapshot.encode(format).unwrap();
            let decoded = ModelSnapshot::decode(HazardType::Flood, &bytes, format).unwrap();
            let rebuilt = decoded.into_model(HazardType::Flood).unwrap();
            assert_eq!(rebuilt.model, entry.model);
            assert_eq!(rebuilt.scaler, entry.scaler);
        }
    }

    #[test]
    fn test_future_version_is_incompatible() {
        let mut snapshot = ModelSnapshot::from_model(&trained(HazardType::Avalanche));
        snapshot.format_version = 2;

        for format in [SnapshotFormat::Json, SnapshotFormat::Binary] {
            let bytes = snapshot.encode(format).unwrap();
            match ModelSnapshot::decode(HazardType::Avalanche, &bytes, format) {
                Err(MlError::IncompatibleSnapshotVersion {
                    hazard,
                    found,
                    expected,
                }) => {
                    assert_eq!(hazard, HazardType::Avalanche);
                    assert_eq!(found, 2);
                    assert_eq!(expected, SNAPSHOT_FORMAT_VERSION);
                }
                other => panic!("expected version error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_wrong_hazard_is_corrupt() {
        let snapshot = ModelSnapshot::from_model(&trained(HazardType::Earthquake));
        assert!(matches!(
            snapshot.into_model(HazardType::Flood),
            Err(MlError::CorruptSnapshot { .. })
        ));
    }

    #[test]
    fn test_tree_count_mismatch_is_corrupt() {
        let mut snapshot = ModelSnapshot::from_model(&trained(HazardType::Earthquake));
        snapshot.forest.tree_count = 10;
        assert!(matches!(
            snapshot.into_model(HazardType::Earthquake),
            Err(MlError::CorruptSnapshot { .. })
        ));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        assert!(matches!(
            ModelSnapshot::decode(HazardType::Flood, b"not json", SnapshotFormat::Json),
            Err(MlError::CorruptSnapshot { .. })
        ));
        assert!(matches!(
            ModelSnapshot::decode(HazardType::Flood, b"{}", SnapshotFormat::Json),
            Err(MlError::CorruptSnapshot { .. })
        ));
    }

    #[test]
    fn test_store_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path(), SnapshotFormat::Binary);
        let entry = trained(HazardType::Flood);

        assert!(store.load(HazardType::Flood).unwrap().is_none());

        let path = store.save(&entry).unwrap();
        assert_eq!(path, dir.path().join("flood_model.bin"));
        assert!(path.exists());

        let loaded = store.load(HazardType::Flood).unwrap().unwrap();
        assert_eq!(loaded.model, entry.model);
        assert_eq!(loaded.metadata.n_training_samples, 80);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("json".parse::<SnapshotFormat>().unwrap(), SnapshotFormat::Json);
        assert_eq!("BINARY".parse::<SnapshotFormat>().unwrap(), SnapshotFormat::Binary);
        assert_eq!(SnapshotFormat::Binary.extension(), "bin");
    }
}
