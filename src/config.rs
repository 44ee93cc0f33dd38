use crate::error::{AppError, Result};
use crate::ml::{ForestOverrides, ModelRegistry, SnapshotFormat, SnapshotStore};
use crate::optimizer::ClusteringConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Embedded defaults, also the base layer of [`Config::load`]
const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Hazard model configuration
    #[serde(default)]
    pub ml: MlConfig,

    /// Clustering configuration
    #[serde(default)]
    pub optimizer: OptimizerConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/default.toml".to_string());
        Self::load_from(&config_path)
    }

    /// Load with an explicit optional config file
    pub fn load_from(config_path: &str) -> Result<Self> {
        let config: Config = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            // Override with config file if it exists
            .add_source(config::File::with_name(config_path).required(false))
            // Override with environment variables (prefix: DRC_)
            .add_source(
                config::Environment::with_prefix("DRC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ml.forest.tree_count == Some(0) {
            return Err(AppError::Configuration(
                "ml.forest.tree_count must be at least 1".to_string(),
            ));
        }
        if self.ml.forest.unbounded_depth && self.ml.forest.max_depth.is_some() {
            return Err(AppError::Configuration(
                "ml.forest.max_depth and ml.forest.unbounded_depth are mutually exclusive"
                    .to_string(),
            ));
        }
        if self.ml.forest.max_depth == Some(0) {
            return Err(AppError::Configuration(
                "ml.forest.max_depth must be at least 1".to_string(),
            ));
        }
        if self.optimizer.restarts == 0 {
            return Err(AppError::Configuration(
                "optimizer.restarts must be at least 1".to_string(),
            ));
        }
        if self.optimizer.max_iterations == 0 {
            return Err(AppError::Configuration(
                "optimizer.max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlConfig {
    /// Directory holding `<hazard>_model.<ext>` snapshots
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Snapshot encoding
    #[serde(default)]
    pub snapshot_format: SnapshotFormat,

    /// Write snapshots after training
    #[serde(default = "default_true")]
    pub persist: bool,

    /// Load every available snapshot at startup
    #[serde(default = "default_true")]
    pub load_on_startup: bool,

    /// Overrides applied to every hazard's default forest
    #[serde(default)]
    pub forest: ForestOverrides,
}

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            snapshot_format: SnapshotFormat::default(),
            persist: true,
            load_on_startup: true,
            forest: ForestOverrides::default(),
        }
    }
}

impl MlConfig {
    /// Build the registry described by this section
    pub fn registry(&self) -> ModelRegistry {
        let registry = if self.persist {
            ModelRegistry::with_store(SnapshotStore::new(&self.model_dir, self.snapshot_format))
        } else {
            ModelRegistry::in_memory()
        };
        let registry = registry.with_overrides(self.forest.clone());
        if self.persist && self.load_on_startup {
            registry.load_all();
        }
        registry
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// k-means restarts per clustering call
    #[serde(default = "default_restarts")]
    pub restarts: usize,

    /// Iteration cap per restart
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Seed for centroid initialization
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            restarts: default_restarts(),
            max_iterations: default_max_iterations(),
            seed: default_seed(),
        }
    }
}

impl OptimizerConfig {
    pub fn clustering(&self) -> ClusteringConfig {
        ClusteringConfig {
            restarts: self.restarts,
            max_iterations: self.max_iterations,
            seed: self.seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_restarts() -> usize {
    10
}

fn default_max_iterations() -> usize {
    300
}

fn default_seed() -> u64 {
    42
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
