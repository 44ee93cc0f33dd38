use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use disaster_response_core::config::Config;
use disaster_response_core::ml::{
    synthetic, HazardType, LoadOutcome, ModelRegistry, RawFeatures, TrainingDataset,
};
use disaster_response_core::optimizer::{
    demo_scenario, Coordinate, DemandClusterer, ResourceAssigner, ResponsePlanner,
};
use disaster_response_core::{telemetry, AppError};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "disaster-cli")]
#[command(about = "Disaster risk prediction and response planning", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file layered over the built-in defaults
    /// (falls back to $CONFIG_PATH, then config/default.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Snapshot directory (overrides ml.model_dir)
    #[arg(short, long)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a hazard model and persist its snapshot
    Train {
        #[arg(value_name = "HAZARD")]
        hazard: String,

        /// JSON array of records with every feature column and the label column
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Synthetic sample count when no data file is given
        #[arg(short = 'n', long, default_value_t = synthetic::DEFAULT_SAMPLES)]
        samples: usize,

        /// Seed for synthetic data
        #[arg(long, default_value_t = 42)]
        data_seed: u64,

        /// Tree count override
        #[arg(short, long)]
        trees: Option<usize>,
    },

    /// Predict risk from named features
    Predict {
        #[arg(value_name = "HAZARD")]
        hazard: String,

        /// Feature value as NAME=VALUE (repeatable)
        #[arg(short, long = "feature", value_parser = parse_feature, allow_hyphen_values = true)]
        features: Vec<(String, f64)>,
    },

    /// List trained models
    Models,

    /// Group incident coordinates into demand zones
    Cluster {
        /// Number of zones
        #[arg(short = 'k', long)]
        zones: usize,

        /// JSON array of {"lat", "lng"} objects
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Incident as LAT,LNG (repeatable)
        #[arg(short, long = "point", allow_hyphen_values = true)]
        points: Vec<Coordinate>,

        /// Seed override
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Optimally assign resources to demand sites
    Assign {
        /// JSON array of resource coordinates
        #[arg(long)]
        resources_file: Option<PathBuf>,

        /// JSON array of demand coordinates
        #[arg(long)]
        demands_file: Option<PathBuf>,

        /// Resource as LAT,LNG (repeatable)
        #[arg(short, long = "resource", allow_hyphen_values = true)]
        resources: Vec<Coordinate>,

        /// Demand site as LAT,LNG (repeatable)
        #[arg(short, long = "demand", allow_hyphen_values = true)]
        demands: Vec<Coordinate>,
    },

    /// Plan a seeded demo scenario
    Simulate {
        #[arg(long, default_value_t = 8)]
        incidents: usize,

        #[arg(long, default_value_t = 8)]
        resources: usize,

        #[arg(short = 'k', long, default_value_t = 3)]
        zones: usize,

        #[arg(short, long, default_value_t = 0)]
        seed: u64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config.as_deref() {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;
    if let Some(dir) = cli.model_dir {
        config.ml.model_dir = dir;
    }
    telemetry::init_tracing(&config.observability)?;

    match cli.command {
        Commands::Train {
            hazard,
            data,
            samples,
            data_seed,
            trees,
        } => {
            let hazard = HazardType::parse(&hazard)?;
            if trees.is_some() {
                config.ml.forest.tree_count = trees;
                config.validate()?;
            }
            let dataset = match data {
                Some(path) => TrainingDataset::from_json_file(hazard, &path)?,
                None => {
                    info!(hazard = %hazard, samples, seed = data_seed, "Generating synthetic training data");
                    synthetic::generate(hazard, samples, data_seed)?
                }
            };

            let registry = registry(&config, false);
            let report = registry.train(hazard, &dataset)?;
            print_json(&report)?;
        }

        Commands::Predict { hazard, features } => {
            let features: RawFeatures = features.into_iter().collect();
            let registry = registry(&config, false);
            let prediction = registry.predict_named(&hazard, &features)?;
            print_json(&prediction)?;
        }

        Commands::Models => {
            let registry = registry(&config, true);
            print_json(&registry.metadata())?;
        }

        Commands::Cluster {
            zones,
            file,
            points,
            seed,
        } => {
            let points = coordinates(file.as_deref(), points)?;
            let clusterer = DemandClusterer::new(config.optimizer.clustering());
            let seed = seed.unwrap_or(config.optimizer.seed);
            let result = clusterer.cluster_with_seed(&points, zones, seed)?;
            print_json(&result)?;
        }

        Commands::Assign {
            resources_file,
            demands_file,
            resources,
            demands,
        } => {
            let resources = coordinates(resources_file.as_deref(), resources)?;
            let demands = coordinates(demands_file.as_deref(), demands)?;
            if resources.is_empty() || demands.is_empty() {
                bail!("assign needs at least one resource and one demand site");
            }
            let result = ResourceAssigner::assign(&resources, &demands)?;
            print_json(&result)?;
        }

        Commands::Simulate {
            incidents,
            resources,
            zones,
            seed,
        } => {
            let (incident_coords, resource_coords) = demo_scenario(incidents, resources, seed);
            let planner = ResponsePlanner::new(config.optimizer.clustering());
            let plan = planner.plan(&resource_coords, &incident_coords, zones)?;
            print_json(&json!({
                "incidents": incident_coords,
                "resources": resource_coords,
                "plan": plan,
            }))?;
        }
    }

    Ok(())
}

/// Registry from config; `load_all` eagerly reads every snapshot, otherwise
/// snapshots load on first use
fn registry(config: &Config, load_all: bool) -> ModelRegistry {
    let mut ml = config.ml.clone();
    ml.load_on_startup = false;
    let registry = ml.registry();
    if load_all {
        for (hazard, outcome) in registry.load_all() {
            if let LoadOutcome::Failed(e) = outcome {
                eprintln!("{}: {} [{}]", hazard, e, e.error_code());
            }
        }
    }
    registry
}

fn parse_feature(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("bad value for '{}': {}", name, e))?;
    Ok((name.trim().to_string(), value))
}

/// Inline points, or the contents of a JSON file when one is given
fn coordinates(
    file: Option<&Path>,
    inline: Vec<Coordinate>,
) -> disaster_response_core::Result<Vec<Coordinate>> {
    match file {
        Some(path) if !inline.is_empty() => Err(AppError::Validation(format!(
            "give either {} or inline points, not both",
            path.display()
        ))),
        Some(path) => {
            let bytes = std::fs::read(path)?;
            Ok(serde_json::from_slice(&bytes)?)
        }
        None => Ok(inline),
    }
}

fn print_json<T: Serialize>(value: &T) -> disaster_response_core::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
