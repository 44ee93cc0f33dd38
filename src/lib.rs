//! Analytical core for disaster response.
//!
//! Two independent halves:
//!
//! - [`ml`]: per-hazard risk prediction. Raw observations are standardized,
//!   scored by a bootstrap-aggregated decision-tree ensemble and bucketed
//!   into a severity label. Trained models live in a [`ml::ModelRegistry`]
//!   and are persisted as versioned snapshots.
//! - [`optimizer`]: response planning. Incident coordinates are grouped into
//!   demand zones with k-means, and resources are matched to demand sites
//!   with the Hungarian algorithm.
//!
//! # Example
//!
//! ```no_run
//! use disaster_response_core::ml::{synthetic, HazardType, ModelRegistry, RawFeatures};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ModelRegistry::in_memory();
//!     let dataset = synthetic::generate(HazardType::Flood, 1000, 42)?;
//!     let report = registry.train(HazardType::Flood, &dataset)?;
//!     println!("flood accuracy: {:.3}", report.accuracy);
//!
//!     let features: RawFeatures = [
//!         ("rainfall", 120.0),
//!         ("river_level", 12.0),
//!         ("soil_moisture", 80.0),
//!         ("temperature", 28.0),
//!         ("humidity", 90.0),
//!     ]
//!     .into_iter()
//!     .map(|(name, value)| (name.to_string(), value))
//!     .collect();
//!
//!     let prediction = registry.predict_named("flood", &features)?;
//!     println!("{} -> {}", prediction.probability, prediction.severity);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod ml;
pub mod optimizer;
pub mod telemetry;

pub use error::{AppError, Result};
