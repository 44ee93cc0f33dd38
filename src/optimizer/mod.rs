/// Response resource optimization
///
/// This module provides stateless planning primitives:
/// - Demand zone clustering (k-means with restarts)
/// - Optimal resource to demand assignment (Hungarian algorithm)
/// - A planner combining both for one incident snapshot

pub mod assignment;
pub mod clustering;
pub mod error;
pub mod geometry;
pub mod planner;

pub use assignment::{AssignmentResult, ResourceAssigner};
pub use clustering::{ClusterResult, ClusteringConfig, DemandClusterer};
pub use error::{OptimizerError, OptimizerResult};
pub use geometry::{distance_matrix, Coordinate};
pub use planner::{demo_scenario, ResponsePlan, ResponsePlanner};
