//! Error types for clustering and assignment

/// Result type for optimizer operations
pub type OptimizerResult<T> = std::result::Result<T, OptimizerError>;

/// Errors that can occur while planning a response
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OptimizerError {
    /// Zone count outside `1..=points`
    #[error("Invalid cluster count: k={k} for {points} points")]
    InvalidClusterCount { k: usize, points: usize },

    /// NaN or infinite latitude/longitude
    #[error("Non-finite {role} coordinate at index {index}")]
    NonFiniteCoordinate { role: &'static str, index: usize },

    /// Distance that overflowed to infinity or NaN
    #[error("Non-finite cost between resource {resource} and demand {demand}")]
    NonFiniteCost { resource: usize, demand: usize },

    /// Potentials or the summed cost left the finite range during a solve
    #[error("Assignment cost overflow")]
    CostOverflow,

    /// Clustering parameters out of range
    #[error("Invalid optimizer configuration: {0}")]
    InvalidConfig(String),
}

impl OptimizerError {
    pub fn error_code(&self) -> &'static str {
        match self {
            OptimizerError::InvalidClusterCount { .. } => "INVALID_CLUSTER_COUNT",
            OptimizerError::NonFiniteCoordinate { .. } => "NON_FINITE_COORDINATE",
            OptimizerError::NonFiniteCost { .. } => "NON_FINITE_COST",
            OptimizerError::CostOverflow => "COST_OVERFLOW",
            OptimizerError::InvalidConfig(_) => "INVALID_OPTIMIZER_CONFIG",
        }
    }
}
