//! Probability to severity bucketing.
//!
//! One shared policy for every hazard type. Thresholds are strict lower
//! bounds checked from the highest bucket down.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Ordered risk label
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// (exclusive lower bound, label), highest first
pub const SEVERITY_THRESHOLDS: [(f64, RiskSeverity); 3] = [
    (0.8, RiskSeverity::Critical),
    (0.6, RiskSeverity::High),
    (0.3, RiskSeverity::Medium),
];

/// Stateless severity policy
pub struct SeverityBucketer;

impl SeverityBucketer {
    /// Map a probability to its severity bucket. Total: anything not above
    /// the lowest threshold (including NaN) is `Low`.
    pub fn label(probability: f64) -> RiskSeverity {
        SEVERITY_THRESHOLDS
            .iter()
            .find(|(bound, _)| probability > *bound)
            .map(|(_, severity)| *severity)
            .unwrap_or(RiskSeverity::Low)
    }
}
