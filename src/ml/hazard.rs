//! Supported hazard types and their feature schemas.
//!
//! Feature order, label columns and synthetic-data ranges are table data so
//! they can be audited and tested without touching the training code.

use crate::ml::error::{MlError, MlResult};
use crate::ml::models::ForestConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Hazard category with its own feature schema and model
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum HazardType {
    Flood,
    Earthquake,
    Cloudburst,
    Avalanche,
}

impl HazardType {
    /// Parse a hazard name, trimming surrounding whitespace
    pub fn parse(name: &str) -> MlResult<Self> {
        HazardType::from_str(name.trim())
            .map_err(|_| MlError::UnknownHazardType(name.to_string()))
    }

    /// Schema row for this hazard
    pub fn schema(&self) -> &'static HazardSchema {
        match self {
            HazardType::Flood => &SCHEMAS[0],
            HazardType::Earthquake => &SCHEMAS[1],
            HazardType::Cloudburst => &SCHEMAS[2],
            HazardType::Avalanche => &SCHEMAS[3],
        }
    }

    /// Ordered feature column names
    pub fn feature_names(&self) -> Vec<&'static str> {
        self.schema().features.iter().map(|f| f.name).collect()
    }

    pub fn n_features(&self) -> usize {
        self.schema().features.len()
    }
}

/// One input column of a hazard schema
#[derive(Debug, Clone, Copy)]
pub struct FeatureSpec {
    pub name: &'static str,

    /// Uniform range used for synthetic sample data (low, high)
    pub sample_range: (f64, f64),
}

/// Table row describing how a hazard's data is laid out
#[derive(Debug)]
pub struct HazardSchema {
    pub hazard: HazardType,

    /// Feature columns in model order
    pub features: &'static [FeatureSpec],

    /// Binary occurrence column in tabular training data
    pub label_column: &'static str,

    /// Depth cap applied when no override is configured
    pub default_max_depth: Option<usize>,
}

impl HazardSchema {
    /// Forest settings used when the caller supplies none
    pub fn default_forest(&self) -> ForestConfig {
        ForestConfig {
            max_depth: self.default_max_depth,
            ..ForestConfig::default()
        }
    }

    pub fn position(&self, feature: &str) -> Option<usize> {
        self.features.iter().position(|f| f.name == feature)
    }
}

const fn feature(name: &'static str, low: f64, high: f64) -> FeatureSpec {
    FeatureSpec {
        name,
        sample_range: (low, high),
    }
}

static SCHEMAS: [HazardSchema; 4] = [
    HazardSchema {
        hazard: HazardType::Flood,
        features: &[
            feature("rainfall", 0.0, 300.0),
            feature("river_level", 0.0, 20.0),
            feature("soil_moisture", 10.0, 100.0),
            feature("temperature", 15.0, 40.0),
            feature("humidity", 40.0, 100.0),
        ],
        label_column: "flood_occurred",
        default_max_depth: Some(10),
    },
    HazardSchema {
        hazard: HazardType::Earthquake,
        features: &[
            feature("magnitude", 3.0, 9.0),
            feature("depth", 1.0, 70.0),
            feature("distance_from_fault", 0.0, 100.0),
            feature("peak_ground_accel", 0.01, 1.0),
        ],
        label_column: "quake_occurred",
        default_max_depth: None,
    },
    HazardSchema {
        hazard: HazardType::Cloudburst,
        // mm/hr, minutes, g/m3, deg C
        features: &[
            feature("rainfall_rate", 50.0, 200.0),
            feature("duration", 10.0, 60.0),
            feature("cloud_water_content", 10.0, 50.0),
            feature("temp_diff", 2.0, 15.0),
        ],
        label_column: "cloudburst_occurred",
        default_max_depth: None,
    },
    HazardSchema {
        hazard: HazardType::Avalanche,
        // cm, degrees, deg C, m/s
        features: &[
            feature("snow_depth", 50.0, 300.0),
            feature("slope_angle", 25.0, 50.0),
            feature("temperature", -15.0, 5.0),
            feature("wind_speed", 0.0, 30.0),
        ],
        label_column: "avalanche_occurred",
        default_max_depth: None,
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(HazardType::parse("flood").unwrap(), HazardType::Flood);
        assert_eq!(HazardType::parse("Earthquake").unwrap(), HazardType::Earthquake);
        assert_eq!(HazardType::parse(" AVALANCHE ").unwrap(), HazardType::Avalanche);
    }

    #[test]
    fn test_parse_unknown_hazard() {
        let err = HazardType::parse("tsunami").unwrap_err();
        assert!(matches!(err, MlError::UnknownHazardType(ref name) if name == "tsunami"));
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for hazard in HazardType::iter() {
            assert_eq!(HazardType::parse(&hazard.to_string()).unwrap(), hazard);
        }
    }

    #[test]
    fn test_schema_rows_match_their_hazard() {
        for hazard in HazardType::iter() {
            let schema = hazard.schema();
            assert_eq!(schema.hazard, hazard);
            assert!(schema.label_column.ends_with("_occurred"));
            for spec in schema.features {
                assert!(spec.sample_range.0 < spec.sample_range.1, "{}", spec.name);
            }
        }
    }

    #[test]
    fn test_flood_schema() {
        assert_eq!(
            HazardType::Flood.feature_names(),
            vec!["rainfall", "river_level", "soil_moisture", "temperature", "humidity"]
        );
        assert_eq!(HazardType::Flood.schema().default_forest().max_depth, Some(10));
        assert_eq!(HazardType::Earthquake.schema().default_forest().max_depth, None);
        assert_eq!(HazardType::Flood.schema().position("temperature"), Some(3));
    }
}
