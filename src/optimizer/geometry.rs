use crate::optimizer::error::{OptimizerError, OptimizerResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Planar (lat, lng) position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    /// Euclidean distance treating degrees as planar units
    pub fn distance(&self, other: &Coordinate) -> f64 {
        (self.lat - other.lat).hypot(self.lng - other.lng)
    }

    pub fn squared_distance(&self, other: &Coordinate) -> f64 {
        let dlat = self.lat - other.lat;
        let dlng = self.lng - other.lng;
        dlat * dlat + dlng * dlng
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self { lat, lng }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

/// Parses `lat,lng`
impl FromStr for Coordinate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lng) = s
            .split_once(',')
            .ok_or_else(|| format!("expected 'lat,lng', got '{}'", s))?;
        let lat = lat
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("bad latitude '{}': {}", lat.trim(), e))?;
        let lng = lng
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("bad longitude '{}': {}", lng.trim(), e))?;
        Ok(Self { lat, lng })
    }
}

/// Reject NaN/infinite coordinates, reporting the first offender
pub fn ensure_finite(points: &[Coordinate], role: &'static str) -> OptimizerResult<()> {
    match points.iter().position(|p| !p.is_finite()) {
        Some(index) => Err(OptimizerError::NonFiniteCoordinate { role, index }),
        None => Ok(()),
    }
}

/// `cost[[i, j]]` is the distance from `from[i]` to `to[j]`
pub fn distance_matrix(from: &[Coordinate], to: &[Coordinate]) -> Array2<f64> {
    Array2::from_shape_fn((from.len(), to.len()), |(i, j)| from[i].distance(&to[j]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_distance() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(3.0, 4.0);
        assert_relative_eq!(a.distance(&b), 5.0);
        assert_relative_eq!(a.squared_distance(&b), 25.0);
        assert_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn test_parse() {
        let c: Coordinate = "28.61, 77.2".parse().unwrap();
        assert_eq!(c, Coordinate::new(28.61, 77.2));
        assert!("28.61".parse::<Coordinate>().is_err());
        assert!("north,77".parse::<Coordinate>().is_err());
    }

    #[test]
    fn test_distance_matrix_shape() {
        let from = [Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 0.0)];
        let to = [
            Coordinate::new(0.0, 1.0),
            Coordinate::new(0.0, 2.0),
            Coordinate::new(1.0, 1.0),
        ];
        let matrix = distance_matrix(&from, &to);
        assert_eq!(matrix.dim(), (2, 3));
        assert_relative_eq!(matrix[[1, 2]], 1.0);
        assert_relative_eq!(matrix[[0, 1]], 2.0);
    }

    #[test]
    fn test_ensure_finite() {
        let points = [Coordinate::new(0.0, 0.0), Coordinate::new(f64::NAN, 1.0)];
        assert_eq!(
            ensure_finite(&points, "incident"),
            Err(OptimizerError::NonFiniteCoordinate {
                role: "incident",
                index: 1
            })
        );
        assert!(ensure_finite(&points[..1], "incident").is_ok());
    }
}
