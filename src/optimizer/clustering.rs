//! Demand zone clustering.
//!
//! k-means with k-means++ seeding, run from several seeds; the restart with
//! the lowest inertia wins and ties go to the earliest restart.

use crate::optimizer::error::{OptimizerError, OptimizerResult};
use crate::optimizer::geometry::{ensure_finite, Coordinate};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// k-means parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Independent seeded runs per call
    pub restarts: usize,

    /// Lloyd iteration cap per run
    pub max_iterations: usize,

    pub seed: u64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            restarts: 10,
            max_iterations: 300,
            seed: 42,
        }
    }
}

impl ClusteringConfig {
    pub fn validate(&self) -> OptimizerResult<()> {
        if self.restarts == 0 {
            return Err(OptimizerError::InvalidConfig(
                "restarts must be at least 1".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(OptimizerError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Zone centers plus one zone index per input point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterResult {
    pub centroids: Vec<Coordinate>,

    /// `labels[i]` indexes into `centroids`
    pub labels: Vec<usize>,

    /// Sum of squared distances to assigned centroids
    pub inertia: f64,

    /// Lloyd iterations of the winning run
    pub iterations: usize,
}

impl ClusterResult {
    /// Number of points in each zone
    pub fn zone_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.centroids.len()];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }
}

/// Partitions incident coordinates into demand zones
#[derive(Debug, Clone, Default)]
pub struct DemandClusterer {
    config: ClusteringConfig,
}

impl DemandClusterer {
    pub fn new(config: ClusteringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    /// Cluster with the configured seed
    pub fn cluster(&self, points: &[Coordinate], k: usize) -> OptimizerResult<ClusterResult> {
        self.cluster_with_seed(points, k, self.config.seed)
    }

    pub fn cluster_with_seed(
        &self,
        points: &[Coordinate],
        k: usize,
        seed: u64,
    ) -> OptimizerResult<ClusterResult> {
        self.config.validate()?;
        if k == 0 || k > points.len() {
            return Err(OptimizerError::InvalidClusterCount {
                k,
                points: points.len(),
            });
        }
        ensure_finite(points, "incident")?;

        let runs: Vec<ClusterResult> = (0..self.config.restarts)
            .into_par_iter()
            .map(|restart| {
                let mut rng = StdRng::seed_from_u64(restart_seed(seed, restart));
                lloyd(points, k, self.config.max_iterations, &mut rng)
            })
            .collect();

        let mut runs = runs.into_iter();
        let mut best = runs.next().ok_or_else(|| {
            OptimizerError::InvalidConfig("restarts must be at least 1".to_string())
        })?;
        for run in runs {
            if run.inertia < best.inertia {
                best = run;
            }
        }

        debug!(
            k,
            points = points.len(),
            inertia = best.inertia,
            iterations = best.iterations,
            "Clustered demand zones"
        );
        Ok(best)
    }
}

fn restart_seed(seed: u64, restart: usize) -> u64 {
    let mut z = seed ^ (restart as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 33)).wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    z ^ (z >> 33)
}

/// k-means++ seeding: each further center is drawn with probability
/// proportional to its squared distance from the nearest chosen center
fn seed_centroids(points: &[Coordinate], k: usize, rng: &mut StdRng) -> Vec<Coordinate> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..points.len())]);

    let mut nearest: Vec<f64> = points
        .iter()
        .map(|p| p.squared_distance(&centroids[0]))
        .collect();
    while centroids.len() < k {
        let next = match WeightedIndex::new(&nearest) {
            Ok(weights) => weights.sample(rng),
            // every point coincides with a chosen center
            Err(_) => rng.gen_range(0..points.len()),
        };
        let center = points[next];
        for (d, p) in nearest.iter_mut().zip(points) {
            *d = d.min(p.squared_distance(&center));
        }
        centroids.push(center);
    }
    centroids
}

fn nearest_centroid(point: &Coordinate, centroids: &[Coordinate]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (idx, centroid) in centroids.iter().enumerate() {
        let d = point.squared_distance(centroid);
        if d < best_distance {
            best = idx;
            best_distance = d;
        }
    }
    best
}

/// Returns whether any label changed
fn assign_labels(points: &[Coordinate], centroids: &[Coordinate], labels: &mut [usize]) -> bool {
    let mut changed = false;
    for (label, point) in labels.iter_mut().zip(points) {
        let nearest = nearest_centroid(point, centroids);
        if *label != nearest {
            *label = nearest;
            changed = true;
        }
    }
    changed
}

/// Move centroids to the mean of their points. An empty zone takes over the
/// point farthest from its current centroid.
fn update_centroids(points: &[Coordinate], labels: &mut [usize], centroids: &mut [Coordinate]) {
    let k = centroids.len();
    let mut sums = vec![(0.0, 0.0); k];
    let mut counts = vec![0usize; k];
    for (point, &label) in points.iter().zip(labels.iter()) {
        sums[label].0 += point.lat;
        sums[label].1 += point.lng;
        counts[label] += 1;
    }

    for zone in 0..k {
        if counts[zone] > 0 {
            continue;
        }
        let donor = (0..points.len())
            .filter(|&i| counts[labels[i]] > 1)
            .max_by(|&a, &b| {
                let da = points[a].squared_distance(&centroids[labels[a]]);
                let db = points[b].squared_distance(&centroids[labels[b]]);
                da.total_cmp(&db)
            });
        if let Some(i) = donor {
            let old = labels[i];
            sums[old].0 -= points[i].lat;
            sums[old].1 -= points[i].lng;
            counts[old] -= 1;
            sums[zone] = (points[i].lat, points[i].lng);
            counts[zone] = 1;
            labels[i] = zone;
        }
    }

    for ((centroid, sum), count) in centroids.iter_mut().zip(&sums).zip(&counts) {
        if *count > 0 {
            let n = *count as f64;
            *centroid = Coordinate::new(sum.0 / n, sum.1 / n);
        }
    }
}

fn lloyd(points: &[Coordinate], k: usize, max_iterations: usize, rng: &mut StdRng) -> ClusterResult {
    let mut centroids = seed_centroids(points, k, rng);
    let mut labels = vec![usize::MAX; points.len()];

    let mut iterations = 0;
    while iterations < max_iterations {
        iterations += 1;
        if !assign_labels(points, &centroids, &mut labels) {
            break;
        }
        update_centroids(points, &mut labels, &mut centroids);
    }
    // labels must agree with the final centroids when the cap was hit
    assign_labels(points, &centroids, &mut labels);

    let inertia = points
        .iter()
        .zip(&labels)
        .map(|(p, &label)| p.squared_distance(&centroids[label]))
        .sum();

    ClusterResult {
        centroids,
        labels,
        inertia,
        iterations,
    }
}
