use crate::optimizer::assignment::{AssignmentResult, ResourceAssigner};
use crate::optimizer::clustering::{ClusterResult, ClusteringConfig, DemandClusterer};
use crate::optimizer::error::OptimizerResult;
use crate::optimizer::geometry::Coordinate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Latitude span of the demo scenario
pub const DEMO_LAT_RANGE: (f64, f64) = (28.5, 28.8);

/// Longitude span of the demo scenario
pub const DEMO_LNG_RANGE: (f64, f64) = (77.0, 77.5);

/// Demand zones plus the resource dispatch for one set of incidents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePlan {
    pub zones: ClusterResult,
    pub assignment: AssignmentResult,
    pub total_cost: f64,
    pub unassigned_resources: Vec<usize>,
    pub uncovered_incidents: Vec<usize>,
}

/// Clusters incidents into zones and dispatches resources to incidents
#[derive(Debug, Clone, Default)]
pub struct ResponsePlanner {
    clusterer: DemandClusterer,
}

impl ResponsePlanner {
    pub fn new(config: ClusteringConfig) -> Self {
        Self {
            clusterer: DemandClusterer::new(config),
        }
    }

    pub fn plan(
        &self,
        resources: &[Coordinate],
        incidents: &[Coordinate],
        zone_count: usize,
    ) -> OptimizerResult<ResponsePlan> {
        let zones = self.clusterer.cluster(incidents, zone_count)?;
        let assignment = ResourceAssigner::assign(resources, incidents)?;

        let plan = ResponsePlan {
            total_cost: assignment.total_cost,
            unassigned_resources: assignment.unassigned_resources(resources.len()),
            uncovered_incidents: assignment.uncovered_demands(incidents.len()),
            zones,
            assignment,
        };

        info!(
            incidents = incidents.len(),
            resources = resources.len(),
            zones = zone_count,
            total_cost = plan.total_cost,
            uncovered = plan.uncovered_incidents.len(),
            "Response plan ready"
        );
        Ok(plan)
    }
}

/// Seeded incident and resource positions inside the demo bounding box
pub fn demo_scenario(incidents: usize, resources: usize, seed: u64) -> (Vec<Coordinate>, Vec<Coordinate>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut draw = |n: usize| -> Vec<Coordinate> {
        (0..n)
            .map(|_| {
                Coordinate::new(
                    rng.gen_range(DEMO_LAT_RANGE.0..DEMO_LAT_RANGE.1),
                    rng.gen_range(DEMO_LNG_RANGE.0..DEMO_LNG_RANGE.1),
                )
            })
            .collect()
    };
    let incident_coords = draw(incidents);
    let resource_coords = draw(resources);
    (incident_coords, resource_coords)
}
