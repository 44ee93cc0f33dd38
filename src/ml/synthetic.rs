//! Seeded sample data for demos, benchmarks and tests.

use crate::ml::error::MlResult;
use crate::ml::hazard::HazardType;
use crate::ml::models::TrainingDataset;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Sample count used by the CLI when no dataset file is given
pub const DEFAULT_SAMPLES: usize = 1000;

/// Draw `n_samples` rows uniformly over the hazard's sample ranges with
/// random binary labels.
pub fn generate(hazard: HazardType, n_samples: usize, seed: u64) -> MlResult<TrainingDataset> {
    let schema = hazard.schema();
    let mut rng = StdRng::seed_from_u64(seed);

    let mut features = Array2::zeros((n_samples, schema.features.len()));
    let mut labels = Vec::with_capacity(n_samples);
    for mut row in features.rows_mut() {
        for (value, spec) in row.iter_mut().zip(schema.features) {
            let (low, high) = spec.sample_range;
            *value = rng.gen_range(low..high);
        }
        labels.push(rng.gen_range(0..=1u8));
    }

    TrainingDataset::new(hazard, features, labels)
}
