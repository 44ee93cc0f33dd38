use crate::ml::error::{MlError, MlResult};
use crate::ml::hazard::HazardType;
use crate::ml::models::{FeatureVector, ForestConfig, TrainingDataset};
use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Nodes smaller than this are never split
const MIN_SAMPLES_SPLIT: usize = 2;

/// Trait for binary classifiers over scaled feature rows
pub trait Classifier: Send + Sync {
    /// Probability of the positive class
    fn predict_proba(&self, row: ArrayView1<'_, f64>) -> f64;

    /// Number of features a row must carry
    fn n_features(&self) -> usize;

    /// Hard class label; ties resolve to the negative class
    fn predict(&self, row: ArrayView1<'_, f64>) -> u8 {
        u8::from(self.predict_proba(row) > 0.5)
    }
}

/// One node of a flattened decision tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    /// Rows with `row[feature] <= threshold` go left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },

    /// Class counts `[negative, positive]` of the bootstrap rows reaching this leaf
    Leaf { votes: [u32; 2] },
}

/// Binary decision tree stored as a node arena, root at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    n_features: usize,
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Rebuild from persisted nodes, checking the arena is a well-formed tree
    pub fn from_nodes(n_features: usize, nodes: Vec<TreeNode>) -> Result<Self, String> {
        if nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (idx, node) in nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } = node
            {
                if *feature >= n_features {
                    return Err(format!("node {} splits on unknown feature {}", idx, feature));
                }
                if !threshold.is_finite() {
                    return Err(format!("node {} has a non-finite threshold", idx));
                }
                // children always follow their parent, which rules out cycles
                for child in [left, right] {
                    if *child <= idx || *child >= nodes.len() {
                        return Err(format!("node {} has invalid child {}", idx, child));
                    }
                }
            }
        }
        Ok(Self { n_features, nodes })
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    /// Longest root-to-leaf path, counted in edges
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, depth)) = stack.pop() {
            match &self.nodes[idx] {
                TreeNode::Split { left, right, .. } => {
                    stack.push((*left, depth + 1));
                    stack.push((*right, depth + 1));
                }
                TreeNode::Leaf { .. } => max_depth = max_depth.max(depth),
            }
        }
        max_depth
    }

    fn leaf_votes(&self, row: ArrayView1<'_, f64>) -> [u32; 2] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
                TreeNode::Leaf { votes } => return *votes,
            }
        }
    }
}

impl Classifier for DecisionTree {
    fn predict_proba(&self, row: ArrayView1<'_, f64>) -> f64 {
        if self.predict(row) == 1 {
            1.0
        } else {
            0.0
        }
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, row: ArrayView1<'_, f64>) -> u8 {
        let [negative, positive] = self.leaf_votes(row);
        u8::from(positive > negative)
    }
}

/// Fitted bagged ensemble for one hazard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    hazard: HazardType,
    n_features: usize,
    trees: Vec<DecisionTree>,
    config: ForestConfig,
}

impl TrainedModel {
    /// Rebuild from persisted trees
    pub fn from_parts(
        hazard: HazardType,
        trees: Vec<DecisionTree>,
        config: ForestConfig,
    ) -> MlResult<Self> {
        let corrupt = |reason: String| MlError::CorruptSnapshot { hazard, reason };

        config
            .validate()
            .map_err(|e| corrupt(format!("stored config is invalid: {}", e)))?;
        if trees.len() != config.tree_count {
            return Err(corrupt(format!(
                "config declares {} trees, snapshot holds {}",
                config.tree_count,
                trees.len()
            )));
        }
        let n_features = hazard.n_features();
        if let Some(tree) = trees.iter().find(|t| t.n_features != n_features) {
            return Err(corrupt(format!(
                "tree expects {} features, schema has {}",
                tree.n_features, n_features
            )));
        }

        Ok(Self {
            hazard,
            n_features,
            trees,
            config,
        })
    }

    pub fn hazard(&self) -> HazardType {
        self.hazard
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Fraction of trees voting for an occurrence
    pub fn predict_vector(&self, scaled: &FeatureVector) -> MlResult<f64> {
        if scaled.hazard() != self.hazard || scaled.len() != self.n_features {
            return Err(MlError::FeatureDimensionMismatch {
                hazard: self.hazard,
                expected: self.n_features,
                actual: scaled.len(),
                detail: format!("vector built for '{}'", scaled.hazard()),
            });
        }
        Ok(self.predict_proba(ArrayView1::from(scaled.values())))
    }

    /// Fraction of rows whose hard prediction matches the label
    pub fn score(&self, features: ArrayView2<'_, f64>, labels: &[u8]) -> f64 {
        if labels.is_empty() {
            return 0.0;
        }
        let correct = features
            .rows()
            .into_iter()
            .zip(labels)
            .filter(|(row, label)| self.predict(row.view()) == **label)
            .count();
        correct as f64 / labels.len() as f64
    }
}

impl Classifier for TrainedModel {
    fn predict_proba(&self, row: ArrayView1<'_, f64>) -> f64 {
        let positive = self
            .trees
            .iter()
            .filter(|tree| tree.predict(row) == 1)
            .count();
        positive as f64 / self.trees.len() as f64
    }

    fn n_features(&self) -> usize {
        self.n_features
    }
}

/// Bootstrap-aggregated decision tree trainer
pub struct HazardClassifier;

impl HazardClassifier {
    /// Fit an ensemble on an already-scaled dataset.
    ///
    /// Each tree draws its own generator from the configured seed and its
    /// index, so the result does not depend on how rayon schedules trees.
    pub fn fit(dataset: &TrainingDataset, config: &ForestConfig) -> MlResult<(TrainedModel, f64)> {
        config.validate()?;

        let features = dataset.features().view();
        let labels = dataset.labels();
        let n_features = dataset.n_features();
        let builder = TreeBuilder {
            features,
            labels,
            max_depth: config.max_depth,
            max_features: ((n_features as f64).sqrt().floor() as usize).max(1),
        };

        let trees: Vec<DecisionTree> = (0..config.tree_count)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = StdRng::seed_from_u64(tree_seed(config.random_seed, tree_idx));
                let n = labels.len();
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                builder.grow(sample, &mut rng)
            })
            .collect();

        let model = TrainedModel {
            hazard: dataset.hazard(),
            n_features,
            trees,
            config: config.clone(),
        };
        let accuracy = model.score(features, labels);

        debug!(
            hazard = %model.hazard,
            trees = model.trees.len(),
            max_depth = model.trees.iter().map(DecisionTree::depth).max().unwrap_or(0),
            accuracy,
            "Fitted hazard ensemble"
        );

        Ok((model, accuracy))
    }
}

/// SplitMix64 finalizer over (seed, tree index)
fn tree_seed(seed: u64, tree_idx: usize) -> u64 {
    let mut z = seed.wrapping_add((tree_idx as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn gini(counts: [u32; 2]) -> f64 {
    let total = (counts[0] + counts[1]) as f64;
    if total == 0.0 {
        return 0.0;
    }
    let p0 = counts[0] as f64 / total;
    let p1 = counts[1] as f64 / total;
    1.0 - p0 * p0 - p1 * p1
}

#[derive(Debug, Clone, Copy)]
struct Split {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

struct TreeBuilder<'a> {
    features: ArrayView2<'a, f64>,
    labels: &'a [u8],
    max_depth: Option<usize>,
    max_features: usize,
}

impl TreeBuilder<'_> {
    fn votes(&self, indices: &[usize]) -> [u32; 2] {
        let mut votes = [0u32; 2];
        for &i in indices {
            votes[usize::from(self.labels[i])] += 1;
        }
        votes
    }

    fn grow(&self, sample: Vec<usize>, rng: &mut StdRng) -> DecisionTree {
        let placeholder = TreeNode::Leaf { votes: [0, 0] };
        let mut nodes = vec![placeholder.clone()];
        let mut pending = vec![(0usize, sample, 0usize)];

        while let Some((node_idx, indices, depth)) = pending.pop() {
            let votes = self.votes(&indices);
            let pure = votes[0] == 0 || votes[1] == 0;
            let depth_reached = self.max_depth.is_some_and(|max| depth >= max);

            if pure || depth_reached || indices.len() < MIN_SAMPLES_SPLIT {
                nodes[node_idx] = TreeNode::Leaf { votes };
                continue;
            }

            let Some(split) = self.best_split(&indices, votes, rng) else {
                nodes[node_idx] = TreeNode::Leaf { votes };
                continue;
            };

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| self.features[[i, split.feature]] <= split.threshold);

            let left = nodes.len();
            let right = left + 1;
            nodes.push(placeholder.clone());
            nodes.push(placeholder.clone());
            nodes[node_idx] = TreeNode::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };

            pending.push((right, right_rows, depth + 1));
            pending.push((left, left_rows, depth + 1));
        }

        DecisionTree {
            n_features: self.features.ncols(),
            nodes,
        }
    }

    /// Examine `max_features` random features, continuing past that budget
    /// only while no valid split has been found
    fn best_split(&self, indices: &[usize], votes: [u32; 2], rng: &mut StdRng) -> Option<Split> {
        let mut candidates: Vec<usize> = (0..self.features.ncols()).collect();
        candidates.shuffle(rng);

        let mut best: Option<Split> = None;
        for (visited, feature) in candidates.into_iter().enumerate() {
            if visited >= self.max_features && best.is_some() {
                break;
            }
            if let Some(split) = self.best_split_on(feature, indices, votes) {
                if best.map_or(true, |b| split.impurity < b.impurity) {
                    best = Some(split);
                }
            }
        }
        best
    }

    fn best_split_on(&self, feature: usize, indices: &[usize], totals: [u32; 2]) -> Option<Split> {
        let mut column: Vec<(f64, u8)> = indices
            .iter()
            .map(|&i| (self.features[[i, feature]], self.labels[i]))
            .collect();
        column.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = column.len() as f64;
        let mut left = [0u32; 2];
        let mut best: Option<Split> = None;

        for k in 0..column.len() - 1 {
            left[usize::from(column[k].1)] += 1;
            let (lo, hi) = (column[k].0, column[k + 1].0);
            if lo == hi {
                continue;
            }

            let right = [totals[0] - left[0], totals[1] - left[1]];
            let n_left = (k + 1) as f64;
            let impurity = (n_left * gini(left) + (n - n_left) * gini(right)) / n;

            if best.map_or(true, |b| impurity < b.impurity) {
                let mid = lo + (hi - lo) / 2.0;
                // adjacent floats can round the midpoint up onto `hi`
                let threshold = if mid < hi { mid } else { lo };
                best = Some(Split {
                    feature,
                    threshold,
                    impurity,
                });
            }
        }
        best
    }
}
