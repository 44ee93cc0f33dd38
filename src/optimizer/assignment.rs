//! Minimum-cost resource to demand matching.
//!
//! Hungarian algorithm with row/column potentials, O(n³) in the larger side.
//! Unequal sides are padded to a square with zero-cost dummy rows or
//! columns; pairs that touch a dummy are dropped from the result.

use crate::optimizer::error::{OptimizerError, OptimizerResult};
use crate::optimizer::geometry::{distance_matrix, ensure_finite, Coordinate};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Matched (resource, demand) index pairs with their distances
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentResult {
    /// Sorted by resource index
    pub pairs: Vec<(usize, usize)>,

    /// `costs[i]` is the distance of `pairs[i]`
    pub costs: Vec<f64>,

    pub total_cost: f64,
}

impl AssignmentResult {
    /// Resource indices in `0..n_resources` without a demand
    pub fn unassigned_resources(&self, n_resources: usize) -> Vec<usize> {
        let mut assigned = vec![false; n_resources];
        for &(resource, _) in &self.pairs {
            assigned[resource] = true;
        }
        (0..n_resources).filter(|&i| !assigned[i]).collect()
    }

    /// Demand indices in `0..n_demands` without a resource
    pub fn uncovered_demands(&self, n_demands: usize) -> Vec<usize> {
        let mut covered = vec![false; n_demands];
        for &(_, demand) in &self.pairs {
            covered[demand] = true;
        }
        (0..n_demands).filter(|&j| !covered[j]).collect()
    }
}

pub struct ResourceAssigner;

impl ResourceAssigner {
    /// Optimal assignment over planar distances
    pub fn assign(
        resources: &[Coordinate],
        demands: &[Coordinate],
    ) -> OptimizerResult<AssignmentResult> {
        ensure_finite(resources, "resource")?;
        ensure_finite(demands, "demand")?;

        let cost = distance_matrix(resources, demands);
        let result = Self::assign_costs(&cost)?;
        debug!(
            resources = resources.len(),
            demands = demands.len(),
            pairs = result.pairs.len(),
            total_cost = result.total_cost,
            "Assigned resources"
        );
        Ok(result)
    }

    /// Optimal assignment over an arbitrary cost matrix (rows are
    /// resources, columns demands). Every entry must be finite.
    pub fn assign_costs(cost: &Array2<f64>) -> OptimizerResult<AssignmentResult> {
        let (rows, cols) = cost.dim();
        if rows == 0 || cols == 0 {
            return Ok(AssignmentResult::default());
        }
        if let Some(((resource, demand), _)) =
            cost.indexed_iter().find(|(_, c)| !c.is_finite())
        {
            return Err(OptimizerError::NonFiniteCost { resource, demand });
        }

        let column_of_row = hungarian(cost, rows.max(cols))?;
        let mut pairs = Vec::with_capacity(rows.min(cols));
        let mut costs = Vec::with_capacity(rows.min(cols));
        for (row, col) in column_of_row.into_iter().enumerate() {
            if row < rows && col < cols {
                pairs.push((row, col));
                costs.push(cost[[row, col]]);
            }
        }
        let total_cost: f64 = costs.iter().sum();
        if !total_cost.is_finite() {
            return Err(OptimizerError::CostOverflow);
        }

        Ok(AssignmentResult {
            pairs,
            costs,
            total_cost,
        })
    }
}

/// Square Hungarian solve over `cost` padded to `n × n` with zeros.
/// Returns the column matched to each row.
fn hungarian(cost: &Array2<f64>, n: usize) -> OptimizerResult<Vec<usize>> {
    let (rows, cols) = cost.dim();
    let at = |i: usize, j: usize| {
        if i < rows && j < cols {
            cost[[i, j]]
        } else {
            0.0
        }
    };

    // 1-based; index 0 is the virtual start column
    let mut u = vec![0.0; n + 1];
    let mut v = vec![0.0; n + 1];
    let mut row_of_col = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        row_of_col[0] = i;
        let mut j0 = 0;
        let mut min_slack = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = row_of_col[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0;
            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let reduced = at(i0 - 1, j - 1) - u[i0] - v[j];
                if reduced < min_slack[j] {
                    min_slack[j] = reduced;
                    way[j] = j0;
                }
                if min_slack[j] < delta {
                    delta = min_slack[j];
                    j1 = j;
                }
            }
            // no finite slack left means the potentials overflowed
            if !delta.is_finite() || j1 == 0 {
                return Err(OptimizerError::CostOverflow);
            }
            for j in 0..=n {
                if used[j] {
                    u[row_of_col[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_slack[j] -= delta;
                }
            }
            j0 = j1;
            if row_of_col[j0] == 0 {
                break;
            }
        }

        // augment along the alternating path
        loop {
            let j1 = way[j0];
            row_of_col[j0] = row_of_col[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut column_of_row = vec![0usize; n];
    for j in 1..=n {
        column_of_row[row_of_col[j] - 1] = j - 1;
    }
    Ok(column_of_row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn coords(points: &[(f64, f64)]) -> Vec<Coordinate> {
        points.iter().copied().map(Coordinate::from).collect()
    }

    /// Exhaustive minimum over all injections of the smaller side
    fn brute_force(cost: &Array2<f64>) -> f64 {
        fn search(cost: &Array2<f64>, row: usize, used: &mut Vec<bool>, acc: f64, best: &mut f64) {
            if row == cost.nrows() {
                *best = best.min(acc);
                return;
            }
            for col in 0..cost.ncols() {
                if !used[col] {
                    used[col] = true;
                    search(cost, row + 1, used, acc + cost[[row, col]], best);
                    used[col] = false;
                }
            }
        }
        let cost = if cost.nrows() > cost.ncols() {
            cost.t().to_owned()
        } else {
            cost.clone()
        };
        let mut best = f64::INFINITY;
        search(&cost, 0, &mut vec![false; cost.ncols()], 0.0, &mut best);
        best
    }

    #[test]
    fn test_diagonal_pairs() {
        let resources = coords(&[(0.0, 0.0), (10.0, 10.0)]);
        let demands = coords(&[(0.0, 1.0), (10.0, 11.0)]);

        let result = ResourceAssigner::assign(&resources, &demands).unwrap();
        assert_eq!(result.pairs, vec![(0, 0), (1, 1)]);
        assert_relative_eq!(result.costs[0], 1.0);
        assert_relative_eq!(result.costs[1], 1.0);
        assert_relative_eq!(result.total_cost, 2.0);

        let cross = resources[0].distance(&demands[1]) + resources[1].distance(&demands[0]);
        assert!(result.total_cost < cross);
    }

    #[test]
    fn test_beats_nearest_first_greedy() {
        // greedy sends resource 0 to demand 0 (distance 1) and pays 4.5 for
        // resource 1; the optimum is 1.5 + 2.0
        let resources = coords(&[(0.0, 0.0), (3.0, 0.0)]);
        let demands = coords(&[(1.0, 0.0), (-1.5, 0.0)]);

        let result = ResourceAssigner::assign(&resources, &demands).unwrap();
        assert_eq!(result.pairs, vec![(0, 1), (1, 0)]);
        assert_relative_eq!(result.total_cost, 3.5);
    }

    #[test]
    fn test_more_resources_than_demands() {
        let resources = coords(&[(0.0, 0.0), (5.0, 5.0), (9.0, 9.0)]);
        let demands = coords(&[(9.0, 8.0), (0.0, 1.0)]);

        let result = ResourceAssigner::assign(&resources, &demands).unwrap();
        assert_eq!(result.pairs, vec![(0, 1), (2, 0)]);
        assert_eq!(result.unassigned_resources(3), vec![1]);
        assert!(result.uncovered_demands(2).is_empty());
        assert_relative_eq!(result.total_cost, 2.0);
    }

    #[test]
    fn test_more_demands_than_resources() {
        let resources = coords(&[(4.0, 4.0)]);
        let demands = coords(&[(0.0, 0.0), (4.0, 5.0), (9.0, 9.0)]);

        let result = ResourceAssigner::assign(&resources, &demands).unwrap();
        assert_eq!(result.pairs, vec![(0, 1)]);
        assert_eq!(result.uncovered_demands(3), vec![0, 2]);
    }

    #[test]
    fn test_each_index_used_at_most_once() {
        let resources: Vec<Coordinate> = (0..7)
            .map(|i| Coordinate::new((i * 3 % 5) as f64, (i * 2 % 7) as f64))
            .collect();
        let demands: Vec<Coordinate> = (0..5)
            .map(|j| Coordinate::new((j * 4 % 3) as f64, (j % 4) as f64 * 1.5))
            .collect();

        let result = ResourceAssigner::assign(&resources, &demands).unwrap();
        assert_eq!(result.pairs.len(), 5);
        let mut rs: Vec<usize> = result.pairs.iter().map(|p| p.0).collect();
        let mut ds: Vec<usize> = result.pairs.iter().map(|p| p.1).collect();
        rs.dedup();
        ds.sort_unstable();
        ds.dedup();
        assert_eq!(rs.len(), 5);
        assert_eq!(ds, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_matches_brute_force() {
        let matrices = [
            array![[4.0, 1.0, 3.0], [2.0, 0.0, 5.0], [3.0, 2.0, 2.0]],
            array![[7.0, 3.0], [2.0, 9.0], [4.0, 4.0], [1.0, 8.0]],
            array![[5.0, 9.0, 1.0, 6.0], [10.0, 3.0, 2.0, 7.0]],
            array![[1.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 1.0]],
        ];
        for cost in &matrices {
            let result = ResourceAssigner::assign_costs(cost).unwrap();
            assert_relative_eq!(result.total_cost, brute_force(cost), epsilon = 1e-9);
            assert_eq!(result.pairs.len(), cost.nrows().min(cost.ncols()));
        }
    }

    #[test]
    fn test_empty_sides() {
        let some = coords(&[(1.0, 1.0)]);
        assert_eq!(
            ResourceAssigner::assign(&[], &some).unwrap(),
            AssignmentResult::default()
        );
        assert!(ResourceAssigner::assign(&some, &[]).unwrap().pairs.is_empty());
    }

    #[test]
    fn test_non_finite_demand_rejected() {
        let resources = coords(&[(0.0, 0.0)]);
        let demands = coords(&[(0.0, 1.0), (f64::NAN, 0.0)]);
        assert!(matches!(
            ResourceAssigner::assign(&resources, &demands),
            Err(crate::optimizer::OptimizerError::NonFiniteCoordinate {
                role: "demand",
                index: 1
            })
        ));
    }

    #[test]
    fn test_overflowing_distances_rejected() {
        // finite coordinates whose distances overflow to infinity
        let resources = coords(&[(1e308, 0.0), (1e308, 1.0)]);
        let demands = coords(&[(-1e308, 0.0), (-1e308, 1.0)]);
        let err = ResourceAssigner::assign(&resources, &demands).unwrap_err();
        assert_eq!(
            err,
            OptimizerError::NonFiniteCost {
                resource: 0,
                demand: 0
            }
        );
        assert_eq!(err.error_code(), "NON_FINITE_COST");
    }

    #[test]
    fn test_non_finite_cost_matrix_rejected() {
        let cost = array![[1.0, 2.0], [f64::NAN, 0.5]];
        assert_eq!(
            ResourceAssigner::assign_costs(&cost).unwrap_err(),
            OptimizerError::NonFiniteCost {
                resource: 1,
                demand: 0
            }
        );
    }

    #[test]
    fn test_summed_cost_overflow_rejected() {
        // each entry is finite but any full matching sums past f64::MAX
        let huge = array![[f64::MAX, f64::MAX], [f64::MAX, f64::MAX]];
        assert_eq!(
            ResourceAssigner::assign_costs(&huge).unwrap_err(),
            OptimizerError::CostOverflow
        );
    }
}
