//! Equilibrium search
//!
//! Finds the isolated real roots of `f(x, 0) = 0` with multi-start Newton
//! iteration. The Jacobian comes from the same dual-number sweep the
//! linearizer uses, so each step is exact up to rounding.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::{linearize::jacobians, Dynamics};
use crate::{Error, Result};

/// Coordinates below this magnitude are reported as exactly zero
const SNAP_TO_ZERO: f64 = 1e-12;

/// Iterates whose magnitude exceeds this are treated as diverged
const DIVERGENCE_LIMIT: f64 = 1e6;

/// Equilibrium solver configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Seeds are spread over `[-search_radius, search_radius]` on each axis
    pub search_radius: f64,
    /// Seeds per axis (the grid has `seeds_per_axis ^ state_dim` points)
    pub seeds_per_axis: usize,
    /// Newton iterations per seed
    pub max_iterations: usize,
    /// Step size below which a seed has converged
    pub tolerance: f64,
    /// Residual infinity-norm a converged iterate must reach to count as a root
    pub residual_tolerance: f64,
    /// Roots closer than this (infinity-norm) are the same root
    pub merge_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            search_radius: 2.0,
            seeds_per_axis: 9,
            max_iterations: 50,
            tolerance: 1e-12,
            residual_tolerance: 1e-10,
            merge_tolerance: 1e-6,
        }
    }
}

impl SolverConfig {
    /// Set the search box half-width
    pub fn with_search_radius(mut self, radius: f64) -> Self {
        self.search_radius = radius;
        self
    }

    /// Set the number of seeds per axis
    pub fn with_seeds_per_axis(mut self, seeds: usize) -> Self {
        self.seeds_per_axis = seeds;
        self
    }
}

/// A state at which the zero-input dynamics vanish
#[derive(Debug, Clone, PartialEq)]
pub struct EquilibriumPoint {
    state: DVector<f64>,
}

impl EquilibriumPoint {
    /// Create from coordinates
    pub fn new(coords: Vec<f64>) -> Self {
        Self {
            state: DVector::from_vec(coords),
        }
    }

    /// State vector
    pub fn state(&self) -> &DVector<f64> {
        &self.state
    }

    /// Coordinates as a slice
    pub fn as_slice(&self) -> &[f64] {
        self.state.as_slice()
    }

    /// Number of coordinates
    pub fn dim(&self) -> usize {
        self.state.len()
    }

    /// Coordinate by index
    pub fn get(&self, index: usize) -> Option<f64> {
        self.state.get(index).copied()
    }
}

impl std::fmt::Display for EquilibriumPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.state.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "x{} = {:.6}", i + 1, v)?;
        }
        write!(f, ")")
    }
}

/// Outcome of an equilibrium search
///
/// An empty search is a normal result, not an error; callers that need at
/// least one point use [`Equilibria::into_result`].
#[derive(Debug, Clone, PartialEq)]
pub enum Equilibria {
    /// No real solution was found
    Empty,
    /// One or more isolated roots, in lexicographic order
    Points(Vec<EquilibriumPoint>),
}

impl Equilibria {
    fn from_vec(points: Vec<EquilibriumPoint>) -> Self {
        if points.is_empty() {
            Self::Empty
        } else {
            Self::Points(points)
        }
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.points().len()
    }

    /// Check whether no point was found
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Points as a slice (empty for [`Equilibria::Empty`])
    pub fn points(&self) -> &[EquilibriumPoint] {
        match self {
            Self::Empty => &[],
            Self::Points(points) => points,
        }
    }

    /// Convert to the non-empty list, or [`Error::NoEquilibrium`]
    pub fn into_result(self) -> Result<Vec<EquilibriumPoint>> {
        match self {
            Self::Empty => Err(Error::NoEquilibrium),
            Self::Points(points) => Ok(points),
        }
    }
}

/// Multi-start Newton solver for `f(x, 0) = 0`
#[derive(Debug, Clone, Default)]
pub struct EquilibriumSolver {
    config: SolverConfig,
}

impl EquilibriumSolver {
    /// Create a solver with the given configuration
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Find every isolated root reachable from the seed grid
    pub fn solve<D: Dynamics>(&self, dynamics: &D) -> Equilibria {
        let n = dynamics.state_dim();
        let zero_input = vec![0.0; dynamics.input_dim()];
        let mut roots: Vec<DVector<f64>> = Vec::new();
        let mut seeds = 0usize;

        for seed in self.seed_grid(n) {
            seeds += 1;
            let Some(root) = self.newton(dynamics, seed, &zero_input) else {
                continue;
            };
            let duplicate = roots
                .iter()
                .any(|r| (r - &root).amax() < self.config.merge_tolerance);
            if !duplicate {
                roots.push(root);
            }
        }

        roots.sort_by(|a, b| {
            a.iter()
                .zip(b.iter())
                .map(|(x, y)| x.total_cmp(y))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        tracing::debug!(
            model = dynamics.name(),
            seeds,
            roots = roots.len(),
            "equilibrium search finished"
        );

        Equilibria::from_vec(
            roots
                .into_iter()
                .map(|r| EquilibriumPoint { state: r })
                .collect(),
        )
    }

    fn seed_grid(&self, n: usize) -> Vec<DVector<f64>> {
        let per_axis = self.config.seeds_per_axis.max(1);
        let r = self.config.search_radius;
        let coord = |i: usize| {
            if per_axis == 1 {
                0.0
            } else {
                -r + 2.0 * r * i as f64 / (per_axis - 1) as f64
            }
        };

        let total = per_axis.pow(n as u32);
        (0..total)
            .map(|mut index| {
                DVector::from_fn(n, |_, _| {
                    let c = coord(index % per_axis);
                    index /= per_axis;
                    c
                })
            })
            .collect()
    }

    fn newton<D: Dynamics>(&self, dynamics: &D, seed: DVector<f64>, u: &[f64]) -> Option<DVector<f64>> {
        let mut x = seed;

        for _ in 0..self.config.max_iterations {
            let f = DVector::from_vec(dynamics.derivatives(x.as_slice(), u));
            let (a, _) = jacobians(dynamics, x.as_slice(), u);
            let step = solve_step(a, &f)?;
            x -= &step;

            if !x.iter().all(|v| v.is_finite()) || x.amax() > DIVERGENCE_LIMIT {
                return None;
            }
            if step.amax() <= self.config.tolerance * (1.0 + x.amax()) {
                break;
            }
        }

        let residual = DVector::from_vec(dynamics.derivatives(x.as_slice(), u));
        if residual.amax() >= self.config.residual_tolerance {
            return None;
        }

        x.apply(|v| {
            if v.abs() < SNAP_TO_ZERO {
                *v = 0.0;
            }
        });
        Some(x)
    }
}

fn solve_step(jacobian: DMatrix<f64>, f: &DVector<f64>) -> Option<DVector<f64>> {
    jacobian.lu().solve(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Scalar;
    use crate::synthesis::ReferenceDynamics;
    use approx::assert_relative_eq;

    /// `ẋ1 = x1² + 1`, `ẋ2 = -x2 + u` has no real equilibrium
    struct NoRoots;

    impl Dynamics for NoRoots {
        fn state_dim(&self) -> usize {
            2
        }

        fn derivatives<T: Scalar>(&self, x: &[T], u: &[T]) -> Vec<T> {
            vec![x[0] * x[0] + T::from_f64(1.0), -x[1] + u[0]]
        }
    }

    #[test]
    fn test_reference_equilibria() {
        let found = EquilibriumSolver::default().solve(&ReferenceDynamics);
        let s = std::f64::consts::FRAC_1_SQRT_2;
        let expected = [[-s, -s], [0.0, 0.0], [s, s]];

        assert_eq!(found.len(), 3);
        for (point, want) in found.points().iter().zip(expected.iter()) {
            assert_relative_eq!(point.get(0).unwrap(), want[0], epsilon = 1e-9);
            assert_relative_eq!(point.get(1).unwrap(), want[1], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_origin_is_exact_zero() {
        let found = EquilibriumSolver::default().solve(&ReferenceDynamics);
        let origin = &found.points()[1];
        assert_eq!(origin.as_slice(), &[0.0, 0.0]);
    }

    #[test]
    fn test_no_real_root_is_empty_not_error() {
        let found = EquilibriumSolver::default().solve(&NoRoots);
        assert!(found.is_empty());
        assert_eq!(found.points().len(), 0);
        assert!(matches!(found.into_result(), Err(Error::NoEquilibrium)));
    }

    #[test]
    fn test_result_is_independent_of_grid_density() {
        let coarse = EquilibriumSolver::new(SolverConfig::default().with_seeds_per_axis(5))
            .solve(&ReferenceDynamics);
        let fine = EquilibriumSolver::new(SolverConfig::default().with_seeds_per_axis(15))
            .solve(&ReferenceDynamics);
        assert_eq!(coarse.len(), fine.len());
        for (a, b) in coarse.points().iter().zip(fine.points()) {
            assert!((a.state() - b.state()).amax() < 1e-9);
        }
    }

    #[test]
    fn test_seed_grid_covers_box() {
        let solver = EquilibriumSolver::new(SolverConfig::default().with_seeds_per_axis(3));
        let grid = solver.seed_grid(2);
        assert_eq!(grid.len(), 9);
        assert!(grid.iter().any(|s| s[0] == -2.0 && s[1] == 2.0));
        assert!(grid.iter().any(|s| s[0] == 0.0 && s[1] == 0.0));
    }
}
