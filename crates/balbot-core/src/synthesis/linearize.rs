//! Jacobian linearization by forward-mode differentiation

use nalgebra::DMatrix;

use super::{Dynamics, EquilibriumPoint};
use crate::math::Dual;

/// Linear model `δẋ = A·δx + B·δu` about one operating point
///
/// Owned by the point it was computed at; if the point moves the model is
/// recomputed, never edited.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    /// State matrix ∂f/∂x
    pub a: DMatrix<f64>,
    /// Input matrix ∂f/∂u
    pub b: DMatrix<f64>,
}

impl LinearModel {
    /// Linearize `dynamics` at an equilibrium with zero input
    pub fn at<D: Dynamics>(dynamics: &D, point: &EquilibriumPoint) -> Self {
        let u = vec![0.0; dynamics.input_dim()];
        Self::at_operating_point(dynamics, point.as_slice(), &u)
    }

    /// Linearize at an arbitrary `(x, u)`
    pub fn at_operating_point<D: Dynamics>(dynamics: &D, x: &[f64], u: &[f64]) -> Self {
        let (a, b) = jacobians(dynamics, x, u);
        Self { a, b }
    }

    /// Number of states
    pub fn state_dim(&self) -> usize {
        self.a.nrows()
    }

    /// Number of inputs
    pub fn input_dim(&self) -> usize {
        self.b.ncols()
    }
}

/// Exact Jacobians `(∂f/∂x, ∂f/∂u)` at `(x, u)`
///
/// One dual-number sweep per column: the seeded variable carries a unit
/// tangent, everything else is constant.
pub fn jacobians<D: Dynamics>(dynamics: &D, x: &[f64], u: &[f64]) -> (DMatrix<f64>, DMatrix<f64>) {
    let n = dynamics.state_dim();
    let m = dynamics.input_dim();
    debug_assert_eq!(x.len(), n);
    debug_assert_eq!(u.len(), m);

    let lift = |values: &[f64], seed: Option<usize>| -> Vec<Dual> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                if Some(i) == seed {
                    Dual::variable(v)
                } else {
                    Dual::constant(v)
                }
            })
            .collect()
    };

    let mut a = DMatrix::zeros(n, n);
    for j in 0..n {
        let f = dynamics.derivatives(&lift(x, Some(j)), &lift(u, None));
        for (i, fi) in f.iter().enumerate() {
            a[(i, j)] = fi.eps;
        }
    }

    let mut b = DMatrix::zeros(n, m);
    for k in 0..m {
        let f = dynamics.derivatives(&lift(x, None), &lift(u, Some(k)));
        for (i, fi) in f.iter().enumerate() {
            b[(i, k)] = fi.eps;
        }
    }

    (a, b)
}
