//! Continuous-time dynamics models
//!
//! Models are written once, generically over [`Scalar`], so the same code
//! evaluates plain derivatives and exact Jacobians.

use crate::math::Scalar;

/// A smooth vector field `ẋ = f(x, u)`
pub trait Dynamics {
    /// Number of states
    fn state_dim(&self) -> usize;

    /// Number of inputs
    fn input_dim(&self) -> usize {
        1
    }

    /// Model name for logging
    fn name(&self) -> &str {
        "dynamics"
    }

    /// Evaluate `f(x, u)`
    ///
    /// `x` has `state_dim()` entries and `u` has `input_dim()` entries; the
    /// returned vector has `state_dim()` entries.
    fn derivatives<T: Scalar>(&self, x: &[T], u: &[T]) -> Vec<T>;
}

/// The planar reference system used for gain synthesis
///
/// ```text
/// ẋ1 = -x1 + x2 + 4u
/// ẋ2 = -x1 - x2 + 4·x1·x2² + 2u
/// ```
///
/// With `u = 0` the first equation forces `x2 = x1`, and the second reduces
/// to `x1·(4·x1² - 2) = 0`, so the equilibria are the origin and
/// `±(1/√2, 1/√2)`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReferenceDynamics;

impl Dynamics for ReferenceDynamics {
    fn state_dim(&self) -> usize {
        2
    }

    fn name(&self) -> &str {
        "reference"
    }

    fn derivatives<T: Scalar>(&self, x: &[T], u: &[T]) -> Vec<T> {
        let (x1, x2, u) = (x[0], x[1], u[0]);
        let c = T::from_f64;
        vec![
            -x1 + x2 + c(4.0) * u,
            -x1 - x2 + c(4.0) * x1 * x2.powi(2) + c(2.0) * u,
        ]
    }
}
