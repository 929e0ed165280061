//! Analytic model of the mock plant
//!
//! The same physics the [`MockBalanceBot`](super::MockBalanceBot)
//! integrates, written in the controller's error coordinates
//! `z = [−θ, −θ̇, φ, ω]` with the mean wheel velocity command as input:
//!
//! ```text
//! ż0 = z1
//! ż1 = (g/l)·sin z0 − (r/(l·τ))·(u − z3)·cos z0
//! ż2 = z3
//! ż3 = (u − z3)/τ
//! ```
//!
//! Wheel position enters only through its own integrator, so upright
//! equilibria form a line in `z2`; gains are synthesized about the origin
//! directly rather than through the equilibrium search.

use crate::math::Scalar;
use crate::synthesis::{Dynamics, LinearModel, LqrSolution, LqrSynthesizer, LqrWeights};
use crate::Result;

use super::PlantConfig;

/// Inverted pendulum on lagged velocity-controlled wheels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalancePlant {
    gravity: f64,
    length: f64,
    radius: f64,
    tau: f64,
}

impl BalancePlant {
    /// Take the physical parameters from a plant configuration
    pub fn from_config(config: &PlantConfig) -> Self {
        Self {
            gravity: config.gravity,
            length: config.pendulum_length,
            radius: config.wheel_radius,
            tau: config.wheel_time_constant,
        }
    }

    /// Linearization about upright and at rest
    pub fn upright_model(&self) -> LinearModel {
        LinearModel::at_operating_point(self, &[0.0; 4], &[0.0])
    }

    /// LQR gain for the upright model
    pub fn synthesize(&self, weights: &LqrWeights) -> Result<LqrSolution> {
        let model = self.upright_model();
        let solution = LqrSynthesizer::new().solve_weighted(&model.a, &model.b, weights)?;
        tracing::info!(gain = %solution.gain, "synthesized plant gain");
        Ok(solution)
    }
}

impl Default for BalancePlant {
    fn default() -> Self {
        Self::from_config(&PlantConfig::default())
    }
}

impl Dynamics for BalancePlant {
    fn state_dim(&self) -> usize {
        4
    }

    fn name(&self) -> &str {
        "balance_plant"
    }

    fn derivatives<T: Scalar>(&self, x: &[T], u: &[T]) -> Vec<T> {
        let c = T::from_f64;
        let (tilt, rate, vel, u) = (x[0], x[1], x[3], u[0]);
        let slip = u - vel;
        vec![
            rate,
            c(self.gravity / self.length) * tilt.sin()
                - c(self.radius / (self.length * self.tau)) * slip * tilt.cos(),
            vel,
            slip / c(self.tau),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::EigenSpectrum;
    use approx::assert_relative_eq;

    #[test]
    fn test_upright_model() {
        let model = BalancePlant::default().upright_model();
        let g_over_l = 9.81 / 0.12;
        let coupling = 0.05 / (0.12 * 0.05);

        assert_relative_eq!(model.a[(0, 1)], 1.0);
        assert_relative_eq!(model.a[(1, 0)], g_over_l, epsilon = 1e-12);
        assert_relative_eq!(model.a[(1, 3)], coupling, epsilon = 1e-12);
        assert_relative_eq!(model.a[(2, 3)], 1.0);
        assert_relative_eq!(model.a[(3, 3)], -20.0, epsilon = 1e-12);
        assert_relative_eq!(model.b[(1, 0)], -coupling, epsilon = 1e-12);
        assert_relative_eq!(model.b[(3, 0)], 20.0, epsilon = 1e-12);
    }

    #[test]
    fn test_upright_is_unstable() {
        let model = BalancePlant::default().upright_model();
        let spectrum = EigenSpectrum::of(&model.a);
        assert!(spectrum.has_growing_mode());
        // Falling mode at +√(g/l)
        assert_relative_eq!(spectrum.max_real_part(), (9.81f64 / 0.12).sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_synthesized_gain() {
        let weights = LqrWeights::new(vec![100.0, 1.0, 10.0, 1.0], vec![1.0]);
        let solution = BalancePlant::default().synthesize(&weights).unwrap();
        let k = solution.gain.to_state_gains::<4>().unwrap();

        assert_relative_eq!(k[0], -102.15, epsilon = 0.05);
        assert_relative_eq!(k[1], -11.29, epsilon = 0.05);
        assert_relative_eq!(k[2], -3.162, epsilon = 0.005);
        assert_relative_eq!(k[3], -3.231, epsilon = 0.005);
        assert!(!solution.closed_loop.has_growing_mode());
    }
}
