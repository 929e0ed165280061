//! Infinite-horizon LQR synthesis
//!
//! Solves the continuous algebraic Riccati equation
//!
//! ```text
//! AᵀP + PA − PBR⁻¹BᵀP + Q = 0
//! ```
//!
//! for the stabilizing solution with the matrix sign function of the
//! Hamiltonian, then recovers `P` from the stable invariant subspace by least
//! squares. The gain is `K = R⁻¹BᵀP` and the control law is `u = −Kx`.

use std::fmt;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use super::EigenSpectrum;
use crate::{Error, Result};

/// Relative asymmetry tolerated in the weight matrices
const SYMMETRY_TOLERANCE: f64 = 1e-12;

/// A non-converged sign iteration is still accepted below this relative step
const ACCEPTABLE_SIGN_STEP: f64 = 1e-6;

/// Diagonal state and input weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LqrWeights {
    /// Diagonal of Q (one entry per state)
    pub q_diagonal: Vec<f64>,
    /// Diagonal of R (one entry per input)
    pub r_diagonal: Vec<f64>,
}

impl Default for LqrWeights {
    fn default() -> Self {
        Self {
            q_diagonal: vec![1.0, 1.0],
            r_diagonal: vec![1.0],
        }
    }
}

impl LqrWeights {
    /// Create from diagonals
    pub fn new(q_diagonal: Vec<f64>, r_diagonal: Vec<f64>) -> Self {
        Self {
            q_diagonal,
            r_diagonal,
        }
    }

    /// Identity weights for `n` states and `m` inputs
    pub fn identity(n: usize, m: usize) -> Self {
        Self::new(vec![1.0; n], vec![1.0; m])
    }

    /// Q as a dense matrix
    pub fn q(&self) -> DMatrix<f64> {
        DMatrix::from_diagonal(&nalgebra::DVector::from_column_slice(&self.q_diagonal))
    }

    /// R as a dense matrix
    pub fn r(&self) -> DMatrix<f64> {
        DMatrix::from_diagonal(&nalgebra::DVector::from_column_slice(&self.r_diagonal))
    }
}

/// State-feedback gain `K` (m×n)
///
/// Immutable once synthesized. A gain is stale as soon as Q, R, A or B
/// change; rerun synthesis instead of editing it.
#[derive(Debug, Clone, PartialEq)]
pub struct GainMatrix {
    k: DMatrix<f64>,
}

impl GainMatrix {
    /// Wrap a gain matrix
    pub fn new(k: DMatrix<f64>) -> Self {
        Self { k }
    }

    /// Underlying matrix
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.k
    }

    /// Number of inputs (rows)
    pub fn inputs(&self) -> usize {
        self.k.nrows()
    }

    /// Number of states (columns)
    pub fn states(&self) -> usize {
        self.k.ncols()
    }

    /// Extract a single-input gain row of known width
    ///
    /// Fails with [`Error::Config`] if the shape is not `1×N`.
    pub fn to_state_gains<const N: usize>(&self) -> Result<[f64; N]> {
        if self.k.nrows() != 1 || self.k.ncols() != N {
            return Err(Error::Config(format!(
                "gain matrix is {}x{}, controller expects 1x{}",
                self.k.nrows(),
                self.k.ncols(),
                N
            )));
        }
        let mut gains = [0.0; N];
        for (g, k) in gains.iter_mut().zip(self.k.iter()) {
            *g = *k;
        }
        Ok(gains)
    }
}

impl fmt::Display for GainMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for i in 0..self.k.nrows() {
            if i > 0 {
                write!(f, "; ")?;
            }
            for j in 0..self.k.ncols() {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:.6}", self.k[(i, j)])?;
            }
        }
        write!(f, "]")
    }
}

/// Result of a successful synthesis
#[derive(Debug, Clone, PartialEq)]
pub struct LqrSolution {
    /// Feedback gain `K = R⁻¹BᵀP`
    pub gain: GainMatrix,
    /// Stabilizing Riccati solution `P` (symmetric positive definite)
    pub riccati: DMatrix<f64>,
    /// Spectrum of `A − BK`
    pub closed_loop: EigenSpectrum,
    /// Sign-function iterations used
    pub iterations: usize,
}

/// Riccati solver configuration and entry point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LqrSynthesizer {
    /// Maximum sign-function iterations
    pub max_iterations: usize,
    /// Relative step size that counts as converged
    pub tolerance: f64,
}

impl Default for LqrSynthesizer {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-10,
        }
    }
}

impl LqrSynthesizer {
    /// Create with default iteration limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Synthesize using diagonal weights
    pub fn solve_weighted(&self, a: &DMatrix<f64>, b: &DMatrix<f64>, weights: &LqrWeights) -> Result<LqrSolution> {
        self.solve(a, b, &weights.q(), &weights.r())
    }

    /// Solve the CARE and return the stabilizing gain
    ///
    /// # Errors
    /// - [`Error::InvalidWeights`] if shapes disagree, R is not positive
    ///   definite, or Q is not symmetric positive semidefinite
    /// - [`Error::NotStabilizable`] if no stabilizing solution exists
    pub fn solve(&self, a: &DMatrix<f64>, b: &DMatrix<f64>, q: &DMatrix<f64>, r: &DMatrix<f64>) -> Result<LqrSolution> {
        let n = a.nrows();
        let m = b.ncols();
        check_shapes(a, b, q, r)?;
        if !a.iter().chain(b.iter()).all(|v| v.is_finite()) {
            return Err(Error::NotStabilizable("model has non-finite entries".into()));
        }

        let r_inv = r
            .clone()
            .cholesky()
            .ok_or_else(|| Error::InvalidWeights("R must be positive definite".into()))?
            .inverse();
        check_psd(q)?;

        let g = b * &r_inv * b.transpose();
        let mut h = DMatrix::zeros(2 * n, 2 * n);
        h.view_mut((0, 0), (n, n)).copy_from(a);
        h.view_mut((0, n), (n, n)).copy_from(&(-&g));
        h.view_mut((n, 0), (n, n)).copy_from(&(-q));
        h.view_mut((n, n), (n, n)).copy_from(&(-a.transpose()));

        let (w, iterations) = self.matrix_sign(h)?;

        let identity = DMatrix::<f64>::identity(n, n);
        let mut lhs = DMatrix::zeros(2 * n, n);
        lhs.view_mut((0, 0), (n, n)).copy_from(&w.view((0, n), (n, n)));
        lhs.view_mut((n, 0), (n, n))
            .copy_from(&(w.view((n, n), (n, n)) + &identity));
        let mut rhs = DMatrix::zeros(2 * n, n);
        rhs.view_mut((0, 0), (n, n))
            .copy_from(&(-(w.view((0, 0), (n, n)) + &identity)));
        rhs.view_mut((n, 0), (n, n))
            .copy_from(&(-w.view((n, 0), (n, n))));

        let svd = lhs.svd(true, true);
        let cutoff = 1e-10 * svd.singular_values.max();
        let p = svd
            .solve(&rhs, cutoff)
            .map_err(|e| Error::NotStabilizable(format!("stable subspace recovery failed: {}", e)))?;
        let p = (&p + p.transpose()) * 0.5;

        if !p.iter().all(|v| v.is_finite()) {
            return Err(Error::NotStabilizable("Riccati solution is not finite".into()));
        }
        if p.clone().cholesky().is_none() {
            return Err(Error::NotStabilizable(
                "Riccati solution is not positive definite".into(),
            ));
        }

        let k = &r_inv * b.transpose() * &p;
        let closed_loop = EigenSpectrum::of(&(a - b * &k));
        if !closed_loop.is_stable() {
            return Err(Error::NotStabilizable(format!(
                "closed loop A - BK is not Hurwitz (max real part {:.3e})",
                closed_loop.max_real_part()
            )));
        }

        tracing::debug!(n, m, iterations, "Riccati equation solved");

        Ok(LqrSolution {
            gain: GainMatrix::new(k),
            riccati: p,
            closed_loop,
            iterations,
        })
    }

    /// Determinant-scaled Newton iteration for `sign(H)`
    fn matrix_sign(&self, h: DMatrix<f64>) -> Result<(DMatrix<f64>, usize)> {
        let dim = h.nrows() as f64;
        let mut z = h;
        let mut relative_step = f64::INFINITY;

        for iteration in 1..=self.max_iterations {
            let lu = z.clone().lu();
            let det = lu.determinant();
            let z_inv = lu.try_inverse().ok_or_else(|| {
                Error::NotStabilizable("Hamiltonian has eigenvalues on the imaginary axis".into())
            })?;

            let scale = if det.is_finite() && det != 0.0 {
                det.abs().powf(-1.0 / dim)
            } else {
                1.0
            };
            let next = (&z * scale + z_inv / scale) * 0.5;
            let step = (&next - &z).norm();
            z = next;

            if !z.iter().all(|v| v.is_finite()) {
                return Err(Error::NotStabilizable("sign iteration diverged".into()));
            }
            relative_step = step / z.norm().max(f64::MIN_POSITIVE);
            if relative_step <= self.tolerance {
                return Ok((z, iteration));
            }
        }

        if relative_step > ACCEPTABLE_SIGN_STEP {
            return Err(Error::NotStabilizable(format!(
                "sign iteration did not converge (relative step {:.3e})",
                relative_step
            )));
        }
        tracing::warn!(relative_step, "sign iteration hit the iteration limit");
        Ok((z, self.max_iterations))
    }
}

/// Frobenius norm of `AᵀP + PA − PBR⁻¹BᵀP + Q`
///
/// Returns `f64::INFINITY` if R is singular.
pub fn riccati_residual(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    q: &DMatrix<f64>,
    r: &DMatrix<f64>,
    p: &DMatrix<f64>,
) -> f64 {
    let Some(r_inv) = r.clone().try_inverse() else {
        return f64::INFINITY;
    };
    let residual = a.transpose() * p + p * a - p * b * r_inv * b.transpose() * p + q;
    residual.norm()
}

fn check_shapes(a: &DMatrix<f64>, b: &DMatrix<f64>, q: &DMatrix<f64>, r: &DMatrix<f64>) -> Result<()> {
    let n = a.nrows();
    let m = b.ncols();
    if !a.is_square() || b.nrows() != n {
        return Err(Error::InvalidWeights(format!(
            "model shapes disagree: A is {}x{}, B is {}x{}",
            a.nrows(),
            a.ncols(),
            b.nrows(),
            b.ncols()
        )));
    }
    if q.shape() != (n, n) {
        return Err(Error::InvalidWeights(format!(
            "Q is {}x{}, expected {}x{}",
            q.nrows(),
            q.ncols(),
            n,
            n
        )));
    }
    if r.shape() != (m, m) {
        return Err(Error::InvalidWeights(format!(
            "R is {}x{}, expected {}x{}",
            r.nrows(),
            r.ncols(),
            m,
            m
        )));
    }
    if !is_symmetric(r) {
        return Err(Error::InvalidWeights("R must be symmetric".into()));
    }
    Ok(())
}

fn is_symmetric(m: &DMatrix<f64>) -> bool {
    let scale = m.amax().max(1.0);
    (m - m.transpose()).amax() <= SYMMETRY_TOLERANCE * scale
}

fn check_psd(q: &DMatrix<f64>) -> Result<()> {
    if !q.iter().all(|v| v.is_finite()) {
        return Err(Error::InvalidWeights("Q has non-finite entries".into()));
    }
    if !is_symmetric(q) {
        return Err(Error::InvalidWeights("Q must be symmetric".into()));
    }
    let eigen = q.clone().symmetric_eigen();
    let min = eigen.eigenvalues.min();
    if min < -SYMMETRY_TOLERANCE * q.amax().max(1.0) {
        return Err(Error::InvalidWeights(format!(
            "Q must be positive semidefinite (min eigenvalue {:.3e})",
            min
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn saddle() -> (DMatrix<f64>, DMatrix<f64>) {
        (
            DMatrix::from_row_slice(2, 2, &[-1.0, 1.0, 1.0, 3.0]),
            DMatrix::from_row_slice(2, 1, &[4.0, 2.0]),
        )
    }

    #[test]
    fn test_reference_saddle_gain() {
        let (a, b) = saddle();
        let weights = LqrWeights::default();
        let solution = LqrSynthesizer::new().solve_weighted(&a, &b, &weights).unwrap();

        let k = solution.gain.to_state_gains::<2>().unwrap();
        assert_relative_eq!(k[0], 0.5569, epsilon = 1e-3);
        assert_relative_eq!(k[1], 3.6497, epsilon = 1e-3);

        let residual = riccati_residual(&a, &b, &weights.q(), &weights.r(), &solution.riccati);
        assert!(residual < 1e-8, "residual = {:e}", residual);
        assert!(solution.closed_loop.is_stable());
        assert!(solution.iterations <= 100);
    }

    #[test]
    fn test_riccati_solution_is_symmetric() {
        let (a, b) = saddle();
        let solution = LqrSynthesizer::new()
            .solve_weighted(&a, &b, &LqrWeights::new(vec![10.0, 1.0], vec![0.5]))
            .unwrap();
        let p = &solution.riccati;
        assert_relative_eq!(p[(0, 1)], p[(1, 0)], epsilon = 1e-12);
        assert!(p.clone().cholesky().is_some());
    }

    #[test]
    fn test_random_controllable_systems_are_stabilized() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let synthesizer = LqrSynthesizer::new();
        let mut solved = 0;

        for _ in 0..50 {
            let n = rng.gen_range(2..=4);
            let a = DMatrix::from_fn(n, n, |_, _| rng.gen_range(-3.0..3.0));
            let b = DMatrix::from_fn(n, 1, |_, _| rng.gen_range(-3.0..3.0));

            // Skip draws that are numerically close to uncontrollable
            let mut ctrb = DMatrix::zeros(n, n);
            let mut column = b.clone();
            for j in 0..n {
                ctrb.set_column(j, &column.column(0));
                column = &a * column;
            }
            let sv = ctrb.singular_values();
            if sv.min() < 1e-6 * sv.max() {
                continue;
            }

            let q = DMatrix::identity(n, n);
            let r = DMatrix::identity(1, 1);
            let solution = synthesizer.solve(&a, &b, &q, &r).unwrap();
            assert!(
                solution.closed_loop.max_real_part() < 0.0,
                "closed loop not Hurwitz for A = {}",
                a
            );
            assert!(riccati_residual(&a, &b, &q, &r, &solution.riccati) < 1e-6);
            solved += 1;
        }

        assert!(solved >= 40);
    }

    #[test]
    fn test_uncontrollable_unstable_mode() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, -1.0]);
        let b = DMatrix::from_row_slice(2, 1, &[0.0, 1.0]);
        let result = LqrSynthesizer::new().solve_weighted(&a, &b, &LqrWeights::default());
        assert!(matches!(result, Err(Error::NotStabilizable(_))));
    }

    #[test]
    fn test_zero_input_matrix() {
        let a = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]);
        let b = DMatrix::zeros(2, 1);
        let result = LqrSynthesizer::new().solve_weighted(&a, &b, &LqrWeights::default());
        assert!(matches!(result, Err(Error::NotStabilizable(_))));
    }

    #[test]
    fn test_invalid_weights() {
        let (a, b) = saddle();
        let synthesizer = LqrSynthesizer::new();
        for r in [0.0, -1.0] {
            let result = synthesizer.solve_weighted(&a, &b, &LqrWeights::new(vec![1.0, 1.0], vec![r]));
            assert!(matches!(result, Err(Error::InvalidWeights(_))), "R = {}", r);
        }

        let indefinite = LqrWeights::new(vec![1.0, -2.0], vec![1.0]);
        assert!(matches!(
            synthesizer.solve_weighted(&a, &b, &indefinite),
            Err(Error::InvalidWeights(_))
        ));

        let wrong_size = LqrWeights::new(vec![1.0, 1.0, 1.0], vec![1.0]);
        assert!(matches!(
            synthesizer.solve_weighted(&a, &b, &wrong_size),
            Err(Error::InvalidWeights(_))
        ));
    }

    #[test]
    fn test_gain_shape_check() {
        let gain = GainMatrix::new(DMatrix::from_row_slice(1, 2, &[1.0, 2.0]));
        assert_eq!(gain.to_state_gains::<2>().unwrap(), [1.0, 2.0]);
        assert!(matches!(gain.to_state_gains::<4>(), Err(Error::Config(_))));
        assert_eq!(gain.to_string(), "[1.000000, 2.000000]");
    }
}
