//! Offline synthesis driver
//!
//! Equilibria → linearization → classification → LQR, run once before the
//! control loop starts. Any stage failing aborts the run; no partial gain is
//! returned.

use std::fmt;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use super::{
    classify, lqr::riccati_residual, select_unstable, ClassifiedEquilibrium, Dynamics,
    EquilibriumSolver, GainMatrix, LqrSolution, LqrSynthesizer, LqrWeights, SolverConfig,
};
use crate::Result;

/// Pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub solver: SolverConfig,
    pub weights: LqrWeights,
}

impl SynthesisConfig {
    /// Set the LQR weights
    pub fn with_weights(mut self, weights: LqrWeights) -> Self {
        self.weights = weights;
        self
    }
}

/// Everything the pipeline computed
#[derive(Debug, Clone)]
pub struct SynthesisReport {
    /// All equilibria in solver order, each with A, B and its spectrum
    pub equilibria: Vec<ClassifiedEquilibrium>,
    /// The equilibrium the gain was designed for
    pub selected: ClassifiedEquilibrium,
    /// Riccati solution, gain and closed-loop spectrum
    pub lqr: LqrSolution,
    /// Frobenius norm of the CARE residual at the returned P
    pub residual: f64,
}

impl SynthesisReport {
    /// The synthesized gain
    pub fn gain(&self) -> &GainMatrix {
        &self.lqr.gain
    }
}

/// Runs the offline pipeline for one dynamics model
pub struct SynthesisPipeline<D: Dynamics> {
    dynamics: D,
    config: SynthesisConfig,
    synthesizer: LqrSynthesizer,
}

impl<D: Dynamics> SynthesisPipeline<D> {
    /// Create a pipeline
    pub fn new(dynamics: D, config: SynthesisConfig) -> Self {
        Self {
            dynamics,
            config,
            synthesizer: LqrSynthesizer::default(),
        }
    }

    /// Override the Riccati solver limits
    pub fn with_synthesizer(mut self, synthesizer: LqrSynthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    /// Get the dynamics model
    pub fn dynamics(&self) -> &D {
        &self.dynamics
    }

    /// Run every stage
    ///
    /// # Errors
    /// - [`crate::Error::NoEquilibrium`] if the solver finds nothing
    /// - [`crate::Error::NoUnstableEquilibrium`] if every point is stable
    /// - [`crate::Error::InvalidWeights`] / [`crate::Error::NotStabilizable`]
    ///   from the Riccati solve
    pub fn run(&self) -> Result<SynthesisReport> {
        let points = EquilibriumSolver::new(self.config.solver)
            .solve(&self.dynamics)
            .into_result()?;
        let equilibria = classify(&self.dynamics, &points);
        let selected = select_unstable(&equilibria)?.clone();

        let q = self.config.weights.q();
        let r = self.config.weights.r();
        let lqr = self
            .synthesizer
            .solve(&selected.model.a, &selected.model.b, &q, &r)?;
        let residual = riccati_residual(&selected.model.a, &selected.model.b, &q, &r, &lqr.riccati);

        tracing::info!(
            model = self.dynamics.name(),
            equilibria = equilibria.len(),
            selected = %selected.point,
            gain = %lqr.gain,
            residual,
            "synthesis complete"
        );

        Ok(SynthesisReport {
            equilibria,
            selected,
            lqr,
            residual,
        })
    }
}

fn write_matrix(f: &mut fmt::Formatter<'_>, m: &DMatrix<f64>) -> fmt::Result {
    write!(f, "[")?;
    for i in 0..m.nrows() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "[")?;
        for j in 0..m.ncols() {
            if j > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:.6}", m[(i, j)])?;
        }
        write!(f, "]")?;
    }
    write!(f, "]")
}

impl fmt::Display for SynthesisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Equilibria ({}):", self.equilibria.len())?;
        for (i, eq) in self.equilibria.iter().enumerate() {
            writeln!(f, "  [{}] {}", i + 1, eq.point)?;
            write!(f, "      A = ")?;
            write_matrix(f, &eq.model.a)?;
            writeln!(f)?;
            write!(f, "      B = ")?;
            write_matrix(f, &eq.model.b)?;
            writeln!(f)?;
            writeln!(f, "      eigenvalues: {}", eq.spectrum)?;
            writeln!(f, "      {}", eq.label())?;
        }
        writeln!(f, "Selected: {}", self.selected.point)?;
        write!(f, "P = ")?;
        write_matrix(f, &self.lqr.riccati)?;
        writeln!(f)?;
        writeln!(f, "K = {}", self.lqr.gain)?;
        writeln!(f, "Closed-loop eigenvalues: {}", self.lqr.closed_loop)?;
        write!(f, "Riccati residual: {:.3e}", self.residual)
    }
}
