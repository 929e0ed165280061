//! Offline controller synthesis
//!
//! Stages, each usable on its own:
//!
//! 1. [`EquilibriumSolver`] finds every isolated root of `f(x, 0) = 0`
//! 2. [`LinearModel`] holds the exact Jacobians `A`, `B` at a root
//! 3. [`EigenSpectrum`] classifies the root as stable or unstable
//! 4. [`LqrSynthesizer`] solves the Riccati equation for the gain `K`
//!
//! [`SynthesisPipeline`] chains them and picks the first unstable root.
//!
//! # Example
//! ```
//! use balbot_core::synthesis::{ReferenceDynamics, SynthesisConfig, SynthesisPipeline};
//!
//! let report = SynthesisPipeline::new(ReferenceDynamics, SynthesisConfig::default())
//!     .run()
//!     .unwrap();
//! assert_eq!(report.equilibria.len(), 3);
//! println!("K = {}", report.gain());
//! ```

mod dynamics;
mod equilibrium;
mod linearize;
mod lqr;
mod pipeline;
mod stability;

pub use dynamics::{Dynamics, ReferenceDynamics};
pub use equilibrium::{Equilibria, EquilibriumPoint, EquilibriumSolver, SolverConfig};
pub use linearize::{jacobians, LinearModel};
pub use lqr::{riccati_residual, GainMatrix, LqrSolution, LqrSynthesizer, LqrWeights};
pub use pipeline::{SynthesisConfig, SynthesisPipeline, SynthesisReport};
pub use stability::{
    classify, select_unstable, ClassifiedEquilibrium, EigenSpectrum, Eigenvalue, StabilityLabel,
};
