//! balbot-core: synthesis and control core for a two-wheeled self-balancing robot
//!
//! The crate has two halves that meet at the gain matrix `K`:
//!
//! - an offline [`synthesis`] pipeline that finds the equilibria of the
//!   robot's nonlinear dynamics, linearizes about each, classifies their
//!   stability and solves the continuous algebraic Riccati equation for the
//!   unstable (upright) one;
//! - an online [`control`] loop that turns sensor frames into wheel velocity
//!   commands once per tick.
//!
//! # Modules
//!
//! - [`synthesis`] - Equilibria, Jacobians, spectra, LQR gain
//! - [`estimate`] - Sensor frame to state-error vector
//! - [`input`] - Key events to setpoints
//! - [`control`] - State-feedback and PID controllers, tick state machine
//! - [`actuator`] - Drive/steering split and saturation
//! - [`hardware`] - Sensor and actuator interfaces owned by the host
//! - [`sim`] - Mock plant implementing those interfaces
//! - [`config`] - Serializable configuration
//!
//! # Architecture
//!
//! ```text
//!  offline (once)                                   online (every tick)
//! ┌───────────┐  ┌───────────┐  ┌─────┐       ┌─────────┐  ┌────────────┐  ┌──────────┐
//! │ equilibria│─►│ linearize │─►│ LQR │──K──► │ estimate│─►│ controller │─►│ actuator │
//! └───────────┘  └───────────┘  └─────┘       └─────────┘  └────────────┘  └──────────┘
//!                                                  ▲ sensors       ▲ setpoints (input)
//! ```

#![warn(unused_must_use)]

pub mod actuator;
pub mod config;
pub mod control;
pub mod estimate;
pub mod hardware;
pub mod input;
pub mod math;
pub mod sim;
pub mod synthesis;

// Re-exports for convenience
pub use actuator::{ActuatorCommand, ActuatorMapper};
pub use config::{BalanceConfig, ControllerKind};
pub use control::{BalanceMachine, Controller, DriveCommand, Pid, PidConfig};
pub use estimate::{Estimate, Setpoints, StateEstimator, StateVector};
pub use hardware::{ActuatorSink, Joint, KeyEvent, SensorFrame, SensorSource};
pub use input::{InputShaper, InputState};
pub use synthesis::{
    Dynamics, EigenSpectrum, Equilibria, EquilibriumPoint, GainMatrix, LinearModel, LqrWeights,
    ReferenceDynamics, StabilityLabel, SynthesisPipeline, SynthesisReport,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for balbot-core
///
/// Offline pipeline errors are fatal to that run: no partial gain is ever
/// produced. Online errors are recovered per tick by the
/// [`BalanceMachine`], which holds the last actuator command.
///
/// # Example
/// ```ignore
/// match pipeline.run() {
///     Ok(report) => controller_gain = report.gain().clone(),
///     Err(Error::NoEquilibrium) => eprintln!("no controller derivable"),
///     Err(Error::NotStabilizable(msg)) => eprintln!("synthesis failed: {}", msg),
///     Err(e) => return Err(e),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
#[must_use = "errors must be handled or explicitly ignored with let _ = ..."]
#[non_exhaustive]
pub enum Error {
    /// The equilibrium solver found no real solution.
    /// Handle by: reporting that no controller can be derived for these dynamics.
    #[error("no equilibrium point found")]
    NoEquilibrium,

    /// Every equilibrium is stable (or marginal without a growing mode).
    /// Handle by: checking the dynamics; LQR synthesis refuses to pick a stable point.
    #[error("no equilibrium with an eigenvalue in the right half-plane")]
    NoUnstableEquilibrium,

    /// The Riccati solve failed or did not yield a stabilizing gain.
    /// Handle by: checking controllability of (A, B) and the weights.
    #[error("system is not stabilizable: {0}")]
    NotStabilizable(String),

    /// LQR weights have the wrong shape or definiteness.
    /// Handle by: using a positive definite R and a symmetric PSD Q.
    #[error("invalid LQR weights: {0}")]
    InvalidWeights(String),

    /// A sensor read failed or returned non-finite values.
    /// Handle by: holding the previous actuator command for this tick.
    #[error("sensor unavailable: {0}")]
    SensorUnavailable(String),

    /// Writing a joint command failed.
    /// Handle by: retrying next tick, stopping the robot if it persists.
    #[error("actuator error: {0}")]
    Actuator(String),

    /// Invalid configuration parameter.
    /// Handle by: validating config before use, checking parameter ranges.
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation attempted in invalid state (e.g., ticking an uninitialized machine).
    /// Handle by: calling `initialize` before the first tick.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Config(format!("I/O error: {}", e))
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(format!("TOML error: {}", e))
    }
}

/// Result type alias for balbot-core operations
pub type Result<T> = std::result::Result<T, Error>;
