//! Balance controllers and the per-tick state machine
//!
//! Both controller variants implement [`Controller`] and produce a
//! [`DriveCommand`]; the [`BalanceMachine`] owns whichever one the
//! configuration selects and runs it once per tick.

mod machine;
mod pid;
mod pid_balance;
mod state_feedback;

pub use machine::{BalanceMachine, ControlContext, MachineStats, Phase, Tick};
pub use pid::{Pid, PidConfig, PidState};
pub use pid_balance::PidBalanceController;
pub use state_feedback::StateFeedbackController;

use serde::{Deserialize, Serialize};

use crate::config::{BalanceConfig, ControllerKind};
use crate::estimate::{Estimate, Setpoints};
use crate::synthesis::GainMatrix;
use crate::Result;

/// Balance/drive command plus steering correction, before wheel mapping
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DriveCommand {
    /// Common-mode wheel velocity
    pub drive: f64,
    /// Differential correction (added to left, subtracted from right)
    pub steering: f64,
}

/// A balance control strategy
pub trait Controller: Send {
    /// Strategy name for logging
    fn name(&self) -> &str;

    /// Compute this tick's command
    ///
    /// Called exactly once per fresh estimate.
    fn compute(&mut self, estimate: &Estimate, setpoints: &Setpoints) -> DriveCommand;

    /// Clear any loop memory
    fn reset(&mut self) {}
}

/// Build the controller the configuration selects
///
/// A synthesized gain, when given, replaces the configured state-feedback
/// gains. It must be 1×4.
pub fn build_controller(config: &BalanceConfig, gain: Option<&GainMatrix>) -> Result<Box<dyn Controller>> {
    Ok(match config.controller {
        ControllerKind::StateFeedback => match gain {
            Some(gain) => Box::new(StateFeedbackController::from_gain(config.state_feedback, gain)?),
            None => Box::new(StateFeedbackController::new(config.state_feedback)),
        },
        ControllerKind::Pid => {
            if gain.is_some() {
                tracing::warn!("synthesized gain is ignored by the PID controller");
            }
            Box::new(PidBalanceController::new(config.pid))
        }
    })
}
