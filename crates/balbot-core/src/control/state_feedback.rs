//! Full state feedback `u = −K·x`

use super::{Controller, DriveCommand};
use crate::config::{StateFeedbackConfig, YawPolicy};
use crate::estimate::{Estimate, Setpoints};
use crate::math::{angle_diff, clamp_symmetric};
use crate::synthesis::GainMatrix;
use crate::Result;

/// Linear state-feedback balance controller
///
/// Stateless between ticks: the output depends only on the current estimate
/// and setpoints.
#[derive(Debug, Clone)]
pub struct StateFeedbackController {
    config: StateFeedbackConfig,
}

impl StateFeedbackController {
    /// Create from configuration
    pub fn new(config: StateFeedbackConfig) -> Self {
        Self { config }
    }

    /// Use a synthesized 1×4 gain instead of the configured one
    pub fn from_gain(config: StateFeedbackConfig, gain: &GainMatrix) -> Result<Self> {
        Ok(Self::new(config.with_gains(gain.to_state_gains::<4>()?)))
    }

    /// Active gain row
    pub fn gains(&self) -> &[f64; 4] {
        &self.config.gains
    }

    /// Get the configuration
    pub fn config(&self) -> &StateFeedbackConfig {
        &self.config
    }

    fn yaw_correction(&self, estimate: &Estimate, setpoints: &Setpoints) -> f64 {
        match self.config.yaw {
            YawPolicy::Heading { gain } => gain * angle_diff(setpoints.desired_yaw, estimate.yaw),
            YawPolicy::Manual { gain } => gain * setpoints.turn_input,
        }
    }
}

impl Controller for StateFeedbackController {
    fn name(&self) -> &str {
        "state_feedback"
    }

    fn compute(&mut self, estimate: &Estimate, setpoints: &Setpoints) -> DriveCommand {
        let mut u = -estimate.x.dot(&self.config.gains);
        if self.config.feedforward {
            u += setpoints.desired_velocity;
        }

        let (drive, saturated) = clamp_symmetric(u, self.config.command_limit);
        if saturated {
            tracing::debug!(u, limit = self.config.command_limit, "drive command saturated");
        }

        DriveCommand {
            drive,
            steering: self.yaw_correction(estimate, setpoints),
        }
    }
}
