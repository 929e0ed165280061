//! State estimation
//!
//! Turns a raw [`SensorFrame`] into the 4-component error vector both
//! controllers consume. No filtering: readings are used as delivered.
//!
//! Sign convention (shared by every controller):
//!
//! ```text
//! x[0] = -tilt
//! x[1] = -tilt_rate
//! x[2] = position - desired_position
//! x[3] = velocity                      (VelocityTerm::Absolute)
//!      | velocity - desired_velocity   (VelocityTerm::RelativeToSetpoint)
//! ```

use std::ops::Index;

use nalgebra::Vector4;
use serde::{Deserialize, Serialize};

use crate::config::{EstimatorConfig, PositionSource, VelocityTerm};
use crate::hardware::SensorFrame;
use crate::{Error, Result};

/// The state-error vector
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StateVector(Vector4<f64>);

impl StateVector {
    pub const TILT_ANGLE: usize = 0;
    pub const TILT_VELOCITY: usize = 1;
    pub const WHEEL_POSITION_ERROR: usize = 2;
    pub const WHEEL_VELOCITY: usize = 3;

    /// Create from components
    pub fn new(components: [f64; 4]) -> Self {
        Self(Vector4::from(components))
    }

    /// Underlying vector
    pub fn as_vector(&self) -> &Vector4<f64> {
        &self.0
    }

    /// `gains · x`
    #[inline]
    pub fn dot(&self, gains: &[f64; 4]) -> f64 {
        self.0.dot(&Vector4::from(*gains))
    }
}

impl Index<usize> for StateVector {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}

/// Estimator output for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Estimate {
    pub x: StateVector,
    /// Measured heading
    pub yaw: f64,
    /// Host clock at the frame
    pub time: f64,
    /// Tick duration
    pub dt: f64,
}

/// Operator and planner targets
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Setpoints {
    /// Target position (advanced by `desired_velocity × dt` every tick)
    pub desired_position: f64,
    pub desired_velocity: f64,
    pub desired_yaw: f64,
    /// Steering input in `[-1, 1]`
    pub turn_input: f64,
    /// Arm input in `[-1, 1]`
    pub arm_input: f64,
    /// Gripper input in `[-1, 1]`
    pub gripper_input: f64,
    /// Set while a drive command is active this tick
    pub movement_active: bool,
}

/// Builds the state vector from sensor frames
#[derive(Debug, Clone, Copy, Default)]
pub struct StateEstimator {
    config: EstimatorConfig,
}

impl StateEstimator {
    /// Create an estimator
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Advance the desired position and compute the error vector
    ///
    /// # Errors
    /// [`Error::SensorUnavailable`] if the frame holds a non-finite value or
    /// a negative tick duration. Setpoints are left untouched in that case.
    pub fn estimate(&self, frame: &SensorFrame, setpoints: &mut Setpoints) -> Result<Estimate> {
        if !frame.is_finite() {
            return Err(Error::SensorUnavailable("non-finite sensor reading".into()));
        }
        if frame.dt < 0.0 {
            return Err(Error::SensorUnavailable(format!(
                "negative tick duration {}",
                frame.dt
            )));
        }

        setpoints.desired_position += setpoints.desired_velocity * frame.dt;

        let (position, velocity) = match self.config.position_source {
            PositionSource::WheelJoint => (frame.wheel_position, frame.wheel_velocity),
            PositionSource::Body => (frame.body_position, frame.body_velocity),
        };
        let velocity_term = match self.config.velocity_term {
            VelocityTerm::Absolute => velocity,
            VelocityTerm::RelativeToSetpoint => velocity - setpoints.desired_velocity,
        };

        let x = StateVector::new([
            -frame.tilt,
            -frame.tilt_rate,
            position - setpoints.desired_position,
            velocity_term,
        ]);
        tracing::trace!(x = ?x.as_vector().as_slice(), time = frame.time, "state estimate");

        Ok(Estimate {
            x,
            yaw: frame.yaw,
            time: frame.time,
            dt: frame.dt,
        })
    }
}
