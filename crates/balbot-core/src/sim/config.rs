//! Mock plant configuration

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Physical parameters of the simulated robot
///
/// The body is an inverted pendulum on a massless axle; each wheel tracks
/// its commanded velocity through a first-order lag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantConfig {
    /// Control tick in seconds
    pub dt: f64,
    /// Integration substeps per tick
    pub substeps: usize,
    /// Gravity in m/s²
    pub gravity: f64,
    /// Axle to center of mass in meters
    pub pendulum_length: f64,
    /// Wheel radius in meters
    pub wheel_radius: f64,
    /// Wheel velocity lag in seconds
    pub wheel_time_constant: f64,
    /// Distance between the wheels in meters
    pub track_width: f64,
    /// Tilt magnitude at which the robot has fallen (rad)
    pub fall_angle: f64,
    /// Tilt at reset (rad)
    pub initial_tilt: f64,
    /// Arm joint travel (rad)
    pub arm_range: [f64; 2],
    /// Gripper joint travel
    pub gripper_range: [f64; 2],
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            dt: 0.01,     // 100 Hz
            substeps: 10, // Effective 1 kHz integration
            gravity: 9.81,
            pendulum_length: 0.12,
            wheel_radius: 0.05,
            wheel_time_constant: 0.05,
            track_width: 0.2,
            fall_angle: 1.2,
            initial_tilt: 0.0,
            arm_range: [-1.5, 1.5],
            gripper_range: [0.0, 0.7],
        }
    }
}

impl PlantConfig {
    /// Coarser integration for quick runs
    pub fn fast() -> Self {
        Self {
            substeps: 2,
            ..Default::default()
        }
    }

    /// Set the tilt at reset
    pub fn with_initial_tilt(mut self, tilt: f64) -> Self {
        self.initial_tilt = tilt;
        self
    }

    /// Set the control tick
    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    /// Set the wheel lag
    pub fn with_wheel_time_constant(mut self, tau: f64) -> Self {
        self.wheel_time_constant = tau;
        self
    }

    /// Integration step
    pub fn substep_dt(&self) -> f64 {
        self.dt / self.substeps as f64
    }

    /// Check parameter ranges
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("dt", self.dt),
            ("gravity", self.gravity),
            ("pendulum_length", self.pendulum_length),
            ("wheel_radius", self.wheel_radius),
            ("wheel_time_constant", self.wheel_time_constant),
            ("track_width", self.track_width),
            ("fall_angle", self.fall_angle),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Config(format!("{} must be positive, got {}", name, value)));
            }
        }
        if self.substeps == 0 {
            return Err(Error::Config("substeps must be at least 1".into()));
        }
        if !self.initial_tilt.is_finite() || self.initial_tilt.abs() >= self.fall_angle {
            return Err(Error::Config(format!(
                "initial tilt {} is not inside the fall angle {}",
                self.initial_tilt, self.fall_angle
            )));
        }
        Ok(())
    }
}
