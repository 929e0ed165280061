//! Simulation backend trait

use serde::{Deserialize, Serialize};

use crate::hardware::{ActuatorSink, SensorSource};
use crate::Result;

use super::PlantConfig;

/// Ground-truth plant state after a step
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SimState {
    /// Body tilt (rad, positive leans toward negative travel)
    pub tilt: f64,
    /// Tilt rate (rad/s)
    pub tilt_rate: f64,
    /// Heading (rad, unwrapped)
    pub yaw: f64,
    /// Left and right wheel angles (rad)
    pub wheel_angles: [f64; 2],
    /// Left and right wheel rates (rad/s)
    pub wheel_rates: [f64; 2],
    /// Arm joint position
    pub arm: f64,
    /// Gripper joint position
    pub gripper: f64,
    /// Simulation time in seconds
    pub sim_time: f64,
    /// Episode terminated (fell over)
    pub terminated: bool,
}

impl SimState {
    /// Mean wheel angle
    pub fn wheel_position(&self) -> f64 {
        0.5 * (self.wheel_angles[0] + self.wheel_angles[1])
    }

    /// Mean wheel rate
    pub fn wheel_velocity(&self) -> f64 {
        0.5 * (self.wheel_rates[0] + self.wheel_rates[1])
    }
}

/// Result from stepping the simulation
#[derive(Debug, Clone, Copy)]
pub struct StepResult {
    /// New state after step
    pub state: SimState,
    /// Whether the episode is done
    pub done: bool,
}

/// Trait for simulation backends
///
/// A backend is also the host: the control loop reads it as a
/// [`SensorSource`] and commands it as an [`ActuatorSink`], then the
/// driver calls [`step`](Self::step) to advance one tick under the last
/// command.
pub trait SimBackend: SensorSource + ActuatorSink {
    /// Get the backend name
    fn name(&self) -> &str;

    /// Get the plant configuration
    fn config(&self) -> &PlantConfig;

    /// Reset the simulation to its initial state
    fn reset(&mut self) -> Result<SimState>;

    /// Advance one control tick
    fn step(&mut self) -> Result<StepResult>;

    /// Get current state without stepping
    fn state(&self) -> SimState;

    /// Get current simulation time
    fn sim_time(&self) -> f64 {
        self.state().sim_time
    }

    /// Check whether the robot has fallen
    fn has_fallen(&self) -> bool {
        self.state().terminated
    }
}
