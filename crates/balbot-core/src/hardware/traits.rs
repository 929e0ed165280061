//! Host I/O traits
//!
//! The simulator or robot runtime owns the sensors and motors; the control
//! core only sees these two interfaces, so the same loop runs against the
//! mock plant or a real host.

use serde::{Deserialize, Serialize};

use crate::Result;

/// One tick's worth of sensor readings
///
/// Angles in radians, rates in rad/s, positions in metres. `tilt` is the
/// pitch of the body away from upright.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorFrame {
    /// Body pitch
    pub tilt: f64,
    /// Body pitch rate
    pub tilt_rate: f64,
    /// Heading about the vertical axis
    pub yaw: f64,
    /// Wheel joint angle (mean of both wheels)
    pub wheel_position: f64,
    /// Wheel joint rate (mean of both wheels)
    pub wheel_velocity: f64,
    /// Body position along the travel axis
    pub body_position: f64,
    /// Body velocity along the travel axis
    pub body_velocity: f64,
    /// Duration of this tick in seconds
    pub dt: f64,
    /// Host clock in seconds
    pub time: f64,
}

impl SensorFrame {
    /// Check that every reading is a finite number
    pub fn is_finite(&self) -> bool {
        [
            self.tilt,
            self.tilt_rate,
            self.yaw,
            self.wheel_position,
            self.wheel_velocity,
            self.body_position,
            self.body_velocity,
            self.dt,
            self.time,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// A raw key event from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyEvent {
    pub code: i32,
}

impl KeyEvent {
    /// Create from a host key code
    pub fn new(code: i32) -> Self {
        Self { code }
    }
}

/// Velocity-controlled joints the core drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Joint {
    LeftWheel,
    RightWheel,
    Arm,
    Gripper,
}

impl Joint {
    /// All joints in write order
    pub const ALL: [Joint; 4] = [Joint::LeftWheel, Joint::RightWheel, Joint::Arm, Joint::Gripper];
}

impl std::fmt::Display for Joint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LeftWheel => write!(f, "left_wheel"),
            Self::RightWheel => write!(f, "right_wheel"),
            Self::Arm => write!(f, "arm"),
            Self::Gripper => write!(f, "gripper"),
        }
    }
}

/// Sensor side of the host
pub trait SensorSource {
    /// Read the current frame
    ///
    /// Returns [`crate::Error::SensorUnavailable`] when the host cannot
    /// provide a reading this tick.
    fn read(&mut self) -> Result<SensorFrame>;

    /// Pop the next pending key event, if any
    fn poll_event(&mut self) -> Option<KeyEvent>;
}

/// Actuator side of the host
pub trait ActuatorSink {
    /// Command a joint velocity (rad/s)
    fn set_joint_velocity(&mut self, joint: Joint, velocity: f64) -> Result<()>;
}
