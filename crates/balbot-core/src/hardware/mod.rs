//! Hardware abstraction
//!
//! Sensor and actuator interfaces the host runtime implements, plus the key
//! codes the host reports for the teleoperation keys.

mod traits;

pub use traits::{ActuatorSink, Joint, KeyEvent, SensorFrame, SensorSource};

/// Host key codes
pub mod keys {
    pub const UP: i32 = 2007;
    pub const DOWN: i32 = 2008;
    pub const RIGHT: i32 = 2009;
    pub const LEFT: i32 = 2010;

    /// `w`: raise arm
    pub const ARM_RAISE: i32 = 119;
    /// `s`: lower arm
    pub const ARM_LOWER: i32 = 115;
    /// `q`: open gripper
    pub const GRIPPER_OPEN: i32 = 113;
    /// `e`: close gripper
    pub const GRIPPER_CLOSE: i32 = 101;
}
