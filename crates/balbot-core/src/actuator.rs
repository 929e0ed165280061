//! Actuator mapping
//!
//! Splits the drive/steering pair into wheel velocities and clamps every
//! joint to its limit. Saturation is expected near the edge of the
//! recoverable envelope and is only logged.

use serde::{Deserialize, Serialize};

use crate::config::ActuatorConfig;
use crate::control::DriveCommand;
use crate::estimate::Setpoints;
use crate::hardware::{ActuatorSink, Joint};
use crate::math::clamp_symmetric;
use crate::Result;

/// Joint velocity targets for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ActuatorCommand {
    pub left: f64,
    pub right: f64,
    pub arm: f64,
    pub gripper: f64,
}

impl ActuatorCommand {
    /// All joints stopped
    pub const ZERO: Self = Self {
        left: 0.0,
        right: 0.0,
        arm: 0.0,
        gripper: 0.0,
    };

    /// Velocity for one joint
    pub fn get(&self, joint: Joint) -> f64 {
        match joint {
            Joint::LeftWheel => self.left,
            Joint::RightWheel => self.right,
            Joint::Arm => self.arm,
            Joint::Gripper => self.gripper,
        }
    }
}

/// Maps controller output to joint commands
#[derive(Debug, Clone, Copy, Default)]
pub struct ActuatorMapper {
    config: ActuatorConfig,
}

impl ActuatorMapper {
    /// Create a mapper
    pub fn new(config: ActuatorConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &ActuatorConfig {
        &self.config
    }

    /// `left = drive + steering`, `right = drive − steering`, then clamp
    pub fn map(&self, command: &DriveCommand, setpoints: &Setpoints) -> ActuatorCommand {
        let c = &self.config;
        let out = ActuatorCommand {
            left: self.clamp(Joint::LeftWheel, command.drive + command.steering, c.max_wheel_velocity),
            right: self.clamp(Joint::RightWheel, command.drive - command.steering, c.max_wheel_velocity),
            arm: self.clamp(Joint::Arm, setpoints.arm_input * c.arm_rate, c.max_arm_velocity),
            gripper: self.clamp(
                Joint::Gripper,
                setpoints.gripper_input * c.gripper_rate,
                c.max_gripper_velocity,
            ),
        };
        tracing::trace!(?out, "actuator command");
        out
    }

    fn clamp(&self, joint: Joint, value: f64, limit: f64) -> f64 {
        let (clamped, saturated) = clamp_symmetric(value, limit);
        if saturated {
            tracing::debug!(%joint, requested = value, limit, "joint velocity saturated");
        }
        clamped
    }

    /// Write every joint, even past a failed one
    ///
    /// Returns the first failure after all joints have been attempted.
    pub fn write<A: ActuatorSink + ?Sized>(&self, command: &ActuatorCommand, sink: &mut A) -> Result<()> {
        let mut first_error = None;
        for joint in Joint::ALL {
            if let Err(e) = sink.set_joint_velocity(joint, command.get(joint)) {
                tracing::warn!(%joint, error = %e, "joint write failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[derive(Default)]
    struct Recorder {
        writes: Vec<(Joint, f64)>,
        fail_on: Option<Joint>,
    }

    impl ActuatorSink for Recorder {
        fn set_joint_velocity(&mut self, joint: Joint, velocity: f64) -> Result<()> {
            if self.fail_on == Some(joint) {
                return Err(Error::Actuator(format!("{} offline", joint)));
            }
            self.writes.push((joint, velocity));
            Ok(())
        }
    }

    #[test]
    fn test_zero_in_zero_out() {
        let mapper = ActuatorMapper::default();
        let out = mapper.map(&DriveCommand::default(), &Setpoints::default());
        assert_eq!(out, ActuatorCommand::ZERO);
    }

    #[test]
    fn test_steering_split() {
        let mapper = ActuatorMapper::default();
        let out = mapper.map(
            &DriveCommand {
                drive: 2.0,
                steering: 0.5,
            },
            &Setpoints::default(),
        );
        assert_eq!(out.left, 2.5);
        assert_eq!(out.right, 1.5);
    }

    #[test]
    fn test_clamp_is_exact() {
        let mapper = ActuatorMapper::default();
        let out = mapper.map(
            &DriveCommand {
                drive: 12.0,
                steering: 0.0,
            },
            &Setpoints::default(),
        );
        assert_eq!(out.left, 10.0);
        assert_eq!(out.right, 10.0);

        let out = mapper.map(
            &DriveCommand {
                drive: -9.0,
                steering: 8.0,
            },
            &Setpoints::default(),
        );
        assert_eq!(out.left, -1.0);
        assert_eq!(out.right, -10.0);
    }

    #[test]
    fn test_arm_and_gripper_rates() {
        let mapper = ActuatorMapper::default();
        let setpoints = Setpoints {
            arm_input: -1.0,
            gripper_input: 1.0,
            ..Default::default()
        };
        let out = mapper.map(&DriveCommand::default(), &setpoints);
        assert_eq!(out.arm, -5.0);
        assert_eq!(out.gripper, 0.7);
    }

    #[test]
    fn test_write_order_and_failure() {
        let mapper = ActuatorMapper::default();
        let cmd = ActuatorCommand {
            left: 1.0,
            right: 2.0,
            arm: 3.0,
            gripper: 4.0,
        };

        let mut sink = Recorder::default();
        mapper.write(&cmd, &mut sink).unwrap();
        assert_eq!(
            sink.writes,
            vec![
                (Joint::LeftWheel, 1.0),
                (Joint::RightWheel, 2.0),
                (Joint::Arm, 3.0),
                (Joint::Gripper, 4.0)
            ]
        );

        let mut failing = Recorder {
            fail_on: Some(Joint::RightWheel),
            ..Default::default()
        };
        assert!(matches!(mapper.write(&cmd, &mut failing), Err(Error::Actuator(_))));
        // Joints after the failed one are still written
        assert_eq!(
            failing.writes,
            vec![(Joint::LeftWheel, 1.0), (Joint::Arm, 3.0), (Joint::Gripper, 4.0)]
        );
    }
}
