//! Configuration
//!
//! Every tunable of the online loop lives here with its default. Configs are
//! plain serde structs, loadable from TOML:
//!
//! ```toml
//! controller = "pid"
//!
//! [estimator]
//! position_source = "body"
//!
//! [input]
//! mode = "position"
//! key_timeout = 0.0
//! ```

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::control::PidConfig;
use crate::synthesis::LqrWeights;
use crate::{Error, Result};

/// Which controller drives the wheels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerKind {
    /// `u = -K·x`
    #[default]
    StateFeedback,
    /// Cascaded tilt/position PID
    Pid,
}

impl std::fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StateFeedback => write!(f, "state_feedback"),
            Self::Pid => write!(f, "pid"),
        }
    }
}

/// How the steering correction is computed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum YawPolicy {
    /// `gain × wrap(desired_yaw − yaw)`
    Heading { gain: f64 },
    /// `gain × turn_input`
    Manual { gain: f64 },
}

impl Default for YawPolicy {
    fn default() -> Self {
        Self::Heading { gain: 0.0 }
    }
}

/// State-feedback controller settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateFeedbackConfig {
    /// K over [tilt, tilt rate, wheel position error, wheel velocity]
    pub gains: [f64; 4],
    /// Drive command saturates at `±command_limit`
    pub command_limit: f64,
    /// Add the desired velocity to the drive command before clamping
    pub feedforward: bool,
    pub yaw: YawPolicy,
}

impl Default for StateFeedbackConfig {
    fn default() -> Self {
        Self {
            gains: [-120.0, -50.0, -5.0, -15.0],
            command_limit: 10.0,
            feedforward: false,
            yaw: YawPolicy::default(),
        }
    }
}

impl StateFeedbackConfig {
    /// Tuning for keyboard teleoperation: softer position gain, feedforward
    /// and manual steering
    pub fn teleop() -> Self {
        Self {
            gains: [-110.0, -40.0, -0.8, -10.0],
            command_limit: 7.0,
            feedforward: true,
            yaw: YawPolicy::Manual { gain: 1.2 },
        }
    }

    /// Set the gain row
    pub fn with_gains(mut self, gains: [f64; 4]) -> Self {
        self.gains = gains;
        self
    }

    /// Set the drive saturation
    pub fn with_command_limit(mut self, limit: f64) -> Self {
        self.command_limit = limit;
        self
    }

    /// Enable or disable velocity feedforward
    pub fn with_feedforward(mut self, enabled: bool) -> Self {
        self.feedforward = enabled;
        self
    }

    /// Set the yaw policy
    pub fn with_yaw(mut self, yaw: YawPolicy) -> Self {
        self.yaw = yaw;
        self
    }
}

/// Where the position component of the state comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSource {
    /// Wheel joint angle and rate
    #[default]
    WheelJoint,
    /// Body position and velocity along the travel axis
    Body,
}

/// How the fourth state component is formed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityTerm {
    /// Measured velocity
    #[default]
    Absolute,
    /// Measured velocity minus the desired velocity
    RelativeToSetpoint,
}

/// State estimator settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub position_source: PositionSource,
    pub velocity_term: VelocityTerm,
}

/// Cascaded PID balance controller settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidBalanceConfig {
    /// Tilt loop (target upright)
    #[serde(deserialize_with = "tilt_loop")]
    pub tilt: PidConfig,
    /// Position loop (target desired position)
    #[serde(deserialize_with = "position_loop")]
    pub position: PidConfig,
    /// Fixed integration weight used in place of the tick duration
    pub dt_weight: f64,
    /// Below this distance to target the position gains are scheduled down
    pub decel_threshold: f64,
    /// Below this distance the position integral is damped every tick
    pub stop_threshold: f64,
    /// Position kp multiplier at zero distance
    pub kp_floor: f64,
    /// Position kd multiplier at zero distance
    pub kd_floor: f64,
    /// Position integral multiplier applied inside the stop threshold
    pub stop_integral_decay: f64,
    /// Position integral multiplier applied on ticks without a movement command
    pub idle_integral_decay: f64,
    /// Drive command per unit of combined PID output
    pub wheel_speed_gain: f64,
    /// Steering per unit of turn input
    pub turn_rate: f64,
}

impl Default for PidBalanceConfig {
    fn default() -> Self {
        Self {
            tilt: PidConfig::new(15.0, 2.0, 0.2).with_integral_limit(10.0),
            position: PidConfig::new(50.0, 0.6, 0.6).with_integral_limit(10.0),
            dt_weight: 0.5,
            decel_threshold: 0.15,
            stop_threshold: 0.02,
            kp_floor: 0.3,
            kd_floor: 0.5,
            stop_integral_decay: 0.5,
            idle_integral_decay: 0.9,
            wheel_speed_gain: 10.0,
            turn_rate: 8.0,
        }
    }
}

/// A `[pid.tilt]` or `[pid.position]` table; omitted keys keep the loop's
/// default rather than a bare [`PidConfig`]
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PidLoopTable {
    kp: Option<f64>,
    ki: Option<f64>,
    kd: Option<f64>,
    integral_limit: Option<f64>,
}

impl PidLoopTable {
    fn over(self, base: PidConfig) -> PidConfig {
        PidConfig {
            kp: self.kp.unwrap_or(base.kp),
            ki: self.ki.unwrap_or(base.ki),
            kd: self.kd.unwrap_or(base.kd),
            integral_limit: self.integral_limit.unwrap_or(base.integral_limit),
        }
    }
}

fn tilt_loop<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<PidConfig, D::Error> {
    Ok(PidLoopTable::deserialize(d)?.over(PidBalanceConfig::default().tilt))
}

fn position_loop<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<PidConfig, D::Error> {
    Ok(PidLoopTable::deserialize(d)?.over(PidBalanceConfig::default().position))
}

/// How drive keys are turned into setpoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Up/down command a forward velocity while held
    #[default]
    Velocity,
    /// Up/down step the target position
    Position,
}

/// Input shaping settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub mode: InputMode,
    /// Seconds after the last event before all buttons release
    pub key_timeout: f64,
    /// Desired velocity while up/down is held (velocity mode)
    pub forward_speed: f64,
    /// Turn input while left/right is held
    pub turn_magnitude: f64,
    /// Target position change per up/down event (position mode)
    pub target_step: f64,
    /// A step is accepted only if it moves the target less than this from
    /// its value at the end of the previous tick
    pub max_target_step: f64,
    /// Constant desired velocity added to the key command (velocity mode)
    pub cruise_velocity: f64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            mode: InputMode::Velocity,
            key_timeout: 0.2,
            forward_speed: 0.25,
            turn_magnitude: 1.0,
            target_step: 0.01,
            max_target_step: 0.1,
            cruise_velocity: 0.0,
        }
    }
}

/// Actuator mapping settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    /// Wheel commands saturate at `±max_wheel_velocity`
    pub max_wheel_velocity: f64,
    /// Arm velocity per unit of arm input
    pub arm_rate: f64,
    /// Gripper velocity per unit of gripper input
    pub gripper_rate: f64,
    pub max_arm_velocity: f64,
    pub max_gripper_velocity: f64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            max_wheel_velocity: 10.0,
            arm_rate: 5.0,
            gripper_rate: 0.7,
            max_arm_velocity: 5.0,
            max_gripper_velocity: 1.0,
        }
    }
}

/// Complete online-loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    pub controller: ControllerKind,
    pub state_feedback: StateFeedbackConfig,
    pub pid: PidBalanceConfig,
    pub estimator: EstimatorConfig,
    pub input: InputConfig,
    pub actuator: ActuatorConfig,
    /// Weights used when synthesizing gains for the 4-state balance model
    pub lqr: LqrWeights,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            controller: ControllerKind::StateFeedback,
            state_feedback: StateFeedbackConfig::default(),
            pid: PidBalanceConfig::default(),
            estimator: EstimatorConfig::default(),
            input: InputConfig::default(),
            actuator: ActuatorConfig::default(),
            lqr: LqrWeights::new(vec![100.0, 1.0, 10.0, 1.0], vec![1.0]),
        }
    }
}

impl BalanceConfig {
    /// State feedback tuned for teleoperation
    pub fn teleop() -> Self {
        Self {
            state_feedback: StateFeedbackConfig::teleop(),
            estimator: EstimatorConfig {
                velocity_term: VelocityTerm::RelativeToSetpoint,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// PID balance with position stepping on the body position
    pub fn pid_position() -> Self {
        Self {
            controller: ControllerKind::Pid,
            estimator: EstimatorConfig {
                position_source: PositionSource::Body,
                ..Default::default()
            },
            input: InputConfig {
                mode: InputMode::Position,
                key_timeout: 0.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Select the controller
    pub fn with_controller(mut self, kind: ControllerKind) -> Self {
        self.controller = kind;
        self
    }

    /// Set the state-feedback settings
    pub fn with_state_feedback(mut self, config: StateFeedbackConfig) -> Self {
        self.state_feedback = config;
        self
    }

    /// Set the input settings
    pub fn with_input(mut self, config: InputConfig) -> Self {
        self.input = config;
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Check parameter ranges
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, value: f64) -> Result<()> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(Error::Config(format!("{} must be positive, got {}", name, value)))
            }
        }
        fn non_negative(name: &str, value: f64) -> Result<()> {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(Error::Config(format!("{} must be non-negative, got {}", name, value)))
            }
        }

        if !self.state_feedback.gains.iter().all(|g| g.is_finite()) {
            return Err(Error::Config("state_feedback.gains must be finite".into()));
        }
        positive("state_feedback.command_limit", self.state_feedback.command_limit)?;

        let pid = &self.pid;
        positive("pid.dt_weight", pid.dt_weight)?;
        non_negative("pid.stop_threshold", pid.stop_threshold)?;
        positive("pid.decel_threshold", pid.decel_threshold)?;
        if pid.stop_threshold > pid.decel_threshold {
            return Err(Error::Config(
                "pid.stop_threshold must not exceed pid.decel_threshold".into(),
            ));
        }
        for (name, value) in [
            ("pid.stop_integral_decay", pid.stop_integral_decay),
            ("pid.idle_integral_decay", pid.idle_integral_decay),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!("{} must be in [0, 1], got {}", name, value)));
            }
        }
        for (name, gains) in [("pid.tilt", &pid.tilt), ("pid.position", &pid.position)] {
            if !gains.is_valid() {
                return Err(Error::Config(format!(
                    "{} needs finite gains and a non-negative integral_limit, got {:?}",
                    name, gains
                )));
            }
        }

        non_negative("input.key_timeout", self.input.key_timeout)?;
        non_negative("input.forward_speed", self.input.forward_speed)?;
        positive("input.max_target_step", self.input.max_target_step)?;
        if !self.input.cruise_velocity.is_finite() {
            return Err(Error::Config(format!(
                "input.cruise_velocity must be finite, got {}",
                self.input.cruise_velocity
            )));
        }

        positive("actuator.max_wheel_velocity", self.actuator.max_wheel_velocity)?;
        non_negative("actuator.max_arm_velocity", self.actuator.max_arm_velocity)?;
        non_negative("actuator.max_gripper_velocity", self.actuator.max_gripper_velocity)?;

        if self.lqr.q_diagonal.len() != 4 || self.lqr.r_diagonal.len() != 1 {
            return Err(Error::Config(format!(
                "lqr weights must have 4 state and 1 input entries, got {} and {}",
                self.lqr.q_diagonal.len(),
                self.lqr.r_diagonal.len()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BalanceConfig::default();
        assert_eq!(config.controller, ControllerKind::StateFeedback);
        assert_eq!(config.state_feedback.gains, [-120.0, -50.0, -5.0, -15.0]);
        assert_eq!(config.actuator.max_wheel_velocity, 10.0);
        assert_eq!(config.pid.tilt.kp, 15.0);
        assert_eq!(config.pid.position.integral_limit, 10.0);
        assert_eq!(config.input.key_timeout, 0.2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        let teleop = BalanceConfig::teleop();
        assert!(teleop.state_feedback.feedforward);
        assert_eq!(teleop.state_feedback.yaw, YawPolicy::Manual { gain: 1.2 });
        assert_eq!(teleop.estimator.velocity_term, VelocityTerm::RelativeToSetpoint);

        let pid = BalanceConfig::pid_position();
        assert_eq!(pid.controller, ControllerKind::Pid);
        assert_eq!(pid.estimator.position_source, PositionSource::Body);
        assert_eq!(pid.input.mode, InputMode::Position);
        assert!(pid.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = BalanceConfig::from_toml_str(
            r#"
            controller = "pid"

            [state_feedback]
            command_limit = 5.0
            yaw = { mode = "manual", gain = 2.0 }

            [input]
            mode = "position"
            "#,
        )
        .unwrap();

        assert_eq!(config.controller, ControllerKind::Pid);
        assert_eq!(config.state_feedback.command_limit, 5.0);
        assert_eq!(config.state_feedback.gains, [-120.0, -50.0, -5.0, -15.0]);
        assert_eq!(config.state_feedback.yaw, YawPolicy::Manual { gain: 2.0 });
        assert_eq!(config.input.mode, InputMode::Position);
        assert_eq!(config.input.forward_speed, 0.25);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = BalanceConfig::default();
        config.actuator.max_wheel_velocity = 0.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = BalanceConfig::default();
        config.pid.stop_threshold = 0.5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = BalanceConfig::default();
        config.lqr = LqrWeights::default();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        assert!(matches!(
            BalanceConfig::from_toml_str("controller = \"fuzzy\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_partial_pid_table_keeps_loop_defaults() {
        let config = BalanceConfig::from_toml_str(
            r#"
            controller = "pid"

            [pid.tilt]
            kp = 20.0

            [pid.position]
            integral_limit = 4.0
            "#,
        )
        .unwrap();

        let tilt = config.pid.tilt;
        assert_eq!((tilt.kp, tilt.ki, tilt.kd, tilt.integral_limit), (20.0, 2.0, 0.2, 10.0));
        let position = config.pid.position;
        assert_eq!(
            (position.kp, position.ki, position.kd, position.integral_limit),
            (50.0, 0.6, 0.6, 4.0)
        );
        assert_eq!(config.pid.dt_weight, 0.5);
    }

    #[test]
    fn test_pid_loop_validation() {
        // Output limits are not a loop setting
        let stale = "controller = \"pid\"\n[pid.tilt]\nkp = 15.0\nki = 2.0\nkd = 0.2\n\
                     integral_limit = 10.0\noutput_min = 1.0\noutput_max = -1.0";
        assert!(matches!(BalanceConfig::from_toml_str(stale), Err(Error::Config(_))));

        for limit in ["nan", "-1.0"] {
            let doc = format!("[pid.tilt]\nintegral_limit = {}", limit);
            assert!(matches!(BalanceConfig::from_toml_str(&doc), Err(Error::Config(_))), "{}", limit);
        }
        let unlimited = BalanceConfig::from_toml_str("[pid.position]\nintegral_limit = inf").unwrap();
        assert_eq!(unlimited.pid.position.integral_limit, f64::INFINITY);

        let mut config = BalanceConfig::pid_position();
        config.pid.position.kd = f64::NAN;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_cruise_velocity() {
        let config = BalanceConfig::from_toml_str("[input]\ncruise_velocity = 0.1").unwrap();
        assert_eq!(config.input.cruise_velocity, 0.1);
        assert_eq!(BalanceConfig::default().input.cruise_velocity, 0.0);

        let mut config = BalanceConfig::default();
        config.input.cruise_velocity = f64::INFINITY;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
