//! Mock two-wheeled robot for testing the control loop without hardware

use std::collections::VecDeque;

use crate::actuator::ActuatorCommand;
use crate::hardware::{ActuatorSink, Joint, KeyEvent, SensorFrame, SensorSource};
use crate::{Error, Result};

use super::{PlantConfig, SimBackend, SimState, StepResult};

/// A simulated balancing robot
///
/// Integrates an inverted pendulum on two velocity-lagged wheels with
/// explicit Euler substeps. Yaw grows when the left wheel outruns the right.
/// Key events and sensor dropouts can be scripted against simulation time.
#[derive(Debug)]
pub struct MockBalanceBot {
    config: PlantConfig,
    state: SimState,
    ticks: u64,
    command: ActuatorCommand,
    events: VecDeque<(f64, KeyEvent)>,
    dropouts: Vec<(f64, f64)>,
}

impl MockBalanceBot {
    /// Create a robot at rest with the configured initial tilt
    pub fn new(config: PlantConfig) -> Self {
        Self {
            state: Self::initial_state(&config),
            config,
            ticks: 0,
            command: ActuatorCommand::ZERO,
            events: VecDeque::new(),
            dropouts: Vec::new(),
        }
    }

    fn initial_state(config: &PlantConfig) -> SimState {
        SimState {
            tilt: config.initial_tilt,
            ..Default::default()
        }
    }

    /// Command currently driving the joints
    pub fn command(&self) -> &ActuatorCommand {
        &self.command
    }

    /// Queue a key event for delivery at `time`
    pub fn push_key(&mut self, time: f64, code: i32) {
        let at = self.events.partition_point(|(t, _)| *t <= time);
        self.events.insert(at, (time, KeyEvent::new(code)));
    }

    /// Repeat a key every `period` seconds over `[start, end)`, like a held
    /// key with auto-repeat
    pub fn hold_key(&mut self, code: i32, start: f64, end: f64, period: f64) {
        if period <= 0.0 {
            return;
        }
        let mut k = 0u32;
        loop {
            let t = start + f64::from(k) * period;
            if t >= end {
                break;
            }
            self.push_key(t, code);
            k += 1;
        }
    }

    /// Make every read with simulation time in `[start, end)` fail
    pub fn drop_reads(&mut self, start: f64, end: f64) {
        self.dropouts.push((start, end));
    }

    fn in_dropout(&self) -> bool {
        let t = self.state.sim_time;
        self.dropouts.iter().any(|&(start, end)| t >= start && t < end)
    }

    fn frame(&self) -> SensorFrame {
        let s = &self.state;
        let r = self.config.wheel_radius;
        SensorFrame {
            tilt: s.tilt,
            tilt_rate: s.tilt_rate,
            yaw: s.yaw,
            wheel_position: s.wheel_position(),
            wheel_velocity: s.wheel_velocity(),
            body_position: r * s.wheel_position(),
            body_velocity: r * s.wheel_velocity(),
            dt: self.config.dt,
            time: s.sim_time,
        }
    }

    fn physics_substep(&mut self, h: f64) {
        let c = &self.config;
        let s = &mut self.state;
        let commanded = [self.command.left, self.command.right];

        let mut wheel_accel = [0.0; 2];
        for (i, accel) in wheel_accel.iter_mut().enumerate() {
            *accel = (commanded[i] - s.wheel_rates[i]) / c.wheel_time_constant;
        }
        let axle_accel = c.wheel_radius * 0.5 * (wheel_accel[0] + wheel_accel[1]);
        let tilt_accel = (c.gravity / c.pendulum_length) * s.tilt.sin()
            + (axle_accel / c.pendulum_length) * s.tilt.cos();

        for i in 0..2 {
            s.wheel_rates[i] += wheel_accel[i] * h;
            s.wheel_angles[i] += s.wheel_rates[i] * h;
        }
        s.yaw += c.wheel_radius * (s.wheel_rates[0] - s.wheel_rates[1]) / c.track_width * h;

        s.tilt_rate += tilt_accel * h;
        s.tilt += s.tilt_rate * h;
    }
}

impl Default for MockBalanceBot {
    fn default() -> Self {
        Self::new(PlantConfig::default())
    }
}

impl SensorSource for MockBalanceBot {
    fn read(&mut self) -> Result<SensorFrame> {
        if self.in_dropout() {
            return Err(Error::SensorUnavailable(format!(
                "scripted dropout at t = {:.3}",
                self.state.sim_time
            )));
        }
        Ok(self.frame())
    }

    fn poll_event(&mut self) -> Option<KeyEvent> {
        // Half a tick of slack absorbs rounding in scripted times
        let due = self.state.sim_time + 0.5 * self.config.dt;
        match self.events.front() {
            Some(&(t, _)) if t <= due => self.events.pop_front().map(|(_, event)| event),
            _ => None,
        }
    }
}

impl ActuatorSink for MockBalanceBot {
    fn set_joint_velocity(&mut self, joint: Joint, velocity: f64) -> Result<()> {
        if !velocity.is_finite() {
            return Err(Error::Actuator(format!("{} command {} is not finite", joint, velocity)));
        }
        match joint {
            Joint::LeftWheel => self.command.left = velocity,
            Joint::RightWheel => self.command.right = velocity,
            Joint::Arm => self.command.arm = velocity,
            Joint::Gripper => self.command.gripper = velocity,
        }
        Ok(())
    }
}

impl SimBackend for MockBalanceBot {
    fn name(&self) -> &str {
        "mock"
    }

    fn config(&self) -> &PlantConfig {
        &self.config
    }

    fn reset(&mut self) -> Result<SimState> {
        self.config.validate()?;
        self.state = Self::initial_state(&self.config);
        self.ticks = 0;
        self.command = ActuatorCommand::ZERO;
        self.events.clear();
        self.dropouts.clear();
        Ok(self.state)
    }

    fn step(&mut self) -> Result<StepResult> {
        let h = self.config.substep_dt();
        for _ in 0..self.config.substeps {
            self.physics_substep(h);
        }

        let dt = self.config.dt;
        let [arm_lo, arm_hi] = self.config.arm_range;
        let [grip_lo, grip_hi] = self.config.gripper_range;
        self.state.arm = (self.state.arm + self.command.arm * dt).clamp(arm_lo, arm_hi);
        self.state.gripper = (self.state.gripper + self.command.gripper * dt).clamp(grip_lo, grip_hi);

        self.ticks += 1;
        self.state.sim_time = self.ticks as f64 * dt;

        if !self.state.terminated && self.state.tilt.abs() > self.config.fall_angle {
            tracing::warn!(tilt = self.state.tilt, time = self.state.sim_time, "robot fell over");
            self.state.terminated = true;
        }

        Ok(StepResult {
            state: self.state,
            done: self.state.terminated,
        })
    }

    fn state(&self) -> SimState {
        self.state
    }
}
