//! Operator input shaping
//!
//! Key events arrive as raw host codes. At most one logical button is held at
//! a time: every event releases everything and presses the button it names.
//! Buttons release on their own once `key_timeout` passes without events,
//! so a lost key-up never leaves the robot driving.

use crate::config::{InputConfig, InputMode};
use crate::estimate::Setpoints;
use crate::hardware::{keys, KeyEvent};

/// Debounced logical buttons
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub arm_raise: bool,
    pub arm_lower: bool,
    pub gripper_open: bool,
    pub gripper_close: bool,
    /// Host time of the most recent event
    pub last_event_time: Option<f64>,
}

impl InputState {
    /// Release every button
    pub fn release_all(&mut self) {
        let last_event_time = self.last_event_time;
        *self = Self {
            last_event_time,
            ..Default::default()
        };
    }

    /// Check whether any button is held
    pub fn any_pressed(&self) -> bool {
        self.up
            || self.down
            || self.left
            || self.right
            || self.arm_raise
            || self.arm_lower
            || self.gripper_open
            || self.gripper_close
    }

    fn press(&mut self, code: i32) -> bool {
        let button = match code {
            keys::UP => &mut self.up,
            keys::DOWN => &mut self.down,
            keys::LEFT => &mut self.left,
            keys::RIGHT => &mut self.right,
            keys::ARM_RAISE => &mut self.arm_raise,
            keys::ARM_LOWER => &mut self.arm_lower,
            keys::GRIPPER_OPEN => &mut self.gripper_open,
            keys::GRIPPER_CLOSE => &mut self.gripper_close,
            _ => return false,
        };
        *button = true;
        true
    }
}

fn axis(positive: bool, negative: bool) -> f64 {
    match (positive, negative) {
        (true, false) => 1.0,
        (false, true) => -1.0,
        _ => 0.0,
    }
}

/// Maps key events to setpoints
#[derive(Debug, Clone)]
pub struct InputShaper {
    config: InputConfig,
    state: InputState,
    /// Target position at the end of the previous tick (position mode)
    last_tick_target: f64,
    stepped_this_tick: bool,
}

impl InputShaper {
    /// Create a shaper with all buttons released
    pub fn new(config: InputConfig) -> Self {
        Self {
            config,
            state: InputState::default(),
            last_tick_target: 0.0,
            stepped_this_tick: false,
        }
    }

    /// Current button state
    pub fn state(&self) -> &InputState {
        &self.state
    }

    /// Get the configuration
    pub fn config(&self) -> &InputConfig {
        &self.config
    }

    /// Apply one key event
    ///
    /// Unknown codes release everything and press nothing. In position mode
    /// up/down also step the target position.
    pub fn handle_event(&mut self, event: KeyEvent, now: f64, setpoints: &mut Setpoints) {
        self.state.release_all();
        let known = self.state.press(event.code);
        self.state.last_event_time = Some(now);

        if !known {
            tracing::debug!(code = event.code, "ignoring unknown key");
        }

        if self.config.mode == InputMode::Position && (self.state.up || self.state.down) {
            let step = axis(self.state.up, self.state.down) * self.config.target_step;
            let next = setpoints.desired_position + step;
            if (next - self.last_tick_target).abs() < self.config.max_target_step {
                setpoints.desired_position = next;
            } else {
                tracing::debug!(next, last = self.last_tick_target, "target step rejected");
            }
            self.stepped_this_tick = true;
        }
    }

    /// Expire stale buttons and write this tick's setpoints
    ///
    /// Call once per tick after all events have been handled.
    pub fn tick(&mut self, now: f64, setpoints: &mut Setpoints) {
        let expired = match self.state.last_event_time {
            Some(t) => now - t > self.config.key_timeout,
            None => true,
        };
        if expired && self.state.any_pressed() {
            tracing::debug!(now, "key timeout, releasing buttons");
            self.state.release_all();
        }

        let s = &self.state;
        setpoints.turn_input = axis(s.right, s.left) * self.config.turn_magnitude;
        setpoints.arm_input = axis(s.arm_lower, s.arm_raise);
        setpoints.gripper_input = axis(s.gripper_close, s.gripper_open);

        match self.config.mode {
            InputMode::Velocity => {
                setpoints.desired_velocity = axis(s.up, s.down)
                    .mul_add(self.config.forward_speed, self.config.cruise_velocity);
                setpoints.movement_active = setpoints.desired_velocity != 0.0;
            }
            InputMode::Position => {
                setpoints.desired_velocity = 0.0;
                setpoints.movement_active = self.stepped_this_tick;
                self.stepped_this_tick = false;
                self.last_tick_target = setpoints.desired_position;
            }
        }
    }

    /// Release everything and forget the last target
    pub fn reset(&mut self) {
        self.state = InputState::default();
        self.last_tick_target = 0.0;
        self.stepped_this_tick = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn velocity_shaper() -> InputShaper {
        InputShaper::new(InputConfig::default())
    }

    #[test]
    fn test_up_drives_forward_until_timeout() {
        let mut shaper = velocity_shaper();
        let mut sp = Setpoints::default();

        shaper.handle_event(KeyEvent::new(keys::UP), 1.0, &mut sp);
        shaper.tick(1.0, &mut sp);
        assert_eq!(sp.desired_velocity, 0.25);
        assert!(sp.movement_active);

        shaper.tick(1.15, &mut sp);
        assert_eq!(sp.desired_velocity, 0.25);

        shaper.tick(1.25, &mut sp);
        assert_eq!(sp.desired_velocity, 0.0);
        assert!(!sp.movement_active);
        assert!(!shaper.state().any_pressed());
    }

    #[test]
    fn test_cruise_velocity_without_keys() {
        let mut shaper = InputShaper::new(InputConfig {
            cruise_velocity: 0.1,
            ..Default::default()
        });
        let mut sp = Setpoints::default();

        shaper.tick(0.0, &mut sp);
        assert_eq!(sp.desired_velocity, 0.1);
        assert!(sp.movement_active);

        shaper.handle_event(KeyEvent::new(keys::DOWN), 0.5, &mut sp);
        shaper.tick(0.5, &mut sp);
        assert!((sp.desired_velocity - (0.1 - 0.25)).abs() < 1e-12);
    }

    #[test]
    fn test_timeout_releases_everything() {
        let mut shaper = velocity_shaper();
        let mut sp = Setpoints::default();

        shaper.handle_event(KeyEvent::new(keys::RIGHT), 0.0, &mut sp);
        shaper.tick(0.0, &mut sp);
        assert_eq!(sp.turn_input, 1.0);

        shaper.tick(0.5, &mut sp);
        assert_eq!(sp.turn_input, 0.0);
        assert_eq!(sp.arm_input, 0.0);
        assert_eq!(sp.gripper_input, 0.0);
        assert_eq!(sp.desired_velocity, 0.0);
    }

    #[test]
    fn test_one_button_at_a_time() {
        let mut shaper = velocity_shaper();
        let mut sp = Setpoints::default();

        shaper.handle_event(KeyEvent::new(keys::UP), 0.0, &mut sp);
        shaper.handle_event(KeyEvent::new(keys::LEFT), 0.01, &mut sp);
        shaper.tick(0.01, &mut sp);
        assert!(!shaper.state().up);
        assert_eq!(sp.turn_input, -1.0);
        assert_eq!(sp.desired_velocity, 0.0);

        shaper.handle_event(KeyEvent::new(999), 0.02, &mut sp);
        shaper.tick(0.02, &mut sp);
        assert!(!shaper.state().any_pressed());
        assert_eq!(sp.turn_input, 0.0);
    }

    #[test]
    fn test_arm_and_gripper_keys() {
        let mut shaper = velocity_shaper();
        let mut sp = Setpoints::default();

        for (code, arm, gripper) in [
            (keys::ARM_RAISE, -1.0, 0.0),
            (keys::ARM_LOWER, 1.0, 0.0),
            (keys::GRIPPER_OPEN, 0.0, -1.0),
            (keys::GRIPPER_CLOSE, 0.0, 1.0),
        ] {
            shaper.handle_event(KeyEvent::new(code), 0.0, &mut sp);
            shaper.tick(0.0, &mut sp);
            assert_eq!(sp.arm_input, arm, "code {}", code);
            assert_eq!(sp.gripper_input, gripper, "code {}", code);
        }
    }

    #[test]
    fn test_position_mode_steps_target() {
        let mut shaper = InputShaper::new(InputConfig {
            mode: InputMode::Position,
            key_timeout: 0.0,
            ..Default::default()
        });
        let mut sp = Setpoints::default();

        shaper.handle_event(KeyEvent::new(keys::UP), 0.0, &mut sp);
        shaper.tick(0.0, &mut sp);
        assert!((sp.desired_position - 0.01).abs() < 1e-12);
        assert!(sp.movement_active);
        assert_eq!(sp.desired_velocity, 0.0);

        shaper.tick(0.01, &mut sp);
        assert!(!sp.movement_active);
        assert!(!shaper.state().up);

        shaper.handle_event(KeyEvent::new(keys::DOWN), 0.02, &mut sp);
        shaper.handle_event(KeyEvent::new(keys::DOWN), 0.02, &mut sp);
        shaper.tick(0.02, &mut sp);
        assert!((sp.desired_position + 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_position_mode_rejects_large_jump() {
        let mut shaper = InputShaper::new(InputConfig {
            mode: InputMode::Position,
            target_step: 0.2,
            ..Default::default()
        });
        let mut sp = Setpoints::default();

        shaper.handle_event(KeyEvent::new(keys::UP), 0.0, &mut sp);
        shaper.tick(0.0, &mut sp);
        assert_eq!(sp.desired_position, 0.0);
        assert!(sp.movement_active);
    }
}
