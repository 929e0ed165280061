//! Cascaded PID balance controller
//!
//! Two independent loops share the drive command: a tilt loop holding the
//! body upright and a position loop pulling the robot toward the target.
//! The position loop softens as the target gets close.

use super::{Controller, DriveCommand, Pid};
use crate::config::PidBalanceConfig;
use crate::estimate::{Estimate, Setpoints, StateVector};
use crate::math::lerp;

/// Tilt + position PID controller with proximity gain scheduling
#[derive(Debug, Clone)]
pub struct PidBalanceController {
    config: PidBalanceConfig,
    tilt: Pid,
    position: Pid,
}

impl PidBalanceController {
    /// Create with zeroed loop memory
    pub fn new(config: PidBalanceConfig) -> Self {
        Self {
            tilt: Pid::new(config.tilt),
            position: Pid::new(config.position),
            config,
        }
    }

    /// Tilt loop
    pub fn tilt_loop(&self) -> &Pid {
        &self.tilt
    }

    /// Position loop
    pub fn position_loop(&self) -> &Pid {
        &self.position
    }

    /// `(kp_scale, kd_scale)` for the position loop at `distance` from target
    pub fn schedule(&self, distance: f64) -> (f64, f64) {
        let c = &self.config;
        if distance < c.decel_threshold {
            let factor = distance / c.decel_threshold;
            (lerp(c.kp_floor, 1.0, factor), lerp(c.kd_floor, 1.0, factor))
        } else {
            (1.0, 1.0)
        }
    }
}

impl Controller for PidBalanceController {
    fn name(&self) -> &str {
        "pid"
    }

    fn compute(&mut self, estimate: &Estimate, setpoints: &Setpoints) -> DriveCommand {
        let c = &self.config;

        if !setpoints.movement_active {
            self.position.scale_integral(c.idle_integral_decay);
        }

        // Upright target: error = 0 − tilt
        let tilt_error = estimate.x[StateVector::TILT_ANGLE];
        // Target − measured
        let position_error = -estimate.x[StateVector::WHEEL_POSITION_ERROR];
        let distance = position_error.abs();

        if distance < c.stop_threshold {
            self.position.scale_integral(c.stop_integral_decay);
        }
        let (kp_scale, kd_scale) = self.schedule(distance);

        let tilt_out = self.tilt.update_error(tilt_error, c.dt_weight);
        let position_out =
            self.position
                .update_error_scaled(position_error, c.dt_weight, kp_scale, kd_scale);

        tracing::trace!(tilt_error, position_error, tilt_out, position_out, "pid loops");

        DriveCommand {
            drive: (tilt_out - position_out) * c.wheel_speed_gain,
            steering: setpoints.turn_input * c.turn_rate,
        }
    }

    fn reset(&mut self) {
        self.tilt.reset();
        self.position.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn estimate(tilt_error: f64, position_error: f64) -> Estimate {
        Estimate {
            x: StateVector::new([tilt_error, 0.0, -position_error, 0.0]),
            ..Default::default()
        }
    }

    fn moving() -> Setpoints {
        Setpoints {
            movement_active: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_tick_values() {
        let mut ctrl = PidBalanceController::new(PidBalanceConfig::default());
        let cmd = ctrl.compute(&estimate(0.1, 0.0), &moving());

        // P = 1.5, I = 2 × 0.05 = 0.1, D = 0.2 × 0.1 / 0.5 = 0.04
        let tilt_out = 1.5 + 0.1 + 0.04;
        assert_relative_eq!(cmd.drive, tilt_out * 10.0, epsilon = 1e-10);
        assert_eq!(cmd.steering, 0.0);
    }

    #[test]
    fn test_schedule() {
        let ctrl = PidBalanceController::new(PidBalanceConfig::default());
        assert_eq!(ctrl.schedule(1.0), (1.0, 1.0));
        assert_eq!(ctrl.schedule(0.15), (1.0, 1.0));

        let (kp, kd) = ctrl.schedule(0.075);
        assert_relative_eq!(kp, 0.3 + 0.7 * 0.5, epsilon = 1e-12);
        assert_relative_eq!(kd, 0.5 + 0.5 * 0.5, epsilon = 1e-12);

        assert_eq!(ctrl.schedule(0.0), (0.3, 0.5));
    }

    #[test]
    fn test_position_loop_opposes_error() {
        let mut ctrl = PidBalanceController::new(PidBalanceConfig::default());
        // Target ahead: position output positive, drive negative
        let cmd = ctrl.compute(&estimate(0.0, 0.5), &moving());
        // P = 25, I = 0.6 × 0.25 = 0.15, D = 0.6 × 0.5 / 0.5 = 0.6
        assert_relative_eq!(cmd.drive, -(25.0 + 0.15 + 0.6) * 10.0, epsilon = 1e-10);
    }

    #[test]
    fn test_stop_threshold_halves_integral() {
        let mut ctrl = PidBalanceController::new(PidBalanceConfig::default());
        ctrl.compute(&estimate(0.0, 0.5), &moving());
        assert_relative_eq!(ctrl.position_loop().state().integral, 0.25);

        // Inside the stop threshold: 0.25 × 0.5 + 0.01 × 0.5
        ctrl.compute(&estimate(0.0, 0.01), &moving());
        assert_relative_eq!(ctrl.position_loop().state().integral, 0.13, epsilon = 1e-12);
    }

    #[test]
    fn test_idle_decay() {
        let mut ctrl = PidBalanceController::new(PidBalanceConfig::default());
        ctrl.compute(&estimate(0.0, 0.5), &moving());

        // No movement command: 0.25 × 0.9 + 0.5 × 0.5
        ctrl.compute(&estimate(0.0, 0.5), &Setpoints::default());
        assert_relative_eq!(ctrl.position_loop().state().integral, 0.475, epsilon = 1e-12);
    }

    #[test]
    fn test_windup_is_bounded() {
        let mut ctrl = PidBalanceController::new(PidBalanceConfig::default());
        for _ in 0..1000 {
            ctrl.compute(&estimate(5.0, 5.0), &moving());
            assert!(ctrl.tilt_loop().state().integral.abs() <= 10.0);
            assert!(ctrl.position_loop().state().integral.abs() <= 10.0);
        }
    }

    #[test]
    fn test_steering_and_reset() {
        let mut ctrl = PidBalanceController::new(PidBalanceConfig::default());
        let setpoints = Setpoints {
            turn_input: -1.0,
            ..moving()
        };
        let cmd = ctrl.compute(&estimate(0.1, 0.1), &setpoints);
        assert_eq!(cmd.steering, -8.0);

        ctrl.reset();
        assert_eq!(ctrl.tilt_loop().state().integral, 0.0);
        assert_eq!(ctrl.position_loop().state().prev_error, 0.0);
    }
}
