//! PID controller
//!
//! Single-loop PID with integral windup clamping and per-call gain scaling,
//! the building block of the cascaded balance controller.

use serde::{Deserialize, Serialize};

/// PID controller configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PidConfig {
    /// Proportional gain
    pub kp: f64,
    /// Integral gain
    pub ki: f64,
    /// Derivative gain
    pub kd: f64,
    /// Integral windup limit (f64::INFINITY for no limit)
    pub integral_limit: f64,
}

impl PidConfig {
    /// Create a new PID config with given gains and no windup limit
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            integral_limit: f64::INFINITY,
        }
    }

    /// Set integral windup limit
    pub fn with_integral_limit(mut self, limit: f64) -> Self {
        self.integral_limit = limit;
        self
    }

    /// Whether the gains are finite and the windup limit is a non-negative
    /// number (infinity allowed)
    pub fn is_valid(&self) -> bool {
        self.kp.is_finite()
            && self.ki.is_finite()
            && self.kd.is_finite()
            && self.integral_limit >= 0.0
    }
}

/// PID controller memory
///
/// Mutated once per update; cleared only by [`Pid::reset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PidState {
    /// Accumulated integral term
    pub integral: f64,
    /// Previous error for derivative calculation
    pub prev_error: f64,
}

/// PID controller
///
/// # Example
/// ```
/// use balbot_core::control::{Pid, PidConfig};
///
/// let config = PidConfig::new(15.0, 2.0, 0.2).with_integral_limit(10.0);
/// let mut pid = Pid::new(config);
///
/// // Tilt loop: measured pitch 0.05 rad, so the error is -0.05
/// let output = pid.update_error(-0.05, 0.5);
/// assert!(output < 0.0);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Pid {
    config: PidConfig,
    state: PidState,
}

impl Pid {
    /// Create a new PID controller with the given configuration
    pub fn new(config: PidConfig) -> Self {
        Self {
            config,
            state: PidState::default(),
        }
    }

    /// Create a full PID controller
    pub fn pid(kp: f64, ki: f64, kd: f64) -> Self {
        Self::new(PidConfig::new(kp, ki, kd))
    }

    /// Update the PID controller with a pre-computed error
    #[inline]
    pub fn update_error(&mut self, error: f64, dt: f64) -> f64 {
        self.update_error_scaled(error, dt, 1.0, 1.0)
    }

    /// Update with the proportional and derivative gains scaled for this call
    ///
    /// Used for gain scheduling; the configured gains are left untouched.
    #[inline]
    pub fn update_error_scaled(&mut self, error: f64, dt: f64, kp_scale: f64, kd_scale: f64) -> f64 {
        debug_assert!(dt > 0.0);

        let p_term = self.config.kp * kp_scale * error;

        // Integral term with windup protection (FMA)
        self.state.integral = error.mul_add(dt, self.state.integral);
        self.state.integral = self
            .state
            .integral
            .clamp(-self.config.integral_limit, self.config.integral_limit);
        let i_term = self.config.ki * self.state.integral;

        let derivative = (error - self.state.prev_error) / dt;
        let d_term = self.config.kd * kd_scale * derivative;

        self.state.prev_error = error;

        p_term + i_term + d_term
    }

    /// Multiply the integral accumulator by `factor`
    #[inline]
    pub fn scale_integral(&mut self, factor: f64) {
        self.state.integral *= factor;
    }

    /// Reset the controller state
    pub fn reset(&mut self) {
        self.state = PidState::default();
    }

    /// Get the current state
    pub fn state(&self) -> &PidState {
        &self.state
    }

    /// Get the configuration
    pub fn config(&self) -> &PidConfig {
        &self.config
    }

}
