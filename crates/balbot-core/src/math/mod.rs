//! Math utilities: angle wrapping, interpolation and dual numbers
//!
//! Dense linear algebra comes from nalgebra; this module only adds the
//! small scalar helpers the controllers and the linearizer share.

mod dual;

pub use dual::{Dual, Scalar};

/// Linearly interpolate between two values
#[inline]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Normalize an angle to [-π, π]
#[inline]
pub fn normalize_angle(angle: f64) -> f64 {
    const TWO_PI: f64 = 2.0 * std::f64::consts::PI;
    const INV_TWO_PI: f64 = 1.0 / TWO_PI;
    angle - TWO_PI * (angle * INV_TWO_PI + 0.5).floor()
}

/// Wrap angle difference to [-π, π] for shortest path
#[inline]
pub fn angle_diff(target: f64, current: f64) -> f64 {
    normalize_angle(target - current)
}

/// Clamp to `[-limit, limit]`, reporting whether the value was cut
#[inline]
pub fn clamp_symmetric(value: f64, limit: f64) -> (f64, bool) {
    let clamped = value.clamp(-limit, limit);
    (clamped, clamped != value)
}
