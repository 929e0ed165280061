//! Forward-mode automatic differentiation
//!
//! A [`Dual`] carries a value and one tangent. Evaluating a function on
//! `Dual::variable(x)` yields `f(x)` and `f'(x)` exactly (up to floating
//! point rounding of the operations themselves), with no step size.

use std::ops::{Add, Div, Mul, Neg, Sub};

/// Scalar arithmetic shared by `f64` and [`Dual`]
///
/// Dynamics models are written once against this trait and evaluated
/// either plainly or with derivatives attached.
pub trait Scalar:
    Copy
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    /// Lift a constant
    fn from_f64(value: f64) -> Self;

    /// Real part
    fn value(self) -> f64;

    fn sin(self) -> Self;

    fn cos(self) -> Self;

    /// Integer power
    fn powi(self, n: i32) -> Self;
}

impl Scalar for f64 {
    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }

    #[inline]
    fn value(self) -> f64 {
        self
    }

    #[inline]
    fn sin(self) -> Self {
        f64::sin(self)
    }

    #[inline]
    fn cos(self) -> Self {
        f64::cos(self)
    }

    #[inline]
    fn powi(self, n: i32) -> Self {
        f64::powi(self, n)
    }
}

/// Dual number `re + eps·ε` with `ε² = 0`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Dual {
    /// Value
    pub re: f64,
    /// Derivative with respect to the seeded variable
    pub eps: f64,
}

impl Dual {
    /// A constant (zero tangent)
    pub const fn constant(re: f64) -> Self {
        Self { re, eps: 0.0 }
    }

    /// The differentiation variable (unit tangent)
    pub const fn variable(re: f64) -> Self {
        Self { re, eps: 1.0 }
    }
}

impl Add for Dual {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self {
            re: self.re + rhs.re,
            eps: self.eps + rhs.eps,
        }
    }
}

impl Sub for Dual {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self {
            re: self.re - rhs.re,
            eps: self.eps - rhs.eps,
        }
    }
}

impl Mul for Dual {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self {
            re: self.re * rhs.re,
            eps: self.re.mul_add(rhs.eps, self.eps * rhs.re),
        }
    }
}

impl Div for Dual {
    type Output = Self;

    #[inline]
    fn div(self, rhs: Self) -> Self {
        Self {
            re: self.re / rhs.re,
            eps: (self.eps * rhs.re - self.re * rhs.eps) / (rhs.re * rhs.re),
        }
    }
}

impl Neg for Dual {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self {
            re: -self.re,
            eps: -self.eps,
        }
    }
}

impl Scalar for Dual {
    #[inline]
    fn from_f64(value: f64) -> Self {
        Self::constant(value)
    }

    #[inline]
    fn value(self) -> f64 {
        self.re
    }

    #[inline]
    fn sin(self) -> Self {
        Self {
            re: self.re.sin(),
            eps: self.eps * self.re.cos(),
        }
    }

    #[inline]
    fn cos(self) -> Self {
        Self {
            re: self.re.cos(),
            eps: -self.eps * self.re.sin(),
        }
    }

    #[inline]
    fn powi(self, n: i32) -> Self {
        // d/dx x^0 is zero everywhere, including x = 0 where x^-1 is infinite
        let eps = if n == 0 {
            0.0
        } else {
            self.eps * f64::from(n) * self.re.powi(n - 1)
        };
        Self {
            re: self.re.powi(n),
            eps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn poly<T: Scalar>(x: T) -> T {
        // 4x^3 - 2x
        T::from_f64(4.0) * x.powi(3) - T::from_f64(2.0) * x
    }

    #[test]
    fn test_polynomial_derivative() {
        let d = poly(Dual::variable(0.5));
        assert_relative_eq!(d.re, 4.0 * 0.125 - 1.0, epsilon = 1e-15);
        // 12x^2 - 2
        assert_relative_eq!(d.eps, 12.0 * 0.25 - 2.0, epsilon = 1e-15);
    }

    #[test]
    fn test_trig_derivative() {
        let x = Dual::variable(0.3);
        let y = x.sin() * x.cos();
        // d/dx sin x cos x = cos 2x
        assert_relative_eq!(y.eps, (0.6f64).cos(), epsilon = 1e-15);
    }

    #[test]
    fn test_quotient_and_zero_power() {
        let x = Dual::variable(2.0);
        let q = Dual::constant(1.0) / x;
        assert_relative_eq!(q.eps, -0.25, epsilon = 1e-15);

        let z = Dual::variable(0.0).powi(0);
        assert_eq!(z.re, 1.0);
        assert_eq!(z.eps, 0.0);
    }

    #[test]
    fn test_constants_carry_no_tangent() {
        let c = Dual::constant(3.0) * Dual::constant(4.0);
        assert_eq!(c.eps, 0.0);
        assert_eq!(poly(1.0f64), 2.0);
    }
}
