use std::ops::{Add, Div, Mul, Neg, Sub};

/// Scalar abstraction for the right-hand side. The simulation evaluates
/// every state-dependent quantity either on plain `f64` or on a
/// forward-mode dual number, so an integrator can push derivative seeds
/// through the exact same code path it uses for values.
///
/// Branch decisions (segment lookup, clamping, flow direction) are taken
/// on `value()` so both scalar types select the same branch.
pub trait Scalar:
    Copy
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + Add<f64, Output = Self>
    + Sub<f64, Output = Self>
    + Mul<f64, Output = Self>
    + Div<f64, Output = Self>
{
    fn constant(v: f64) -> Self;
    fn value(self) -> f64;
    fn sqrt(self) -> Self;
    fn atan(self) -> Self;
    fn powf(self, p: f64) -> Self;
    fn abs(self) -> Self;
    fn min(self, other: Self) -> Self;
    fn max(self, other: Self) -> Self;
}

impl Scalar for f64 {
    fn constant(v: f64) -> Self {
        v
    }

    fn value(self) -> f64 {
        self
    }

    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    fn atan(self) -> Self {
        libm::atan(self)
    }

    fn powf(self, p: f64) -> Self {
        f64::powf(self, p)
    }

    fn abs(self) -> Self {
        f64::abs(self)
    }

    fn min(self, other: Self) -> Self {
        f64::min(self, other)
    }

    fn max(self, other: Self) -> Self {
        f64::max(self, other)
    }
}

/// First-order dual number carrying one derivative direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct Dual {
    pub v: f64,
    pub d: f64,
}

impl Dual {
    pub fn new(v: f64, d: f64) -> Self {
        Self { v, d }
    }

    /// Seed for the j-th Jacobian column: value from the state, unit
    /// derivative.
    pub fn seeded(v: f64) -> Self {
        Self { v, d: 1.0 }
    }
}

impl Add for Dual {
    type Output = Dual;
    fn add(self, rhs: Dual) -> Dual {
        Dual::new(self.v + rhs.v, self.d + rhs.d)
    }
}

impl Sub for Dual {
    type Output = Dual;
    fn sub(self, rhs: Dual) -> Dual {
        Dual::new(self.v - rhs.v, self.d - rhs.d)
    }
}

impl Mul for Dual {
    type Output = Dual;
    fn mul(self, rhs: Dual) -> Dual {
        Dual::new(self.v * rhs.v, self.d * rhs.v + self.v * rhs.d)
    }
}

impl Div for Dual {
    type Output = Dual;
    fn div(self, rhs: Dual) -> Dual {
        Dual::new(
            self.v / rhs.v,
            (self.d * rhs.v - self.v * rhs.d) / (rhs.v * rhs.v),
        )
    }
}

impl Neg for Dual {
    type Output = Dual;
    fn neg(self) -> Dual {
        Dual::new(-self.v, -self.d)
    }
}

impl Add<f64> for Dual {
    type Output = Dual;
    fn add(self, rhs: f64) -> Dual {
        Dual::new(self.v + rhs, self.d)
    }
}

impl Sub<f64> for Dual {
    type Output = Dual;
    fn sub(self, rhs: f64) -> Dual {
        Dual::new(self.v - rhs, self.d)
    }
}

impl Mul<f64> for Dual {
    type Output = Dual;
    fn mul(self, rhs: f64) -> Dual {
        Dual::new(self.v * rhs, self.d * rhs)
    }
}

impl Div<f64> for Dual {
    type Output = Dual;
    fn div(self, rhs: f64) -> Dual {
        Dual::new(self.v / rhs, self.d / rhs)
    }
}

impl Scalar for Dual {
    fn constant(v: f64) -> Self {
        Dual::new(v, 0.0)
    }

    fn value(self) -> f64 {
        self.v
    }

    fn sqrt(self) -> Self {
        let r = self.v.sqrt();
        Dual::new(r, self.d * 0.5 / r)
    }

    fn atan(self) -> Self {
        Dual::new(libm::atan(self.v), self.d / (1.0 + self.v * self.v))
    }

    fn powf(self, p: f64) -> Self {
        Dual::new(self.v.powf(p), self.d * p * self.v.powf(p - 1.0))
    }

    fn abs(self) -> Self {
        if self.v < 0.0 {
            -self
        } else {
            self
        }
    }

    fn min(self, other: Self) -> Self {
        if other.v < self.v {
            other
        } else {
            self
        }
    }

    fn max(self, other: Self) -> Self {
        if other.v > self.v {
            other
        } else {
            self
        }
    }
}
