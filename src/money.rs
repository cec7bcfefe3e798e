use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};

/// Dollar amount for reporting. Arithmetic stays in full `f64` precision;
/// rounding to cents only happens in `Display`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Usd(pub f64);

impl Usd {
    pub const SYMBOL: &'static str = "USD";

    pub fn amount(&self) -> f64 {
        self.0
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }
}

impl From<f64> for Usd {
    fn from(amount: f64) -> Self {
        Self(amount)
    }
}

impl Add for Usd {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl Sub for Usd {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

impl Sum for Usd {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Usd::default(), |acc, x| acc + x)
    }
}

impl fmt::Display for Usd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.0, Self::SYMBOL)
    }
}
