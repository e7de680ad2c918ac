//! The numeric capability shared by every per-channel filter, so the same
//! median and Kalman code serves both `f32` and `f64` channel data.

use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Sub};

/// A real-number-like type: the four arithmetic operators, a partial
/// ordering, and lossless-enough conversion through `f64`.
pub trait Real:
    Copy
    + Debug
    + Default
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Send
    + 'static
{
    /// Additive identity
    fn zero() -> Self;
    /// Multiplicative identity
    fn one() -> Self;
    /// Converts from an `f64`, rounding if the target is narrower
    fn from_f64(value: f64) -> Self;
    /// Widens to an `f64`
    fn to_f64(self) -> f64;
}

macro_rules! impl_real {
    ($($t:ty),*) => {
        $(
            impl Real for $t {
                fn zero() -> Self {
                    0.0
                }

                fn one() -> Self {
                    1.0
                }

                fn from_f64(value: f64) -> Self {
                    value as $t
                }

                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_real!(f32, f64);
