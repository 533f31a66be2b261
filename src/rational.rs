//! Unsigned rational numbers as stored in EXIF `RATIONAL` fields.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Largest denominator [`URational::approximate`] will scale up to.
pub const MAX_DENOMINATOR: u32 = 1_000_000;

/// Tolerance, in units of the denominator, for treating a scaled value as
/// already integral.
const INTEGRAL_TOLERANCE: f64 = 1e-6;

/// A pair of `u32` values representing `numerator / denominator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct URational {
    /// Numerator.
    pub numerator: u32,
    /// Denominator. Never zero for values produced by this crate.
    pub denominator: u32,
}

impl URational {
    /// Create a rational from its parts.
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// A whole number, `value / 1`.
    pub const fn integer(value: u32) -> Self {
        Self::new(value, 1)
    }

    /// The magnitude of `value` rounded to the nearest multiple of
    /// `1 / denominator`.
    ///
    /// Returns `None` if the numerator would not fit in a `u32`, or if
    /// `value` is not finite or `denominator` is zero.
    pub fn with_denominator(value: f64, denominator: u32) -> Option<Self> {
        if !value.is_finite() || denominator == 0 {
            return None;
        }
        let scaled = (value.abs() * f64::from(denominator)).round();
        (scaled <= f64::from(u32::MAX)).then(|| Self::new(scaled as u32, denominator))
    }

    /// Encode the magnitude of `value` without losing decimal precision.
    ///
    /// Starts at `base_denominator` and multiplies the denominator by ten
    /// while `value` still has digits the current denominator cannot
    /// represent, up to [`MAX_DENOMINATOR`] or until the numerator would
    /// overflow. The final value is rounded to nearest, so the error is at
    /// most half of `1 / base_denominator`.
    ///
    /// Values too large for `base_denominator` fall back to coarser
    /// denominators, down to 1, and saturate at `u32::MAX / 1`.
    ///
    /// ```
    /// use geoframes::URational;
    ///
    /// assert_eq!(URational::approximate(24.0, 100), URational::new(2400, 100));
    /// assert_eq!(URational::approximate(4.125, 100), URational::new(4125, 1000));
    /// assert_eq!(URational::approximate(-50.2, 1000), URational::new(50200, 1000));
    /// ```
    pub fn approximate(value: f64, base_denominator: u32) -> Self {
        let magnitude = if value.is_finite() { value.abs() } else { 0.0 };
        let mut denominator = base_denominator.max(1);

        while denominator > 1 && magnitude * f64::from(denominator) > f64::from(u32::MAX) {
            denominator /= 10;
        }

        while denominator < MAX_DENOMINATOR {
            let scaled = magnitude * f64::from(denominator);
            if (scaled - scaled.round()).abs() <= INTEGRAL_TOLERANCE {
                break;
            }
            let next = denominator.saturating_mul(10);
            if magnitude * f64::from(next) > f64::from(u32::MAX) {
                break;
            }
            denominator = next;
        }

        Self::with_denominator(magnitude, denominator).unwrap_or(Self::integer(u32::MAX))
    }

    /// The value as a float. Zero denominators yield `0.0`.
    pub fn to_f64(self) -> f64 {
        if self.denominator == 0 {
            0.0
        } else {
            f64::from(self.numerator) / f64::from(self.denominator)
        }
    }
}

impl Display for URational {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}
