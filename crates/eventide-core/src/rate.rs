//! Real-time pacing rates.

use std::fmt;

use crate::error::RateError;

/// Ratio of virtual time to wall-clock time the dispatch loop may not
/// exceed.
///
/// A rate of `1.0` paces the simulation at wall speed, `2.0` at twice
/// wall speed, [`RealtimeRate::UNLIMITED`] disables throttling entirely,
/// and [`RealtimeRate::PAUSED`] (zero) blocks the loop until it is
/// released or the rate is raised. The kernel guarantees only that it
/// will not run *faster* than the configured rate; it may fall behind.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RealtimeRate(f64);

impl RealtimeRate {
    /// No throttling: virtual time advances as fast as dispatch allows.
    pub const UNLIMITED: RealtimeRate = RealtimeRate(f64::INFINITY);

    /// Fully paused: the loop blocks before each instant until released.
    pub const PAUSED: RealtimeRate = RealtimeRate(0.0);

    /// Validated construction. Rejects negative values and NaN.
    pub fn new(value: f64) -> Result<Self, RateError> {
        if value.is_nan() {
            return Err(RateError::NotANumber);
        }
        if value < 0.0 {
            return Err(RateError::Negative { value });
        }
        Ok(Self(value))
    }

    /// The raw multiplier. Infinite for [`UNLIMITED`](Self::UNLIMITED).
    pub const fn value(self) -> f64 {
        self.0
    }

    /// `true` when throttling is disabled.
    pub fn is_unlimited(self) -> bool {
        self.0.is_infinite()
    }

    /// `true` when the loop must block instead of sleeping.
    pub fn is_paused(self) -> bool {
        self.0 == 0.0
    }
}

/// Wall speed: one virtual second per wall second.
impl Default for RealtimeRate {
    fn default() -> Self {
        Self(1.0)
    }
}

impl fmt::Display for RealtimeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unlimited() {
            write!(f, "unlimited")
        } else {
            write!(f, "{}x", self.0)
        }
    }
}
