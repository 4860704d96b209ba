//! Pacing state and wall-clock sleep arithmetic.
//!
//! The kernel throttles virtual-time advancement against the wall clock:
//! before advancing to the next instant it sleeps the scaled wall delta,
//! or blocks outright while the rate is zero. The condvar plumbing lives
//! in the kernel; this module owns the mutable pacing fields and the pure
//! sleep computation.

use std::time::Duration;

use eventide_core::{RealtimeRate, TimeUnit, VirtualTime};

/// Mutable pacing fields, guarded by the kernel gate.
#[derive(Debug)]
pub(crate) struct PacingState {
    /// Current rate. Read by the dispatch loop before each advance.
    pub(crate) rate: RealtimeRate,
    /// One-shot permission to pass the rate-zero gate. Set by `release()`,
    /// consumed by the next blocked (or about-to-block) pace.
    pub(crate) release_pending: bool,
    /// Bumped on every rate change so a sleeping pace can tell its
    /// deadline is stale and recompute.
    pub(crate) rate_epoch: u64,
}

impl PacingState {
    pub(crate) fn new(initial: RealtimeRate) -> Self {
        Self {
            rate: initial,
            release_pending: false,
            rate_epoch: 0,
        }
    }

    pub(crate) fn set_rate(&mut self, rate: RealtimeRate) {
        self.rate = rate;
        self.rate_epoch += 1;
    }

    /// Consume a pending release, if any.
    pub(crate) fn take_release(&mut self) -> bool {
        std::mem::take(&mut self.release_pending)
    }
}

/// Wall-clock duration to sleep before the virtual clock may advance from
/// `from` to `to` at `rate`.
///
/// `None` means no sleep is required: the rate is unlimited, or the
/// target is not ahead of the clock, or the scaled delta rounds below a
/// nanosecond. A delta too large for the wall clock (including division
/// by a denormal rate) comes back as `Duration::MAX`; callers treat that
/// as "hold until something changes".
///
/// The zero rate blocks instead of sleeping and must be handled before
/// calling this.
pub(crate) fn scaled_wall_delta(
    from: VirtualTime,
    to: VirtualTime,
    rate: RealtimeRate,
) -> Option<Duration> {
    debug_assert!(!rate.is_paused(), "zero rate blocks, it does not sleep");
    if rate.is_unlimited() || to <= from {
        return None;
    }
    let wall_secs = (to - from).frac(TimeUnit::Seconds) / rate.value();
    match Duration::try_from_secs_f64(wall_secs) {
        Ok(d) if d.is_zero() => None,
        Ok(d) => Some(d),
        Err(_) => Some(Duration::MAX),
    }
}
