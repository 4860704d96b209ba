//! Error types for the Eventide simulation kernel.
//!
//! One enum per subsystem: time parsing, scheduling, cancellation,
//! pacing, breakpoints, and the run loop. All errors are synchronous;
//! they surface at the offending call, never at a later step.

use std::error::Error;
use std::fmt;

use crate::time::VirtualTime;

/// Boxed error returned by event listeners and carried out of the run
/// loop in [`RunError::Listener`].
pub type ListenerError = Box<dyn Error + Send + Sync + 'static>;

/// Failure to parse a [`VirtualTime`](crate::time::VirtualTime) from its
/// textual format.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimeParseError {
    /// The string matches neither a `<number><unit>` pattern nor a
    /// reserved literal (`FOREVER`, `INFINITE`, `ZERO`).
    InvalidFormat {
        /// The offending input, verbatim.
        input: String,
    },
    /// The numeric part parsed but the unit suffix is not one of
    /// `ns`/`us`/`ms`/`s`/`m`/`h`.
    UnknownUnit {
        /// The offending input, verbatim.
        input: String,
        /// The unrecognized suffix.
        suffix: String,
    },
}

impl fmt::Display for TimeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat { input } => {
                write!(f, "invalid virtual-time format: {input:?}")
            }
            Self::UnknownUnit { input, suffix } => {
                write!(f, "unknown time unit {suffix:?} in {input:?}")
            }
        }
    }
}

impl Error for TimeParseError {}

/// Rejected scheduling call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleError {
    /// The requested offset is a negative duration. Events are scheduled
    /// at `now + offset`; the kernel never schedules into the past.
    NegativeOffset {
        /// The rejected offset.
        offset: VirtualTime,
    },
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NegativeOffset { offset } => {
                write!(f, "scheduling offset {offset} is negative")
            }
        }
    }
}

impl Error for ScheduleError {}

/// Rejected cancellation call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelError {
    /// The handle's event has already been dispatched or canceled.
    NotScheduled,
}

impl fmt::Display for CancelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotScheduled => write!(f, "event is no longer scheduled"),
        }
    }
}

impl Error for CancelError {}

/// Rejected pacing-rate value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RateError {
    /// Rates below zero have no meaning; pausing is rate zero.
    Negative {
        /// The rejected multiplier.
        value: f64,
    },
    /// NaN is rejected outright rather than poisoning comparisons.
    NotANumber,
}

impl fmt::Display for RateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Negative { value } => write!(f, "pacing rate {value} is negative"),
            Self::NotANumber => write!(f, "pacing rate is NaN"),
        }
    }
}

impl Error for RateError {}

/// Rejected breakpoint registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakpointError {
    /// Breakpoints must lie strictly after the current virtual clock;
    /// the loop can no longer pause before an instant it has reached.
    PastTime {
        /// The requested breakpoint time.
        requested: VirtualTime,
        /// The virtual clock at the time of the call.
        now: VirtualTime,
    },
}

impl fmt::Display for BreakpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PastTime { requested, now } => {
                write!(f, "breakpoint at {requested} is not after current time {now}")
            }
        }
    }
}

impl Error for BreakpointError {}

/// Abnormal termination of `run()` / `run_until()`.
///
/// Normal termination (store drained, horizon reached, `stop()` called)
/// is reported through the run outcome, not through this error.
#[derive(Debug)]
pub enum RunError {
    /// An event listener returned an error. The run aborts immediately,
    /// leaving the clock and both stores in their last-consistent state;
    /// nothing scheduled for future instants is lost.
    Listener {
        /// Virtual time of the failing dispatch.
        at: VirtualTime,
        /// The listener's error, unmodified.
        source: ListenerError,
    },
    /// A run is already in progress on another thread; the dispatch loop
    /// is strictly single-threaded.
    AlreadyRunning,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listener { at, source } => {
                write!(f, "listener failed at {at}: {source}")
            }
            Self::AlreadyRunning => write!(f, "dispatch loop is already running"),
        }
    }
}

impl Error for RunError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Listener { source, .. } => Some(&**source),
            Self::AlreadyRunning => None,
        }
    }
}
