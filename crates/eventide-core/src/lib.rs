//! Core types for the Eventide simulation kernel.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the fundamental value types used throughout the Eventide workspace:
//! virtual-time instants and durations, pacing rates, and the kernel
//! error taxonomy.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod rate;
pub mod time;

pub use error::{
    BreakpointError, CancelError, ListenerError, RateError, RunError, ScheduleError,
    TimeParseError,
};
pub use rate::RealtimeRate;
pub use time::{TimeUnit, VirtualTime};
