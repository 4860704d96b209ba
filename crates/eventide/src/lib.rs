//! Eventide: a discrete-event simulation kernel with virtual time,
//! real-time pacing, and breakpoints.
//!
//! This is the top-level facade crate that re-exports the public API
//! from the Eventide sub-crates. For most users, adding `eventide` as a
//! single dependency is sufficient.
//!
//! Simulations schedule callbacks against a virtual clock; the kernel
//! dispatches them in time order, jumping the clock from instant to
//! instant. Simultaneous events dispatch as one batch in a
//! seeded-random order, so a run is exactly reproducible from its seed.
//! Pacing couples the virtual clock to the wall clock at any rate from
//! paused to unlimited, and breakpoints pause a run at a chosen virtual
//! time.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use eventide::prelude::*;
//!
//! let kernel = SimKernel::new(KernelConfig {
//!     seed: Some(42),
//!     initial_rate: RealtimeRate::UNLIMITED,
//! });
//!
//! // Five heartbeats, one per virtual second.
//! for i in 1..=5 {
//!     kernel
//!         .schedule(
//!             Arc::new(|ctx: &mut StepContext<'_>, _: &EventPayload| {
//!                 println!("beat at {}", ctx.now());
//!                 Ok(())
//!             }),
//!             VirtualTime::new(i, TimeUnit::Seconds),
//!             unit_payload(),
//!         )
//!         .unwrap();
//! }
//!
//! let outcome = kernel.run().unwrap();
//! assert_eq!(outcome.metrics.ordinary_dispatched, 5);
//! assert_eq!(outcome.ended_at, VirtualTime::new(5, TimeUnit::Seconds));
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in
//! the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `eventide-core` | Virtual time, pacing rates, error taxonomy |
//! | [`engine`] | `eventide-engine` | The kernel, event handles, breakpoints, metrics |
//! | [`timer`] | `eventide-timer` | Re-armable one-shot timers |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Virtual time, pacing rates, and the error taxonomy
/// (`eventide-core`).
///
/// [`types::VirtualTime`] and [`types::RealtimeRate`] are also in the
/// [`prelude`].
pub use eventide_core as types;

/// The dispatch engine (`eventide-engine`).
///
/// [`engine::SimKernel`] is the entry point; callbacks receive an
/// [`engine::StepContext`]. Both are in the [`prelude`].
pub use eventide_engine as engine;

/// Re-armable one-shot timers on top of the kernel (`eventide-timer`).
///
/// [`timer::Timer`] pairs a [`timer::TimerHandler`] with at most one
/// pending expiry.
pub use eventide_timer as timer;

/// Common imports for typical Eventide usage.
///
/// ```rust
/// use eventide::prelude::*;
/// ```
///
/// This imports the kernel surface, the time and rate value types, the
/// listener traits, and the error types their callbacks return.
pub mod prelude {
    // Time and pacing
    pub use eventide_core::{RealtimeRate, TimeUnit, VirtualTime};

    // Errors
    pub use eventide_core::{
        BreakpointError, CancelError, ListenerError, RateError, RunError, ScheduleError,
    };

    // Kernel
    pub use eventide_engine::{
        unit_payload, BreakpointListener, EventHandle, EventListener, EventPayload, KernelConfig,
        KernelMetrics, RunOutcome, RunStop, SimKernel, StepContext,
    };

    // Timers
    pub use eventide_timer::{Timer, TimerHandler};
}
