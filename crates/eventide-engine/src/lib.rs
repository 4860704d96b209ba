//! The Eventide dispatch engine.
//!
//! This crate houses the moving parts of the simulation kernel: the
//! time-ordered event stores, the dispatch loop with its seeded shuffle
//! of simultaneous events, real-time pacing, and the breakpoint
//! subsystem. Most users should depend on the `eventide` facade crate
//! instead, which re-exports this surface together with the core types.
//!
//! The entry point is [`SimKernel`]; callbacks interact with the
//! running kernel through [`StepContext`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod breakpoint;
pub mod config;
pub mod event;
pub mod kernel;
pub mod metrics;

mod pacing;
mod store;

pub use breakpoint::BreakpointListener;
pub use config::KernelConfig;
pub use event::{unit_payload, EventHandle, EventListener, EventPayload};
pub use kernel::{KernelGuard, RunOutcome, RunStop, SimKernel, StepContext};
pub use metrics::KernelMetrics;
