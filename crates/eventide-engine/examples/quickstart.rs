//! Eventide quickstart: a complete, minimal simulation from scratch.
//!
//! Demonstrates:
//!   1. Building a kernel with a fixed seed
//!   2. Scheduling events with typed payloads
//!   3. Canceling one of them through its handle
//!   4. Running to a horizon and reading the outcome
//!
//! Run with:
//!   cargo run --example quickstart

use std::sync::Arc;

use eventide_core::{ListenerError, RealtimeRate, TimeUnit, VirtualTime};
use eventide_engine::{EventPayload, KernelConfig, SimKernel, StepContext};

// ─── Payload ────────────────────────────────────────────────────

/// What each scheduled event carries: a label to print at dispatch.
struct Announcement {
    label: String,
}

fn announce(ctx: &mut StepContext<'_>, payload: &EventPayload) -> Result<(), ListenerError> {
    let announcement = payload
        .downcast_ref::<Announcement>()
        .ok_or("payload was not an Announcement")?;
    println!("  {:>8} {}", format!("{}", ctx.now()), announcement.label);
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Eventide Quickstart ===\n");

    // 1. Build a kernel. A fixed seed makes the dispatch order of
    //    simultaneous events reproducible; unlimited rate means the
    //    run never waits on the wall clock (see the `breakpoints`
    //    example for pacing).
    let kernel = SimKernel::new(KernelConfig {
        seed: Some(42),
        initial_rate: RealtimeRate::UNLIMITED,
    });
    println!("Kernel created. Seed: {}\n", kernel.seed());

    // 2. Schedule ten announcements, one per virtual second.
    let mut handles = Vec::new();
    for i in 0..10 {
        let handle = kernel.schedule(
            Arc::new(announce),
            VirtualTime::new(i, TimeUnit::Seconds),
            Arc::new(Announcement {
                label: format!("event {i}"),
            }),
        )?;
        handles.push(handle);
    }

    // 3. Cancel event 3 before the run; its instant will cost nothing.
    kernel.cancel(&handles[3])?;
    println!("Canceled event 3 (due {})\n", handles[3].due());

    // 4. Run with a 20s horizon. The clock ends at the last dispatched
    //    instant, not at the horizon.
    println!("Dispatching:");
    let outcome = kernel.run_until(VirtualTime::new(20, TimeUnit::Seconds))?;

    println!("\nRun ended: {:?} at {}", outcome.stop, outcome.ended_at);
    println!(
        "Dispatched {} events, skipped {} expired, over {} instants.",
        outcome.metrics.ordinary_dispatched,
        outcome.metrics.expired_skipped,
        outcome.metrics.instants,
    );
    Ok(())
}
