//! Breakpoints and pacing: pausing a paced run at chosen virtual
//! times and resuming from a listener.
//!
//! Demonstrates:
//!   1. Running paced (virtual time coupled to the wall clock)
//!   2. Registering breakpoints, including one past the last event
//!   3. A listener that logs each pause and restores the rate
//!   4. Inspecting what is left after the run
//!
//! Run with:
//!   cargo run --example breakpoints

use std::sync::Arc;

use eventide_core::{ListenerError, RealtimeRate, TimeUnit, VirtualTime};
use eventide_engine::{unit_payload, EventPayload, KernelConfig, SimKernel, StepContext};

const RATE: f64 = 8.0;

fn secs(n: i64) -> VirtualTime {
    VirtualTime::new(n, TimeUnit::Seconds)
}

fn millis(n: i64) -> VirtualTime {
    VirtualTime::new(n, TimeUnit::Milliseconds)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Eventide Breakpoints ===\n");

    // 1. A paced kernel: virtual seconds pass at 8x wall speed.
    let kernel = SimKernel::new(KernelConfig {
        seed: Some(7),
        initial_rate: RealtimeRate::new(RATE)?,
    });

    // 2. Each fired breakpoint drops the rate to zero. This listener
    //    reports the pause and immediately resumes at the paced rate,
    //    so the run continues hands-free.
    kernel.add_breakpoint_listener(Arc::new(
        |ctx: &mut StepContext<'_>, time: VirtualTime| {
            println!("  ** breakpoint at {time}; resuming at {RATE}x");
            ctx.set_rate(RealtimeRate::new(RATE).unwrap());
        },
    ));

    // 3. Breakpoints, including two half a virtual millisecond apart
    //    and one past the final event that will never fire.
    for time in [secs(1), millis(2500), millis(8500), millis(8505), secs(10)] {
        kernel.add_breakpoint(time)?;
    }

    // 4. Ten events, one per virtual second.
    for i in 0..10 {
        kernel.schedule(
            Arc::new(move |ctx: &mut StepContext<'_>, _: &EventPayload| -> Result<(), ListenerError> {
                println!("  event {i} at {}", ctx.now());
                Ok(())
            }),
            secs(i),
            unit_payload(),
        )?;
    }

    let outcome = kernel.run_until(secs(20))?;

    // 5. The ordinary store drained at 9s, so the 10s breakpoint is
    //    still registered.
    println!("\nRun ended: {:?} at {}", outcome.stop, outcome.ended_at);
    println!("Breakpoints fired: {}", outcome.metrics.breakpoints_fired);
    println!(
        "Still registered: {:?}",
        kernel
            .lock_for_inspection()
            .breakpoint_times()
            .iter()
            .map(|t| format!("{t}"))
            .collect::<Vec<_>>()
    );
    Ok(())
}
