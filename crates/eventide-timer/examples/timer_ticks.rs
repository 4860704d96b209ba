//! Timers: one-shot expiries, re-arming, and periodic ticks.
//!
//! Demonstrates:
//!   1. That the latest `start` wins: re-arming replaces the pending
//!      expiry instead of stacking another one
//!   2. Telling expiries apart by payload
//!   3. A handler re-arming itself from its callback for a periodic
//!      tick
//!
//! Run with:
//!   cargo run --example timer_ticks

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use eventide_core::{ListenerError, RealtimeRate, TimeUnit, VirtualTime};
use eventide_engine::{unit_payload, EventPayload, KernelConfig, SimKernel, StepContext};
use eventide_timer::{Timer, TimerHandler};

fn secs(n: i64) -> VirtualTime {
    VirtualTime::new(n, TimeUnit::Seconds)
}

/// Re-arms its own timer once per virtual second, five beats total.
struct Metronome {
    timer: Mutex<Option<Timer>>,
    beats: AtomicUsize,
}

impl TimerHandler for Metronome {
    fn timer_expired(
        &self,
        ctx: &mut StepContext<'_>,
        _payload: &EventPayload,
    ) -> Result<(), ListenerError> {
        let beat = self.beats.fetch_add(1, Ordering::SeqCst) + 1;
        println!("  beat {beat} at {}", ctx.now());
        if beat < 5 {
            let guard = self.timer.lock().unwrap();
            let timer = guard.as_ref().ok_or("metronome timer missing")?;
            timer.start_with(ctx, secs(1), unit_payload())?;
        }
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Eventide Timers ===\n");

    let kernel = SimKernel::new(KernelConfig {
        seed: Some(3),
        initial_rate: RealtimeRate::UNLIMITED,
    });

    // 1. One-shot with payload: four starts in a row, each replacing
    //    the previous expiry, so only the last one fires.
    let one_shot = Timer::new(Arc::new(
        |ctx: &mut StepContext<'_>, payload: &EventPayload| -> Result<(), ListenerError> {
            let label = payload.downcast_ref::<&str>().ok_or("label payload")?;
            println!("  one-shot fired at {}: {label}", ctx.now());
            Ok(())
        },
    ));
    one_shot.start(&kernel, secs(1), Arc::new("first"))?;
    one_shot.start(&kernel, secs(2), Arc::new("second"))?;
    one_shot.start(&kernel, secs(3), Arc::new("third"))?;
    println!("One-shot armed three times; still running: {}", one_shot.is_running());

    // 2. Periodic: the metronome re-arms itself from its callback.
    let metronome = Arc::new(Metronome {
        timer: Mutex::new(None),
        beats: AtomicUsize::new(0),
    });
    let beat_timer = Timer::new(metronome.clone());
    beat_timer.start(&kernel, secs(1), unit_payload())?;
    *metronome.timer.lock().unwrap() = Some(beat_timer);

    println!("\nDispatching:");
    let outcome = kernel.run()?;

    println!("\nRun ended: {:?} at {}", outcome.stop, outcome.ended_at);
    println!(
        "{} expiries dispatched, {} replaced starts skipped.",
        outcome.metrics.ordinary_dispatched,
        outcome.metrics.expired_skipped,
    );
    Ok(())
}
