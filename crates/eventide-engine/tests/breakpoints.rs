//! Breakpoint integration tests.
//!
//! A breakpoint is a pause request pinned to a virtual time: when the
//! clock reaches it, pacing drops to zero before anything ordinary at
//! that instant dispatches, registered listeners are notified on the
//! dispatch thread, and the registration is consumed. These tests cover
//! the pause ordering, listener choreography, validation, and removal.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use eventide_core::{BreakpointError, RealtimeRate, TimeUnit, VirtualTime};
use eventide_engine::{
    unit_payload, BreakpointListener, KernelConfig, RunStop, SimKernel, StepContext,
};
use eventide_test_utils::{AutoResume, CountingListener, EventLog, RecordingListener};

// ── Helpers ─────────────────────────────────────────────────────

fn secs(n: i64) -> VirtualTime {
    VirtualTime::new(n, TimeUnit::Seconds)
}

fn millis(n: i64) -> VirtualTime {
    VirtualTime::new(n, TimeUnit::Milliseconds)
}

fn unlimited_kernel(seed: u64) -> SimKernel {
    SimKernel::new(KernelConfig {
        seed: Some(seed),
        initial_rate: RealtimeRate::UNLIMITED,
    })
}

/// Poll `probe` every couple of milliseconds until it holds, or panic
/// after five seconds.
fn eventually(what: &str, mut probe: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if probe() {
            return;
        }
        thread::sleep(Duration::from_millis(2));
    }
    panic!("timed out waiting for {what}");
}

// ── Validation ──────────────────────────────────────────────────

#[test]
fn breakpoints_must_lie_strictly_in_the_future() {
    let kernel = unlimited_kernel(1);
    assert_eq!(
        kernel.add_breakpoint(VirtualTime::ZERO),
        Err(BreakpointError::PastTime {
            requested: VirtualTime::ZERO,
            now: VirtualTime::ZERO,
        })
    );

    // Run the clock forward, then try to pin a pause behind it.
    let counter = CountingListener::new();
    kernel
        .schedule(counter.clone(), secs(5), unit_payload())
        .unwrap();
    kernel.run().unwrap();
    assert_eq!(
        kernel.add_breakpoint(secs(3)),
        Err(BreakpointError::PastTime {
            requested: secs(3),
            now: secs(5),
        })
    );
}

#[test]
fn one_breakpoint_per_time() {
    let kernel = unlimited_kernel(1);
    assert_eq!(kernel.add_breakpoint(secs(1)), Ok(true));
    assert_eq!(kernel.add_breakpoint(secs(1)), Ok(false));
    assert_eq!(kernel.add_breakpoint(secs(2)), Ok(true));
    assert_eq!(
        kernel.lock_for_inspection().breakpoint_times(),
        vec![secs(1), secs(2)]
    );
}

#[test]
fn removed_breakpoints_never_pause() {
    let kernel = unlimited_kernel(1);
    let counter = CountingListener::new();
    kernel
        .schedule(counter.clone(), secs(2), unit_payload())
        .unwrap();

    assert!(kernel.add_breakpoint(secs(1)).unwrap());
    assert!(kernel.remove_breakpoint(secs(1)));
    assert!(!kernel.remove_breakpoint(secs(1)));

    let outcome = kernel.run().unwrap();
    assert_eq!(outcome.stop, RunStop::Exhausted);
    assert_eq!(counter.count(), 1);
    assert_eq!(outcome.metrics.breakpoints_fired, 0);
    assert_eq!(kernel.rate(), RealtimeRate::UNLIMITED);
}

// ── Pause ordering ──────────────────────────────────────────────

/// The pause lands before anything ordinary at the breakpoint's own
/// instant: a resuming listener sees the same-instant batch dispatch
/// after it.
#[test]
fn breakpoint_pauses_before_the_same_instant_batch() {
    let kernel = unlimited_kernel(21);
    let log = EventLog::new();
    for name in ["x", "y", "z"] {
        kernel
            .schedule(
                RecordingListener::new(name, log.clone()),
                millis(2500),
                unit_payload(),
            )
            .unwrap();
    }
    kernel
        .schedule(RecordingListener::new("before", log.clone()), secs(1), unit_payload())
        .unwrap();

    kernel.add_breakpoint(millis(2500)).unwrap();
    let resume = AutoResume::with_log(RealtimeRate::UNLIMITED, log.clone());
    kernel.add_breakpoint_listener(resume.clone());

    let outcome = kernel.run().unwrap();
    assert_eq!(outcome.stop, RunStop::Exhausted);
    assert_eq!(resume.resumed(), 1);
    assert_eq!(outcome.metrics.breakpoints_fired, 1);

    let labels = log.labels();
    assert_eq!(labels.len(), 5);
    assert_eq!(labels[0], "before");
    assert_eq!(labels[1], "breakpoint");
    let mut batch: Vec<&str> = labels[2..].iter().map(String::as_str).collect();
    batch.sort_unstable();
    assert_eq!(batch, ["x", "y", "z"]);

    // Fired breakpoints are consumed.
    assert!(kernel.lock_for_inspection().breakpoint_times().is_empty());
}

/// A breakpoint with no ordinary event at its time still pauses, with
/// the clock advanced exactly to it.
#[test]
fn breakpoint_alone_advances_the_clock_to_itself() {
    let kernel = unlimited_kernel(3);
    let log = EventLog::new();
    kernel
        .schedule(RecordingListener::new("evt", log.clone()), secs(4), unit_payload())
        .unwrap();
    kernel.add_breakpoint(millis(1500)).unwrap();
    let resume = AutoResume::with_log(RealtimeRate::UNLIMITED, log.clone());
    kernel.add_breakpoint_listener(resume);

    kernel.run().unwrap();

    assert_eq!(
        log.entries(),
        vec![
            ("breakpoint".to_string(), millis(1500)),
            ("evt".to_string(), secs(4)),
        ]
    );
}

/// Without a resuming listener the run genuinely parks: the clock sits
/// at the breakpoint and nothing past it dispatches until a supervisor
/// raises the rate.
#[test]
fn unattended_breakpoint_parks_the_run() {
    let kernel = Arc::new(unlimited_kernel(5));
    let counter = CountingListener::new();
    kernel
        .schedule(counter.clone(), secs(1), unit_payload())
        .unwrap();
    kernel.add_breakpoint(millis(500)).unwrap();

    let runner = Arc::clone(&kernel);
    let driver = thread::Builder::new()
        .name("eventide-driver".into())
        .spawn(move || runner.run())
        .unwrap();

    eventually("breakpoint to pause the run", || {
        kernel.rate() == RealtimeRate::PAUSED
    });
    assert_eq!(counter.count(), 0);
    assert_eq!(kernel.current_time(), millis(500));

    kernel.set_rate(RealtimeRate::UNLIMITED);
    let outcome = driver.join().unwrap().unwrap();
    assert_eq!(outcome.stop, RunStop::Exhausted);
    assert_eq!(counter.count(), 1);
    assert_eq!(outcome.ended_at, secs(1));
}

// ── Listener management ─────────────────────────────────────────

/// Listener that deregisters a configured victim on its first fire.
struct RemoveOnce {
    victim: Mutex<Option<Arc<dyn BreakpointListener>>>,
}

impl BreakpointListener for RemoveOnce {
    fn breakpoint_reached(&self, ctx: &mut StepContext<'_>, _time: VirtualTime) {
        if let Some(victim) = self.victim.lock().unwrap().take() {
            assert!(ctx.remove_breakpoint_listener(&victim));
        }
    }
}

/// Every registered listener hears every fired breakpoint; a removed
/// listener hears nothing further.
#[test]
fn listeners_are_notified_per_fire_until_removed() {
    let kernel = unlimited_kernel(8);
    let counter = CountingListener::new();
    for i in 1..=4 {
        kernel
            .schedule(counter.clone(), secs(i), unit_payload())
            .unwrap();
    }
    kernel.add_breakpoint(millis(1500)).unwrap();
    kernel.add_breakpoint(millis(3500)).unwrap();

    let resume = AutoResume::new(RealtimeRate::UNLIMITED);
    let bystander = AutoResume::new(RealtimeRate::UNLIMITED);
    kernel.add_breakpoint_listener(resume.clone());
    kernel.add_breakpoint_listener(bystander.clone());

    // Deregister the bystander from inside the first fire.
    kernel.add_breakpoint_listener(Arc::new(RemoveOnce {
        victim: Mutex::new(Some(bystander.clone())),
    }));

    let outcome = kernel.run().unwrap();

    assert_eq!(outcome.metrics.breakpoints_fired, 2);
    assert_eq!(resume.resumed(), 2);
    // The bystander heard only the first fire.
    assert_eq!(bystander.resumed(), 1);
    assert_eq!(counter.count(), 4);
}
