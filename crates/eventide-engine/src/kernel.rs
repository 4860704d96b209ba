//! The dispatch loop and its public surface.
//!
//! [`SimKernel`] owns all mutable simulation state (the virtual clock,
//! both event stores, pacing, breakpoints, and the shuffle RNG) behind a
//! single mutex (the interleaving gate) plus one condvar for pacing
//! waits. One thread drives [`run`](SimKernel::run); any other thread may
//! concurrently schedule, cancel, adjust pacing, or manage breakpoints
//! through `&self` methods that take the same gate.
//!
//! ```text
//!   dispatch thread                    supervisory / producer threads
//!   ───────────────                    ──────────────────────────────
//!   run_until(end)                     schedule() / cancel()
//!     └─ step: lock gate               set_rate() / release() / stop()
//!          discard dead batches        add_breakpoint() / listeners
//!          pick next instant               │
//!          pace (gate released  ◄──────────┘ notify on state change
//!            inside condvar waits)
//!          advance clock, pop batch
//!          shuffle (ordinary only)
//!          expire + invoke callbacks ── StepContext (no re-locking)
//! ```
//!
//! Within one instant, system events drain first in insertion order;
//! the ordinary batch is then dispatched in a seeded-random permutation.
//! The permutation is the only nondeterminism in the kernel and is fully
//! reproducible from [`KernelConfig::seed`].

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, trace};

use eventide_core::{
    BreakpointError, CancelError, RealtimeRate, RunError, ScheduleError, VirtualTime,
};

use crate::breakpoint::{BreakpointFire, BreakpointListener, BreakpointRegistry};
use crate::config::KernelConfig;
use crate::event::{unit_payload, EventHandle, EventListener, EventPayload, EventRecord};
use crate::metrics::KernelMetrics;
use crate::pacing::{scaled_wall_delta, PacingState};
use crate::store::EventStore;

// ── Run reporting ────────────────────────────────────────────────────────

/// Why a run returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStop {
    /// The ordinary store drained. Pending system events, if any, are
    /// left in place.
    Exhausted,
    /// The next ordinary instant lies beyond the requested end time;
    /// everything past the horizon stays scheduled.
    HorizonReached,
    /// [`stop`](SimKernel::stop) was called.
    Stopped,
}

/// Report returned by [`SimKernel::run`] / [`SimKernel::run_until`].
#[derive(Clone, Copy, Debug)]
pub struct RunOutcome {
    /// The terminator that ended the run.
    pub stop: RunStop,
    /// Virtual clock when the run returned.
    pub ended_at: VirtualTime,
    /// Counter snapshot at return.
    pub metrics: KernelMetrics,
}

// ── Shared state ─────────────────────────────────────────────────────────

/// Everything behind the interleaving gate.
struct KernelState {
    clock: VirtualTime,
    ordinary: EventStore,
    system: EventStore,
    pacing: PacingState,
    breakpoints: BreakpointRegistry,
    rng: ChaCha8Rng,
    metrics: KernelMetrics,
    stop_requested: bool,
    running: bool,
    /// Instant the loop is currently pacing toward, if any. Scheduling
    /// an event before this target flips `pace_preempted` so the pace
    /// wakes and re-derives its target.
    pace_target: Option<VirtualTime>,
    pace_preempted: bool,
}

impl KernelState {
    fn insert_event(
        &mut self,
        listener: Arc<dyn EventListener>,
        due: VirtualTime,
        payload: EventPayload,
        system: bool,
    ) -> EventHandle {
        let record = EventRecord::new(listener, due, payload);
        let handle = EventHandle::new(Arc::clone(&record));
        if system {
            self.system.insert(record);
        } else {
            self.ordinary.insert(record);
        }
        if let Some(target) = self.pace_target {
            if due < target {
                self.pace_preempted = true;
            }
        }
        trace!(%due, system, "event scheduled");
        handle
    }

    fn schedule_at(
        &mut self,
        listener: Arc<dyn EventListener>,
        offset: VirtualTime,
        payload: EventPayload,
        system: bool,
    ) -> Result<EventHandle, ScheduleError> {
        if offset.is_negative() {
            return Err(ScheduleError::NegativeOffset { offset });
        }
        Ok(self.insert_event(listener, self.clock + offset, payload, system))
    }

    fn add_breakpoint(&mut self, time: VirtualTime) -> Result<bool, BreakpointError> {
        if time <= self.clock {
            return Err(BreakpointError::PastTime {
                requested: time,
                now: self.clock,
            });
        }
        if self.breakpoints.contains(time) {
            return Ok(false);
        }
        let handle = self.insert_event(Arc::new(BreakpointFire), time, unit_payload(), true);
        self.breakpoints.insert(time, handle);
        debug!(%time, "breakpoint added");
        Ok(true)
    }

    fn remove_breakpoint(&mut self, time: VirtualTime) -> bool {
        match self.breakpoints.remove(time) {
            Some(handle) => {
                // The dead system record is swept with its batch.
                let _ = handle.cancel();
                debug!(%time, "breakpoint removed");
                true
            }
            None => false,
        }
    }

    fn discard_dead_batches(&mut self) {
        while let Some((time, count)) = self.ordinary.pop_min_if_dead() {
            self.metrics.expired_skipped += count as u64;
            trace!(%time, count, "discarded expired ordinary batch");
        }
        while let Some((time, count)) = self.system.pop_min_if_dead() {
            self.metrics.expired_skipped += count as u64;
            trace!(%time, count, "discarded expired system batch");
        }
    }
}

fn run_outcome(stop: RunStop, state: &KernelState) -> RunOutcome {
    debug!(?stop, ended_at = %state.clock, "run finished");
    RunOutcome {
        stop,
        ended_at: state.clock,
        metrics: state.metrics,
    }
}

/// Seed matching the original behavior of seeding from the wall clock
/// when the caller did not fix one.
fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ── Kernel ───────────────────────────────────────────────────────────────

/// A discrete-event simulation kernel.
///
/// The virtual clock advances strictly by jumping to the next pending
/// due time; all events at that instant dispatch as one batch. See the
/// [module docs](self) for the threading picture.
///
/// ```
/// use std::sync::Arc;
/// use eventide_core::{RealtimeRate, TimeUnit, VirtualTime};
/// use eventide_engine::{unit_payload, EventPayload, KernelConfig, SimKernel, StepContext};
///
/// let kernel = SimKernel::new(KernelConfig {
///     seed: Some(7),
///     initial_rate: RealtimeRate::UNLIMITED,
/// });
/// kernel
///     .schedule(
///         Arc::new(|ctx: &mut StepContext<'_>, _: &EventPayload| {
///             println!("fired at {}", ctx.now());
///             Ok(())
///         }),
///         VirtualTime::new(250, TimeUnit::Milliseconds),
///         unit_payload(),
///     )
///     .unwrap();
/// let outcome = kernel.run().unwrap();
/// assert_eq!(outcome.ended_at, VirtualTime::new(250, TimeUnit::Milliseconds));
/// ```
pub struct SimKernel {
    state: Mutex<KernelState>,
    pacer: Condvar,
    seed: u64,
}

// One thread drives the loop while supervisory threads adjust pacing and
// breakpoints through &self. Fails to compile if any field loses the
// bounds.
const _: () = {
    #[allow(dead_code)]
    fn assert_send_sync<T: Send + Sync>() {}
    #[allow(dead_code)]
    fn check() {
        assert_send_sync::<SimKernel>();
        assert_send_sync::<EventHandle>();
    }
};

enum Pace {
    /// Wall time caught up with the target instant; dispatch it.
    Reached,
    /// State changed under the wait (stop, or an earlier event arrived);
    /// re-derive the next instant.
    Restart,
}

impl SimKernel {
    /// Build a kernel at virtual time zero with empty stores.
    pub fn new(config: KernelConfig) -> Self {
        let seed = config.seed.unwrap_or_else(clock_seed);
        debug!(seed, rate = %config.initial_rate, "kernel created");
        Self {
            state: Mutex::new(KernelState {
                clock: VirtualTime::ZERO,
                ordinary: EventStore::default(),
                system: EventStore::default(),
                pacing: PacingState::new(config.initial_rate),
                breakpoints: BreakpointRegistry::new(),
                rng: ChaCha8Rng::seed_from_u64(seed),
                metrics: KernelMetrics::default(),
                stop_requested: false,
                running: false,
                pace_target: None,
                pace_preempted: false,
            }),
            pacer: Condvar::new(),
            seed,
        }
    }

    /// The seed actually in effect, whether configured or clock-derived.
    /// Rerunning an identical schedule with this seed reproduces the
    /// dispatch permutation.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn lock_state(&self) -> MutexGuard<'_, KernelState> {
        self.state.lock().unwrap()
    }

    // ── Producer surface ─────────────────────────────────────────────────

    /// Schedule an ordinary event `offset` after the current virtual
    /// time. The offset must be non-negative.
    ///
    /// Returns a handle for [`cancel`](SimKernel::cancel).
    pub fn schedule(
        &self,
        listener: Arc<dyn EventListener>,
        offset: VirtualTime,
        payload: EventPayload,
    ) -> Result<EventHandle, ScheduleError> {
        let mut state = self.lock_state();
        let handle = state.schedule_at(listener, offset, payload, false)?;
        let preempted = state.pace_preempted;
        drop(state);
        if preempted {
            self.pacer.notify_all();
        }
        Ok(handle)
    }

    /// Schedule into the system store: same contract as
    /// [`schedule`](SimKernel::schedule), but the event drains before the
    /// ordinary batch at its instant and is never shuffled. Breakpoints
    /// use this store; it is exposed for symmetry.
    pub fn schedule_system(
        &self,
        listener: Arc<dyn EventListener>,
        offset: VirtualTime,
        payload: EventPayload,
    ) -> Result<EventHandle, ScheduleError> {
        let mut state = self.lock_state();
        let handle = state.schedule_at(listener, offset, payload, true)?;
        let preempted = state.pace_preempted;
        drop(state);
        if preempted {
            self.pacer.notify_all();
        }
        Ok(handle)
    }

    /// Expire a scheduled event before it fires.
    ///
    /// O(1) and lazy: the record stays in its batch and is skipped at
    /// dispatch. Alias of [`EventHandle::cancel`], which does not take
    /// the gate, so this is safe from any thread.
    pub fn cancel(&self, handle: &EventHandle) -> Result<(), CancelError> {
        handle.cancel()
    }

    /// The virtual clock. Monotonically non-decreasing across a run.
    pub fn current_time(&self) -> VirtualTime {
        self.lock_state().clock
    }

    /// Counter snapshot.
    pub fn metrics(&self) -> KernelMetrics {
        self.lock_state().metrics
    }

    // ── Supervisory surface ──────────────────────────────────────────────

    /// Replace the pacing rate. Takes effect immediately: a sleeping
    /// pace re-computes, and a rate-zero block ends if the new rate is
    /// nonzero.
    pub fn set_rate(&self, rate: RealtimeRate) {
        let mut state = self.lock_state();
        debug!(%rate, "pacing rate changed");
        state.pacing.set_rate(rate);
        drop(state);
        self.pacer.notify_all();
    }

    /// The current pacing rate.
    pub fn rate(&self) -> RealtimeRate {
        self.lock_state().pacing.rate
    }

    /// Single-step: allow a loop blocked (or about to block) at rate
    /// zero through exactly one instant.
    ///
    /// The permission is a flag, not a bare signal, so a release that
    /// lands just before the loop blocks is never lost. While the rate
    /// is nonzero the flag is simply held until the next block.
    pub fn release(&self) {
        let mut state = self.lock_state();
        state.pacing.release_pending = true;
        drop(state);
        self.pacer.notify_all();
    }

    /// End the current run at the next opportunity: mid-pace waits wake
    /// immediately, an in-flight batch finishes first. Idempotent; has
    /// no effect on a kernel that is not running.
    pub fn stop(&self) {
        let mut state = self.lock_state();
        state.stop_requested = true;
        drop(state);
        self.pacer.notify_all();
    }

    /// Request a pause just before `time`.
    ///
    /// Returns `Ok(false)` if a breakpoint already exists at exactly
    /// that time, `Err` if `time` is not strictly after the clock.
    pub fn add_breakpoint(&self, time: VirtualTime) -> Result<bool, BreakpointError> {
        let mut state = self.lock_state();
        let added = state.add_breakpoint(time)?;
        let preempted = state.pace_preempted;
        drop(state);
        if preempted {
            self.pacer.notify_all();
        }
        Ok(added)
    }

    /// Drop the breakpoint at `time`, canceling its system event.
    /// Returns `false` if none is registered there.
    pub fn remove_breakpoint(&self, time: VirtualTime) -> bool {
        self.lock_state().remove_breakpoint(time)
    }

    /// Register a listener for every subsequently fired breakpoint.
    pub fn add_breakpoint_listener(&self, listener: Arc<dyn BreakpointListener>) {
        self.lock_state().breakpoints.add_listener(listener);
    }

    /// Remove a listener previously added, matched by `Arc` identity.
    pub fn remove_breakpoint_listener(&self, listener: &Arc<dyn BreakpointListener>) -> bool {
        self.lock_state().breakpoints.remove_listener(listener)
    }

    /// Acquire the interleaving gate for external inspection.
    ///
    /// Blocks while a batch is being dispatched; the returned guard
    /// holds the gate (pausing dispatch at its next acquisition) until
    /// dropped, and exposes a consistent read-only view.
    pub fn lock_for_inspection(&self) -> KernelGuard<'_> {
        KernelGuard {
            state: self.lock_state(),
        }
    }

    // ── Run loop ─────────────────────────────────────────────────────────

    /// Drive the loop until the ordinary store drains or `stop()` is
    /// called. Equivalent to `run_until(VirtualTime::NEVER)`.
    pub fn run(&self) -> Result<RunOutcome, RunError> {
        self.run_until(VirtualTime::NEVER)
    }

    /// Drive the loop until the ordinary store drains, the next ordinary
    /// instant would exceed `end`, or `stop()` is called. Events beyond
    /// the horizon are left pending, not discarded.
    ///
    /// Listener failures abort the run with the clock and both stores in
    /// their last-consistent state.
    pub fn run_until(&self, end: VirtualTime) -> Result<RunOutcome, RunError> {
        {
            let mut state = self.lock_state();
            if state.running {
                return Err(RunError::AlreadyRunning);
            }
            state.running = true;
            state.stop_requested = false;
            debug!(horizon = %end, now = %state.clock, "run starting");
        }
        let result = self.drive(end);
        self.lock_state().running = false;
        result
    }

    fn drive(&self, end: VirtualTime) -> Result<RunOutcome, RunError> {
        loop {
            let mut state = self.lock_state();

            // A canceled instant costs no pacing and no clock movement.
            state.discard_dead_batches();

            if state.stop_requested {
                return Ok(run_outcome(RunStop::Stopped, &state));
            }
            let Some(t_ord) = state.ordinary.peek_min_time() else {
                return Ok(run_outcome(RunStop::Exhausted, &state));
            };
            if t_ord > end {
                debug!(next = %t_ord, horizon = %end, "next instant beyond horizon");
                return Ok(run_outcome(RunStop::HorizonReached, &state));
            }

            // System events due at or before the ordinary instant drain
            // first, one batch per pass.
            let target = match state.system.peek_min_time() {
                Some(t_sys) if t_sys <= t_ord => t_sys,
                _ => t_ord,
            };

            let (mut state, pace) = self.pace(state, target);
            if matches!(pace, Pace::Restart) {
                continue;
            }

            // Late system arrivals at exactly `target` still win the
            // instant; anything earlier would have preempted the pace.
            let system_turn = state.system.peek_min_time() == Some(target);
            let popped = if system_turn {
                state.system.pop_min_batch()
            } else {
                state.ordinary.pop_min_batch()
            };
            let Some((time, mut batch)) = popped else {
                continue;
            };
            debug_assert_eq!(time, target);

            state.clock = state.clock.max(time);
            state.metrics.instants += 1;

            if !system_turn {
                // The one place nondeterminism enters: simultaneous
                // ordinary events run in a seeded-random order.
                batch.shuffle(&mut state.rng);
            }
            trace!(%time, system = system_turn, count = batch.len(), "dispatching batch");

            let mut ctx = StepContext { state: &mut state };
            for record in batch.iter() {
                // Expire immediately before invoking so a callback never
                // observes itself as still pending; a concurrent cancel
                // that wins the swap suppresses the dispatch entirely.
                if !record.expire() {
                    ctx.state.metrics.expired_skipped += 1;
                    continue;
                }
                if system_turn {
                    ctx.state.metrics.system_dispatched += 1;
                } else {
                    ctx.state.metrics.ordinary_dispatched += 1;
                }
                record
                    .invoke(&mut ctx)
                    .map_err(|source| RunError::Listener { at: time, source })?;
            }
        }
    }

    /// Hold until wall time permits dispatching `target`.
    ///
    /// Releases the gate inside every wait so producer and supervisory
    /// calls proceed while the loop sleeps or is paused.
    fn pace<'k>(
        &'k self,
        mut state: MutexGuard<'k, KernelState>,
        target: VirtualTime,
    ) -> (MutexGuard<'k, KernelState>, Pace) {
        state.pace_target = Some(target);
        state.pace_preempted = false;
        let mut deadline: Option<(u64, Instant)> = None;

        let pace = loop {
            if state.stop_requested || state.pace_preempted {
                break Pace::Restart;
            }
            let rate = state.pacing.rate;
            if rate.is_unlimited() {
                break Pace::Reached;
            }
            if rate.is_paused() {
                deadline = None;
                if state.pacing.take_release() {
                    debug!(%target, "single-step release");
                    break Pace::Reached;
                }
                trace!(%target, "pacing paused; waiting");
                state = self.pacer.wait(state).unwrap();
                continue;
            }
            let epoch = state.pacing.rate_epoch;
            let wall_deadline = match deadline {
                Some((e, d)) if e == epoch => d,
                _ => {
                    let Some(sleep) = scaled_wall_delta(state.clock, target, rate) else {
                        break Pace::Reached;
                    };
                    match Instant::now().checked_add(sleep) {
                        Some(d) => {
                            deadline = Some((epoch, d));
                            d
                        }
                        None => {
                            // Off the end of the wall clock; hold until
                            // the rate or the stores change.
                            state = self.pacer.wait(state).unwrap();
                            continue;
                        }
                    }
                }
            };
            let remaining = wall_deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break Pace::Reached;
            }
            let (guard, _) = self.pacer.wait_timeout(state, remaining).unwrap();
            state = guard;
        };

        state.pace_target = None;
        state.pace_preempted = false;
        (state, pace)
    }
}

/// `SimKernel::new(KernelConfig::default())`.
impl Default for SimKernel {
    fn default() -> Self {
        Self::new(KernelConfig::default())
    }
}

// ── Step context ─────────────────────────────────────────────────────────

/// Capability surface handed to callbacks during dispatch.
///
/// The gate is held while listeners run, so listeners must not call
/// [`SimKernel`] methods (the gate is not re-entrant); everything a
/// callback may legally do is mirrored here and operates on the already
/// locked state.
pub struct StepContext<'k> {
    state: &'k mut KernelState,
}

impl StepContext<'_> {
    /// The instant being dispatched.
    pub fn now(&self) -> VirtualTime {
        self.state.clock
    }

    /// Schedule an ordinary event; same contract as
    /// [`SimKernel::schedule`]. An event scheduled for offset zero joins
    /// a later batch at this same instant, never the one in flight.
    pub fn schedule(
        &mut self,
        listener: Arc<dyn EventListener>,
        offset: VirtualTime,
        payload: EventPayload,
    ) -> Result<EventHandle, ScheduleError> {
        self.state.schedule_at(listener, offset, payload, false)
    }

    /// Schedule a system event; same contract as
    /// [`SimKernel::schedule_system`].
    pub fn schedule_system(
        &mut self,
        listener: Arc<dyn EventListener>,
        offset: VirtualTime,
        payload: EventPayload,
    ) -> Result<EventHandle, ScheduleError> {
        self.state.schedule_at(listener, offset, payload, true)
    }

    /// Cancel a scheduled event; same contract as [`SimKernel::cancel`].
    pub fn cancel(&self, handle: &EventHandle) -> Result<(), CancelError> {
        handle.cancel()
    }

    /// End the run once the current batch finishes.
    pub fn stop(&mut self) {
        self.state.stop_requested = true;
    }

    /// The current pacing rate.
    pub fn rate(&self) -> RealtimeRate {
        self.state.pacing.rate
    }

    /// Replace the pacing rate from inside a callback. This is how a
    /// breakpoint listener resumes the run.
    pub fn set_rate(&mut self, rate: RealtimeRate) {
        debug!(%rate, "pacing rate changed by callback");
        self.state.pacing.set_rate(rate);
    }

    /// Same contract as [`SimKernel::add_breakpoint`].
    pub fn add_breakpoint(&mut self, time: VirtualTime) -> Result<bool, BreakpointError> {
        self.state.add_breakpoint(time)
    }

    /// Same contract as [`SimKernel::remove_breakpoint`].
    pub fn remove_breakpoint(&mut self, time: VirtualTime) -> bool {
        self.state.remove_breakpoint(time)
    }

    /// Same contract as [`SimKernel::add_breakpoint_listener`].
    pub fn add_breakpoint_listener(&mut self, listener: Arc<dyn BreakpointListener>) {
        self.state.breakpoints.add_listener(listener);
    }

    /// Same contract as [`SimKernel::remove_breakpoint_listener`].
    pub fn remove_breakpoint_listener(&mut self, listener: &Arc<dyn BreakpointListener>) -> bool {
        self.state.breakpoints.remove_listener(listener)
    }

    /// Counter snapshot.
    pub fn metrics(&self) -> KernelMetrics {
        self.state.metrics
    }

    /// Fire the breakpoint at the current instant: pause, notify every
    /// listener, drop the registration.
    pub(crate) fn fire_breakpoint(&mut self) {
        let time = self.state.clock;
        self.state.pacing.set_rate(RealtimeRate::PAUSED);
        self.state.metrics.breakpoints_fired += 1;
        let listeners = self.state.breakpoints.snapshot_listeners();
        debug!(%time, listeners = listeners.len(), "breakpoint reached; pacing paused");
        for listener in &listeners {
            listener.breakpoint_reached(self, time);
        }
        self.state.breakpoints.remove(time);
    }
}

// ── Inspection guard ─────────────────────────────────────────────────────

/// Read-only view of a quiescent kernel, holding the interleaving gate.
///
/// Returned by [`SimKernel::lock_for_inspection`]. While held, the
/// dispatch loop cannot begin or finish a batch (it may be inside a
/// pacing wait, which observes no state). Dropping the guard releases
/// the gate.
pub struct KernelGuard<'k> {
    state: MutexGuard<'k, KernelState>,
}

impl KernelGuard<'_> {
    /// The virtual clock.
    pub fn current_time(&self) -> VirtualTime {
        self.state.clock
    }

    /// The pacing rate.
    pub fn rate(&self) -> RealtimeRate {
        self.state.pacing.rate
    }

    /// Records in the ordinary store, expired ones included.
    pub fn pending_ordinary(&self) -> usize {
        self.state.ordinary.len()
    }

    /// Records in the system store, expired ones included.
    pub fn pending_system(&self) -> usize {
        self.state.system.len()
    }

    /// Registered breakpoint times, in registration order.
    pub fn breakpoint_times(&self) -> Vec<VirtualTime> {
        self.state.breakpoints.times()
    }

    /// Counter snapshot.
    pub fn metrics(&self) -> KernelMetrics {
        self.state.metrics
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use eventide_core::{ListenerError, TimeUnit};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn secs(n: i64) -> VirtualTime {
        VirtualTime::new(n, TimeUnit::Seconds)
    }

    fn unlimited_kernel(seed: u64) -> SimKernel {
        SimKernel::new(KernelConfig {
            seed: Some(seed),
            initial_rate: RealtimeRate::UNLIMITED,
        })
    }

    fn counting_listener(counter: Arc<AtomicUsize>) -> Arc<dyn EventListener> {
        Arc::new(move |_: &mut StepContext<'_>, _: &EventPayload| -> Result<(), ListenerError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    // ── Scheduling contract ──────────────────────────────────────────────

    #[test]
    fn schedule_rejects_negative_offsets() {
        let kernel = unlimited_kernel(1);
        let counter = Arc::new(AtomicUsize::new(0));
        let err = kernel
            .schedule(counting_listener(counter), secs(-1), unit_payload())
            .unwrap_err();
        assert_eq!(
            err,
            ScheduleError::NegativeOffset { offset: secs(-1) }
        );
        assert_eq!(kernel.lock_for_inspection().pending_ordinary(), 0);
    }

    #[test]
    fn schedule_computes_due_from_current_clock() {
        let kernel = unlimited_kernel(1);
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = kernel
            .schedule(counting_listener(counter), secs(3), unit_payload())
            .unwrap();
        assert_eq!(handle.due(), secs(3));
        assert!(handle.is_scheduled());
    }

    #[test]
    fn cancel_twice_reports_not_scheduled() {
        let kernel = unlimited_kernel(1);
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = kernel
            .schedule(counting_listener(counter), secs(1), unit_payload())
            .unwrap();
        kernel.cancel(&handle).unwrap();
        assert_eq!(kernel.cancel(&handle), Err(CancelError::NotScheduled));
        assert!(!handle.is_scheduled());
    }

    // ── Run basics ───────────────────────────────────────────────────────

    #[test]
    fn empty_kernel_reports_exhausted_at_zero() {
        let kernel = unlimited_kernel(1);
        let outcome = kernel.run().unwrap();
        assert_eq!(outcome.stop, RunStop::Exhausted);
        assert_eq!(outcome.ended_at, VirtualTime::ZERO);
        assert_eq!(outcome.metrics.instants, 0);
    }

    #[test]
    fn clock_stops_at_last_dispatched_instant() {
        let kernel = unlimited_kernel(1);
        let counter = Arc::new(AtomicUsize::new(0));
        for i in 0..10 {
            kernel
                .schedule(counting_listener(Arc::clone(&counter)), secs(i), unit_payload())
                .unwrap();
        }
        let outcome = kernel.run_until(secs(20)).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert_eq!(outcome.ended_at, secs(9));
        assert_eq!(outcome.stop, RunStop::Exhausted);
        assert_eq!(kernel.current_time(), secs(9));
    }

    #[test]
    fn horizon_leaves_later_events_pending() {
        let kernel = unlimited_kernel(1);
        let counter = Arc::new(AtomicUsize::new(0));
        kernel
            .schedule(counting_listener(Arc::clone(&counter)), secs(2), unit_payload())
            .unwrap();
        kernel
            .schedule(counting_listener(Arc::clone(&counter)), secs(8), unit_payload())
            .unwrap();

        let outcome = kernel.run_until(secs(5)).unwrap();
        assert_eq!(outcome.stop, RunStop::HorizonReached);
        assert_eq!(outcome.ended_at, secs(2));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(kernel.lock_for_inspection().pending_ordinary(), 1);

        // Resuming with a wider horizon picks the pending event up.
        let outcome = kernel.run_until(secs(10)).unwrap();
        assert_eq!(outcome.stop, RunStop::Exhausted);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn event_exactly_at_horizon_is_dispatched() {
        let kernel = unlimited_kernel(1);
        let counter = Arc::new(AtomicUsize::new(0));
        kernel
            .schedule(counting_listener(Arc::clone(&counter)), secs(5), unit_payload())
            .unwrap();
        kernel.run_until(secs(5)).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn canceled_instant_never_advances_the_clock() {
        let kernel = unlimited_kernel(1);
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = kernel
            .schedule(counting_listener(Arc::clone(&counter)), secs(5), unit_payload())
            .unwrap();
        kernel.cancel(&handle).unwrap();

        let outcome = kernel.run_until(secs(10)).unwrap();
        assert_eq!(outcome.stop, RunStop::Exhausted);
        assert_eq!(outcome.ended_at, VirtualTime::ZERO);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.metrics.expired_skipped, 1);
        assert_eq!(outcome.metrics.instants, 0);
    }

    // ── Callback re-entry ────────────────────────────────────────────────

    #[test]
    fn callbacks_schedule_followups_through_the_context() {
        let kernel = unlimited_kernel(1);
        let counter = Arc::new(AtomicUsize::new(0));
        let chained = Arc::clone(&counter);
        kernel
            .schedule(
                Arc::new(move |ctx: &mut StepContext<'_>, _: &EventPayload| -> Result<(), ListenerError> {
                    let follow = counting_listener(Arc::clone(&chained));
                    ctx.schedule(follow, secs(1), unit_payload())?;
                    Ok(())
                }),
                secs(1),
                unit_payload(),
            )
            .unwrap();

        let outcome = kernel.run().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.ended_at, secs(2));
    }

    #[test]
    fn same_instant_reschedule_lands_in_a_later_batch() {
        let kernel = unlimited_kernel(1);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_inner = Arc::clone(&seen);
        kernel
            .schedule(
                Arc::new(move |ctx: &mut StepContext<'_>, _: &EventPayload| -> Result<(), ListenerError> {
                    let at = ctx.now();
                    let seen2 = Arc::clone(&seen_inner);
                    ctx.schedule(
                        Arc::new(move |ctx2: &mut StepContext<'_>, _: &EventPayload| -> Result<(), ListenerError> {
                            assert_eq!(ctx2.now(), at);
                            seen2.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }),
                        VirtualTime::ZERO,
                        unit_payload(),
                    )?;
                    Ok(())
                }),
                secs(4),
                unit_payload(),
            )
            .unwrap();

        let outcome = kernel.run().unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        // Two batches at the same virtual instant.
        assert_eq!(outcome.metrics.instants, 2);
        assert_eq!(outcome.ended_at, secs(4));
    }

    #[test]
    fn stop_from_a_callback_finishes_the_batch_then_returns() {
        let kernel = unlimited_kernel(9);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let c = Arc::clone(&counter);
            kernel
                .schedule(
                    Arc::new(move |ctx: &mut StepContext<'_>, _: &EventPayload| -> Result<(), ListenerError> {
                        c.fetch_add(1, Ordering::SeqCst);
                        ctx.stop();
                        Ok(())
                    }),
                    secs(1),
                    unit_payload(),
                )
                .unwrap();
        }
        let c = Arc::clone(&counter);
        kernel.schedule(counting_listener(c), secs(2), unit_payload()).unwrap();

        let outcome = kernel.run().unwrap();
        assert_eq!(outcome.stop, RunStop::Stopped);
        // Whole 1s batch ran; the 2s event did not.
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(outcome.ended_at, secs(1));
    }

    // ── Listener failure ─────────────────────────────────────────────────

    #[test]
    fn listener_error_aborts_with_state_intact() {
        let kernel = unlimited_kernel(3);
        let counter = Arc::new(AtomicUsize::new(0));
        kernel
            .schedule(
                Arc::new(|_: &mut StepContext<'_>, _: &EventPayload| -> Result<(), ListenerError> {
                    Err("sensor wedged".into())
                }),
                secs(1),
                unit_payload(),
            )
            .unwrap();
        kernel
            .schedule(counting_listener(Arc::clone(&counter)), secs(2), unit_payload())
            .unwrap();

        let err = kernel.run().unwrap_err();
        match err {
            RunError::Listener { at, .. } => assert_eq!(at, secs(1)),
            other => panic!("expected Listener error, got {other}"),
        }
        // The failing instant was reached; the future event survives.
        assert_eq!(kernel.current_time(), secs(1));
        assert_eq!(kernel.lock_for_inspection().pending_ordinary(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        // The kernel is not wedged: a later run dispatches the survivor.
        kernel.run().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    // ── Determinism ──────────────────────────────────────────────────────

    fn permutation_for_seed(seed: u64, n: usize) -> Vec<usize> {
        let kernel = unlimited_kernel(seed);
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..n {
            let order = Arc::clone(&order);
            kernel
                .schedule(
                    Arc::new(move |_: &mut StepContext<'_>, _: &EventPayload| -> Result<(), ListenerError> {
                        order.lock().unwrap().push(i);
                        Ok(())
                    }),
                    secs(1),
                    unit_payload(),
                )
                .unwrap();
        }
        kernel.run().unwrap();
        Arc::try_unwrap(order).unwrap().into_inner().unwrap()
    }

    #[test]
    fn same_seed_reproduces_the_batch_permutation() {
        let a = permutation_for_seed(0xFEED, 64);
        let b = permutation_for_seed(0xFEED, 64);
        assert_eq!(a, b);

        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..64).collect::<Vec<_>>());
    }

    #[test]
    fn different_seeds_permute_differently() {
        let a = permutation_for_seed(1, 64);
        let b = permutation_for_seed(2, 64);
        assert_ne!(a, b);
    }

    // ── Run-state guards ─────────────────────────────────────────────────

    #[test]
    fn second_concurrent_run_is_rejected() {
        let kernel = Arc::new(unlimited_kernel(5));
        let (entered_tx, entered_rx) = crossbeam_channel::bounded::<()>(1);
        kernel
            .schedule(
                Arc::new(move |ctx: &mut StepContext<'_>, _: &EventPayload| -> Result<(), ListenerError> {
                    // Park the loop at the next pace so the run stays
                    // live while the main thread probes it.
                    ctx.set_rate(RealtimeRate::PAUSED);
                    entered_tx.send(()).unwrap();
                    Ok(())
                }),
                secs(1),
                unit_payload(),
            )
            .unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        kernel
            .schedule(counting_listener(Arc::clone(&counter)), secs(2), unit_payload())
            .unwrap();

        let runner = Arc::clone(&kernel);
        let driver = std::thread::Builder::new()
            .name("eventide-test-driver".into())
            .spawn(move || runner.run())
            .unwrap();

        entered_rx.recv().unwrap();
        assert!(matches!(kernel.run(), Err(RunError::AlreadyRunning)));

        kernel.stop();
        let outcome = driver.join().unwrap().unwrap();
        assert_eq!(outcome.stop, RunStop::Stopped);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
