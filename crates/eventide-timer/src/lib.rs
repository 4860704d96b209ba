//! Re-armable one-shot timers on top of the Eventide simulation kernel.
//!
//! A [`Timer`] associates a [`TimerHandler`] with at most one pending
//! kernel event. [`start`](Timer::start) schedules the expiry and
//! implicitly cancels any previous one, so the latest start always
//! wins; the timer never repeats on its own. A handler that wants
//! periodic behavior re-arms the timer from inside its own callback
//! with [`start_with`](Timer::start_with).
//!
//! [`Timer::new`] schedules into the ordinary store; timers built with
//! [`Timer::system`] use the system store, so their expiries beat
//! ordinary events at the same instant and are never shuffled.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex, Weak};

use tracing::trace;

use eventide_core::{ListenerError, ScheduleError, VirtualTime};
use eventide_engine::{EventHandle, EventListener, EventPayload, SimKernel, StepContext};

// ── Handler trait ────────────────────────────────────────────────────────

/// Invoked on the dispatch thread when a [`Timer`] expires.
///
/// The payload is whatever was passed to the `start` call that armed
/// the expiry, so one handler can serve several timers or staggered
/// re-arms and still tell the callbacks apart.
pub trait TimerHandler: Send + Sync {
    /// Called once per expiry. The timer is already disarmed; re-arm it
    /// through `ctx` for periodic behavior.
    fn timer_expired(
        &self,
        ctx: &mut StepContext<'_>,
        payload: &EventPayload,
    ) -> Result<(), ListenerError>;
}

impl<F> TimerHandler for F
where
    F: Fn(&mut StepContext<'_>, &EventPayload) -> Result<(), ListenerError> + Send + Sync,
{
    fn timer_expired(
        &self,
        ctx: &mut StepContext<'_>,
        payload: &EventPayload,
    ) -> Result<(), ListenerError> {
        self(ctx, payload)
    }
}

// ── Timer ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimerStore {
    Ordinary,
    System,
}

struct TimerCore {
    handler: Arc<dyn TimerHandler>,
    pending: Mutex<Option<EventHandle>>,
    store: TimerStore,
}

/// One-shot timer bound to a handler.
///
/// ```
/// use std::sync::Arc;
/// use eventide_core::{TimeUnit, VirtualTime};
/// use eventide_engine::{unit_payload, EventPayload, KernelConfig, SimKernel, StepContext};
/// use eventide_timer::Timer;
///
/// let kernel = SimKernel::new(KernelConfig {
///     seed: Some(3),
///     initial_rate: eventide_core::RealtimeRate::UNLIMITED,
/// });
/// let timer = Timer::new(Arc::new(
///     |ctx: &mut StepContext<'_>, _: &EventPayload| {
///         println!("expired at {}", ctx.now());
///         Ok(())
///     },
/// ));
/// timer
///     .start(&kernel, VirtualTime::new(2, TimeUnit::Seconds), unit_payload())
///     .unwrap();
/// kernel.run().unwrap();
/// assert!(!timer.is_running());
/// ```
pub struct Timer {
    core: Arc<TimerCore>,
}

/// Kernel-event glue: holds the core weakly so a dropped [`Timer`]
/// silently disarms instead of keeping itself alive through its own
/// pending event.
struct TimerFire {
    core: Weak<TimerCore>,
}

impl EventListener for TimerFire {
    fn event_released(
        &self,
        ctx: &mut StepContext<'_>,
        payload: &EventPayload,
    ) -> Result<(), ListenerError> {
        let Some(core) = self.core.upgrade() else {
            return Ok(());
        };
        core.pending.lock().unwrap().take();
        trace!(at = %ctx.now(), "timer expired");
        core.handler.timer_expired(ctx, payload)
    }
}

impl Timer {
    /// Timer whose expiries go through the ordinary store.
    pub fn new(handler: Arc<dyn TimerHandler>) -> Self {
        Self {
            core: Arc::new(TimerCore {
                handler,
                pending: Mutex::new(None),
                store: TimerStore::Ordinary,
            }),
        }
    }

    /// Timer whose expiries go through the system store: they beat
    /// ordinary events at the same instant and are never shuffled.
    pub fn system(handler: Arc<dyn TimerHandler>) -> Self {
        Self {
            core: Arc::new(TimerCore {
                handler,
                pending: Mutex::new(None),
                store: TimerStore::System,
            }),
        }
    }

    /// Arm the timer to expire `interval` from now, replacing any
    /// pending expiry. The payload is handed back to the handler.
    pub fn start(
        &self,
        kernel: &SimKernel,
        interval: VirtualTime,
        payload: EventPayload,
    ) -> Result<(), ScheduleError> {
        self.cancel();
        let fire = self.fire_listener();
        let handle = match self.core.store {
            TimerStore::Ordinary => kernel.schedule(fire, interval, payload)?,
            TimerStore::System => kernel.schedule_system(fire, interval, payload)?,
        };
        self.arm(handle);
        Ok(())
    }

    /// [`start`](Timer::start) for use inside a dispatch callback,
    /// where the kernel's gate is already held.
    pub fn start_with(
        &self,
        ctx: &mut StepContext<'_>,
        interval: VirtualTime,
        payload: EventPayload,
    ) -> Result<(), ScheduleError> {
        self.cancel();
        let fire = self.fire_listener();
        let handle = match self.core.store {
            TimerStore::Ordinary => ctx.schedule(fire, interval, payload)?,
            TimerStore::System => ctx.schedule_system(fire, interval, payload)?,
        };
        self.arm(handle);
        Ok(())
    }

    /// Whether an expiry is pending. Goes `false` once the handler has
    /// been invoked or the timer canceled.
    pub fn is_running(&self) -> bool {
        self.core
            .pending
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(EventHandle::is_scheduled)
    }

    /// Disarm the pending expiry, if any. Does nothing on an idle
    /// timer.
    pub fn cancel(&self) {
        if let Some(handle) = self.core.pending.lock().unwrap().take() {
            // Already-dispatched expiries lose the race harmlessly.
            let _ = handle.cancel();
            trace!(due = %handle.due(), "timer canceled");
        }
    }

    fn fire_listener(&self) -> Arc<dyn EventListener> {
        Arc::new(TimerFire {
            core: Arc::downgrade(&self.core),
        })
    }

    fn arm(&self, handle: EventHandle) {
        trace!(due = %handle.due(), "timer armed");
        *self.core.pending.lock().unwrap() = Some(handle);
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
