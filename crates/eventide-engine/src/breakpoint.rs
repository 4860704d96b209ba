//! Breakpoints: pause the dispatch loop just before a chosen instant.
//!
//! A breakpoint is a system-store event. System events drain before the
//! ordinary batch at any instant, so the firing breakpoint sets the
//! pacing rate to zero (pausing the loop) before any ordinary event at
//! that time is invoked, and without consuming a draw from the ordinary
//! shuffle stream. Listeners are then notified with the breakpoint time;
//! resuming (raising the rate or single-stepping) is their call to make.

use std::sync::Arc;

use indexmap::IndexMap;

use eventide_core::{ListenerError, VirtualTime};

use crate::event::{EventHandle, EventListener, EventPayload};
use crate::kernel::StepContext;

// ── Listener trait ───────────────────────────────────────────────────────

/// Notified on the dispatch thread when a breakpoint fires.
///
/// By the time a listener runs, the pacing rate is already zero. A
/// listener that wants the run to continue unattended can raise it again
/// through the context:
///
/// ```
/// use std::sync::Arc;
/// use eventide_core::{RealtimeRate, VirtualTime};
/// use eventide_engine::{BreakpointListener, StepContext};
///
/// struct AutoResume;
/// impl BreakpointListener for AutoResume {
///     fn breakpoint_reached(&self, ctx: &mut StepContext<'_>, time: VirtualTime) {
///         println!("paused at {time}");
///         ctx.set_rate(RealtimeRate::UNLIMITED);
///     }
/// }
/// # let _ = Arc::new(AutoResume);
/// ```
pub trait BreakpointListener: Send + Sync {
    /// Called once per fired breakpoint, after pacing was set to zero.
    fn breakpoint_reached(&self, ctx: &mut StepContext<'_>, time: VirtualTime);
}

/// Closures can serve as breakpoint listeners.
impl<F> BreakpointListener for F
where
    F: Fn(&mut StepContext<'_>, VirtualTime) + Send + Sync,
{
    fn breakpoint_reached(&self, ctx: &mut StepContext<'_>, time: VirtualTime) {
        (self)(ctx, time)
    }
}

// ── Registry ─────────────────────────────────────────────────────────────

/// Registered breakpoints and their notification listeners.
///
/// At most one breakpoint per distinct time; the map value is the handle
/// of the system event realizing it, kept so removal can cancel the
/// event. Insertion order is preserved for inspection.
pub(crate) struct BreakpointRegistry {
    by_time: IndexMap<VirtualTime, EventHandle>,
    listeners: Vec<Arc<dyn BreakpointListener>>,
}

impl BreakpointRegistry {
    pub(crate) fn new() -> Self {
        Self {
            by_time: IndexMap::new(),
            listeners: Vec::new(),
        }
    }

    pub(crate) fn contains(&self, time: VirtualTime) -> bool {
        self.by_time.contains_key(&time)
    }

    pub(crate) fn insert(&mut self, time: VirtualTime, handle: EventHandle) {
        self.by_time.insert(time, handle);
    }

    /// Drop the entry at `time`, returning the underlying event handle.
    pub(crate) fn remove(&mut self, time: VirtualTime) -> Option<EventHandle> {
        self.by_time.shift_remove(&time)
    }

    pub(crate) fn times(&self) -> Vec<VirtualTime> {
        self.by_time.keys().copied().collect()
    }

    pub(crate) fn add_listener(&mut self, listener: Arc<dyn BreakpointListener>) {
        self.listeners.push(listener);
    }

    /// Remove a previously added listener, matched by `Arc` identity.
    pub(crate) fn remove_listener(&mut self, listener: &Arc<dyn BreakpointListener>) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| !Arc::ptr_eq(l, listener));
        self.listeners.len() != before
    }

    /// Clone of the listener list, taken before notification so a
    /// listener may add or remove listeners without invalidating the
    /// iteration.
    pub(crate) fn snapshot_listeners(&self) -> Vec<Arc<dyn BreakpointListener>> {
        self.listeners.clone()
    }
}

// ── Firing glue ──────────────────────────────────────────────────────────

/// The system-store listener realizing a breakpoint: pause the loop,
/// notify, forget the registration.
pub(crate) struct BreakpointFire;

impl EventListener for BreakpointFire {
    fn event_released(
        &self,
        ctx: &mut StepContext<'_>,
        _payload: &EventPayload,
    ) -> Result<(), ListenerError> {
        ctx.fire_breakpoint();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{unit_payload, EventRecord};
    use eventide_core::TimeUnit;

    fn handle_at(ms: i64) -> EventHandle {
        let record = EventRecord::new(
            Arc::new(BreakpointFire),
            VirtualTime::new(ms, TimeUnit::Milliseconds),
            unit_payload(),
        );
        EventHandle::new(record)
    }

    fn t(ms: i64) -> VirtualTime {
        VirtualTime::new(ms, TimeUnit::Milliseconds)
    }

    #[test]
    fn one_entry_per_time() {
        let mut reg = BreakpointRegistry::new();
        assert!(!reg.contains(t(100)));
        reg.insert(t(100), handle_at(100));
        assert!(reg.contains(t(100)));
        assert_eq!(reg.times(), vec![t(100)]);
    }

    #[test]
    fn remove_returns_the_handle() {
        let mut reg = BreakpointRegistry::new();
        reg.insert(t(100), handle_at(100));
        let handle = reg.remove(t(100)).unwrap();
        assert_eq!(handle.due(), t(100));
        assert!(reg.remove(t(100)).is_none());
        assert!(!reg.contains(t(100)));
    }

    #[test]
    fn times_preserve_insertion_order() {
        let mut reg = BreakpointRegistry::new();
        reg.insert(t(300), handle_at(300));
        reg.insert(t(100), handle_at(100));
        reg.insert(t(200), handle_at(200));
        assert_eq!(reg.times(), vec![t(300), t(100), t(200)]);
    }

    #[test]
    fn listener_removal_matches_identity() {
        let mut reg = BreakpointRegistry::new();
        let a: Arc<dyn BreakpointListener> =
            Arc::new(|_: &mut StepContext<'_>, _: VirtualTime| {});
        let b: Arc<dyn BreakpointListener> =
            Arc::new(|_: &mut StepContext<'_>, _: VirtualTime| {});
        reg.add_listener(Arc::clone(&a));
        reg.add_listener(Arc::clone(&b));
        assert_eq!(reg.snapshot_listeners().len(), 2);

        assert!(reg.remove_listener(&a));
        assert!(!reg.remove_listener(&a));
        assert_eq!(reg.snapshot_listeners().len(), 1);
        assert!(Arc::ptr_eq(&reg.snapshot_listeners()[0], &b));
    }
}
