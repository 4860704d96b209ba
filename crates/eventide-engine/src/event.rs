//! Scheduled-event records, handles, and the listener trait.
//!
//! A scheduled event binds a listener, a due time, and an opaque payload.
//! The record carries an atomic pending flag that linearizes the race
//! between dispatch and cancellation: whichever side flips it first wins,
//! so a callback fires at most once no matter how the cancel interleaves.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use eventide_core::{CancelError, ListenerError, VirtualTime};

use crate::kernel::StepContext;

// ── Listener trait ───────────────────────────────────────────────────────

/// Opaque caller data carried by an event and handed back at dispatch.
///
/// Payloads are shared (`Arc`) so one value can ride along on many
/// events. Listeners recover the concrete type with
/// [`downcast_ref`](std::any::Any::downcast_ref).
pub type EventPayload = Arc<dyn Any + Send + Sync>;

/// Payload for events that carry no data.
pub fn unit_payload() -> EventPayload {
    Arc::new(())
}

/// Callback target for scheduled events.
///
/// Listeners run synchronously on the dispatch thread, exactly once per
/// event, at the event's virtual instant. The [`StepContext`] grants the
/// full set of calls a callback may legally make (scheduling, canceling,
/// pacing and breakpoint changes) without touching the kernel's public
/// surface, since the kernel gate is held during dispatch and is not
/// re-entrant.
///
/// Returning an error aborts the run; the kernel neither catches nor
/// retries listener failures.
pub trait EventListener: Send + Sync {
    /// Invoked when the event's instant is reached.
    fn event_released(
        &self,
        ctx: &mut StepContext<'_>,
        payload: &EventPayload,
    ) -> Result<(), ListenerError>;
}

/// Closures can serve as listeners; handy for tests and small setups.
impl<F> EventListener for F
where
    F: Fn(&mut StepContext<'_>, &EventPayload) -> Result<(), ListenerError> + Send + Sync,
{
    fn event_released(
        &self,
        ctx: &mut StepContext<'_>,
        payload: &EventPayload,
    ) -> Result<(), ListenerError> {
        (self)(ctx, payload)
    }
}

// ── Event record ─────────────────────────────────────────────────────────

/// A single scheduled callback, shared between the store that will pop it
/// and the [`EventHandle`] the scheduling caller keeps.
///
/// `pending` starts `true` and is flipped exactly once, by dispatch
/// immediately before invocation or by cancellation, whichever comes
/// first. The record is never removed from its store list on cancel; the
/// dispatch loop skips expired records when the batch pops.
pub(crate) struct EventRecord {
    listener: Arc<dyn EventListener>,
    due: VirtualTime,
    payload: EventPayload,
    pending: AtomicBool,
}

impl EventRecord {
    pub(crate) fn new(
        listener: Arc<dyn EventListener>,
        due: VirtualTime,
        payload: EventPayload,
    ) -> Arc<Self> {
        Arc::new(Self {
            listener,
            due,
            payload,
            pending: AtomicBool::new(true),
        })
    }

    pub(crate) fn due(&self) -> VirtualTime {
        self.due
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Flip pending to expired. Returns `true` for the caller that won
    /// the flip; every later call returns `false`.
    pub(crate) fn expire(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn invoke(&self, ctx: &mut StepContext<'_>) -> Result<(), ListenerError> {
        self.listener.event_released(ctx, &self.payload)
    }
}

impl fmt::Debug for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRecord")
            .field("due", &self.due)
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}

// ── Handle ───────────────────────────────────────────────────────────────

/// Cheap, cloneable token for a scheduled event.
///
/// Returned by the scheduling calls; pass it to `cancel` to expire the
/// event before it fires. After dispatch or cancellation the handle is
/// inert: cancel reports [`NotScheduled`](eventide_core::CancelError) and
/// [`is_scheduled`](EventHandle::is_scheduled) stays `false`.
#[derive(Clone, Debug)]
pub struct EventHandle {
    record: Arc<EventRecord>,
}

impl EventHandle {
    pub(crate) fn new(record: Arc<EventRecord>) -> Self {
        Self { record }
    }

    /// The event's absolute due time.
    pub fn due(&self) -> VirtualTime {
        self.record.due()
    }

    /// `true` until the event is dispatched or canceled.
    pub fn is_scheduled(&self) -> bool {
        self.record.is_pending()
    }

    /// Expire the event before it fires.
    ///
    /// Lock-free: the dispatch/cancel race is linearized by the
    /// record's atomic flag, so this is safe from any thread and from
    /// inside callbacks. `SimKernel::cancel` and `StepContext::cancel`
    /// are aliases of this.
    pub fn cancel(&self) -> Result<(), CancelError> {
        if self.record.expire() {
            Ok(())
        } else {
            Err(CancelError::NotScheduled)
        }
    }
}
