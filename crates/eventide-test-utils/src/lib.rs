//! Test utilities and instrumented listeners for Eventide development.
//!
//! Provides canned [`EventListener`] implementations that count, record,
//! or fail on dispatch, plus a [`BreakpointListener`] that resumes a
//! paused run. Shared across the engine's integration tests and the
//! demo programs.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use eventide_core::{ListenerError, RealtimeRate, VirtualTime};
use eventide_engine::{BreakpointListener, EventListener, EventPayload, StepContext};

/// Shared dispatch log: `(label, virtual time)` per invocation, in
/// dispatch order. Clone it before handing it to listeners and read it
/// back with [`entries`](EventLog::entries) after the run.
#[derive(Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<(String, VirtualTime)>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, label: &str, time: VirtualTime) {
        self.entries.lock().unwrap().push((label.to_string(), time));
    }

    pub fn entries(&self) -> Vec<(String, VirtualTime)> {
        self.entries.lock().unwrap().clone()
    }

    /// Labels only, for order assertions.
    pub fn labels(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(label, _)| label.clone())
            .collect()
    }

    /// Dispatch times only, for monotonicity assertions.
    pub fn times(&self) -> Vec<VirtualTime> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(_, time)| *time)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

/// Listener that counts its invocations.
#[derive(Default)]
pub struct CountingListener {
    count: AtomicUsize,
}

impl CountingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl EventListener for CountingListener {
    fn event_released(
        &self,
        _ctx: &mut StepContext<'_>,
        _payload: &EventPayload,
    ) -> Result<(), ListenerError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Listener that appends `(label, dispatch time)` to a shared
/// [`EventLog`].
pub struct RecordingListener {
    label: String,
    log: EventLog,
}

impl RecordingListener {
    pub fn new(label: impl Into<String>, log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            log,
        })
    }
}

impl EventListener for RecordingListener {
    fn event_released(
        &self,
        ctx: &mut StepContext<'_>,
        _payload: &EventPayload,
    ) -> Result<(), ListenerError> {
        self.log.record(&self.label, ctx.now());
        Ok(())
    }
}

/// Listener that always fails with the configured message.
pub struct FailingListener {
    message: String,
}

impl FailingListener {
    pub fn new(message: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            message: message.into(),
        })
    }
}

impl EventListener for FailingListener {
    fn event_released(
        &self,
        _ctx: &mut StepContext<'_>,
        _payload: &EventPayload,
    ) -> Result<(), ListenerError> {
        Err(self.message.clone().into())
    }
}

/// Breakpoint listener that immediately restores a fixed pacing rate,
/// so a run continues through its breakpoints hands-free. Counts the
/// breakpoints it resumed from.
pub struct AutoResume {
    rate: RealtimeRate,
    resumed: AtomicUsize,
    log: Option<EventLog>,
}

impl AutoResume {
    pub fn new(rate: RealtimeRate) -> Arc<Self> {
        Arc::new(Self {
            rate,
            resumed: AtomicUsize::new(0),
            log: None,
        })
    }

    /// Also record each breakpoint into `log` under the label
    /// `"breakpoint"`.
    pub fn with_log(rate: RealtimeRate, log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            rate,
            resumed: AtomicUsize::new(0),
            log: Some(log),
        })
    }

    pub fn resumed(&self) -> usize {
        self.resumed.load(Ordering::SeqCst)
    }
}

impl BreakpointListener for AutoResume {
    fn breakpoint_reached(&self, ctx: &mut StepContext<'_>, time: VirtualTime) {
        if let Some(log) = &self.log {
            log.record("breakpoint", time);
        }
        self.resumed.fetch_add(1, Ordering::SeqCst);
        ctx.set_rate(self.rate);
    }
}
