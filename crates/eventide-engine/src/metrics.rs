//! Dispatch counters for telemetry and tests.

/// Counters accumulated by a kernel since construction.
///
/// Readable at any time via [`SimKernel::metrics`](crate::SimKernel::metrics),
/// from callbacks via [`StepContext::metrics`](crate::StepContext::metrics),
/// and snapshotted into every [`RunOutcome`](crate::RunOutcome).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KernelMetrics {
    /// Batches stepped through, system and ordinary alike. Two batches
    /// at the same virtual time (a same-instant reschedule) count twice.
    pub instants: u64,
    /// Ordinary events invoked.
    pub ordinary_dispatched: u64,
    /// System events invoked.
    pub system_dispatched: u64,
    /// Expired records skipped instead of invoked: lazy cancellations
    /// swept up at dispatch or discarded with a dead batch.
    pub expired_skipped: u64,
    /// Breakpoints that fired.
    pub breakpoints_fired: u64,
}

impl KernelMetrics {
    /// Total events invoked, both stores combined.
    pub fn total_dispatched(&self) -> u64 {
        self.ordinary_dispatched + self.system_dispatched
    }
}
