//! Time-ordered event store.
//!
//! An ordered map from due time to the insertion-ordered list of events
//! due at exactly that time. Grouping co-scheduled events into one list
//! (rather than a flat priority queue) lets the dispatch loop pop a whole
//! instant as a batch and shuffle it as a unit.

use std::collections::BTreeMap;
use std::sync::Arc;

use smallvec::SmallVec;

use eventide_core::VirtualTime;

use crate::event::EventRecord;

/// One instant's worth of events, in insertion order.
///
/// Inline capacity covers the common case of a handful of co-scheduled
/// periodic callbacks; larger batches spill to the heap.
pub(crate) type EventBatch = SmallVec<[Arc<EventRecord>; 4]>;

/// Ordered mapping from due time to the batch scheduled at that time.
///
/// Entries are added by scheduling and removed only by popping the
/// minimum key. Cancellation never removes a record here; it flips the
/// record's pending flag, and dispatch skips expired records when the
/// batch pops.
#[derive(Debug, Default)]
pub(crate) struct EventStore {
    by_time: BTreeMap<VirtualTime, EventBatch>,
    records: usize,
}

impl EventStore {
    /// Append a record to the batch at its due time, creating the batch
    /// if this is the first record at that instant.
    pub(crate) fn insert(&mut self, record: Arc<EventRecord>) {
        self.records += 1;
        self.by_time.entry(record.due()).or_default().push(record);
    }

    /// The earliest due time, or `None` when empty.
    pub(crate) fn peek_min_time(&self) -> Option<VirtualTime> {
        self.by_time.keys().next().copied()
    }

    /// Remove and return the entire earliest batch with its time.
    /// Never returns a partial batch.
    pub(crate) fn pop_min_batch(&mut self) -> Option<(VirtualTime, EventBatch)> {
        let (time, batch) = self.by_time.pop_first()?;
        self.records -= batch.len();
        Some((time, batch))
    }

    /// Remove the earliest batch only if every record in it has expired.
    /// Returns the discarded time and record count.
    pub(crate) fn pop_min_if_dead(&mut self) -> Option<(VirtualTime, usize)> {
        let all_dead = self
            .by_time
            .first_key_value()
            .map(|(_, batch)| batch.iter().all(|r| !r.is_pending()))?;
        if !all_dead {
            return None;
        }
        let (time, batch) = self.by_time.pop_first()?;
        self.records -= batch.len();
        Some((time, batch.len()))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_time.is_empty()
    }

    /// Total records held, expired ones included.
    pub(crate) fn len(&self) -> usize {
        self.records
    }
}
