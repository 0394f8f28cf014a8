/*!
Deadline-ordered multisets of pending evictions.

A queue holds every eviction a queue-based scheduler has accepted and not yet
fired or cancelled. Entries sharing a deadline are disambiguated by a
monotonic sequence number assigned at insertion, so cancellation always
removes the exact entry it was asked about and never a sibling.
*/

use std::sync::Arc;
use std::time::Instant;

use crate::entry::ExpiringEntry;
use crate::scheduler::EvictFn;

mod heap;
mod sorted;

pub use heap::HeapQueue;
pub use sorted::SortedQueue;

/// A pending eviction: the entry plus the eviction hook of the map that
/// scheduled it. One scheduler may serve several maps, so the hook travels
/// with the entry rather than living on the scheduler.
pub struct QueuedEviction<K, V> {
    pub(crate) entry: Arc<ExpiringEntry<K, V>>,
    pub(crate) on_evict: EvictFn<K, V>,
}

impl<K, V> QueuedEviction<K, V> {
    pub(crate) fn new(entry: Arc<ExpiringEntry<K, V>>, on_evict: EvictFn<K, V>) -> Self {
        QueuedEviction { entry, on_evict }
    }

    pub fn entry(&self) -> &Arc<ExpiringEntry<K, V>> {
        &self.entry
    }

    pub(crate) fn evict(self) {
        (self.on_evict)(&self.entry);
    }
}

/// Time-ordered storage behind the queue-based schedulers.
///
/// Only evictible entries are ever pushed. `drain_due` must be atomic with
/// respect to concurrent pushes: an item is either part of the returned
/// batch or remains schedulable, never lost in between.
pub trait EvictionQueue<K, V>: Send + Sync {
    fn is_empty(&self) -> bool;

    /// The earliest deadline currently queued, if any.
    fn next_deadline(&self) -> Option<Instant>;

    /// Insert an item under the sequence number the scheduler assigned.
    fn push(&self, seq: u64, item: QueuedEviction<K, V>);

    /// Remove the exact entry inserted under `seq`. Returns whether the
    /// entry was still queued; tolerates an item already drained.
    fn remove(&self, seq: u64, entry: &Arc<ExpiringEntry<K, V>>) -> bool;

    /// Detach and return every item whose deadline is at or before `now`.
    fn drain_due(&self, now: Instant) -> Vec<QueuedEviction<K, V>>;
}
