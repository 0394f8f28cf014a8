/*!
Eviction scheduling strategies.

A scheduler turns "this entry expires at its deadline" into an actual timer
firing that calls back into the owning map. Four strategies with different
timing models share one contract; a fifth accepts everything and does
nothing, leaving expiry entirely to the map's lazy read-side checks.
*/

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::entry::{EvictionHandle, ExpiringEntry};
use crate::queue::{EvictionQueue, QueuedEviction};

mod dedicated;
mod delayed;
mod interval;
mod per_entry;

pub use dedicated::DedicatedThreadScheduler;
pub use delayed::DelayedTaskScheduler;
pub use interval::IntervalScheduler;
pub use per_entry::PerEntryTimerScheduler;

/// The map-side eviction hook a scheduler fires when an entry's deadline
/// passes. The hook removes the entry from its map by identity and must not
/// call back into [`EvictionScheduler::cancel`]; the firing path already
/// released the queue membership.
pub type EvictFn<K, V> = Arc<dyn Fn(&Arc<ExpiringEntry<K, V>>) + Send + Sync>;

/// Strategy deciding when the expiry side-effect of an entry is applied.
///
/// Implementations must ignore non-evictible entries in every operation and
/// tolerate `cancel` on an entry whose expiry already fired. After
/// `shutdown`, `schedule` is ignored with a logged warning and `cancel` is
/// ignored silently; no timers fire afterwards.
pub trait EvictionScheduler<K, V>: Send + Sync {
    /// Arrange for `on_evict` to run on `entry` at or after its deadline.
    fn schedule(&self, entry: &Arc<ExpiringEntry<K, V>>, on_evict: &EvictFn<K, V>);

    /// Release any timer or queue state held for `entry`.
    fn cancel(&self, entry: &Arc<ExpiringEntry<K, V>>);

    /// Cancel pending timers without draining them and release owned
    /// threads. Idempotent; also run on drop.
    fn shutdown(&self);
}

/// Scheduler that never evicts. Expired entries are only removed when a map
/// operation observes them, which makes the map a pure lazy-expiry store
/// with no background threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScheduler;

impl NoopScheduler {
    pub fn new() -> NoopScheduler {
        NoopScheduler
    }
}

impl<K, V> EvictionScheduler<K, V> for NoopScheduler {
    fn schedule(&self, _entry: &Arc<ExpiringEntry<K, V>>, _on_evict: &EvictFn<K, V>) {}

    fn cancel(&self, _entry: &Arc<ExpiringEntry<K, V>>) {}

    fn shutdown(&self) {}
}

/// Shared envelope of the queue-based schedulers: queue membership
/// bookkeeping on schedule/cancel plus the drain that fires due entries.
/// Holds no timer state of its own; the variants differ only in how they
/// drive [`QueueCore::drain`].
pub(crate) struct QueueCore<K, V> {
    queue: Box<dyn EvictionQueue<K, V>>,
    seq: AtomicU64,
}

impl<K, V> QueueCore<K, V> {
    pub(crate) fn new(queue: Box<dyn EvictionQueue<K, V>>) -> QueueCore<K, V> {
        QueueCore {
            queue,
            seq: AtomicU64::new(0),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.queue.next_deadline()
    }

    /// Queue the entry at its deadline. Returns false for non-evictible
    /// entries, which never enter the queue.
    pub(crate) fn schedule(&self, entry: &Arc<ExpiringEntry<K, V>>, on_evict: &EvictFn<K, V>) -> bool {
        if !entry.is_evictible() {
            return false;
        }
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        entry.put_handle(EvictionHandle::Queued(seq));
        self.queue
            .push(seq, QueuedEviction::new(Arc::clone(entry), Arc::clone(on_evict)));
        true
    }

    /// Release the queue membership recorded in the entry's handle slot.
    /// Returns whether the entry was still queued.
    pub(crate) fn cancel(&self, entry: &Arc<ExpiringEntry<K, V>>) -> bool {
        if !entry.is_evictible() {
            return false;
        }
        match entry.take_handle() {
            Some(EvictionHandle::Queued(seq)) => self.queue.remove(seq, entry),
            _ => false,
        }
    }

    /// Detach every due item and fire its eviction hook. The hooks run
    /// after the queue lock is released, so a hook's map removal can never
    /// contend with a concurrent schedule holding the queue.
    pub(crate) fn drain(&self) -> usize {
        let due = self.queue.drain_due(Instant::now());
        let drained = due.len();
        for item in due {
            item.evict();
        }
        if drained > 0 {
            log::trace!("drained {} expired entries", drained);
        }
        drained
    }
}
