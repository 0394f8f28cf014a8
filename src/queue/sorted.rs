use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{EvictionQueue, QueuedEviction};
use crate::entry::ExpiringEntry;

/// The default eviction queue: a sorted map keyed by `(deadline, sequence)`.
///
/// The sequence component keeps entries sharing a deadline distinct, so
/// removal is always identity-exact and draining is a single split at the
/// deadline boundary.
pub struct SortedQueue<K, V> {
    inner: Mutex<BTreeMap<(Instant, u64), QueuedEviction<K, V>>>,
}

impl<K, V> SortedQueue<K, V> {
    pub fn new() -> SortedQueue<K, V> {
        SortedQueue {
            inner: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<K, V> Default for SortedQueue<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> EvictionQueue<K, V> for SortedQueue<K, V>
where
    K: Send + Sync,
    V: Send + Sync,
{
    fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.inner
            .lock()
            .first_key_value()
            .map(|((deadline, _), _)| *deadline)
    }

    fn push(&self, seq: u64, item: QueuedEviction<K, V>) {
        let deadline = match item.entry.deadline() {
            Some(deadline) => deadline,
            None => return,
        };
        self.inner.lock().insert((deadline, seq), item);
    }

    fn remove(&self, seq: u64, entry: &Arc<ExpiringEntry<K, V>>) -> bool {
        let deadline = match entry.deadline() {
            Some(deadline) => deadline,
            None => return false,
        };
        let key = (deadline, seq);
        let mut inner = self.inner.lock();
        let matched = inner
            .get(&key)
            .map_or(false, |queued| Arc::ptr_eq(&queued.entry, entry));
        if matched {
            inner.remove(&key);
        }
        matched
    }

    fn drain_due(&self, now: Instant) -> Vec<QueuedEviction<K, V>> {
        let mut inner = self.inner.lock();
        // everything strictly after `now` stays; keys are (deadline, seq) so
        // the boundary one nanosecond past `now` keeps deadline == now due
        let not_due = inner.split_off(&(now + Duration::from_nanos(1), 0));
        let due = std::mem::replace(&mut *inner, not_due);
        drop(inner);
        due.into_values().collect()
    }
}
