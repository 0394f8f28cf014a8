use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use scheduled_thread_pool::JobHandle;

/// Scheduler-private state parked on an entry.
///
/// Only the scheduler that wrote the handle may interpret it: queue-based
/// schedulers record the sequence number of the queue insertion, the
/// per-entry-timer scheduler records the cancellation handle of its job.
pub(crate) enum EvictionHandle {
    Queued(u64),
    Timer(JobHandle),
}

/// A stored key-value pair with a fixed expiration deadline.
///
/// The deadline is derived exactly once at construction from the monotonic
/// clock; "refreshing" a mapping is expressed by a new entry replacing the
/// old one, never by mutating the deadline. An entry with a zero TTL is
/// permanent and is ignored by every scheduler operation.
pub struct ExpiringEntry<K, V> {
    key: K,
    value: RwLock<V>,
    ttl: Duration,
    deadline: Option<Instant>,
    handle: Mutex<Option<EvictionHandle>>,
}

impl<K, V> ExpiringEntry<K, V> {
    pub(crate) fn new(key: K, value: V, ttl: Duration) -> ExpiringEntry<K, V> {
        let deadline = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };
        ExpiringEntry {
            key,
            value: RwLock::new(value),
            ttl,
            deadline,
            handle: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// The TTL the entry was inserted with. Zero means permanent.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The absolute monotonic deadline, or `None` for a permanent entry.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether this entry is subject to eviction at all.
    pub fn is_evictible(&self) -> bool {
        self.deadline.is_some()
    }

    /// Whether the deadline has passed. Once true, stays true.
    pub fn is_expired(&self) -> bool {
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    pub fn value(&self) -> V
    where
        V: Clone,
    {
        self.value.read().clone()
    }

    pub fn value_equals(&self, other: &V) -> bool
    where
        V: PartialEq,
    {
        *self.value.read() == *other
    }

    /// Swap the stored value in place, returning the previous one.
    ///
    /// Does not touch the deadline; callers that want a fresh TTL must
    /// replace the whole entry through the map.
    pub fn set_value(&self, value: V) -> V {
        std::mem::replace(&mut *self.value.write(), value)
    }

    pub(crate) fn put_handle(&self, handle: EvictionHandle) {
        *self.handle.lock() = Some(handle);
    }

    pub(crate) fn take_handle(&self) -> Option<EvictionHandle> {
        self.handle.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn permanent_entry() {
        let e = ExpiringEntry::new(1, "a", Duration::ZERO);
        assert!(!e.is_evictible());
        assert!(!e.is_expired());
        assert_eq!(e.deadline(), None);
        sleep(Duration::from_millis(5));
        assert!(!e.is_expired());
    }

    #[test]
    fn entry_expires() {
        let e = ExpiringEntry::new(1, "a", Duration::from_millis(10));
        assert!(e.is_evictible());
        assert!(!e.is_expired());
        sleep(Duration::from_millis(20));
        assert!(e.is_expired());
        // expiry is terminal
        assert!(e.is_expired());
    }

    #[test]
    fn nanosecond_ttl_is_stale_immediately() {
        let e = ExpiringEntry::new(1, "a", Duration::from_nanos(1));
        assert!(e.is_evictible());
        sleep(Duration::from_millis(1));
        assert!(e.is_expired());
    }

    #[test]
    fn set_value_swaps() {
        let e = ExpiringEntry::new(1, "a", Duration::ZERO);
        assert_eq!(e.set_value("b"), "a");
        assert_eq!(e.value(), "b");
    }

    #[test]
    fn handle_is_claimed_once() {
        let e = ExpiringEntry::new(1, "a", Duration::from_secs(1));
        e.put_handle(EvictionHandle::Queued(7));
        assert!(matches!(e.take_handle(), Some(EvictionHandle::Queued(7))));
        assert!(e.take_handle().is_none());
    }
}
