use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::entry::ExpiringEntry;
use crate::scheduler::{DelayedTaskScheduler, EvictFn, EvictionScheduler};

#[derive(Default)]
struct Stats {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Concurrent map whose entries carry an optional TTL.
///
/// Storage lives in a sharded concurrent hash map; eviction timing is
/// delegated to an [`EvictionScheduler`]. A TTL of [`Duration::ZERO`] means
/// the entry is permanent. Independently of the scheduler, any read that
/// observes an expired entry removes it, so a stale value is never returned
/// even before its timer fires.
///
/// All operations that report a previous value treat an
/// expired-but-not-yet-evicted slot as absent.
///
/// Cloning the map is cheap and yields a handle to the same storage and
/// scheduler.
///
/// ```
/// use expiremap::ExpiringMap;
/// use std::time::Duration;
///
/// let map = ExpiringMap::new();
/// map.insert_with_ttl("session", 42, Duration::from_millis(50));
/// assert_eq!(map.get("session"), Some(42));
/// std::thread::sleep(Duration::from_millis(90));
/// assert_eq!(map.get("session"), None);
/// ```
pub struct ExpiringMap<K, V> {
    delegate: Arc<DashMap<K, Arc<ExpiringEntry<K, V>>>>,
    scheduler: Arc<dyn EvictionScheduler<K, V>>,
    on_evict: EvictFn<K, V>,
    stats: Arc<Stats>,
}

impl<K, V> Clone for ExpiringMap<K, V> {
    fn clone(&self) -> Self {
        ExpiringMap {
            delegate: Arc::clone(&self.delegate),
            scheduler: Arc::clone(&self.scheduler),
            on_evict: Arc::clone(&self.on_evict),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<K, V> ExpiringMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Map with the default scheduler: a [`DelayedTaskScheduler`] firing
    /// exactly at the next deadline from its own single-threaded pool.
    #[must_use]
    pub fn new() -> ExpiringMap<K, V> {
        Self::with_scheduler(Arc::new(DelayedTaskScheduler::new()))
    }

    /// Map over a caller-chosen scheduler. The scheduler may be shared by
    /// several maps of the same key and value types; shutting it down is
    /// its owner's call, not the map's.
    pub fn with_scheduler(scheduler: Arc<dyn EvictionScheduler<K, V>>) -> ExpiringMap<K, V> {
        let delegate = Arc::new(DashMap::new());
        // the expiry hook removes by identity and holds the delegate weakly:
        // entries do not know their map and no cycle keeps either alive
        let weak = Arc::downgrade(&delegate);
        let on_evict: EvictFn<K, V> = Arc::new(move |entry: &Arc<ExpiringEntry<K, V>>| {
            if let Some(delegate) = weak.upgrade() {
                delegate.remove_if(entry.key(), |_, current| Arc::ptr_eq(current, entry));
            }
        });
        ExpiringMap {
            delegate,
            scheduler,
            on_evict,
            stats: Arc::new(Stats::default()),
        }
    }

    /// The scheduler this map notifies. Exposed so the owner of a map that
    /// built its own default scheduler can shut it down explicitly.
    pub fn scheduler(&self) -> Arc<dyn EvictionScheduler<K, V>> {
        Arc::clone(&self.scheduler)
    }

    fn entry_arc<Q>(&self, key: &Q) -> Option<Arc<ExpiringEntry<K, V>>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.delegate.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Lazy expiry: remove the exact entry observed and release its
    /// schedule, but only on the path that won the removal. The loser of a
    /// race against the scheduler's own firing must not touch the handle.
    fn expire(&self, entry: &Arc<ExpiringEntry<K, V>>) {
        let won = self
            .delegate
            .remove_if(entry.key(), |_, current| Arc::ptr_eq(current, entry))
            .is_some();
        if won && entry.is_evictible() {
            self.scheduler.cancel(entry);
        }
    }

    /// Insert a permanent mapping, returning the previous live value.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.insert_with_ttl(key, value, Duration::ZERO)
    }

    /// Insert a mapping that expires `ttl` from now ([`Duration::ZERO`] for
    /// permanent), returning the previous live value.
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) -> Option<V> {
        let entry = Arc::new(ExpiringEntry::new(key.clone(), value, ttl));
        let prev = self.delegate.insert(key, Arc::clone(&entry));
        if let Some(old) = &prev {
            if old.is_evictible() {
                self.scheduler.cancel(old);
            }
        }
        self.scheduler.schedule(&entry, &self.on_evict);
        prev.filter(|old| !old.is_expired()).map(|old| old.value())
    }

    /// Insert a permanent mapping unless a live one exists; see
    /// [`insert_if_absent_with_ttl`](Self::insert_if_absent_with_ttl).
    pub fn insert_if_absent(&self, key: K, value: V) -> Option<V> {
        self.insert_if_absent_with_ttl(key, value, Duration::ZERO)
    }

    /// Insert unless a live mapping exists. Returns the existing live value,
    /// or `None` if this call inserted. An expired occupant is evicted and
    /// the insert retried, so concurrent callers on an expired slot agree
    /// on exactly one winner.
    pub fn insert_if_absent_with_ttl(&self, key: K, value: V, ttl: Duration) -> Option<V> {
        loop {
            if let Some(current) = self.entry_arc(&key) {
                if !current.is_expired() {
                    return Some(current.value());
                }
                self.expire(&current);
                continue;
            }
            match self.delegate.entry(key.clone()) {
                Entry::Occupied(_) => {
                    // lost the race to another writer; re-examine the slot
                }
                Entry::Vacant(slot) => {
                    let entry = Arc::new(ExpiringEntry::new(key.clone(), value, ttl));
                    drop(slot.insert(Arc::clone(&entry)));
                    self.scheduler.schedule(&entry, &self.on_evict);
                    return None;
                }
            }
        }
    }

    /// Replace the value of a live mapping with a permanent one; see
    /// [`replace_with_ttl`](Self::replace_with_ttl).
    pub fn replace(&self, key: K, value: V) -> Option<V> {
        self.replace_with_ttl(key, value, Duration::ZERO)
    }

    /// Replace the value of a live mapping, returning the previous value.
    /// Absent or expired mappings are left absent and return `None`, as
    /// does a single lost race against a concurrent writer.
    pub fn replace_with_ttl(&self, key: K, value: V, ttl: Duration) -> Option<V> {
        let current = self.entry_arc(&key)?;
        if current.is_expired() {
            self.expire(&current);
            return None;
        }
        let entry = Arc::new(ExpiringEntry::new(key.clone(), value, ttl));
        let swapped = match self.delegate.entry(key) {
            Entry::Occupied(slot) if Arc::ptr_eq(slot.get(), &current) => {
                let mut slot = slot;
                slot.insert(Arc::clone(&entry));
                true
            }
            _ => false,
        };
        if !swapped {
            return None;
        }
        if current.is_evictible() {
            self.scheduler.cancel(&current);
        }
        self.scheduler.schedule(&entry, &self.on_evict);
        Some(current.value())
    }

    /// Conditionally replace with a permanent value; see
    /// [`replace_if_equal_with_ttl`](Self::replace_if_equal_with_ttl).
    pub fn replace_if_equal(&self, key: K, old: &V, new: V) -> bool
    where
        V: PartialEq,
    {
        self.replace_if_equal_with_ttl(key, old, new, Duration::ZERO)
    }

    /// Replace the mapping only if it is live and currently equal to `old`.
    /// Returns whether the replacement happened.
    pub fn replace_if_equal_with_ttl(&self, key: K, old: &V, new: V, ttl: Duration) -> bool
    where
        V: PartialEq,
    {
        let current = match self.entry_arc(&key) {
            Some(current) => current,
            None => return false,
        };
        if current.is_expired() {
            self.expire(&current);
            return false;
        }
        if !current.value_equals(old) {
            return false;
        }
        let entry = Arc::new(ExpiringEntry::new(key.clone(), new, ttl));
        let swapped = match self.delegate.entry(key) {
            Entry::Occupied(slot) if Arc::ptr_eq(slot.get(), &current) => {
                let mut slot = slot;
                slot.insert(Arc::clone(&entry));
                true
            }
            _ => false,
        };
        if swapped {
            if current.is_evictible() {
                self.scheduler.cancel(&current);
            }
            self.scheduler.schedule(&entry, &self.on_evict);
        }
        swapped
    }

    /// Remove a mapping, returning its value unless it had already expired.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let (_, entry) = self.delegate.remove(key)?;
        if entry.is_evictible() {
            self.scheduler.cancel(&entry);
        }
        if entry.is_expired() {
            None
        } else {
            Some(entry.value())
        }
    }

    /// Remove the mapping only if it is live and currently equal to
    /// `expected`. Returns whether this call removed it; a concurrent
    /// scheduler-driven eviction and this call never both report success.
    pub fn remove_if_equal<Q>(&self, key: &Q, expected: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: PartialEq,
    {
        let current = match self.entry_arc(key) {
            Some(current) => current,
            None => return false,
        };
        if current.is_expired() {
            self.expire(&current);
            return false;
        }
        if !current.value_equals(expected) {
            return false;
        }
        let won = self
            .delegate
            .remove_if(key, |_, c| Arc::ptr_eq(c, &current))
            .is_some();
        if won && current.is_evictible() {
            self.scheduler.cancel(&current);
        }
        won
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.entry_arc(key) {
            Some(entry) => {
                if entry.is_expired() {
                    self.expire(&entry);
                    self.stats.misses.fetch_add(1, Ordering::Relaxed);
                    None
                } else {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    Some(entry.value())
                }
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.entry_arc(key) {
            Some(entry) => {
                if entry.is_expired() {
                    self.expire(&entry);
                    false
                } else {
                    true
                }
            }
            None => false,
        }
    }

    /// Scan for a live entry holding `value`. Every expired entry observed
    /// along the way is evicted.
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        let mut expired = Vec::new();
        let mut found = false;
        for item in self.delegate.iter() {
            let entry = item.value();
            if entry.is_expired() {
                expired.push(Arc::clone(entry));
            } else if !found && entry.value_equals(value) {
                found = true;
            }
        }
        for entry in expired {
            self.expire(&entry);
        }
        found
    }

    /// Cancel every pending eviction, then drop all entries. A timer firing
    /// mid-clear finds its entry gone and is a no-op.
    pub fn clear(&self) {
        let snapshot: Vec<_> = self
            .delegate
            .iter()
            .map(|item| Arc::clone(item.value()))
            .collect();
        for entry in &snapshot {
            if entry.is_evictible() {
                self.scheduler.cancel(entry);
            }
        }
        self.delegate.clear();
    }

    /// Number of stored entries. Weakly consistent: may transiently count
    /// entries that have expired but not yet been evicted.
    pub fn len(&self) -> usize {
        self.delegate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delegate.is_empty()
    }

    /// Snapshot of the live keys. Weakly consistent; expired entries are
    /// skipped but not evicted.
    pub fn keys(&self) -> Vec<K> {
        self.delegate
            .iter()
            .filter(|item| !item.value().is_expired())
            .map(|item| item.key().clone())
            .collect()
    }

    /// Snapshot of the live values. Weakly consistent.
    pub fn values(&self) -> Vec<V> {
        self.delegate
            .iter()
            .map(|item| Arc::clone(item.value()))
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value())
            .collect()
    }

    /// Snapshot of the live entries. Weakly consistent.
    pub fn entries(&self) -> Vec<(K, V)> {
        self.delegate
            .iter()
            .filter(|item| !item.value().is_expired())
            .map(|item| (item.key().clone(), item.value().value()))
            .collect()
    }

    pub fn hits(&self) -> u64 {
        self.stats.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.stats.misses.load(Ordering::Relaxed)
    }
}

impl<K, V> Default for ExpiringMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
