use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::{EvictionQueue, QueuedEviction};
use crate::entry::ExpiringEntry;

/// Priority-queue variant, ordered by deadline ascending.
///
/// Arbitrary removal in a heap is linear, which makes cancellation slower
/// than [`SortedQueue`](super::SortedQueue) under churn; included for
/// pluggability.
pub struct HeapQueue<K, V> {
    inner: Mutex<BinaryHeap<Slot<K, V>>>,
}

struct Slot<K, V> {
    deadline: Instant,
    seq: u64,
    item: QueuedEviction<K, V>,
}

impl<K, V> PartialEq for Slot<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<K, V> Eq for Slot<K, V> {}

impl<K, V> PartialOrd for Slot<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K, V> Ord for Slot<K, V> {
    // BinaryHeap is a max-heap; invert so the earliest deadline surfaces
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<K, V> HeapQueue<K, V> {
    pub fn new() -> HeapQueue<K, V> {
        HeapQueue {
            inner: Mutex::new(BinaryHeap::new()),
        }
    }
}

impl<K, V> Default for HeapQueue<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> EvictionQueue<K, V> for HeapQueue<K, V>
where
    K: Send + Sync,
    V: Send + Sync,
{
    fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.inner.lock().peek().map(|slot| slot.deadline)
    }

    fn push(&self, seq: u64, item: QueuedEviction<K, V>) {
        let deadline = match item.entry.deadline() {
            Some(deadline) => deadline,
            None => return,
        };
        self.inner.lock().push(Slot {
            deadline,
            seq,
            item,
        });
    }

    fn remove(&self, seq: u64, entry: &Arc<ExpiringEntry<K, V>>) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.len();
        inner.retain(|slot| !(slot.seq == seq && Arc::ptr_eq(&slot.item.entry, entry)));
        inner.len() < before
    }

    fn drain_due(&self, now: Instant) -> Vec<QueuedEviction<K, V>> {
        let mut inner = self.inner.lock();
        let mut due = Vec::new();
        while let Some(slot) = inner.peek() {
            if slot.deadline > now {
                break;
            }
            match inner.pop() {
                Some(slot) => due.push(slot.item),
                // a contended peek that turns up empty means nothing to do
                None => break,
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{exercise_queue, exercise_shared_deadline};
    use super::*;

    #[test]
    fn heap_queue() {
        exercise_queue(&HeapQueue::new());
    }

    #[test]
    fn heap_queue_siblings() {
        exercise_shared_deadline(&HeapQueue::new());
    }

    #[test]
    fn heap_orders_by_deadline() {
        let mut heap = BinaryHeap::new();
        let now = Instant::now();
        for (seq, offset_ms) in [(0u64, 30u64), (1, 10), (2, 20)] {
            heap.push(Slot {
                deadline: now + std::time::Duration::from_millis(offset_ms),
                seq,
                item: super::super::tests::item(
                    seq as u32,
                    offset_ms,
                    &Arc::new(std::sync::atomic::AtomicUsize::new(0)),
                ),
            });
        }
        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|s| s.seq)).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }
}
