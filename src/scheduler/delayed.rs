use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use scheduled_thread_pool::{JobHandle, ScheduledThreadPool};

use super::{EvictFn, EvictionScheduler, QueueCore};
use crate::entry::ExpiringEntry;
use crate::queue::{EvictionQueue, SortedQueue};

/// At most one outstanding one-shot job, aimed at the earliest queued
/// deadline.
///
/// Whenever a schedule, cancel, or drain changes the head of the queue the
/// job is cancelled and re-armed for the new head, so the timer fires
/// exactly at the next deadline with no idle ticks. Reprogramming costs a
/// little more per operation than a fixed-rate tick.
pub struct DelayedTaskScheduler<K, V> {
    shared: Arc<Shared<K, V>>,
}

struct Shared<K, V> {
    core: QueueCore<K, V>,
    state: Mutex<Armed>,
    pool: Mutex<Option<Arc<ScheduledThreadPool>>>,
}

struct Armed {
    job: Option<JobHandle>,
    /// The deadline the outstanding job targets; `None` when disarmed.
    next: Option<Instant>,
    /// Bumped whenever the outstanding job is superseded, so a job whose
    /// cancellation came too late recognizes it lost and backs off.
    generation: u64,
}

impl<K, V> Shared<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn reprogram(shared: &Arc<Shared<K, V>>) {
        let mut state = shared.state.lock();
        let head = shared.core.next_deadline();
        if head == state.next {
            return;
        }
        state.generation = state.generation.wrapping_add(1);
        if let Some(job) = state.job.take() {
            job.cancel();
        }
        state.next = head;
        let when = match head {
            Some(when) => when,
            None => return,
        };
        let pool = match shared.pool.lock().clone() {
            Some(pool) => pool,
            None => {
                state.next = None;
                return;
            }
        };
        let generation = state.generation;
        let weak = Arc::downgrade(shared);
        state.job = Some(pool.execute_after(
            when.saturating_duration_since(Instant::now()),
            move || {
                if let Some(shared) = weak.upgrade() {
                    {
                        let mut state = shared.state.lock();
                        if state.generation != generation {
                            // superseded; the job that replaced us covers
                            // the current head
                            return;
                        }
                        state.job = None;
                        state.next = None;
                    }
                    shared.core.drain();
                    Shared::reprogram(&shared);
                }
            },
        ));
    }
}

impl<K, V> DelayedTaskScheduler<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Scheduler on an owned single-threaded pool over the default queue.
    pub fn new() -> DelayedTaskScheduler<K, V> {
        Self::build(
            Arc::new(ScheduledThreadPool::with_name("expiremap-evictor", 1)),
            Box::new(SortedQueue::new()),
        )
    }

    /// Scheduler sharing a caller-owned pool.
    pub fn with_pool(pool: Arc<ScheduledThreadPool>) -> DelayedTaskScheduler<K, V> {
        Self::build(pool, Box::new(SortedQueue::new()))
    }

    /// Scheduler over a custom queue implementation.
    pub fn with_queue(queue: Box<dyn EvictionQueue<K, V>>) -> DelayedTaskScheduler<K, V> {
        Self::build(
            Arc::new(ScheduledThreadPool::with_name("expiremap-evictor", 1)),
            queue,
        )
    }

    fn build(
        pool: Arc<ScheduledThreadPool>,
        queue: Box<dyn EvictionQueue<K, V>>,
    ) -> DelayedTaskScheduler<K, V> {
        DelayedTaskScheduler {
            shared: Arc::new(Shared {
                core: QueueCore::new(queue),
                state: Mutex::new(Armed {
                    job: None,
                    next: None,
                    generation: 0,
                }),
                pool: Mutex::new(Some(pool)),
            }),
        }
    }
}

impl<K, V> Default for DelayedTaskScheduler<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> EvictionScheduler<K, V> for DelayedTaskScheduler<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn schedule(&self, entry: &Arc<ExpiringEntry<K, V>>, on_evict: &EvictFn<K, V>) {
        if !entry.is_evictible() {
            return;
        }
        if self.shared.pool.lock().is_none() {
            log::warn!("eviction scheduled against a shut-down scheduler; ignored");
            return;
        }
        if self.shared.core.schedule(entry, on_evict) {
            Shared::reprogram(&self.shared);
        }
    }

    fn cancel(&self, entry: &Arc<ExpiringEntry<K, V>>) {
        if self.shared.core.cancel(entry) {
            Shared::reprogram(&self.shared);
        }
    }

    fn shutdown(&self) {
        self.shutdown_inner();
    }
}

impl<K, V> DelayedTaskScheduler<K, V> {
    fn shutdown_inner(&self) {
        let mut state = self.shared.state.lock();
        state.generation = state.generation.wrapping_add(1);
        if let Some(job) = state.job.take() {
            job.cancel();
        }
        state.next = None;
        drop(state);
        self.shared.pool.lock().take();
    }
}

impl<K, V> Drop for DelayedTaskScheduler<K, V> {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}
