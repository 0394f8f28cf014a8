use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use super::{EvictFn, EvictionScheduler, QueueCore};
use crate::entry::ExpiringEntry;
use crate::error::BuildError;
use crate::queue::{EvictionQueue, SortedQueue};

/// A single owned worker thread sleeping until the earliest deadline.
///
/// The worker waits on a condition variable with a timeout to the head of
/// the queue; schedule and cancel flag the change and signal it, so a new
/// earliest deadline shortens the wait immediately. Same firing behavior as
/// [`DelayedTaskScheduler`](super::DelayedTaskScheduler) without the pool
/// round-trips, at the cost of owning a thread per scheduler.
pub struct DedicatedThreadScheduler<K, V> {
    shared: Arc<Shared<K, V>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct Shared<K, V> {
    core: QueueCore<K, V>,
    state: Mutex<WorkerState>,
    signal: Condvar,
}

struct WorkerState {
    /// Set by schedule/cancel so a wakeup is distinguishable from a timeout.
    notified: bool,
    finished: bool,
}

impl<K, V> Shared<K, V> {
    fn run(shared: Arc<Shared<K, V>>) {
        let mut state = shared.state.lock();
        while !state.finished {
            state.notified = false;
            match shared.core.next_deadline() {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        drop(state);
                        shared.core.drain();
                        state = shared.state.lock();
                        continue;
                    }
                    let timed_out = shared.signal.wait_until(&mut state, deadline).timed_out();
                    if timed_out && !state.notified && !state.finished {
                        drop(state);
                        shared.core.drain();
                        state = shared.state.lock();
                    }
                    // woken early: loop around and recompute the timeout
                }
                None => shared.signal.wait(&mut state),
            }
        }
    }

    fn poke(&self) {
        let mut state = self.state.lock();
        state.notified = true;
        drop(state);
        self.signal.notify_one();
    }
}

impl<K, V> DedicatedThreadScheduler<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Scheduler with an owned worker thread over the default queue.
    pub fn new() -> Result<DedicatedThreadScheduler<K, V>, BuildError> {
        Self::build(Box::new(SortedQueue::new()))
    }

    /// Scheduler over a custom queue implementation.
    pub fn with_queue(
        queue: Box<dyn EvictionQueue<K, V>>,
    ) -> Result<DedicatedThreadScheduler<K, V>, BuildError> {
        Self::build(queue)
    }

    fn build(
        queue: Box<dyn EvictionQueue<K, V>>,
    ) -> Result<DedicatedThreadScheduler<K, V>, BuildError> {
        let shared = Arc::new(Shared {
            core: QueueCore::new(queue),
            state: Mutex::new(WorkerState {
                notified: false,
                finished: false,
            }),
            signal: Condvar::new(),
        });
        let worker = std::thread::Builder::new()
            .name("expiremap-evictor".to_string())
            .spawn({
                let shared = Arc::clone(&shared);
                move || Shared::run(shared)
            })?;
        Ok(DedicatedThreadScheduler {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }
}

impl<K, V> EvictionScheduler<K, V> for DedicatedThreadScheduler<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn schedule(&self, entry: &Arc<ExpiringEntry<K, V>>, on_evict: &EvictFn<K, V>) {
        if !entry.is_evictible() {
            return;
        }
        if self.shared.state.lock().finished {
            log::warn!("eviction scheduled against a shut-down scheduler; ignored");
            return;
        }
        if self.shared.core.schedule(entry, on_evict) {
            self.shared.poke();
        }
    }

    fn cancel(&self, entry: &Arc<ExpiringEntry<K, V>>) {
        if self.shared.core.cancel(entry) {
            self.shared.poke();
        }
    }

    fn shutdown(&self) {
        self.shutdown_inner();
    }
}

impl<K, V> DedicatedThreadScheduler<K, V> {
    fn shutdown_inner(&self) {
        {
            let mut state = self.shared.state.lock();
            state.finished = true;
            state.notified = true;
        }
        self.shared.signal.notify_one();
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

impl<K, V> Drop for DedicatedThreadScheduler<K, V> {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}
