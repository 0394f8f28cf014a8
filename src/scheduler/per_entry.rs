use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use scheduled_thread_pool::ScheduledThreadPool;

use super::{EvictFn, EvictionScheduler};
use crate::entry::{EvictionHandle, ExpiringEntry};
use crate::error::BuildError;

/// One timer per evictible entry, backed by a scheduled thread pool.
///
/// Cancellation is cheapest of all strategies (flip the job's handle) but
/// every put arms a fresh pool job, which makes this the slowest write path
/// under heavy churn. Useful baseline, and the only strategy with no queue.
///
/// The pool job holds only a [`Weak`](std::sync::Weak) reference to its
/// entry, so a cancelled entry with a long TTL is not kept alive until its
/// timer would have fired.
pub struct PerEntryTimerScheduler {
    pool: Mutex<Option<Arc<ScheduledThreadPool>>>,
}

impl PerEntryTimerScheduler {
    /// Scheduler owning a single-threaded pool.
    pub fn new() -> PerEntryTimerScheduler {
        PerEntryTimerScheduler {
            pool: Mutex::new(Some(Arc::new(ScheduledThreadPool::with_name(
                "expiremap-timer",
                1,
            )))),
        }
    }

    /// Scheduler owning a pool of `threads` workers.
    pub fn with_threads(threads: usize) -> Result<PerEntryTimerScheduler, BuildError> {
        if threads == 0 {
            return Err(BuildError::ZeroThreads);
        }
        Ok(PerEntryTimerScheduler {
            pool: Mutex::new(Some(Arc::new(ScheduledThreadPool::with_name(
                "expiremap-timer",
                threads,
            )))),
        })
    }

    /// Scheduler sharing a caller-owned pool. Shutdown cancels only this
    /// scheduler's jobs and leaves the pool running.
    pub fn with_pool(pool: Arc<ScheduledThreadPool>) -> PerEntryTimerScheduler {
        PerEntryTimerScheduler {
            pool: Mutex::new(Some(pool)),
        }
    }

    fn shutdown_inner(&self) {
        self.pool.lock().take();
    }
}

impl Default for PerEntryTimerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> EvictionScheduler<K, V> for PerEntryTimerScheduler
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn schedule(&self, entry: &Arc<ExpiringEntry<K, V>>, on_evict: &EvictFn<K, V>) {
        let deadline = match entry.deadline() {
            Some(deadline) => deadline,
            None => return,
        };
        let pool = match self.pool.lock().clone() {
            Some(pool) => pool,
            None => {
                log::warn!("eviction scheduled against a shut-down scheduler; ignored");
                return;
            }
        };
        let weak = Arc::downgrade(entry);
        let on_evict = Arc::clone(on_evict);
        let handle = pool.execute_after(
            deadline.saturating_duration_since(Instant::now()),
            move || {
                if let Some(entry) = weak.upgrade() {
                    if entry.is_expired() {
                        on_evict(&entry);
                    }
                }
            },
        );
        entry.put_handle(EvictionHandle::Timer(handle));
    }

    fn cancel(&self, entry: &Arc<ExpiringEntry<K, V>>) {
        if !entry.is_evictible() {
            return;
        }
        // tolerate a job that already ran: cancelling a completed handle is
        // a no-op, and a missing handle means the expiry path claimed it
        if let Some(EvictionHandle::Timer(handle)) = entry.take_handle() {
            handle.cancel();
        }
    }

    fn shutdown(&self) {
        self.shutdown_inner();
    }
}

impl Drop for PerEntryTimerScheduler {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}
