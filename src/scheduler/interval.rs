use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use scheduled_thread_pool::{JobHandle, ScheduledThreadPool};

use super::{EvictFn, EvictionScheduler, QueueCore};
use crate::entry::ExpiringEntry;
use crate::error::BuildError;
use crate::queue::{EvictionQueue, SortedQueue};

/// One shared fixed-rate job drains the queue every `interval`.
///
/// Schedule and cancel are a queue insert/remove; expiry accuracy is
/// bounded by the interval. The tick is armed on the first schedule into an
/// empty queue and disarmed once a drain or cancel leaves the queue empty,
/// so an idle map costs nothing. Good when scheduling and cancellation
/// outpace expirations.
pub struct IntervalScheduler<K, V> {
    shared: Arc<Shared<K, V>>,
    pool: Mutex<Option<Arc<ScheduledThreadPool>>>,
    interval: Duration,
}

struct Shared<K, V> {
    core: QueueCore<K, V>,
    driver: Mutex<Option<JobHandle>>,
}

impl<K, V> Shared<K, V> {
    /// Disarm the tick when the queue is empty. The emptiness re-check runs
    /// under the driver mutex: a schedule racing this decision is serialized
    /// behind it and re-arms afterwards.
    fn disarm_if_idle(&self) {
        let mut driver = self.driver.lock();
        if self.core.is_empty() {
            if let Some(job) = driver.take() {
                job.cancel();
                log::debug!("eviction tick disarmed");
            }
        }
    }
}

impl<K, V> IntervalScheduler<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Scheduler draining every `interval` on an owned single-threaded
    /// pool. The interval must be strictly positive.
    pub fn new(interval: Duration) -> Result<IntervalScheduler<K, V>, BuildError> {
        Self::build(
            interval,
            Arc::new(ScheduledThreadPool::with_name("expiremap-evictor", 1)),
            Box::new(SortedQueue::new()),
        )
    }

    /// Scheduler sharing a caller-owned pool.
    pub fn with_pool(
        interval: Duration,
        pool: Arc<ScheduledThreadPool>,
    ) -> Result<IntervalScheduler<K, V>, BuildError> {
        Self::build(interval, pool, Box::new(SortedQueue::new()))
    }

    /// Scheduler over a custom queue implementation.
    pub fn with_queue(
        interval: Duration,
        queue: Box<dyn EvictionQueue<K, V>>,
    ) -> Result<IntervalScheduler<K, V>, BuildError> {
        Self::build(
            interval,
            Arc::new(ScheduledThreadPool::with_name("expiremap-evictor", 1)),
            queue,
        )
    }

    fn build(
        interval: Duration,
        pool: Arc<ScheduledThreadPool>,
        queue: Box<dyn EvictionQueue<K, V>>,
    ) -> Result<IntervalScheduler<K, V>, BuildError> {
        if interval.is_zero() {
            return Err(BuildError::ZeroInterval);
        }
        Ok(IntervalScheduler {
            shared: Arc::new(Shared {
                core: QueueCore::new(queue),
                driver: Mutex::new(None),
            }),
            pool: Mutex::new(Some(pool)),
            interval,
        })
    }

    fn arm(&self) {
        let mut driver = self.shared.driver.lock();
        if driver.is_some() || self.shared.core.is_empty() {
            return;
        }
        let pool = match self.pool.lock().clone() {
            Some(pool) => pool,
            None => return,
        };
        let weak = Arc::downgrade(&self.shared);
        *driver = Some(pool.execute_at_fixed_rate(self.interval, self.interval, move || {
            if let Some(shared) = weak.upgrade() {
                shared.core.drain();
                shared.disarm_if_idle();
            }
        }));
        log::debug!("eviction tick armed every {:?}", self.interval);
    }
}

impl<K, V> EvictionScheduler<K, V> for IntervalScheduler<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn schedule(&self, entry: &Arc<ExpiringEntry<K, V>>, on_evict: &EvictFn<K, V>) {
        if !entry.is_evictible() {
            return;
        }
        if self.pool.lock().is_none() {
            log::warn!("eviction scheduled against a shut-down scheduler; ignored");
            return;
        }
        if self.shared.core.schedule(entry, on_evict) {
            self.arm();
        }
    }

    fn cancel(&self, entry: &Arc<ExpiringEntry<K, V>>) {
        if self.shared.core.cancel(entry) {
            self.shared.disarm_if_idle();
        }
    }

    fn shutdown(&self) {
        self.shutdown_inner();
    }
}

impl<K, V> IntervalScheduler<K, V> {
    fn shutdown_inner(&self) {
        if let Some(job) = self.shared.driver.lock().take() {
            job.cancel();
        }
        self.pool.lock().take();
    }
}

impl<K, V> Drop for IntervalScheduler<K, V> {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}
