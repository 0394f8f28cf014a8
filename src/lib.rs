/*!
Concurrent map with per-entry TTL and pluggable eviction scheduling.

Entries inserted with a TTL disappear once it elapses; entries inserted
with [`Duration::ZERO`](std::time::Duration::ZERO) are permanent. Two
mechanisms cooperate so a stale value is never observable:

- **Lazy expiry**: any read that finds an expired entry removes it on the
  spot.
- **Scheduled expiry**: an [`EvictionScheduler`] fires at (or shortly
  after) each deadline and removes the entry even if nobody ever reads it
  again.

The scheduler is chosen at construction time and trades put-path cost
against timing accuracy and owned resources:

| Scheduler | Timer model | Notes |
|---|---|---|
| [`PerEntryTimerScheduler`] | one pool job per entry | cheapest cancel, slowest put under churn |
| [`IntervalScheduler`] | fixed-rate drain | accuracy bounded by the interval |
| [`DelayedTaskScheduler`] | one-shot job at the next deadline | exact firing, no idle ticks (default) |
| [`DedicatedThreadScheduler`] | owned worker thread | exact firing without a pool |
| [`NoopScheduler`] | none | lazy expiry only |

```
use expiremap::ExpiringMap;
use std::time::Duration;

let map = ExpiringMap::new();
map.insert("config", "permanent");
map.insert_with_ttl("token", "short-lived", Duration::from_millis(40));

assert_eq!(map.get("token"), Some("short-lived"));
std::thread::sleep(Duration::from_millis(80));
assert_eq!(map.get("token"), None);
assert_eq!(map.get("config"), Some("permanent"));
```

All timing is measured against the monotonic clock
([`Instant`](std::time::Instant)); adjusting the system time never expires
or revives an entry.
*/

mod entry;
mod error;
mod map;
pub mod queue;
pub mod scheduler;

pub use crate::entry::ExpiringEntry;
pub use crate::error::BuildError;
pub use crate::map::ExpiringMap;
pub use crate::queue::{EvictionQueue, HeapQueue, QueuedEviction, SortedQueue};
pub use crate::scheduler::{
    DedicatedThreadScheduler, DelayedTaskScheduler, EvictFn, EvictionScheduler, IntervalScheduler,
    NoopScheduler, PerEntryTimerScheduler,
};
