/*!
End-to-end expiry scenarios across the scheduler variants.

Timings are generous multiples of the TTLs involved so the assertions hold
on slow CI machines; the properties checked are ordering properties, not
exact latencies.
*/

use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use expiremap::{
    DedicatedThreadScheduler, DelayedTaskScheduler, EvictionScheduler, ExpiringMap, HeapQueue,
    IntervalScheduler, NoopScheduler, PerEntryTimerScheduler,
};
use scheduled_thread_pool::ScheduledThreadPool;

const TTL: Duration = Duration::from_millis(60);
const HALF_TTL: Duration = Duration::from_millis(30);
const WELL_PAST_TTL: Duration = Duration::from_millis(200);

fn schedulers() -> Vec<(&'static str, Arc<dyn EvictionScheduler<u32, String>>)> {
    vec![
        ("per-entry", Arc::new(PerEntryTimerScheduler::new())),
        (
            "interval",
            Arc::new(IntervalScheduler::new(Duration::from_millis(10)).unwrap()),
        ),
        ("delayed", Arc::new(DelayedTaskScheduler::new())),
        ("dedicated", Arc::new(DedicatedThreadScheduler::new().unwrap())),
        (
            "per-entry-wide",
            Arc::new(PerEntryTimerScheduler::with_threads(2).unwrap()),
        ),
        (
            "interval-heap",
            Arc::new(
                IntervalScheduler::with_queue(Duration::from_millis(10), Box::new(HeapQueue::new()))
                    .unwrap(),
            ),
        ),
        (
            "delayed-heap",
            Arc::new(DelayedTaskScheduler::with_queue(Box::new(HeapQueue::new()))),
        ),
        (
            "dedicated-heap",
            Arc::new(DedicatedThreadScheduler::with_queue(Box::new(HeapQueue::new())).unwrap()),
        ),
    ]
}

#[test]
fn schedulers_share_an_executor_pool() {
    let pool = Arc::new(ScheduledThreadPool::with_name("shared-timers", 1));
    let sessions: ExpiringMap<u32, String> = ExpiringMap::with_scheduler(Arc::new(
        PerEntryTimerScheduler::with_pool(Arc::clone(&pool)),
    ));
    let tokens: ExpiringMap<u32, String> =
        ExpiringMap::with_scheduler(Arc::new(DelayedTaskScheduler::with_pool(pool)));

    sessions.insert_with_ttl(1, "s".to_string(), TTL);
    tokens.insert_with_ttl(1, "t".to_string(), TTL);
    sleep(WELL_PAST_TTL);
    assert_eq!(sessions.len(), 0);
    assert_eq!(tokens.len(), 0);
}

#[test]
fn basic_expiry() {
    for (name, scheduler) in schedulers() {
        let map: ExpiringMap<u32, String> = ExpiringMap::with_scheduler(scheduler);
        map.insert_with_ttl(1, "a".to_string(), TTL);
        assert_eq!(map.get(&1), Some("a".to_string()), "{}", name);
        sleep(WELL_PAST_TTL);
        assert_eq!(map.get(&1), None, "{}", name);
    }
}

#[test]
fn eviction_happens_without_reads() {
    for (name, scheduler) in schedulers() {
        let map: ExpiringMap<u32, String> = ExpiringMap::with_scheduler(scheduler);
        map.insert_with_ttl(1, "a".to_string(), TTL);
        map.insert(2, "keep".to_string());
        assert_eq!(map.len(), 2, "{}", name);
        sleep(WELL_PAST_TTL);
        // no read has touched key 1; the scheduler alone must have removed it
        assert_eq!(map.len(), 1, "{}", name);
        assert_eq!(map.get(&2), Some("keep".to_string()), "{}", name);
    }
}

#[test]
fn no_premature_eviction() {
    for (name, scheduler) in schedulers() {
        let map: ExpiringMap<u32, String> = ExpiringMap::with_scheduler(scheduler);
        map.insert_with_ttl(1, "a".to_string(), TTL);
        sleep(HALF_TTL);
        assert_eq!(map.get(&1), Some("a".to_string()), "{}", name);
    }
}

#[test]
fn replace_then_expire() {
    for (name, scheduler) in schedulers() {
        let map: ExpiringMap<u32, String> = ExpiringMap::with_scheduler(scheduler);
        // long-lived original, replaced early by a short-lived value: the
        // original deadline is cancelled and the new one fires
        map.insert_with_ttl(1, "a".to_string(), Duration::from_millis(400));
        sleep(Duration::from_millis(20));
        assert_eq!(
            map.insert_with_ttl(1, "b".to_string(), TTL),
            Some("a".to_string()),
            "{}",
            name
        );
        sleep(HALF_TTL);
        assert_eq!(map.get(&1), Some("b".to_string()), "{}", name);
        sleep(WELL_PAST_TTL);
        assert_eq!(map.get(&1), None, "{}", name);
        assert_eq!(map.len(), 0, "{}", name);
    }
}

#[test]
fn interleaved_deadlines() {
    for (name, scheduler) in schedulers() {
        let map: ExpiringMap<u32, String> = ExpiringMap::with_scheduler(scheduler);
        map.insert_with_ttl(1, "a".to_string(), TTL);
        map.insert_with_ttl(2, "a".to_string(), TTL * 4);
        sleep(TTL * 2);
        assert!(map.contains_value(&"a".to_string()), "{}", name);
        assert!(!map.contains_key(&1), "{}", name);
        assert!(map.contains_key(&2), "{}", name);
        sleep(TTL * 4);
        assert!(!map.contains_value(&"a".to_string()), "{}", name);
        assert_eq!(map.len(), 0, "{}", name);
    }
}

#[test]
fn concurrent_insert_if_absent_on_expired_slot() {
    let map: ExpiringMap<u32, String> =
        ExpiringMap::with_scheduler(Arc::new(NoopScheduler::new()));
    map.insert_with_ttl(1, "a".to_string(), Duration::from_millis(5));
    sleep(Duration::from_millis(20));

    let results: Vec<Option<String>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let map = map.clone();
                scope.spawn(move || map.insert_if_absent(1, format!("b{}", i)))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners = results.iter().filter(|r| r.is_none()).count();
    assert_eq!(winners, 1);
    let stored = map.get(&1).unwrap();
    for loser in results.into_iter().flatten() {
        assert_eq!(loser, stored);
    }
}

#[test]
fn clear_under_load() {
    let scheduler: Arc<dyn EvictionScheduler<u32, String>> = Arc::new(DelayedTaskScheduler::new());
    let map: ExpiringMap<u32, String> = ExpiringMap::with_scheduler(scheduler);

    std::thread::scope(|scope| {
        let writer = {
            let map = map.clone();
            scope.spawn(move || {
                for round in 0..20 {
                    for k in 0..200u32 {
                        map.insert_with_ttl(k, format!("v{}", round), Duration::from_millis(10));
                    }
                }
            })
        };
        sleep(Duration::from_millis(5));
        map.clear();
        writer.join().unwrap();
    });

    // everything left behind by the writer has a 10ms TTL; after quiescence
    // the scheduler (or nothing at all) must leave the map empty
    sleep(Duration::from_millis(200));
    assert_eq!(map.len(), 0);
}

#[test]
fn lazy_expiry_without_scheduler() {
    let map: ExpiringMap<u32, String> =
        ExpiringMap::with_scheduler(Arc::new(NoopScheduler::new()));
    map.insert_with_ttl(1, "a".to_string(), Duration::from_millis(5));
    sleep(Duration::from_millis(20));
    assert_eq!(map.len(), 1);
    assert_eq!(map.get(&1), None);
    assert_eq!(map.len(), 0);
}

#[test]
fn remove_beats_pending_eviction() {
    for (name, scheduler) in schedulers() {
        let map: ExpiringMap<u32, String> = ExpiringMap::with_scheduler(scheduler);
        map.insert_with_ttl(1, "a".to_string(), TTL);
        assert_eq!(map.remove(&1), Some("a".to_string()), "{}", name);
        assert_eq!(map.get(&1), None, "{}", name);
        assert!(!map.contains_value(&"a".to_string()), "{}", name);
        sleep(WELL_PAST_TTL);
        assert_eq!(map.len(), 0, "{}", name);
    }
}

#[test]
fn permanent_entries_ignore_schedulers() {
    for (name, scheduler) in schedulers() {
        let map: ExpiringMap<u32, String> = ExpiringMap::with_scheduler(scheduler);
        map.insert(1, "a".to_string());
        sleep(WELL_PAST_TTL);
        assert_eq!(map.get(&1), Some("a".to_string()), "{}", name);
        assert_eq!(map.len(), 1, "{}", name);
    }
}

#[test]
fn scheduler_shared_between_maps() {
    let scheduler: Arc<dyn EvictionScheduler<u32, String>> = Arc::new(DelayedTaskScheduler::new());
    let sessions: ExpiringMap<u32, String> = ExpiringMap::with_scheduler(Arc::clone(&scheduler));
    let tokens: ExpiringMap<u32, String> = ExpiringMap::with_scheduler(scheduler);

    sessions.insert_with_ttl(1, "s".to_string(), TTL);
    tokens.insert_with_ttl(1, "t".to_string(), TTL * 2);

    sleep(TTL + HALF_TTL);
    assert_eq!(sessions.len(), 0);
    assert_eq!(tokens.get(&1), Some("t".to_string()));

    sleep(WELL_PAST_TTL);
    assert_eq!(tokens.len(), 0);
}

#[test]
fn shutdown_degrades_to_lazy_expiry() {
    let map: ExpiringMap<u32, String> =
        ExpiringMap::with_scheduler(Arc::new(DelayedTaskScheduler::new()));

    map.scheduler().shutdown();
    map.insert_with_ttl(1, "a".to_string(), Duration::from_millis(5));
    sleep(Duration::from_millis(50));
    // nothing fires in the background any more
    assert_eq!(map.len(), 1);
    // but reads still never observe a stale value
    assert_eq!(map.get(&1), None);
    assert_eq!(map.len(), 0);
}

#[test]
fn nanosecond_ttl_is_immediately_stale() {
    let map: ExpiringMap<u32, String> = ExpiringMap::new();
    map.insert_with_ttl(1, "a".to_string(), Duration::from_nanos(1));
    sleep(Duration::from_millis(5));
    assert_eq!(map.get(&1), None);
}

#[test]
fn interval_scheduler_rejects_zero_interval() {
    assert!(IntervalScheduler::<u32, String>::new(Duration::ZERO).is_err());
}
