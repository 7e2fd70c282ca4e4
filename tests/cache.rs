use std::sync::atomic::{AtomicUsize, Ordering};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rayon::prelude::*;

use native_lifecycle::{Allocation, CacheConfig, CacheStats, KeyedCache, DEFAULT_IDLE_TIMEOUT};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, PartialEq)]
struct Pipeline {
    name: &'static str,
    instance: u32,
}

fn pipeline(name: &'static str, instance: u32) -> Arc<Pipeline> {
    Arc::new(Pipeline { name, instance })
}

fn cache_with(timeout: Duration) -> KeyedCache<&'static str, Arc<Pipeline>> {
    KeyedCache::with_config(
        |p: &Arc<Pipeline>| p.name,
        CacheConfig::default().with_idle_timeout(timeout),
    )
}

fn counter_build(builds: &AtomicUsize) -> impl FnOnce(&Arc<Pipeline>) + '_ {
    move |_: &Arc<Pipeline>| {
        builds.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn default_config_uses_two_second_timeout() {
    let cache: KeyedCache<&'static str, Arc<Pipeline>> = KeyedCache::new(|p: &Arc<Pipeline>| p.name);
    assert_eq!(cache.idle_timeout(), DEFAULT_IDLE_TIMEOUT);
    assert_eq!(DEFAULT_IDLE_TIMEOUT, Duration::from_secs(2));
    assert!(cache.is_empty());
}

#[test]
fn miss_builds_and_returns_supplied_element() {
    init_logging();
    let cache = cache_with(DEFAULT_IDLE_TIMEOUT);
    let builds = AtomicUsize::new(0);

    let e1 = pipeline("shadow", 1);
    let allocation = cache.allocate(e1.clone(), counter_build(&builds));

    assert!(allocation.is_built());
    assert!(Arc::ptr_eq(allocation.get(), &e1));
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(cache.contains_key(&"shadow"));
}

#[test]
fn hit_returns_previously_cached_element() {
    init_logging();
    let cache = cache_with(DEFAULT_IDLE_TIMEOUT);
    let builds = AtomicUsize::new(0);

    let e1 = pipeline("shadow", 1);
    let e2 = pipeline("shadow", 2);

    cache.allocate(e1.clone(), counter_build(&builds));
    let allocation = cache.allocate(e2.clone(), counter_build(&builds));

    assert!(allocation.is_cached());
    let returned = allocation.into_inner();
    assert!(Arc::ptr_eq(&returned, &e1), "a hit must hand back the first instance");
    assert!(!Arc::ptr_eq(&returned, &e2));
    assert_eq!(returned.instance, 1);
    assert_eq!(builds.load(Ordering::SeqCst), 1, "a hit must not run the build");
    assert_eq!(cache.len(), 1);
}

#[test]
fn distinct_keys_build_independently() {
    init_logging();
    let cache = cache_with(DEFAULT_IDLE_TIMEOUT);
    let builds = AtomicUsize::new(0);

    for name in ["shadow", "bloom", "tonemap"] {
        assert!(cache.allocate(pipeline(name, 0), counter_build(&builds)).is_built());
    }

    assert_eq!(cache.len(), 3);
    assert_eq!(builds.load(Ordering::SeqCst), 3);
}

#[test]
fn zero_timeout_flush_evicts_and_next_allocate_rebuilds() {
    init_logging();
    let cache = cache_with(Duration::ZERO);
    let builds = AtomicUsize::new(0);

    let e1 = pipeline("foo", 1);
    cache.allocate(e1, counter_build(&builds));

    assert_eq!(cache.flush(), 1);
    assert!(cache.is_empty());
    assert_eq!(builds.load(Ordering::SeqCst), 1);

    let e2 = pipeline("foo", 2);
    let allocation = cache.allocate(e2.clone(), counter_build(&builds));

    assert_eq!(builds.load(Ordering::SeqCst), 2);
    assert_eq!(allocation, Allocation::Built(e2.clone()));
    assert!(Arc::ptr_eq(&allocation.into_inner(), &e2));
}

#[test]
fn flush_keeps_entries_within_timeout() {
    init_logging();
    let cache = cache_with(Duration::from_secs(10));
    let builds = AtomicUsize::new(0);

    cache.allocate(pipeline("shadow", 1), counter_build(&builds));
    let after = Instant::now();

    assert_eq!(cache.flush(), 0);
    assert_eq!(cache.flush_at(after + Duration::from_secs(5)), 0);
    assert_eq!(cache.len(), 1);

    assert_eq!(cache.flush_at(after + Duration::from_secs(10)), 1);
    assert!(cache.is_empty());
}

#[test]
fn hit_refreshes_last_use() {
    init_logging();
    let timeout = Duration::from_secs(1);
    let cache = cache_with(timeout);
    let builds = AtomicUsize::new(0);

    cache.allocate(pipeline("shadow", 1), counter_build(&builds));
    thread::sleep(Duration::from_millis(50));

    let refreshed = Instant::now();
    assert!(cache.allocate(pipeline("shadow", 2), counter_build(&builds)).is_cached());

    // Idle measured from the hit, not from the insertion.
    assert_eq!(cache.flush_at(refreshed + timeout - Duration::from_millis(10)), 0);
    assert_eq!(cache.len(), 1);
}

#[test]
fn clear_drops_entries_without_touching_elements() {
    init_logging();
    let cache = cache_with(DEFAULT_IDLE_TIMEOUT);
    let builds = AtomicUsize::new(0);

    let e1 = pipeline("shadow", 1);
    cache.allocate(e1.clone(), counter_build(&builds));
    cache.clear();

    assert!(cache.is_empty());
    assert_eq!(Arc::strong_count(&e1), 1, "the cache no longer holds the element");
    assert_eq!(e1.instance, 1);

    let allocation = cache.allocate(pipeline("shadow", 2), counter_build(&builds));
    assert!(allocation.is_built());
    assert_eq!(builds.load(Ordering::SeqCst), 2);
}

#[test]
fn failed_build_removes_entry() {
    init_logging();
    let cache = cache_with(DEFAULT_IDLE_TIMEOUT);

    let result = cache.try_allocate(pipeline("shadow", 1), |_| Err("device lost"));
    assert_eq!(result.unwrap_err(), "device lost");
    assert!(!cache.contains_key(&"shadow"));

    let retried = cache
        .try_allocate(pipeline("shadow", 2), |_| Ok::<(), &str>(()))
        .unwrap();
    assert!(retried.is_built());
    assert_eq!(retried.get().instance, 2);
}

#[test]
fn stats_track_hits_misses_and_evictions() {
    init_logging();
    let cache = cache_with(Duration::ZERO);
    let builds = AtomicUsize::new(0);

    cache.allocate(pipeline("a", 0), counter_build(&builds));
    cache.allocate(pipeline("a", 1), counter_build(&builds));
    cache.allocate(pipeline("a", 2), counter_build(&builds));
    cache.allocate(pipeline("b", 0), counter_build(&builds));

    assert_eq!(
        cache.stats(),
        CacheStats { entries: 2, hits: 2, misses: 2, evictions: 0 }
    );

    cache.flush();
    assert_eq!(
        cache.stats(),
        CacheStats { entries: 0, hits: 2, misses: 2, evictions: 2 }
    );
}

#[test]
fn concurrent_allocate_builds_once_per_key() {
    init_logging();
    let cache = cache_with(DEFAULT_IDLE_TIMEOUT);
    let builds = AtomicUsize::new(0);

    let allocations: Vec<Allocation<Arc<Pipeline>>> = (0..512u32)
        .into_par_iter()
        .map(|i| {
            let name = if i % 2 == 0 { "even" } else { "odd" };
            cache.allocate(pipeline(name, i), counter_build(&builds))
        })
        .collect();

    assert_eq!(builds.load(Ordering::SeqCst), 2);
    assert_eq!(allocations.iter().filter(|a| a.is_built()).count(), 2);
    assert_eq!(cache.len(), 2);

    for name in ["even", "odd"] {
        let mut same_key = allocations.iter().map(Allocation::get).filter(|p| p.name == name);
        let first = same_key.next().unwrap();
        assert!(same_key.all(|p| Arc::ptr_eq(p, first)));
    }
}

#[test]
fn concurrent_flush_and_allocate_stays_consistent() {
    init_logging();
    let cache = cache_with(Duration::ZERO);
    let builds = AtomicUsize::new(0);

    (0..1_000u32).into_par_iter().for_each(|i| {
        if i % 10 == 0 {
            cache.flush();
        } else {
            cache.allocate(pipeline("hot", i), counter_build(&builds));
        }
    });

    let stats = cache.stats();
    assert_eq!(stats.misses as usize, builds.load(Ordering::SeqCst));
    assert_eq!(stats.hits + stats.misses, 900);
    assert!(stats.entries <= 1);
}

#[test]
fn panicking_build_removes_entry() {
    init_logging();
    let cache = cache_with(DEFAULT_IDLE_TIMEOUT);
    let builds = AtomicUsize::new(0);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        cache.allocate(pipeline("shadow", 1), |_| panic!("validation error"))
    }));
    assert!(outcome.is_err());
    assert!(!cache.contains_key(&"shadow"));

    let allocation = cache.allocate(pipeline("shadow", 2), counter_build(&builds));
    assert!(allocation.is_built());
    assert_eq!(allocation.get().instance, 2);
    assert_eq!(builds.load(Ordering::SeqCst), 1);
}
