//! # Keyed Construction Cache
//!
//! Deduplicates construction of equivalent native resources.
//!
//! A [`KeyedCache`] maps a key **derived from the element itself** (through a
//! projection supplied at construction) to the first element inserted for
//! that key. Callers hand in a freshly instantiated element together with the
//! expensive build work; the cache decides whether that work runs.
//!
//! ## Hit / miss contract
//!
//! * **Miss** — the element is inserted, then the build side effect runs on
//!   the calling thread, and [`Allocation::Built`] returns the element.
//! * **Hit** — the entry's last-use timestamp is refreshed and
//!   [`Allocation::Cached`] returns the **previously cached** element. The
//!   element passed in is discarded; only the first instance inserted for a
//!   key is ever retained.
//!
//! ## Eviction
//!
//! Nothing is evicted implicitly. The owner calls [`KeyedCache::flush`]
//! periodically (once per frame or tick); it removes entries whose idle time
//! meets or exceeds the configured timeout. [`KeyedCache::clear`] removes
//! everything. Neither destroys anything: the cache only deduplicates
//! instances, native cleanup belongs to the lifecycle manager and to whoever
//! still owns the element.
//!
//! ## Concurrency
//!
//! Entries live in a sharded `DashMap`:
//! * hits take a shard read lock and refresh the timestamp atomically,
//! * misses re-check under the shard write lock before inserting, so one key
//!   never gets two entries; the build runs after the lock is released,
//! * `flush` checks and removes under the shard write lock, so a refresh of
//!   the same entry is serialized with the check.
//!
//! A caller racing another caller's in-flight build for the same key gets
//! `Cached` of the winner's element while that build may still be running.
//! Callers that need the built state to be visible must serialize on the key
//! themselves.

use std::convert::Infallible;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::lifecycle::types::DEFAULT_IDLE_TIMEOUT;

/// Per-cache configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Idle window after which an untouched entry is evicted by `flush`.
    pub idle_timeout: Duration,
}

impl CacheConfig {
    /// Returns a copy of this configuration with `idle_timeout` replaced.
    #[inline]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { idle_timeout: DEFAULT_IDLE_TIMEOUT }
    }
}

/// Outcome of [`KeyedCache::allocate`].
///
/// Both variants are successes; they differ only in which element comes
/// back.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allocation<V> {
    /// Cache miss: the supplied element was inserted and built.
    Built(V),

    /// Cache hit: the previously cached element. The supplied one was
    /// discarded without running its build.
    Cached(V),
}

impl<V> Allocation<V> {
    /// Returns `true` for a cache hit.
    #[inline]
    pub fn is_cached(&self) -> bool {
        matches!(self, Allocation::Cached(_))
    }

    /// Returns `true` for a cache miss.
    #[inline]
    pub fn is_built(&self) -> bool {
        matches!(self, Allocation::Built(_))
    }

    /// Borrows the returned element.
    #[inline]
    pub fn get(&self) -> &V {
        match self {
            Allocation::Built(v) | Allocation::Cached(v) => v,
        }
    }

    /// Unwraps the returned element.
    #[inline]
    pub fn into_inner(self) -> V {
        match self {
            Allocation::Built(v) | Allocation::Cached(v) => v,
        }
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of entries.
    pub entries: usize,
    /// Lookups served from an existing entry.
    pub hits: u64,
    /// Lookups that inserted a new entry.
    pub misses: u64,
    /// Entries removed by `flush`.
    pub evictions: u64,
}

struct CacheEntry<V> {
    element: V,
    /// Nanoseconds since the cache epoch; only ever moves forward.
    last_used: AtomicU64,
    /// Distinguishes this insertion from later ones under the same key.
    generation: u64,
}

impl<V> CacheEntry<V> {
    #[inline]
    fn touch(&self, now: u64) {
        self.last_used.fetch_max(now, Ordering::AcqRel);
    }
}

type Projection<K, V> = Box<dyn Fn(&V) -> K + Send + Sync>;

/// Concurrent get-or-build cache keyed by a projection of the element.
///
/// `V` is typically a cheap handle such as `Arc<T>`, so that a hit can hand
/// back the cached instance by clone.

pub struct KeyedCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    projection: Projection<K, V>,
    config: CacheConfig,
    epoch: Instant,
    next_generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> KeyedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates a cache with the default configuration (2 s idle timeout).
    pub fn new<F>(projection: F) -> Self
    where
        F: Fn(&V) -> K + Send + Sync + 'static,
    {
        Self::with_config(projection, CacheConfig::default())
    }

    /// Creates a cache with an explicit configuration.
    pub fn with_config<F>(projection: F, config: CacheConfig) -> Self
    where
        F: Fn(&V) -> K + Send + Sync + 'static,
    {
        Self {
            entries: DashMap::new(),
            projection: Box::new(projection),
            config,
            epoch: Instant::now(),
            next_generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns the configured idle timeout.
    #[inline]
    pub fn idle_timeout(&self) -> Duration {
        self.config.idle_timeout
    }

    /// Returns the cached element for `element`'s key, or inserts `element`
    /// and runs `build` on it.
    ///
    /// See the [module documentation](self) for the hit/miss contract.

    pub fn allocate<F>(&self, element: V, build: F) -> Allocation<V>
    where
        F: FnOnce(&V),
    {
        let outcome = self.try_allocate(element, |element| {
            build(element);
            Ok::<(), Infallible>(())
        });

        match outcome {
            Ok(allocation) => allocation,
            Err(never) => match never {},
        }
    }

    /// Fallible form of [`allocate`](KeyedCache::allocate).
    ///
    /// ## Errors
    /// If `build` fails, the entry inserted for this call is removed (unless
    /// it was already replaced) and the error is returned, so the next
    /// allocation for the key builds again. A panicking `build` removes the
    /// entry the same way while unwinding.

    pub fn try_allocate<F, E>(&self, element: V, build: F) -> Result<Allocation<V>, E>
    where
        F: FnOnce(&V) -> Result<(), E>,
    {
        let key = (self.projection)(&element);
        if let Some(cached) = self.lookup(&key) {
            return Ok(Allocation::Cached(cached));
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let now = self.now();
        match self.entries.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let cached = entry.get();
                cached.touch(now);
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Allocation::Cached(cached.element.clone()));
            }
            Entry::Vacant(slot) => {
                slot.insert(CacheEntry {
                    element: element.clone(),
                    last_used: AtomicU64::new(now),
                    generation,
                });
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        log::trace!("cache miss; building entry (generation {generation})");

        let mut pending = PendingBuild {
            entries: &self.entries,
            key: &key,
            generation,
            armed: true,
        };
        build(&element)?;
        pending.armed = false;

        Ok(Allocation::Built(element))
    }

    /// Evicts every entry idle for at least the configured timeout.
    ///
    /// Returns the number of entries evicted.
    pub fn flush(&self) -> usize {
        self.flush_at(Instant::now())
    }

    /// Evicts every entry idle for at least the configured timeout as of
    /// `now`.
    ///
    /// An entry refreshed after `now` has an idle time of zero.

    pub fn flush_at(&self, now: Instant) -> usize {
        let now = self.stamp(now);
        let timeout = saturating_nanos(self.config.idle_timeout);

        let mut evicted = 0usize;
        self.entries.retain(|_, entry| {
            let idle = now.saturating_sub(entry.last_used.load(Ordering::Acquire));
            let keep = idle < timeout;
            if !keep {
                evicted += 1;
            }
            keep
        });

        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            log::debug!("cache flush evicted {evicted} idle entries");
        }
        evicted
    }

    /// Removes every entry. Nothing is destroyed.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Current number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the cache holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if an entry exists for `key`. Does not refresh it.
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns a snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn lookup(&self, key: &K) -> Option<V> {
        let entry = self.entries.get(key)?;
        entry.touch(self.now());
        self.hits.fetch_add(1, Ordering::Relaxed);
        log::trace!("cache hit (generation {})", entry.generation);
        Some(entry.element.clone())
    }

    #[inline]
    fn now(&self) -> u64 {
        self.stamp(Instant::now())
    }

    #[inline]
    fn stamp(&self, at: Instant) -> u64 {
        saturating_nanos(at.saturating_duration_since(self.epoch))
    }
}

impl<K, V> fmt::Debug for KeyedCache<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedCache")
            .field("entries", &self.entries.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Removes the entry of an unfinished build unless disarmed, covering both
/// the error return and unwinding out of the build closure.
struct PendingBuild<'a, K: Eq + Hash, V> {
    entries: &'a DashMap<K, CacheEntry<V>>,
    key: &'a K,
    generation: u64,
    armed: bool,
}

impl<K: Eq + Hash, V> Drop for PendingBuild<'_, K, V> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let generation = self.generation;
        if self.entries.remove_if(self.key, |_, entry| entry.generation == generation).is_some() {
            log::debug!("discarded unfinished cache entry (generation {generation})");
        }
    }
}

#[inline]
fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
