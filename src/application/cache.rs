//! Bounded LRU + TTL cache shared across requests.
//!
//! Entries expire once their age reaches their TTL and are evicted in
//! least-recently-used order once the cache is full. Recency is a global
//! tick stamped on every insert and every hit, so the LRU order is exact even
//! when many operations land on the same instant.

use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, EvictionCandidate, EvictionPolicy, Storage};
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// A cached value with its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
    last_used: u64,
}

impl<V> CacheEntry<V> {
    fn new(value: V, inserted_at: Instant, ttl: Duration, tick: u64) -> Self {
        Self {
            value,
            inserted_at,
            ttl,
            last_used: tick,
        }
    }

    /// Whether the entry's age has reached its TTL at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }

    /// The cached value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// When the entry was stored.
    pub fn inserted_at(&self) -> Instant {
        self.inserted_at
    }

    /// The entry's time to live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Error returned when cache configuration validation fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheConfigError {
    /// Capacity must be greater than zero
    #[error("cache capacity must be greater than 0")]
    ZeroCapacity,
}

/// Bounded key-value cache with per-entry TTL and LRU eviction.
///
/// Reads and overwrites only take the key's shard lock. New keys reserve a
/// slot from an atomic counter, so the capacity bound holds exactly under
/// contention; only inserts into a full cache take the eviction mutex.
pub struct ResponseCache<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
    S: Storage<K, CacheEntry<V>>,
{
    storage: S,
    clock: Arc<dyn Clock>,
    eviction: Arc<dyn EvictionPolicy<K>>,
    capacity: usize,
    default_ttl: Duration,
    tick: AtomicU64,
    slots: AtomicUsize,
    evict_lock: Mutex<()>,
    metrics: Metrics,
    _value: PhantomData<fn() -> V>,
}

impl<K, V, S> ResponseCache<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + Debug,
    V: Clone + Send + Sync,
    S: Storage<K, CacheEntry<V>>,
{
    /// Create a cache holding at most `capacity` entries.
    ///
    /// # Errors
    /// Returns `CacheConfigError::ZeroCapacity` if `capacity` is zero.
    pub fn new(
        storage: S,
        clock: Arc<dyn Clock>,
        eviction: Arc<dyn EvictionPolicy<K>>,
        capacity: usize,
        default_ttl: Duration,
        metrics: Metrics,
    ) -> Result<Self, CacheConfigError> {
        if capacity == 0 {
            return Err(CacheConfigError::ZeroCapacity);
        }

        Ok(Self {
            storage,
            clock,
            eviction,
            capacity,
            default_ttl,
            tick: AtomicU64::new(0),
            slots: AtomicUsize::new(0),
            evict_lock: Mutex::new(()),
            metrics,
            _value: PhantomData,
        })
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Look up a live entry and mark it most recently used.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let lookup = self.storage.with_existing_mut(key, |entry| {
            if entry.is_expired(now) {
                None
            } else {
                entry.last_used = self.next_tick();
                Some(entry.value.clone())
            }
        });

        match lookup {
            Some(Some(value)) => {
                self.metrics.record_cache_hit();
                Some(value)
            }
            Some(None) => {
                if self
                    .storage
                    .remove_if(key, |entry| entry.is_expired(now))
                    .is_some()
                {
                    self.release_slots(1);
                    self.metrics.record_cache_expirations(1);
                }
                self.metrics.record_cache_miss();
                None
            }
            None => {
                self.metrics.record_cache_miss();
                None
            }
        }
    }

    /// Store `value` under `key` with `ttl`, or the default TTL when `None`.
    ///
    /// Replacing an existing key never evicts another entry and only takes
    /// that key's shard lock. Inserting a new key into a full cache drops
    /// expired entries if there are any, otherwise the least recently used
    /// entry.
    pub fn put(&self, key: K, value: V, ttl: Option<Duration>) {
        let now = self.clock.now();
        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut pending = Some(CacheEntry::new(value, now, ttl, self.next_tick()));

        self.storage.with_existing_mut(&key, |current| {
            if let Some(entry) = pending.take() {
                *current = entry;
            }
        });
        let Some(entry) = pending else {
            return;
        };

        if !self.reserve_slot() {
            let _guard = self
                .evict_lock
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            while !self.reserve_slot() {
                if !self.make_room(now) {
                    debug!(key = ?key, "every slot is mid-insert, dropping cache write");
                    return;
                }
            }
        }

        // A concurrent put of the same key may land first; keep its entry
        let created = Cell::new(false);
        self.storage.with_entry_mut(
            key,
            || {
                created.set(true);
                entry
            },
            |_| (),
        );
        if !created.get() {
            self.release_slots(1);
        }
    }

    fn reserve_slot(&self) -> bool {
        self.slots
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.capacity && !self.eviction.should_evict(used)).then_some(used + 1)
            })
            .is_ok()
    }

    fn release_slots(&self, count: usize) {
        if count > 0 {
            self.slots.fetch_sub(count, Ordering::AcqRel);
        }
    }

    // Frees at least one slot unless every slot is reserved by an insert
    // that has not reached storage yet.
    fn make_room(&self, now: Instant) -> bool {
        let mut candidates = Vec::with_capacity(self.capacity);
        let mut expired = Vec::new();
        self.storage.for_each(|key, entry| {
            if entry.is_expired(now) {
                expired.push(key.clone());
            } else {
                candidates.push(EvictionCandidate {
                    key: key.clone(),
                    last_used: entry.last_used,
                    inserted_at: entry.inserted_at,
                });
            }
        });

        if !expired.is_empty() {
            let purged = expired
                .iter()
                .filter(|key| {
                    self.storage
                        .remove_if(key, |entry| entry.is_expired(now))
                        .is_some()
                })
                .count();
            self.release_slots(purged);
            if purged > 0 {
                self.metrics.record_cache_expirations(purged);
            }
            return true;
        }

        let Some(victim) = self.eviction.select_victim(&candidates) else {
            return false;
        };
        if self.storage.remove(&victim).is_some() {
            self.release_slots(1);
            debug!(key = ?victim, "evicted least recently used cache entry");
            self.metrics.record_cache_eviction();
        }
        true
    }

    /// Remove `key`, returning its value if it was live.
    pub fn remove(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let removed = self.storage.remove(key)?;
        self.release_slots(1);
        (!removed.is_expired(now)).then_some(removed.value)
    }

    /// Drop every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(self.clock.now())
    }

    fn purge_expired_at(&self, now: Instant) -> usize {
        let mut purged = 0;
        self.storage.retain(|_, entry| {
            let expired = entry.is_expired(now);
            if expired {
                purged += 1;
            }
            !expired
        });
        self.release_slots(purged);
        if purged > 0 {
            self.metrics.record_cache_expirations(purged);
        }
        purged
    }

    /// Whether a live entry exists for `key`, without touching recency.
    pub fn contains(&self, key: &K) -> bool {
        let now = self.clock.now();
        self.storage
            .with_existing_mut(key, |entry| !entry.is_expired(now))
            .unwrap_or(false)
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let mut removed = 0;
        self.storage.retain(|_, _| {
            removed += 1;
            false
        });
        self.release_slots(removed);
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// TTL applied when `put` is given none.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

impl<K, V, S> Debug for ResponseCache<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
    S: Storage<K, CacheEntry<V>>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("len", &self.storage.len())
            .field("capacity", &self.capacity)
            .field("default_ttl", &self.default_ttl)
            .field("eviction", &self.eviction)
            .finish()
    }
}
