// =============================================================================
// TTL Cache — memoization for expensive, deterministic computations
// =============================================================================
//
// A single mutex guards the backing map; the TTL check and the eviction of a
// stale entry happen atomically with the read. Eviction is lazy — an expired
// entry is purged by the next lookup that touches it, no background sweep.
//
// Instances are constructed once at process start and handed to the
// components that need them; there is deliberately no global cache.
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct CacheEntry<V> {
    inserted_at: Instant,
    value: V,
}

/// Keyed value cache with per-instance TTL and lazy eviction.
pub struct TtlCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up `key`. Entries at or past the TTL are treated as misses and
    /// removed under the same lock.
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Store `value` under `key`, resetting its insertion time.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if now.duration_since(entry.inserted_at) < self.ttl => {
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn insert_at(&self, key: impl Into<String>, value: V, now: Instant) {
        self.entries.lock().insert(
            key.into(),
            CacheEntry {
                inserted_at: now,
                value,
            },
        );
    }
}
