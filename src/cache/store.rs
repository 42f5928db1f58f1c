//! In-process cache tier.
//!
//! Serialized payloads in an LRU with a per-entry TTL, plus the tag registry
//! used for invalidate-by-tag. Each entry carries the remote generation
//! counters observed before it was produced, so a hit can be checked against
//! invalidations run by other processes.

use std::collections::BTreeSet;
use std::sync::RwLock;
use std::time::Duration;

use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;

use super::config::CacheConfig;
use super::keys::{CacheKey, CacheTag};
use super::lock::{rw_read, rw_write};
use super::registry::CacheRegistry;

const SOURCE: &str = "cache::store";

const METRIC_LOCAL_HIT: &str = "vitrine_cache_local_hit_total";
const METRIC_LOCAL_MISS: &str = "vitrine_cache_local_miss_total";
const METRIC_LOCAL_EVICT: &str = "vitrine_cache_local_evict_total";

/// Generation counters and the values they held when an entry was produced.
pub type Stamp = Vec<(String, u64)>;

pub struct LocalHit {
    pub payload: String,
    pub stamp: Stamp,
}

struct LocalEntry {
    payload: String,
    stamp: Stamp,
    expires_at: Instant,
}

struct LocalState {
    entries: LruCache<CacheKey, LocalEntry>,
    registry: CacheRegistry,
}

impl LocalState {
    fn forget(&mut self, key: &CacheKey) -> bool {
        self.registry.unregister(key);
        self.entries.pop(key).is_some()
    }
}

/// Tier-1 storage: small, short-lived and private to the process.
pub struct LocalStore {
    state: RwLock<LocalState>,
    ttl: Duration,
}

impl LocalStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            state: RwLock::new(LocalState {
                entries: LruCache::new(config.local_capacity_non_zero()),
                registry: CacheRegistry::new(),
            }),
            ttl: config.local_ttl(),
        }
    }

    /// Returns the payload if present and not expired. Expired entries are
    /// dropped on the way out.
    pub fn get(&self, key: &CacheKey) -> Option<LocalHit> {
        let mut state = rw_write(&self.state, SOURCE, "get");
        let now = Instant::now();

        let lookup = state.entries.get(key).map(|entry| {
            (entry.expires_at > now).then(|| LocalHit {
                payload: entry.payload.clone(),
                stamp: entry.stamp.clone(),
            })
        });
        let hit = match lookup {
            Some(Some(hit)) => Some(hit),
            Some(None) => {
                state.forget(key);
                None
            }
            None => None,
        };

        match hit {
            Some(_) => counter!(METRIC_LOCAL_HIT).increment(1),
            None => counter!(METRIC_LOCAL_MISS).increment(1),
        }
        hit
    }

    pub fn insert(&self, key: CacheKey, payload: String, stamp: Stamp, tags: &BTreeSet<CacheTag>) {
        let mut state = rw_write(&self.state, SOURCE, "insert");
        let entry = LocalEntry {
            payload,
            stamp,
            expires_at: Instant::now() + self.ttl,
        };

        if let Some((evicted, _)) = state.entries.push(key, entry)
            && evicted != key
        {
            state.registry.unregister(&evicted);
            counter!(METRIC_LOCAL_EVICT).increment(1);
        }
        state.registry.register(key, tags);
    }

    /// Returns whether an entry was present.
    pub fn remove(&self, key: &CacheKey) -> bool {
        rw_write(&self.state, SOURCE, "remove").forget(key)
    }

    /// Removes every entry carrying `tag`. Returns how many were present.
    pub fn invalidate_tag(&self, tag: &CacheTag) -> u64 {
        let mut state = rw_write(&self.state, SOURCE, "invalidate_tag");
        let keys = state.registry.take_tag(tag);
        keys.iter()
            .filter(|key| state.entries.pop(*key).is_some())
            .count() as u64
    }

    /// Drops everything. Returns the number of entries removed.
    pub fn clear(&self) -> u64 {
        let mut state = rw_write(&self.state, SOURCE, "clear");
        let removed = state.entries.len() as u64;
        state.entries.clear();
        state.registry.clear();
        removed
    }

    pub fn len(&self) -> usize {
        rw_read(&self.state, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
