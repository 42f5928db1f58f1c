//! Shared remote cache tier.
//!
//! `RemoteStore` is the narrow key/value surface the tiered cache needs:
//! get, set-with-TTL plus tag-set membership, delete, tag-set read, prefix
//! scan and the generation counters that keep every process's local tier
//! honest. `MemoryRemoteStore` keeps everything in process and is used
//! when no Redis URL is configured and by the tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::remote";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteStoreError {
    #[error("remote cache connection failed: {0}")]
    Connection(String),
    #[error("remote cache command failed: {0}")]
    Command(String),
    #[error("remote cache call timed out after {0:?}")]
    Timeout(Duration),
}

impl RemoteStoreError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn command(message: impl Into<String>) -> Self {
        Self::Command(message.into())
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RemoteStoreError>;

    /// Stores `value` under `key` and adds `key` to each tag set, as one
    /// atomic write. Tag sets share the entry TTL.
    async fn set_tagged(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        tag_sets: &[String],
    ) -> Result<(), RemoteStoreError>;

    /// Deletes the given keys. Absent keys are ignored. Returns how many
    /// existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, RemoteStoreError>;

    async fn tag_members(&self, tag_set: &str) -> Result<Vec<String>, RemoteStoreError>;

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, RemoteStoreError>;

    /// Current value of each counter, in order. Absent counters read as 0.
    async fn generations(&self, counters: &[String]) -> Result<Vec<u64>, RemoteStoreError>;

    /// Increments each counter and keeps it alive for at least `ttl`.
    async fn bump_generations(
        &self,
        counters: &[String],
        ttl: Duration,
    ) -> Result<(), RemoteStoreError>;
}

enum StoredValue {
    Text(String),
    Set(BTreeSet<String>),
    Counter(u64),
}

struct StoredEntry {
    value: StoredValue,
    expires_at: Instant,
}

/// In-process `RemoteStore`.
///
/// Can be told to fail or to stall so degradation paths are testable.
#[derive(Default)]
pub struct MemoryRemoteStore {
    entries: Mutex<HashMap<String, StoredEntry>>,
    failing: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails with a connection error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Adds an artificial delay before every call.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Live keys, entries and tag sets alike.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        mutex_lock(&self.entries, SOURCE, "len")
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn enter(&self) -> Result<(), RemoteStoreError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteStoreError::connection("memory store marked unavailable"));
        }
        Ok(())
    }
}

fn purge_expired(entries: &mut HashMap<String, StoredEntry>, now: Instant) {
    entries.retain(|_, entry| entry.expires_at > now);
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RemoteStoreError> {
        self.enter().await?;
        let now = Instant::now();
        let entries = mutex_lock(&self.entries, SOURCE, "get");
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => match &entry.value {
                StoredValue::Text(text) => Ok(Some(text.clone())),
                StoredValue::Counter(value) => Ok(Some(value.to_string())),
                StoredValue::Set(_) => Err(RemoteStoreError::command(format!(
                    "WRONGTYPE key `{key}` holds a set"
                ))),
            },
            _ => Ok(None),
        }
    }

    async fn set_tagged(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        tag_sets: &[String],
    ) -> Result<(), RemoteStoreError> {
        self.enter().await?;
        let now = Instant::now();
        let expires_at = now + ttl;
        let mut entries = mutex_lock(&self.entries, SOURCE, "set_tagged");
        purge_expired(&mut entries, now);

        entries.insert(
            key.to_string(),
            StoredEntry {
                value: StoredValue::Text(value.to_string()),
                expires_at,
            },
        );
        for tag_set in tag_sets {
            let entry = entries.entry(tag_set.clone()).or_insert_with(|| StoredEntry {
                value: StoredValue::Set(BTreeSet::new()),
                expires_at,
            });
            if let StoredValue::Set(members) = &mut entry.value {
                members.insert(key.to_string());
                entry.expires_at = expires_at;
            }
        }
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, RemoteStoreError> {
        self.enter().await?;
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "delete");
        purge_expired(&mut entries, now);
        Ok(keys.iter().filter(|key| entries.remove(*key).is_some()).count() as u64)
    }

    async fn tag_members(&self, tag_set: &str) -> Result<Vec<String>, RemoteStoreError> {
        self.enter().await?;
        let now = Instant::now();
        let entries = mutex_lock(&self.entries, SOURCE, "tag_members");
        match entries.get(tag_set) {
            Some(StoredEntry {
                value: StoredValue::Set(members),
                expires_at,
            }) if *expires_at > now => Ok(members.iter().cloned().collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, RemoteStoreError> {
        self.enter().await?;
        let now = Instant::now();
        let entries = mutex_lock(&self.entries, SOURCE, "scan_prefix");
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| entry.expires_at > now && key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn generations(&self, counters: &[String]) -> Result<Vec<u64>, RemoteStoreError> {
        self.enter().await?;
        let now = Instant::now();
        let entries = mutex_lock(&self.entries, SOURCE, "generations");
        Ok(counters
            .iter()
            .map(|counter| match entries.get(counter) {
                Some(StoredEntry {
                    value: StoredValue::Counter(value),
                    expires_at,
                }) if *expires_at > now => *value,
                _ => 0,
            })
            .collect())
    }

    async fn bump_generations(
        &self,
        counters: &[String],
        ttl: Duration,
    ) -> Result<(), RemoteStoreError> {
        self.enter().await?;
        let now = Instant::now();
        let expires_at = now + ttl;
        let mut entries = mutex_lock(&self.entries, SOURCE, "bump_generations");
        purge_expired(&mut entries, now);

        for counter in counters {
            let entry = entries.entry(counter.clone()).or_insert_with(|| StoredEntry {
                value: StoredValue::Counter(0),
                expires_at,
            });
            match &mut entry.value {
                StoredValue::Counter(value) => *value += 1,
                _ => {
                    return Err(RemoteStoreError::command(format!(
                        "WRONGTYPE key `{counter}` is not a counter"
                    )));
                }
            }
            entry.expires_at = entry.expires_at.max(expires_at);
        }
        Ok(())
    }
}
