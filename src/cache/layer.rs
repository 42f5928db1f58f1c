//! Two-tier read-through cache.
//!
//! Reads check the local tier, then the remote tier (backfilling local on a
//! hit), then compute and store in both. Writes go remote first so a local
//! entry never exists without its shared counterpart. A remote tier that
//! errors or stalls past the configured timeout degrades the call to direct
//! computation with nothing cached.
//!
//! Local entries are private to a process, so invalidations also bump
//! generation counters in the remote tier: one per key, one per tag and one
//! for the namespace. A local entry remembers the counters it was produced
//! under and is only served while all of them are unchanged. Counters are
//! read before the remote entry, and invalidations delete before they bump,
//! so a value can never be stamped newer than it is.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::keys::{CacheKey, CacheTag, Namespace};
use super::remote::{RemoteStore, RemoteStoreError};
use super::store::{LocalStore, Stamp};

const METRIC_LOCAL_STALE: &str = "vitrine_cache_local_stale_total";
const METRIC_REMOTE_HIT: &str = "vitrine_cache_remote_hit_total";
const METRIC_REMOTE_MISS: &str = "vitrine_cache_remote_miss_total";
const METRIC_REMOTE_ERROR: &str = "vitrine_cache_remote_error_total";
const METRIC_COMPUTE: &str = "vitrine_cache_compute_total";

/// Keys removed per remote DEL.
const DELETE_BATCH: usize = 500;

/// Result of an invalidation against one tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierOutcome {
    Completed { removed: u64 },
    /// The tier is disabled.
    Skipped,
    Failed { error: String },
}

impl TierOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, TierOutcome::Failed { .. })
    }

    /// Combines outcomes of successive steps; the first failure sticks.
    pub fn merge(self, other: TierOutcome) -> TierOutcome {
        match (self, other) {
            (failed @ TierOutcome::Failed { .. }, _) => failed,
            (_, failed @ TierOutcome::Failed { .. }) => failed,
            (TierOutcome::Completed { removed: a }, TierOutcome::Completed { removed: b }) => {
                TierOutcome::Completed { removed: a + b }
            }
            (TierOutcome::Skipped, other) => other,
            (completed, TierOutcome::Skipped) => completed,
        }
    }
}

impl fmt::Display for TierOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierOutcome::Completed { removed } => write!(f, "completed ({removed} removed)"),
            TierOutcome::Skipped => f.write_str("skipped"),
            TierOutcome::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

/// Per-tier outcomes of one invalidation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierOutcomes {
    pub local: TierOutcome,
    pub remote: TierOutcome,
}

pub struct TieredCache {
    config: CacheConfig,
    namespace: Namespace,
    local: LocalStore,
    remote: Option<Arc<dyn RemoteStore>>,
}

impl TieredCache {
    /// `remote` is ignored when the remote tier is disabled in `config`.
    pub fn new(config: CacheConfig, remote: Option<Arc<dyn RemoteStore>>) -> Self {
        let remote = remote.filter(|_| config.enable_remote_tier);
        Self {
            namespace: Namespace::new(config.namespace.clone()),
            local: LocalStore::new(&config),
            remote,
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    /// Returns the cached value for `key`, or runs `compute` and caches its
    /// successful result under `tags`. Errors from `compute` are returned
    /// as-is and never cached.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        tags: &BTreeSet<CacheTag>,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut degraded = false;

        if self.config.enable_local_tier
            && let Some(hit) = self.local.get(key)
        {
            match self.is_current(&hit.stamp).await {
                Ok(true) => match serde_json::from_str(&hit.payload) {
                    Ok(value) => {
                        debug!(cache_key = %key, tier = "local", "Cache hit");
                        return Ok(value);
                    }
                    Err(err) => {
                        warn!(cache_key = %key, error = %err, "Dropping undecodable local entry");
                        self.local.remove(key);
                    }
                },
                Ok(false) => {
                    counter!(METRIC_LOCAL_STALE).increment(1);
                    debug!(cache_key = %key, "Local entry invalidated by another process");
                    self.local.remove(key);
                }
                Err(err) => {
                    warn!(
                        cache_key = %key,
                        error = %err,
                        "Remote cache unavailable, computing without cache"
                    );
                    degraded = true;
                }
            }
        }

        let storage_key = self.namespace.entry_key(key);
        let mut stamp = Stamp::new();

        if !degraded && let Some(remote) = &self.remote {
            let observed = if self.config.enable_local_tier {
                self.observe_generations(remote.as_ref(), key, tags).await
            } else {
                Ok(Stamp::new())
            };

            let read = match observed {
                Ok(observed) => {
                    stamp = observed;
                    self.remote_call("get", remote.get(&storage_key)).await
                }
                Err(err) => Err(err),
            };

            match read {
                Ok(Some(payload)) => match serde_json::from_str(&payload) {
                    Ok(value) => {
                        counter!(METRIC_REMOTE_HIT).increment(1);
                        debug!(cache_key = %key, tier = "remote", "Cache hit, backfilling local tier");
                        if self.config.enable_local_tier {
                            self.local.insert(*key, payload, stamp, tags);
                        }
                        return Ok(value);
                    }
                    Err(err) => {
                        counter!(METRIC_REMOTE_MISS).increment(1);
                        warn!(cache_key = %key, error = %err, "Ignoring undecodable remote entry");
                    }
                },
                Ok(None) => {
                    counter!(METRIC_REMOTE_MISS).increment(1);
                }
                Err(err) => {
                    warn!(
                        cache_key = %key,
                        error = %err,
                        "Remote cache unavailable, computing without cache"
                    );
                    degraded = true;
                }
            }
        }

        debug!(cache_key = %key, "Cache miss, computing");
        counter!(METRIC_COMPUTE).increment(1);
        let value = compute().await?;

        if degraded {
            return Ok(value);
        }

        let payload = match serde_json::to_string(&value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(cache_key = %key, error = %err, "Computed value is not serializable, not caching");
                return Ok(value);
            }
        };

        if let Some(remote) = &self.remote {
            let tag_sets: Vec<String> = tags
                .iter()
                .map(|tag| self.namespace.tag_set_key(tag))
                .collect();
            let stored = self
                .remote_call(
                    "set",
                    remote.set_tagged(&storage_key, &payload, self.config.remote_ttl(), &tag_sets),
                )
                .await;
            if let Err(err) = stored {
                warn!(
                    cache_key = %key,
                    error = %err,
                    "Remote cache write failed, result not cached"
                );
                return Ok(value);
            }
        }

        if self.config.enable_local_tier {
            self.local.insert(*key, payload, stamp, tags);
        }
        Ok(value)
    }

    /// Removes one entry from both tiers.
    pub async fn invalidate_by_key(&self, key: &CacheKey) -> TierOutcomes {
        let local = if self.config.enable_local_tier {
            TierOutcome::Completed {
                removed: u64::from(self.local.remove(key)),
            }
        } else {
            TierOutcome::Skipped
        };

        let remote = match &self.remote {
            Some(remote) => {
                let keys = [self.namespace.entry_key(key)];
                let deleted = into_outcome(self.remote_call("delete", remote.delete(&keys)).await);
                let counters = [self.namespace.key_generation(key)];
                deleted.merge(self.bump(remote.as_ref(), &counters).await)
            }
            None => TierOutcome::Skipped,
        };

        TierOutcomes { local, remote }
    }

    pub async fn invalidate_by_tag(&self, tag: &CacheTag) -> TierOutcomes {
        self.invalidate_tags(&BTreeSet::from([*tag])).await
    }

    /// Removes every entry carrying any of `tags`: the local tier first, then
    /// the remote tier. Every tag is attempted on both tiers even after a
    /// failure.
    pub async fn invalidate_tags(&self, tags: &BTreeSet<CacheTag>) -> TierOutcomes {
        let local = if self.config.enable_local_tier {
            TierOutcome::Completed {
                removed: tags.iter().map(|tag| self.local.invalidate_tag(tag)).sum(),
            }
        } else {
            TierOutcome::Skipped
        };

        let remote = match &self.remote {
            Some(remote) => {
                let mut outcome = TierOutcome::Completed { removed: 0 };
                for tag in tags {
                    let step = self.invalidate_remote_tag(remote.as_ref(), tag).await;
                    outcome = outcome.merge(step);
                }
                let counters: Vec<String> = tags
                    .iter()
                    .map(|tag| self.namespace.tag_generation(tag))
                    .collect();
                outcome.merge(self.bump(remote.as_ref(), &counters).await)
            }
            None => TierOutcome::Skipped,
        };

        TierOutcomes { local, remote }
    }

    /// Wipes the whole namespace on both tiers, regardless of tags.
    pub async fn clear_all(&self) -> TierOutcomes {
        let local = if self.config.enable_local_tier {
            TierOutcome::Completed {
                removed: self.local.clear(),
            }
        } else {
            TierOutcome::Skipped
        };

        let remote = match &self.remote {
            Some(remote) => {
                let cleared = self.clear_remote(remote.as_ref()).await;
                let counters = [self.namespace.namespace_generation()];
                cleared.merge(self.bump(remote.as_ref(), &counters).await)
            }
            None => TierOutcome::Skipped,
        };

        TierOutcomes { local, remote }
    }

    /// Counters guarding an entry: the namespace, the key and each tag.
    fn generation_counters(&self, key: &CacheKey, tags: &BTreeSet<CacheTag>) -> Vec<String> {
        let mut counters = Vec::with_capacity(tags.len() + 2);
        counters.push(self.namespace.namespace_generation());
        counters.push(self.namespace.key_generation(key));
        counters.extend(tags.iter().map(|tag| self.namespace.tag_generation(tag)));
        counters
    }

    async fn observe_generations(
        &self,
        remote: &dyn RemoteStore,
        key: &CacheKey,
        tags: &BTreeSet<CacheTag>,
    ) -> Result<Stamp, RemoteStoreError> {
        let counters = self.generation_counters(key, tags);
        let values = self
            .remote_call("generations", remote.generations(&counters))
            .await?;
        Ok(counters.into_iter().zip(values).collect())
    }

    /// Whether no invalidation has touched a local entry since it was
    /// stamped. Entries are always current without a remote tier.
    async fn is_current(&self, stamp: &Stamp) -> Result<bool, RemoteStoreError> {
        let Some(remote) = &self.remote else {
            return Ok(true);
        };
        if stamp.is_empty() {
            return Ok(true);
        }

        let counters: Vec<String> = stamp.iter().map(|(counter, _)| counter.clone()).collect();
        let current = self
            .remote_call("generations", remote.generations(&counters))
            .await?;
        Ok(current.len() == stamp.len()
            && stamp
                .iter()
                .zip(current)
                .all(|((_, seen), now)| *seen == now))
    }

    async fn bump(&self, remote: &dyn RemoteStore, counters: &[String]) -> TierOutcome {
        if counters.is_empty() {
            return TierOutcome::Completed { removed: 0 };
        }
        let bumped = self
            .remote_call(
                "bump_generations",
                remote.bump_generations(counters, self.config.generation_ttl()),
            )
            .await;
        into_outcome(bumped.map(|()| 0))
    }

    async fn invalidate_remote_tag(&self, remote: &dyn RemoteStore, tag: &CacheTag) -> TierOutcome {
        let tag_set = self.namespace.tag_set_key(tag);
        let members = match self.remote_call("tag_members", remote.tag_members(&tag_set)).await {
            Ok(members) => members,
            Err(err) => return TierOutcome::Failed { error: err.to_string() },
        };

        let removed = self.delete_batched(remote, &members).await;
        let index = self
            .remote_call("delete", remote.delete(std::slice::from_ref(&tag_set)))
            .await
            .map(|_| 0);

        removed.merge(into_outcome(index))
    }

    async fn clear_remote(&self, remote: &dyn RemoteStore) -> TierOutcome {
        let prefix = self.namespace.prefix();
        let generation_prefix = self.namespace.generation_prefix();
        let keys: Vec<String> = match self.remote_call("scan", remote.scan_prefix(&prefix)).await {
            Ok(keys) => keys
                .into_iter()
                .filter(|key| !key.starts_with(&generation_prefix))
                .collect(),
            Err(err) => return TierOutcome::Failed { error: err.to_string() },
        };

        self.delete_batched(remote, &keys).await
    }

    async fn delete_batched(&self, remote: &dyn RemoteStore, keys: &[String]) -> TierOutcome {
        let mut outcome = TierOutcome::Completed { removed: 0 };
        for batch in keys.chunks(DELETE_BATCH) {
            let deleted = self.remote_call("delete", remote.delete(batch)).await;
            outcome = outcome.merge(into_outcome(deleted));
        }
        outcome
    }

    async fn remote_call<T, Fut>(&self, op: &'static str, call: Fut) -> Result<T, RemoteStoreError>
    where
        Fut: Future<Output = Result<T, RemoteStoreError>>,
    {
        let timeout = self.config.remote_timeout();
        let result = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RemoteStoreError::Timeout(timeout)),
        };
        if result.is_err() {
            counter!(METRIC_REMOTE_ERROR, "op" => op).increment(1);
        }
        result
    }
}

fn into_outcome(result: Result<u64, RemoteStoreError>) -> TierOutcome {
    match result {
        Ok(removed) => TierOutcome::Completed { removed },
        Err(err) => TierOutcome::Failed {
            error: err.to_string(),
        },
    }
}
