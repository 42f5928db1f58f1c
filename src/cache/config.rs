//! Cache configuration.
//!
//! Controls the in-process tier and the shared remote tier via the `[cache]`
//! section of `vitrine.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_LOCAL_CAPACITY: usize = 10_000;
const DEFAULT_LOCAL_TTL_SECS: u64 = 60;
const DEFAULT_REMOTE_TTL_SECS: u64 = 300;
const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 250;
pub const DEFAULT_NAMESPACE: &str = "vitrine";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the in-process tier.
    pub enable_local_tier: bool,
    /// Enable the shared remote tier.
    pub enable_remote_tier: bool,
    /// Maximum entries held by the in-process tier.
    pub local_capacity: usize,
    pub local_ttl_secs: u64,
    pub remote_ttl_secs: u64,
    /// Upper bound on any single remote call.
    pub remote_timeout_ms: u64,
    pub namespace: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_local_tier: true,
            enable_remote_tier: true,
            local_capacity: DEFAULT_LOCAL_CAPACITY,
            local_ttl_secs: DEFAULT_LOCAL_TTL_SECS,
            remote_ttl_secs: DEFAULT_REMOTE_TTL_SECS,
            remote_timeout_ms: DEFAULT_REMOTE_TIMEOUT_MS,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enable_local_tier: settings.enable_local_tier,
            enable_remote_tier: settings.enable_remote_tier,
            local_capacity: settings.local_capacity,
            local_ttl_secs: settings.local_ttl_secs,
            remote_ttl_secs: settings.remote_ttl_secs,
            remote_timeout_ms: settings.remote_timeout_ms,
            namespace: settings.namespace.clone(),
        }
    }
}

impl CacheConfig {
    /// Local capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn local_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.local_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn local_ttl(&self) -> Duration {
        Duration::from_secs(self.local_ttl_secs.max(1))
    }

    pub fn remote_ttl(&self) -> Duration {
        Duration::from_secs(self.remote_ttl_secs.max(1))
    }

    /// Generation counters must outlive every local entry stamped with them,
    /// or a reset counter could revalidate a stale entry.
    pub fn generation_ttl(&self) -> Duration {
        self.local_ttl().max(self.remote_ttl())
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms.max(1))
    }
}
