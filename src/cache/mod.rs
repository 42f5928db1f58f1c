//! Vitrine Cache System
//!
//! Two-tier caching for resolved prices:
//!
//! - **Local tier**: in-process LRU with a short TTL and a tag registry
//! - **Remote tier**: shared key/value store (Redis in production) with a
//!   longer TTL and tag sets kept alongside each write
//!
//! Mutation flows call the [`InvalidationCoordinator`] hooks, which turn a
//! mutation into affected tags and purge both tiers. Remote generation
//! counters carry each purge to the local tier of every other process.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enable_local_tier = true
//! enable_remote_tier = true
//! local_capacity = 10000
//! local_ttl_secs = 60
//! remote_ttl_secs = 300
//! remote_timeout_ms = 250
//! namespace = "vitrine"
//! ```

mod config;
mod events;
mod keys;
mod layer;
mod lock;
mod planner;
mod registry;
mod remote;
mod store;
mod trigger;

pub use config::{CacheConfig, DEFAULT_NAMESPACE};
pub use events::{Epoch, MutationEvent, MutationKind};
pub use keys::{CacheKey, CacheTag, Namespace};
pub use layer::{TierOutcome, TierOutcomes, TieredCache};
pub use planner::InvalidationPlan;
pub use registry::CacheRegistry;
pub use remote::{MemoryRemoteStore, RemoteStore, RemoteStoreError};
pub use store::{LocalHit, LocalStore, Stamp};
pub use trigger::{InvalidationCoordinator, InvalidationReport};
