//! Cache key definitions.
//!
//! Defines `CacheKey` for cache entries and `CacheTag` for the labels used to
//! invalidate groups of entries without knowing their keys.

use std::collections::BTreeSet;
use std::fmt;

use crate::domain::{ProductId, Variation, VariationId};

/// Identifies a single cached payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CacheKey {
    /// The resolved price of one variation.
    ResolvedPrice(VariationId),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::ResolvedPrice(id) => write!(f, "price:{id}"),
        }
    }
}

/// Label attached to cache entries; invalidating a tag removes every entry
/// carrying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CacheTag {
    Variation(VariationId),
    Product(ProductId),
    /// Catalog-wide tag carried by every price entry.
    Products,
}

impl fmt::Display for CacheTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheTag::Variation(id) => write!(f, "variation:{id}"),
            CacheTag::Product(id) => write!(f, "product:{id}"),
            CacheTag::Products => f.write_str("products"),
        }
    }
}

impl CacheTag {
    /// Tags carried by a variation's resolved price.
    pub fn for_variation(variation: &Variation) -> BTreeSet<CacheTag> {
        BTreeSet::from([
            CacheTag::Variation(variation.id),
            CacheTag::Product(variation.product_id),
            CacheTag::Products,
        ])
    }
}

/// Prefixes keys and tag sets so one remote store can host several
/// deployments side by side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn entry_key(&self, key: &CacheKey) -> String {
        format!("{}:{key}", self.0)
    }

    pub fn tag_set_key(&self, tag: &CacheTag) -> String {
        format!("{}:tag:{tag}", self.0)
    }

    /// Counter bumped whenever entries under `key` are invalidated.
    pub fn key_generation(&self, key: &CacheKey) -> String {
        format!("{}:gen:{key}", self.0)
    }

    /// Counter bumped whenever entries carrying `tag` are invalidated.
    pub fn tag_generation(&self, tag: &CacheTag) -> String {
        format!("{}:gen:tag:{tag}", self.0)
    }

    /// Counter bumped by every namespace wipe.
    pub fn namespace_generation(&self) -> String {
        format!("{}:gen:all", self.0)
    }

    /// Matches every generation counter; wipes leave these in place so they
    /// only ever move forward.
    pub fn generation_prefix(&self) -> String {
        format!("{}:gen:", self.0)
    }

    /// Matches every key this namespace owns, entries and tag sets alike.
    pub fn prefix(&self) -> String {
        format!("{}:", self.0)
    }
}
