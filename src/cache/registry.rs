//! Bidirectional tag registry.
//!
//! Tracks which cache keys carry which tags so a tag can be invalidated
//! without scanning the whole store, and so evicted keys can be forgotten.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::keys::{CacheKey, CacheTag};

/// Tracks tag → keys and key → tags mappings.
///
/// Not synchronised on its own: the owning store keeps it behind the same
/// lock as the entries so both sides always change together.
#[derive(Debug, Default)]
pub struct CacheRegistry {
    tag_to_keys: HashMap<CacheTag, HashSet<CacheKey>>,
    key_to_tags: HashMap<CacheKey, BTreeSet<CacheTag>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key with its tags, replacing any previous tag set.
    pub fn register(&mut self, key: CacheKey, tags: &BTreeSet<CacheTag>) {
        self.unregister(&key);
        for tag in tags {
            self.tag_to_keys.entry(*tag).or_default().insert(key);
        }
        self.key_to_tags.insert(key, tags.clone());
    }

    /// Forget a key. Called when an entry is evicted, expires or is
    /// invalidated.
    pub fn unregister(&mut self, key: &CacheKey) {
        let Some(tags) = self.key_to_tags.remove(key) else {
            return;
        };
        for tag in tags {
            if let Some(keys) = self.tag_to_keys.get_mut(&tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tag_to_keys.remove(&tag);
                }
            }
        }
    }

    /// Remove a tag and every key carrying it. Returns the affected keys.
    pub fn take_tag(&mut self, tag: &CacheTag) -> HashSet<CacheKey> {
        let keys = self.tag_to_keys.remove(tag).unwrap_or_default();
        for key in &keys {
            self.unregister(key);
        }
        keys
    }

    pub fn clear(&mut self) {
        self.tag_to_keys.clear();
        self.key_to_tags.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ProductId, VariationId};

    fn price_key(id: i64) -> CacheKey {
        CacheKey::ResolvedPrice(VariationId(id))
    }

    fn tags(id: i64, product: i64) -> BTreeSet<CacheTag> {
        BTreeSet::from([
            CacheTag::Variation(VariationId(id)),
            CacheTag::Product(ProductId(product)),
            CacheTag::Products,
        ])
    }

    #[test]
    fn register_indexes_both_sides() {
        let mut registry = CacheRegistry::new();
        registry.register(price_key(1), &tags(1, 10));

        assert!(
            registry.tag_to_keys[&CacheTag::Variation(VariationId(1))].contains(&price_key(1))
        );
        assert!(registry.key_to_tags[&price_key(1)].contains(&CacheTag::Products));
        assert_eq!(registry.tag_to_keys.len(), 3);
    }

    #[test]
    fn unregister_cleans_up_both_sides() {
        let mut registry = CacheRegistry::new();
        registry.register(price_key(1), &tags(1, 10));

        registry.unregister(&price_key(1));
        assert!(registry.key_to_tags.is_empty());
        assert!(registry.tag_to_keys.is_empty());

        // Absent keys are a no-op.
        registry.unregister(&price_key(1));
    }

    #[test]
    fn take_tag_returns_every_carrier() {
        let mut registry = CacheRegistry::new();
        registry.register(price_key(1), &tags(1, 10));
        registry.register(price_key(2), &tags(2, 10));
        registry.register(price_key(3), &tags(3, 20));

        let affected = registry.take_tag(&CacheTag::Product(ProductId(10)));
        assert_eq!(affected, HashSet::from([price_key(1), price_key(2)]));

        // Taken keys lose their other tags too.
        assert_eq!(
            registry.tag_to_keys[&CacheTag::Products],
            HashSet::from([price_key(3)])
        );
        assert!(registry.take_tag(&CacheTag::Product(ProductId(10))).is_empty());
    }

    #[test]
    fn reregister_replaces_tags() {
        let mut registry = CacheRegistry::new();
        registry.register(price_key(1), &tags(1, 10));
        registry.register(price_key(1), &tags(1, 11));

        assert!(!registry.tag_to_keys.contains_key(&CacheTag::Product(ProductId(10))));
        assert_eq!(registry.key_to_tags.len(), 1);
    }
}
