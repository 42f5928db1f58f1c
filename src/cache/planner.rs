//! Invalidation plan generation.
//!
//! Maps a mutation to the set of cache tags whose entries may now be stale.

use std::collections::BTreeSet;
use std::fmt;

use crate::domain::PromotionTarget;

use super::events::MutationKind;
use super::keys::CacheTag;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InvalidationPlan {
    pub tags: BTreeSet<CacheTag>,
    /// Wipe the namespace instead of walking tags.
    pub clear_all: bool,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clear_all {
            return f.write_str("InvalidationPlan { clear_all }");
        }
        let tags: Vec<String> = self.tags.iter().map(ToString::to_string).collect();
        write!(f, "InvalidationPlan {{ tags: [{}] }}", tags.join(", "))
    }
}

impl InvalidationPlan {
    pub fn for_mutation(kind: &MutationKind) -> Self {
        let mut plan = Self::default();
        match kind {
            MutationKind::PromotionMutated { target, .. }
            | MutationKind::PromotionDeleted { target, .. } => plan.add_target(*target),
            MutationKind::PromotionRetargeted {
                previous, current, ..
            } => {
                plan.add_target(*previous);
                plan.add_target(*current);
            }
            MutationKind::ProductMutated { product_id } => {
                plan.tags.insert(CacheTag::Product(*product_id));
                plan.tags.insert(CacheTag::Products);
            }
            MutationKind::VariationMutated { variation_id, .. } => {
                plan.tags.insert(CacheTag::Variation(*variation_id));
            }
            MutationKind::ClearAll => plan.clear_all = true,
        }
        plan
    }

    /// Variation-scoped promotions touch one SKU; anything broader falls back
    /// to the catalog-wide tag.
    fn add_target(&mut self, target: PromotionTarget) {
        match target {
            PromotionTarget::Variation(id) => {
                self.tags.insert(CacheTag::Variation(id));
            }
            PromotionTarget::Product(id) => {
                self.tags.insert(CacheTag::Product(id));
                self.tags.insert(CacheTag::Products);
            }
            PromotionTarget::Catalog => {
                self.tags.insert(CacheTag::Products);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && !self.clear_all
    }
}
