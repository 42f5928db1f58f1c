//! In-process catalog used when no database is configured and by tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::application::repos::{PromotionsRepo, RepoError};
use crate::domain::{Promotion, PromotionId, PromotionTarget, Variation, VariationId};

#[derive(Default)]
pub struct MemoryCatalog {
    variations: RwLock<HashMap<VariationId, Variation>>,
    promotions: RwLock<BTreeMap<PromotionId, Promotion>>,
    failing: AtomicBool,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_variation(&self, variation: Variation) {
        self.variations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(variation.id, variation);
    }

    pub fn upsert_promotion(&self, promotion: Promotion) {
        self.promotions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(promotion.id, promotion);
    }

    pub fn remove_promotion(&self, id: PromotionId) -> Option<Promotion> {
        self.promotions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    /// While set, every read fails as if the database were unreachable.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), RepoError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("memory catalog marked unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl PromotionsRepo for MemoryCatalog {
    async fn find_variation(&self, id: VariationId) -> Result<Option<Variation>, RepoError> {
        self.check_available()?;
        Ok(self
            .variations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }

    async fn find_candidate_promotions(
        &self,
        variation_id: VariationId,
    ) -> Result<Vec<Promotion>, RepoError> {
        self.check_available()?;
        let product_id = self
            .variations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&variation_id)
            .map(|variation| variation.product_id);

        let promotions = self.promotions.read().unwrap_or_else(PoisonError::into_inner);
        Ok(promotions
            .values()
            .filter(|promotion| match product_id {
                Some(product_id) => promotion.target.covers(variation_id, product_id),
                // Unknown variation: only promotions that name it directly or
                // cover everything can apply.
                None => match promotion.target {
                    PromotionTarget::Variation(id) => id == variation_id,
                    PromotionTarget::Product(_) => false,
                    PromotionTarget::Catalog => true,
                },
            })
            .cloned()
            .collect())
    }

    async fn find_promotion(&self, id: PromotionId) -> Result<Option<Promotion>, RepoError> {
        self.check_available()?;
        Ok(self
            .promotions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }
}
