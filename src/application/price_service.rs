//! Price lookup entry point.
//!
//! Wires the tiered cache, the promotions repository, the clock and the
//! resolver. Lookups never fail on an unavailable collaborator: a repository
//! error yields the undiscounted base price, which is not cached.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{instrument, warn};

use crate::application::pricing::PromotionResolver;
use crate::application::repos::{PromotionsRepo, RepoError};
use crate::cache::{CacheKey, CacheTag, TieredCache};
use crate::domain::{ResolvedPrice, Variation, VariationId};
use crate::util::clock::Clock;

const METRIC_LOOKUP_MS: &str = "vitrine_price_lookup_ms";
const METRIC_FALLBACK: &str = "vitrine_price_fallback_total";

#[derive(Debug, Error)]
pub enum PricingError {
    #[error(transparent)]
    Repository(#[from] RepoError),
    #[error("variation {0} not found")]
    VariationNotFound(VariationId),
}

pub struct PriceService {
    cache: Arc<TieredCache>,
    repo: Arc<dyn PromotionsRepo>,
    clock: Arc<dyn Clock>,
    resolver: PromotionResolver,
}

impl PriceService {
    pub fn new(
        cache: Arc<TieredCache>,
        repo: Arc<dyn PromotionsRepo>,
        clock: Arc<dyn Clock>,
        resolver: PromotionResolver,
    ) -> Self {
        Self {
            cache,
            repo,
            clock,
            resolver,
        }
    }

    pub fn resolver(&self) -> &PromotionResolver {
        &self.resolver
    }

    /// Current price of `variation`.
    #[instrument(skip(self, variation), fields(variation_id = %variation.id))]
    pub async fn lookup(&self, variation: &Variation) -> ResolvedPrice {
        let started_at = Instant::now();
        let key = CacheKey::ResolvedPrice(variation.id);
        let tags = CacheTag::for_variation(variation);

        let resolved = self
            .cache
            .get_or_compute(&key, &tags, || self.compute(variation))
            .await;

        histogram!(METRIC_LOOKUP_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        match resolved {
            Ok(price) => price,
            Err(err) => {
                counter!(METRIC_FALLBACK).increment(1);
                warn!(
                    variation_id = %variation.id,
                    error = %err,
                    transient = err.is_transient(),
                    "Promotions unavailable, serving base price"
                );
                ResolvedPrice::undiscounted(variation)
            }
        }
    }

    /// Loads the variation first. Fails only when the variation itself
    /// cannot be read.
    pub async fn lookup_by_id(&self, id: VariationId) -> Result<ResolvedPrice, PricingError> {
        let variation = self
            .repo
            .find_variation(id)
            .await?
            .ok_or(PricingError::VariationNotFound(id))?;
        Ok(self.lookup(&variation).await)
    }

    async fn compute(&self, variation: &Variation) -> Result<ResolvedPrice, RepoError> {
        let candidates = self.repo.find_candidate_promotions(variation.id).await?;
        Ok(self.resolver.resolve(variation, &candidates, self.clock.now()))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    use super::*;
    use crate::cache::{CacheConfig, MemoryRemoteStore};
    use crate::domain::{DiscountKind, ProductId, Promotion, PromotionId, PromotionTarget};
    use crate::infra::memory::MemoryCatalog;
    use crate::util::clock::FixedClock;

    fn variation() -> Variation {
        Variation {
            id: VariationId(1),
            product_id: ProductId(1),
            price: dec!(100.00),
            active: true,
        }
    }

    fn promotion() -> Promotion {
        Promotion {
            id: PromotionId(1),
            name: "Natal".into(),
            target: PromotionTarget::Variation(VariationId(1)),
            kind: DiscountKind::Percentage,
            value: dec!(20),
            starts_at: datetime!(2025-12-01 03:00 UTC),
            ends_at: datetime!(2025-12-11 02:59 UTC),
            active: true,
        }
    }

    fn service(catalog: Arc<MemoryCatalog>) -> PriceService {
        let cache = Arc::new(TieredCache::new(
            CacheConfig::default(),
            Some(Arc::new(MemoryRemoteStore::new())),
        ));
        PriceService::new(
            cache,
            catalog,
            Arc::new(FixedClock::new(datetime!(2025-12-05 15:00 UTC))),
            PromotionResolver::default(),
        )
    }

    #[tokio::test]
    async fn lookup_applies_live_promotion() {
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.upsert_variation(variation());
        catalog.upsert_promotion(promotion());

        let price = service(catalog).lookup(&variation()).await;
        assert!(price.has_promotion);
        assert_eq!(price.final_price, dec!(80.00));
    }

    #[tokio::test]
    async fn repository_failure_serves_base_price_uncached() {
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.upsert_variation(variation());
        catalog.upsert_promotion(promotion());
        let service = service(catalog.clone());

        catalog.set_failing(true);
        let fallback = service.lookup(&variation()).await;
        assert!(!fallback.has_promotion);
        assert_eq!(fallback.final_price, dec!(100.00));

        catalog.set_failing(false);
        let recovered = service.lookup(&variation()).await;
        assert!(recovered.has_promotion);
        assert_eq!(recovered.final_price, dec!(80.00));
    }

    #[tokio::test]
    async fn lookup_by_id_reports_missing_variation() {
        let service = service(Arc::new(MemoryCatalog::new()));
        let result = service.lookup_by_id(VariationId(404)).await;
        assert!(matches!(result, Err(PricingError::VariationNotFound(VariationId(404)))));
    }
}
