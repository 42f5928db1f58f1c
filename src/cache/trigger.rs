//! Invalidation coordinator.
//!
//! Mutation flows call these hooks synchronously, before acknowledging the
//! write. Each hook plans the affected tags, invalidates the local tier and
//! then the remote tier, and reports per-tier outcomes. A failed tier never
//! blocks the mutation; it is logged and surfaced so an operator can run the
//! manual namespace wipe.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::domain::{ProductId, Promotion, PromotionId, PromotionTarget, VariationId};

use super::events::{EpochCounter, MutationEvent, MutationKind};
use super::keys::CacheTag;
use super::layer::{TierOutcome, TieredCache};
use super::planner::InvalidationPlan;

const METRIC_INVALIDATION_MS: &str = "vitrine_cache_invalidation_ms";
const METRIC_INVALIDATION_FAILED: &str = "vitrine_cache_invalidation_failed_total";

/// What an invalidation hook did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationReport {
    pub event_id: Uuid,
    pub tags: BTreeSet<CacheTag>,
    pub cleared_namespace: bool,
    pub local: TierOutcome,
    pub remote: TierOutcome,
}

impl InvalidationReport {
    /// True when a tier failed and stale prices may survive until TTL.
    pub fn requires_manual_clear(&self) -> bool {
        self.local.is_failed() || self.remote.is_failed()
    }
}

pub struct InvalidationCoordinator {
    cache: Arc<TieredCache>,
    epochs: EpochCounter,
}

impl InvalidationCoordinator {
    pub fn new(cache: Arc<TieredCache>) -> Self {
        Self {
            cache,
            epochs: EpochCounter::default(),
        }
    }

    /// A promotion was created or edited without changing its target.
    pub async fn on_promotion_mutated(&self, promotion: &Promotion) -> InvalidationReport {
        self.dispatch(MutationKind::PromotionMutated {
            promotion_id: promotion.id,
            target: promotion.target,
        })
        .await
    }

    pub async fn on_promotion_deleted(
        &self,
        promotion_id: PromotionId,
        target: PromotionTarget,
    ) -> InvalidationReport {
        self.dispatch(MutationKind::PromotionDeleted {
            promotion_id,
            target,
        })
        .await
    }

    pub async fn on_promotion_retargeted(
        &self,
        promotion_id: PromotionId,
        previous: PromotionTarget,
        current: PromotionTarget,
    ) -> InvalidationReport {
        self.dispatch(MutationKind::PromotionRetargeted {
            promotion_id,
            previous,
            current,
        })
        .await
    }

    pub async fn on_product_mutated(&self, product_id: ProductId) -> InvalidationReport {
        self.dispatch(MutationKind::ProductMutated { product_id })
            .await
    }

    pub async fn on_variation_mutated(
        &self,
        variation_id: VariationId,
        product_id: ProductId,
    ) -> InvalidationReport {
        self.dispatch(MutationKind::VariationMutated {
            variation_id,
            product_id,
        })
        .await
    }

    /// Unconditional wipe of the cache namespace on both tiers.
    pub async fn clear_all(&self) -> InvalidationReport {
        self.dispatch(MutationKind::ClearAll).await
    }

    #[instrument(skip(self), fields(mutation = kind.label()))]
    async fn dispatch(&self, kind: MutationKind) -> InvalidationReport {
        let started_at = Instant::now();
        let event = MutationEvent::new(kind, self.epochs.next());
        let plan = InvalidationPlan::for_mutation(&event.kind);

        let outcomes = if plan.clear_all {
            self.cache.clear_all().await
        } else {
            self.cache.invalidate_tags(&plan.tags).await
        };

        let report = InvalidationReport {
            event_id: event.id,
            tags: plan.tags.clone(),
            cleared_namespace: plan.clear_all,
            local: outcomes.local,
            remote: outcomes.remote,
        };

        info!(
            event_id = %event.id,
            event_epoch = event.epoch,
            occurred_at = %event.timestamp,
            plan = %plan,
            local = %report.local,
            remote = %report.remote,
            "Cache invalidation executed"
        );

        if report.requires_manual_clear() {
            counter!(METRIC_INVALIDATION_FAILED, "mutation" => event.kind.label()).increment(1);
            error!(
                event_id = %event.id,
                local = %report.local,
                remote = %report.remote,
                hint = "run `vitrine clear-cache` once the cache tier is reachable",
                "Cache invalidation incomplete; stale prices may be served until TTL expiry"
            );
        }

        histogram!(METRIC_INVALIDATION_MS, "mutation" => event.kind.label())
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        report
    }
}
