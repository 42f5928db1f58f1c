//! Catalog mutation events.
//!
//! Every mutation hook wraps its input in a `MutationEvent` so invalidations
//! can be correlated in logs.

use std::sync::atomic::{AtomicU64, Ordering};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{ProductId, PromotionId, PromotionTarget, VariationId};

/// Monotonic sequence number within this process.
pub type Epoch = u64;

#[derive(Debug, Clone)]
pub struct MutationEvent {
    pub id: Uuid,
    pub epoch: Epoch,
    pub kind: MutationKind,
    pub timestamp: OffsetDateTime,
}

impl MutationEvent {
    pub fn new(kind: MutationKind, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    /// A promotion was created or edited in place.
    PromotionMutated {
        promotion_id: PromotionId,
        target: PromotionTarget,
    },
    PromotionDeleted {
        promotion_id: PromotionId,
        target: PromotionTarget,
    },
    /// A promotion moved from one target to another.
    PromotionRetargeted {
        promotion_id: PromotionId,
        previous: PromotionTarget,
        current: PromotionTarget,
    },
    /// A product-level field affecting price changed.
    ProductMutated { product_id: ProductId },
    /// A single variation's base price or status changed.
    VariationMutated {
        variation_id: VariationId,
        product_id: ProductId,
    },
    /// Operator-requested wipe of the whole namespace.
    ClearAll,
}

impl MutationKind {
    pub fn label(&self) -> &'static str {
        match self {
            MutationKind::PromotionMutated { .. } => "promotion_mutated",
            MutationKind::PromotionDeleted { .. } => "promotion_deleted",
            MutationKind::PromotionRetargeted { .. } => "promotion_retargeted",
            MutationKind::ProductMutated { .. } => "product_mutated",
            MutationKind::VariationMutated { .. } => "variation_mutated",
            MutationKind::ClearAll => "clear_all",
        }
    }
}

#[derive(Debug, Default)]
pub struct EpochCounter(AtomicU64);

impl EpochCounter {
    pub fn next(&self) -> Epoch {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}
