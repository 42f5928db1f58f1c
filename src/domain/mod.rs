//! Domain layer types and invariants.

pub mod entities;
pub mod error;
pub mod types;

pub use entities::{AppliedPromotion, Promotion, ResolvedPrice, Variation};
pub use error::DomainError;
pub use types::{DiscountKind, ProductId, PromotionId, PromotionTarget, VariationId};
