//! Catalog and promotion records as seen by the pricing engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::{
    error::DomainError,
    types::{DiscountKind, ProductId, PromotionId, PromotionTarget, VariationId},
};

const MAX_PERCENTAGE: Decimal = Decimal::ONE_HUNDRED;

/// A purchasable SKU. Prices are major-unit decimals (e.g. `129.90`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variation {
    pub id: VariationId,
    pub product_id: ProductId,
    pub price: Decimal,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: PromotionId,
    pub name: String,
    pub target: PromotionTarget,
    pub kind: DiscountKind,
    pub value: Decimal,
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub ends_at: OffsetDateTime,
    /// Manual kill-switch, independent of the activity window.
    pub active: bool,
}

impl Promotion {
    /// Checks the invariants every stored promotion must satisfy.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.ends_at <= self.starts_at {
            return Err(DomainError::validation(format!(
                "promotion {} ends at or before it starts",
                self.id
            )));
        }
        if self.value <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "promotion {} has a non-positive discount value {}",
                self.id, self.value
            )));
        }
        if self.kind == DiscountKind::Percentage && self.value > MAX_PERCENTAGE {
            return Err(DomainError::validation(format!(
                "promotion {} has a percentage above 100: {}",
                self.id, self.value
            )));
        }
        Ok(())
    }
}

/// Summary of the promotion that produced a [`ResolvedPrice`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedPromotion {
    pub id: PromotionId,
    pub name: String,
    pub discount_type: DiscountKind,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub discount_value: Decimal,
}

impl From<&Promotion> for AppliedPromotion {
    fn from(promotion: &Promotion) -> Self {
        Self {
            id: promotion.id,
            name: promotion.name.clone(),
            discount_type: promotion.kind,
            discount_value: promotion.value,
        }
    }
}

/// Price of a variation at a given instant. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPrice {
    pub variation_id: VariationId,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub original_price: Decimal,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub final_price: Decimal,
    pub has_promotion: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<AppliedPromotion>,
}

impl ResolvedPrice {
    pub fn undiscounted(variation: &Variation) -> Self {
        Self {
            variation_id: variation.id,
            original_price: variation.price,
            final_price: variation.price,
            has_promotion: false,
            promotion: None,
        }
    }

    pub fn discounted(variation: &Variation, promotion: &Promotion, final_price: Decimal) -> Self {
        Self {
            variation_id: variation.id,
            original_price: variation.price,
            final_price,
            has_promotion: true,
            promotion: Some(AppliedPromotion::from(promotion)),
        }
    }
}
