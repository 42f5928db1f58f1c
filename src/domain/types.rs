//! Identifiers and enumerations shared by the pricing domain.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariationId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub i64);

/// Promotion identifiers are allocated monotonically by the store, so their
/// ordering doubles as creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromotionId(pub i64);

impl fmt::Display for VariationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PromotionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    Percentage,
    Fixed,
}

impl DiscountKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DiscountKind::Percentage => "percentage",
            DiscountKind::Fixed => "fixed",
        }
    }

    /// Parses the persisted discriminator. `fixed_amount` is accepted for
    /// rows written by older admin screens.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "percentage" | "percent" => Some(DiscountKind::Percentage),
            "fixed" | "fixed_amount" => Some(DiscountKind::Fixed),
            _ => None,
        }
    }
}

/// What a promotion applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum PromotionTarget {
    Variation(VariationId),
    Product(ProductId),
    Catalog,
}

impl PromotionTarget {
    /// Higher wins when several promotions apply at once.
    pub fn specificity(self) -> u8 {
        match self {
            PromotionTarget::Variation(_) => 2,
            PromotionTarget::Product(_) => 1,
            PromotionTarget::Catalog => 0,
        }
    }

    pub fn covers(self, variation: VariationId, product: ProductId) -> bool {
        match self {
            PromotionTarget::Variation(id) => id == variation,
            PromotionTarget::Product(id) => id == product,
            PromotionTarget::Catalog => true,
        }
    }
}
