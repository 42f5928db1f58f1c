//! Promotion resolution: picks the promotion that applies to a variation at
//! an instant and computes the discounted price.
//!
//! Everything here is pure. The caller supplies the candidates and "now".

use std::cmp::Ordering;

use rust_decimal::{Decimal, RoundingStrategy};
use time::OffsetDateTime;
use tracing::warn;

use crate::domain::{DiscountKind, Promotion, ResolvedPrice, Variation};
use crate::util::timezone::CivilTime;

pub const DEFAULT_CURRENCY_SCALE: u32 = 2;
pub const MAX_CURRENCY_SCALE: u32 = 6;

#[derive(Debug, Clone, Copy)]
pub struct PromotionResolver {
    civil: CivilTime,
    currency_scale: u32,
}

impl Default for PromotionResolver {
    fn default() -> Self {
        Self::new(CivilTime::default(), DEFAULT_CURRENCY_SCALE)
    }
}

impl PromotionResolver {
    pub fn new(civil: CivilTime, currency_scale: u32) -> Self {
        Self {
            civil,
            currency_scale: currency_scale.min(MAX_CURRENCY_SCALE),
        }
    }

    pub fn currency_scale(&self) -> u32 {
        self.currency_scale
    }

    /// Invalid promotions are skipped, never fatal.
    pub fn is_applicable(&self, promotion: &Promotion, now: OffsetDateTime) -> bool {
        if let Err(error) = promotion.validate() {
            warn!(
                promotion_id = %promotion.id,
                error = %error,
                "Skipping invalid promotion"
            );
            return false;
        }
        self.civil
            .is_live(promotion.active, now, promotion.starts_at, promotion.ends_at)
    }

    pub fn resolve(
        &self,
        variation: &Variation,
        candidates: &[Promotion],
        now: OffsetDateTime,
    ) -> ResolvedPrice {
        if !variation.active {
            return ResolvedPrice::undiscounted(variation);
        }

        let winner = candidates
            .iter()
            .filter(|promotion| {
                promotion
                    .target
                    .covers(variation.id, variation.product_id)
            })
            .filter(|promotion| self.is_applicable(promotion, now))
            .max_by(|a, b| self.precedence(variation.price, a, b));

        match winner {
            Some(promotion) => {
                let final_price =
                    discounted_price(variation.price, promotion.kind, promotion.value, self.currency_scale);
                ResolvedPrice::discounted(variation, promotion, final_price)
            }
            None => ResolvedPrice::undiscounted(variation),
        }
    }

    /// Specific targeting first, then the larger discount, then the newest.
    fn precedence(&self, base_price: Decimal, a: &Promotion, b: &Promotion) -> Ordering {
        a.target
            .specificity()
            .cmp(&b.target.specificity())
            .then_with(|| {
                discount_amount(base_price, a.kind, a.value)
                    .cmp(&discount_amount(base_price, b.kind, b.value))
            })
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// Unrounded amount a discount removes from `price`, capped at `price`.
pub fn discount_amount(price: Decimal, kind: DiscountKind, value: Decimal) -> Decimal {
    let amount = match kind {
        DiscountKind::Percentage => price * value / Decimal::ONE_HUNDRED,
        DiscountKind::Fixed => value,
    };
    amount.clamp(Decimal::ZERO, price.max(Decimal::ZERO))
}

/// Applies a discount and rounds half-up to exactly `scale` decimal places.
/// The result never exceeds `price` and never drops below zero.
pub fn discounted_price(price: Decimal, kind: DiscountKind, value: Decimal, scale: u32) -> Decimal {
    let raw = match kind {
        DiscountKind::Percentage => price * (Decimal::ONE - value / Decimal::ONE_HUNDRED),
        DiscountKind::Fixed => price - value,
    };
    let mut rounded = raw
        .max(Decimal::ZERO)
        .min(price)
        .round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(scale);
    rounded
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    use super::*;
    use crate::domain::{ProductId, PromotionId, PromotionTarget, VariationId};

    fn variation(price: Decimal) -> Variation {
        Variation {
            id: VariationId(10),
            product_id: ProductId(1),
            price,
            active: true,
        }
    }

    fn promotion(id: i64, target: PromotionTarget, kind: DiscountKind, value: Decimal) -> Promotion {
        Promotion {
            id: PromotionId(id),
            name: format!("promo-{id}"),
            target,
            kind,
            value,
            starts_at: datetime!(2025-12-01 03:00 UTC),
            ends_at: datetime!(2025-12-11 02:59 UTC),
            active: true,
        }
    }

    const NOW: OffsetDateTime = datetime!(2025-12-05 15:00 UTC);

    #[test]
    fn percentage_rounds_half_up() {
        assert_eq!(
            discounted_price(dec!(10.05), DiscountKind::Percentage, dec!(50), 2),
            dec!(5.03)
        );
        assert_eq!(
            discounted_price(dec!(99.99), DiscountKind::Percentage, dec!(15), 2),
            dec!(84.99)
        );
    }

    #[test]
    fn full_percentage_is_free() {
        assert_eq!(
            discounted_price(dec!(42.00), DiscountKind::Percentage, dec!(100), 2),
            dec!(0.00)
        );
    }

    #[test]
    fn fixed_amount_clamps_to_zero() {
        assert_eq!(
            discounted_price(dec!(100.00), DiscountKind::Fixed, dec!(150.00), 2),
            dec!(0.00)
        );
        assert_eq!(
            discounted_price(dec!(100.00), DiscountKind::Fixed, dec!(0.005), 2),
            dec!(100.00)
        );
    }

    #[test]
    fn resolves_without_candidates() {
        let resolver = PromotionResolver::default();
        let resolved = resolver.resolve(&variation(dec!(100.00)), &[], NOW);

        assert!(!resolved.has_promotion);
        assert_eq!(resolved.final_price, dec!(100.00));
        assert_eq!(resolved.original_price, dec!(100.00));
        assert!(resolved.promotion.is_none());
    }

    #[test]
    fn variation_specific_beats_larger_catalog_discount() {
        let resolver = PromotionResolver::default();
        let candidates = vec![
            promotion(1, PromotionTarget::Catalog, DiscountKind::Percentage, dec!(50)),
            promotion(
                2,
                PromotionTarget::Variation(VariationId(10)),
                DiscountKind::Percentage,
                dec!(10),
            ),
        ];

        let resolved = resolver.resolve(&variation(dec!(100.00)), &candidates, NOW);
        assert_eq!(resolved.final_price, dec!(90.00));
        assert_eq!(resolved.promotion.map(|p| p.id), Some(PromotionId(2)));
    }

    #[test]
    fn product_scope_beats_catalog_scope() {
        let resolver = PromotionResolver::default();
        let candidates = vec![
            promotion(1, PromotionTarget::Catalog, DiscountKind::Fixed, dec!(30)),
            promotion(2, PromotionTarget::Product(ProductId(1)), DiscountKind::Fixed, dec!(5)),
        ];

        let resolved = resolver.resolve(&variation(dec!(100.00)), &candidates, NOW);
        assert_eq!(resolved.final_price, dec!(95.00));
    }

    #[test]
    fn equal_specificity_prefers_larger_discount_against_base_price() {
        let resolver = PromotionResolver::default();
        // 10% of 300 = 30 beats a flat 25.
        let candidates = vec![
            promotion(5, PromotionTarget::Catalog, DiscountKind::Fixed, dec!(25)),
            promotion(3, PromotionTarget::Catalog, DiscountKind::Percentage, dec!(10)),
        ];

        let resolved = resolver.resolve(&variation(dec!(300.00)), &candidates, NOW);
        assert_eq!(resolved.final_price, dec!(270.00));
        assert_eq!(resolved.promotion.map(|p| p.id), Some(PromotionId(3)));
    }

    #[test]
    fn full_tie_prefers_newest_promotion() {
        let resolver = PromotionResolver::default();
        let candidates = vec![
            promotion(8, PromotionTarget::Catalog, DiscountKind::Fixed, dec!(10)),
            promotion(9, PromotionTarget::Catalog, DiscountKind::Percentage, dec!(10)),
            promotion(7, PromotionTarget::Catalog, DiscountKind::Fixed, dec!(10)),
        ];

        let resolved = resolver.resolve(&variation(dec!(100.00)), &candidates, NOW);
        assert_eq!(resolved.promotion.map(|p| p.id), Some(PromotionId(9)));
        assert_eq!(resolved.final_price, dec!(90.00));
    }

    #[test]
    fn fixed_discounts_capped_at_price_tie_on_amount() {
        let resolver = PromotionResolver::default();
        // Both remove the full 20.00, so the newer one wins.
        let candidates = vec![
            promotion(2, PromotionTarget::Catalog, DiscountKind::Fixed, dec!(500)),
            promotion(4, PromotionTarget::Catalog, DiscountKind::Fixed, dec!(25)),
        ];

        let resolved = resolver.resolve(&variation(dec!(20.00)), &candidates, NOW);
        assert_eq!(resolved.promotion.map(|p| p.id), Some(PromotionId(4)));
        assert_eq!(resolved.final_price, dec!(0.00));
    }

    #[test]
    fn inactive_and_out_of_window_promotions_are_ignored() {
        let resolver = PromotionResolver::default();
        let mut disabled = promotion(1, PromotionTarget::Catalog, DiscountKind::Percentage, dec!(50));
        disabled.active = false;
        let mut expired = promotion(2, PromotionTarget::Catalog, DiscountKind::Percentage, dec!(40));
        expired.ends_at = datetime!(2025-12-04 00:00 UTC);

        let resolved = resolver.resolve(&variation(dec!(100.00)), &[disabled, expired], NOW);
        assert!(!resolved.has_promotion);
        assert_eq!(resolved.final_price, dec!(100.00));
    }

    #[test]
    fn invalid_promotion_is_skipped_not_fatal() {
        let resolver = PromotionResolver::default();
        let broken = promotion(1, PromotionTarget::Catalog, DiscountKind::Percentage, dec!(250));
        let valid = promotion(2, PromotionTarget::Catalog, DiscountKind::Percentage, dec!(5));

        let resolved = resolver.resolve(&variation(dec!(100.00)), &[broken, valid], NOW);
        assert_eq!(resolved.promotion.map(|p| p.id), Some(PromotionId(2)));
        assert_eq!(resolved.final_price, dec!(95.00));
    }

    #[test]
    fn candidates_for_other_variations_are_ignored() {
        let resolver = PromotionResolver::default();
        let elsewhere = promotion(
            1,
            PromotionTarget::Variation(VariationId(99)),
            DiscountKind::Percentage,
            dec!(50),
        );

        let resolved = resolver.resolve(&variation(dec!(100.00)), &[elsewhere], NOW);
        assert!(!resolved.has_promotion);
    }

    #[test]
    fn inactive_variation_never_discounts() {
        let resolver = PromotionResolver::default();
        let mut item = variation(dec!(100.00));
        item.active = false;
        let candidates = vec![promotion(
            1,
            PromotionTarget::Catalog,
            DiscountKind::Percentage,
            dec!(50),
        )];

        let resolved = resolver.resolve(&item, &candidates, NOW);
        assert!(!resolved.has_promotion);
        assert_eq!(resolved.final_price, dec!(100.00));
    }

    #[test]
    fn currency_scale_is_capped() {
        let resolver = PromotionResolver::new(CivilTime::default(), 12);
        assert_eq!(resolver.currency_scale(), MAX_CURRENCY_SCALE);
    }
}
