use proptest::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};
use time::{Duration, OffsetDateTime};
use vitrine::application::pricing::PromotionResolver;
use vitrine::domain::{
    DiscountKind, ProductId, Promotion, PromotionId, PromotionTarget, Variation, VariationId,
};
use vitrine::util::timezone::CivilTime;

const WINDOW_START: i64 = 1_764_547_200; // 2025-12-01T00:00:00Z
const WINDOW_LENGTH_SECS: i64 = 10 * 24 * 3600;

fn resolver() -> PromotionResolver {
    PromotionResolver::new(CivilTime::new(chrono_tz::UTC), 2)
}

fn variation(cents: i64) -> Variation {
    Variation {
        id: VariationId(1),
        product_id: ProductId(1),
        price: Decimal::new(cents, 2),
        active: true,
    }
}

fn start() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(WINDOW_START).expect("valid timestamp")
}

fn end() -> OffsetDateTime {
    start() + Duration::seconds(WINDOW_LENGTH_SECS)
}

fn promotion(kind: DiscountKind, value: Decimal, active: bool) -> Promotion {
    Promotion {
        id: PromotionId(1),
        name: "generated".into(),
        target: PromotionTarget::Variation(VariationId(1)),
        kind,
        value,
        starts_at: start(),
        ends_at: end(),
        active,
    }
}

fn inside_window() -> OffsetDateTime {
    start() + Duration::days(2)
}

proptest! {
    #[test]
    fn inactive_promotions_never_apply(
        cents in 0i64..10_000_000,
        percent_bp in 1i64..=10_000,
        offset in -WINDOW_LENGTH_SECS..2 * WINDOW_LENGTH_SECS,
    ) {
        let promo = promotion(DiscountKind::Percentage, Decimal::new(percent_bp, 2), false);
        let now = start() + Duration::seconds(offset);
        let price = resolver().resolve(&variation(cents), &[promo], now);

        prop_assert!(!price.has_promotion);
        prop_assert_eq!(price.final_price, price.original_price);
    }

    #[test]
    fn percentage_discount_rounds_and_never_exceeds_base(
        cents in 0i64..10_000_000,
        percent_bp in 1i64..=10_000,
    ) {
        let value = Decimal::new(percent_bp, 2);
        let base = Decimal::new(cents, 2);
        let promo = promotion(DiscountKind::Percentage, value, true);
        let price = resolver().resolve(&variation(cents), &[promo], inside_window());

        let expected = (base * (Decimal::ONE - value / Decimal::ONE_HUNDRED))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        prop_assert!(price.has_promotion);
        prop_assert_eq!(price.final_price, expected);
        prop_assert!(price.final_price <= price.original_price);
        prop_assert!(price.final_price >= Decimal::ZERO);
    }

    #[test]
    fn fixed_discount_is_floored_at_zero(
        cents in 0i64..10_000_000,
        discount_cents in 1i64..20_000_000,
    ) {
        let base = Decimal::new(cents, 2);
        let value = Decimal::new(discount_cents, 2);
        let promo = promotion(DiscountKind::Fixed, value, true);
        let price = resolver().resolve(&variation(cents), &[promo], inside_window());

        prop_assert_eq!(price.final_price, (base - value).max(Decimal::ZERO));
        prop_assert!(price.final_price >= Decimal::ZERO);
    }

    #[test]
    fn window_membership_is_inclusive(offset in -WINDOW_LENGTH_SECS..2 * WINDOW_LENGTH_SECS) {
        let promo = promotion(DiscountKind::Percentage, Decimal::TEN, true);
        let now = start() + Duration::seconds(offset);
        let price = resolver().resolve(&variation(10_000), &[promo], now);

        let inside = (0..=WINDOW_LENGTH_SECS).contains(&offset);
        prop_assert_eq!(price.has_promotion, inside);
    }
}

#[test]
fn window_edges_are_live() {
    for now in [start(), end()] {
        let promo = promotion(DiscountKind::Percentage, Decimal::TEN, true);
        let price = resolver().resolve(&variation(10_000), &[promo], now);
        assert!(price.has_promotion);
    }

    for now in [start() - Duration::seconds(1), end() + Duration::seconds(1)] {
        let promo = promotion(DiscountKind::Percentage, Decimal::TEN, true);
        let price = resolver().resolve(&variation(10_000), &[promo], now);
        assert!(!price.has_promotion);
    }
}
