use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use vitrine::application::price_service::PriceService;
use vitrine::application::pricing::PromotionResolver;
use vitrine::cache::{CacheConfig, MemoryRemoteStore, TieredCache};
use vitrine::domain::{
    DiscountKind, ProductId, Promotion, PromotionId, PromotionTarget, Variation, VariationId,
};
use vitrine::infra::memory::MemoryCatalog;
use vitrine::util::clock::FixedClock;
use vitrine::util::timezone::CivilTime;

struct Storefront {
    catalog: Arc<MemoryCatalog>,
    clock: Arc<FixedClock>,
    service: PriceService,
    civil: CivilTime,
}

impl Storefront {
    fn at(local_now: &str) -> Self {
        let civil = CivilTime::default();
        let now = civil.parse_local(local_now).expect("valid local time");
        let catalog = Arc::new(MemoryCatalog::new());
        let clock = Arc::new(FixedClock::new(now));
        let cache = Arc::new(TieredCache::new(
            CacheConfig::default(),
            Some(Arc::new(MemoryRemoteStore::new())),
        ));
        let service = PriceService::new(
            cache,
            catalog.clone(),
            clock.clone(),
            PromotionResolver::new(civil, 2),
        );

        catalog.upsert_variation(shirt());
        Self {
            catalog,
            clock,
            service,
            civil,
        }
    }

    fn promotion(
        &self,
        id: i64,
        target: PromotionTarget,
        kind: DiscountKind,
        value: Decimal,
        window: (&str, &str),
    ) {
        self.catalog.upsert_promotion(Promotion {
            id: PromotionId(id),
            name: format!("promo-{id}"),
            target,
            kind,
            value,
            starts_at: self.civil.parse_local(window.0).expect("valid start"),
            ends_at: self.civil.parse_local(window.1).expect("valid end"),
            active: true,
        });
    }
}

fn shirt() -> Variation {
    Variation {
        id: VariationId(10),
        product_id: ProductId(1),
        price: dec!(100.00),
        active: true,
    }
}

const DECEMBER_WINDOW: (&str, &str) = ("2025-12-01T00:00", "2025-12-10T23:59");

#[tokio::test]
async fn percentage_promotion_inside_local_window() {
    let shop = Storefront::at("2025-12-05T12:00");
    shop.promotion(
        1,
        PromotionTarget::Variation(VariationId(10)),
        DiscountKind::Percentage,
        dec!(20),
        DECEMBER_WINDOW,
    );

    let price = shop.service.lookup(&shirt()).await;
    assert!(price.has_promotion);
    assert_eq!(price.original_price, dec!(100.00));
    assert_eq!(price.final_price, dec!(80.00));
}

#[tokio::test]
async fn promotion_ends_at_local_midnight() {
    let shop = Storefront::at("2025-12-11T00:00");
    shop.promotion(
        1,
        PromotionTarget::Variation(VariationId(10)),
        DiscountKind::Percentage,
        dec!(20),
        DECEMBER_WINDOW,
    );

    let price = shop.service.lookup(&shirt()).await;
    assert!(!price.has_promotion);
    assert_eq!(price.final_price, dec!(100.00));
    assert!(price.promotion.is_none());
}

#[tokio::test]
async fn window_bounds_are_inclusive() {
    for now in ["2025-12-01T00:00", "2025-12-10T23:59"] {
        let shop = Storefront::at(now);
        shop.promotion(
            1,
            PromotionTarget::Variation(VariationId(10)),
            DiscountKind::Percentage,
            dec!(20),
            DECEMBER_WINDOW,
        );
        let price = shop.service.lookup(&shirt()).await;
        assert!(price.has_promotion, "expected promotion live at {now}");
    }
}

#[tokio::test]
async fn variation_specific_beats_larger_catalog_discount() {
    let shop = Storefront::at("2025-12-05T12:00");
    shop.promotion(
        1,
        PromotionTarget::Variation(VariationId(10)),
        DiscountKind::Percentage,
        dec!(10),
        DECEMBER_WINDOW,
    );
    shop.promotion(
        2,
        PromotionTarget::Catalog,
        DiscountKind::Percentage,
        dec!(50),
        DECEMBER_WINDOW,
    );

    let price = shop.service.lookup(&shirt()).await;
    assert_eq!(price.final_price, dec!(90.00));
    assert_eq!(
        price.promotion.map(|promotion| promotion.id),
        Some(PromotionId(1))
    );
}

#[tokio::test]
async fn product_scope_beats_catalog_scope() {
    let shop = Storefront::at("2025-12-05T12:00");
    shop.promotion(
        1,
        PromotionTarget::Catalog,
        DiscountKind::Percentage,
        dec!(40),
        DECEMBER_WINDOW,
    );
    shop.promotion(
        2,
        PromotionTarget::Product(ProductId(1)),
        DiscountKind::Fixed,
        dec!(5.00),
        DECEMBER_WINDOW,
    );

    let price = shop.service.lookup(&shirt()).await;
    assert_eq!(price.final_price, dec!(95.00));
}

#[tokio::test]
async fn oversized_fixed_discount_floors_at_zero() {
    let shop = Storefront::at("2025-12-05T12:00");
    shop.promotion(
        1,
        PromotionTarget::Variation(VariationId(10)),
        DiscountKind::Fixed,
        dec!(150.00),
        DECEMBER_WINDOW,
    );

    let price = shop.service.lookup(&shirt()).await;
    assert!(price.has_promotion);
    assert_eq!(price.final_price, Decimal::ZERO);
    assert_eq!(price.final_price.to_string(), "0.00");
}

#[tokio::test]
async fn deactivated_promotion_is_ignored() {
    let shop = Storefront::at("2025-12-05T12:00");
    shop.catalog.upsert_promotion(Promotion {
        id: PromotionId(1),
        name: "paused".into(),
        target: PromotionTarget::Variation(VariationId(10)),
        kind: DiscountKind::Percentage,
        value: dec!(20),
        starts_at: shop.civil.parse_local(DECEMBER_WINDOW.0).expect("start"),
        ends_at: shop.civil.parse_local(DECEMBER_WINDOW.1).expect("end"),
        active: false,
    });

    let price = shop.service.lookup(&shirt()).await;
    assert!(!price.has_promotion);
}

#[tokio::test]
async fn cached_price_outlives_promotion_window_until_expiry() {
    let shop = Storefront::at("2025-12-05T12:00");
    shop.promotion(
        1,
        PromotionTarget::Variation(VariationId(10)),
        DiscountKind::Percentage,
        dec!(20),
        DECEMBER_WINDOW,
    );
    assert_eq!(shop.service.lookup(&shirt()).await.final_price, dec!(80.00));

    // Staleness is bounded by the TTL, not by the promotion window.
    shop.clock
        .set(shop.civil.parse_local("2025-12-11T00:00").expect("valid"));
    assert_eq!(shop.service.lookup(&shirt()).await.final_price, dec!(80.00));
}

#[tokio::test]
async fn resolved_price_serializes_with_camel_case_numbers() {
    let shop = Storefront::at("2025-12-05T12:00");
    shop.promotion(
        1,
        PromotionTarget::Variation(VariationId(10)),
        DiscountKind::Percentage,
        dec!(20),
        DECEMBER_WINDOW,
    );

    let price = shop.service.lookup(&shirt()).await;
    let json = serde_json::to_value(&price).expect("serializable");

    assert_eq!(json["hasPromotion"], serde_json::json!(true));
    assert_eq!(json["promotion"]["discountType"], serde_json::json!("percentage"));
    assert_eq!(json["finalPrice"].to_string(), "80.00");
    assert_eq!(json["originalPrice"].to_string(), "100.00");
}
