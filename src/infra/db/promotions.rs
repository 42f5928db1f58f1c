use async_trait::async_trait;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::warn;

use crate::{
    application::repos::{PromotionsRepo, RepoError},
    domain::{
        DiscountKind, ProductId, Promotion, PromotionId, PromotionTarget, Variation, VariationId,
    },
};

use super::{PostgresRepositories, map_sqlx_error};

const PROMOTION_COLUMNS: &str = "p.id, p.name, p.variation_id, p.product_id, p.discount_type, \
    p.discount_value, p.starts_at, p.ends_at, p.active";

#[derive(sqlx::FromRow)]
struct VariationRow {
    id: i64,
    product_id: i64,
    price: Decimal,
    active: bool,
}

impl From<VariationRow> for Variation {
    fn from(row: VariationRow) -> Self {
        Self {
            id: VariationId(row.id),
            product_id: ProductId(row.product_id),
            price: row.price,
            active: row.active,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PromotionRow {
    id: i64,
    name: String,
    variation_id: Option<i64>,
    product_id: Option<i64>,
    discount_type: String,
    discount_value: Decimal,
    starts_at: OffsetDateTime,
    ends_at: OffsetDateTime,
    active: bool,
}

impl TryFrom<PromotionRow> for Promotion {
    type Error = RepoError;

    fn try_from(row: PromotionRow) -> Result<Self, Self::Error> {
        let kind = DiscountKind::parse(&row.discount_type).ok_or_else(|| RepoError::InvalidRow {
            message: format!(
                "promotion {} has unknown discount type `{}`",
                row.id, row.discount_type
            ),
        })?;

        let target = match (row.variation_id, row.product_id) {
            (Some(variation), _) => PromotionTarget::Variation(VariationId(variation)),
            (None, Some(product)) => PromotionTarget::Product(ProductId(product)),
            (None, None) => PromotionTarget::Catalog,
        };

        let promotion = Promotion {
            id: PromotionId(row.id),
            name: row.name,
            target,
            kind,
            value: row.discount_value,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            active: row.active,
        };
        promotion.validate().map_err(|err| RepoError::InvalidRow {
            message: err.to_string(),
        })?;
        Ok(promotion)
    }
}

#[async_trait]
impl PromotionsRepo for PostgresRepositories {
    async fn find_variation(&self, id: VariationId) -> Result<Option<Variation>, RepoError> {
        let row = sqlx::query_as::<_, VariationRow>(
            "SELECT id, product_id, price, active FROM product_variations WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Variation::from))
    }

    async fn find_candidate_promotions(
        &self,
        variation_id: VariationId,
    ) -> Result<Vec<Promotion>, RepoError> {
        let sql = format!(
            "SELECT {PROMOTION_COLUMNS} \
             FROM promotions p \
             WHERE p.variation_id = $1 \
                OR (p.variation_id IS NULL AND p.product_id = \
                    (SELECT v.product_id FROM product_variations v WHERE v.id = $1)) \
                OR (p.variation_id IS NULL AND p.product_id IS NULL) \
             ORDER BY p.id"
        );
        let rows = sqlx::query_as::<_, PromotionRow>(&sql)
            .bind(variation_id.0)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let promotions = rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                match Promotion::try_from(row) {
                    Ok(promotion) => Some(promotion),
                    Err(err) => {
                        warn!(
                            promotion_id = id,
                            %variation_id,
                            error = %err,
                            "Dropping invalid promotion row"
                        );
                        None
                    }
                }
            })
            .collect();
        Ok(promotions)
    }

    async fn find_promotion(&self, id: PromotionId) -> Result<Option<Promotion>, RepoError> {
        let sql = format!("SELECT {PROMOTION_COLUMNS} FROM promotions p WHERE p.id = $1");
        let row = sqlx::query_as::<_, PromotionRow>(&sql)
            .bind(id.0)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(Promotion::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    use super::*;

    fn row() -> PromotionRow {
        PromotionRow {
            id: 5,
            name: "Semana do cliente".into(),
            variation_id: None,
            product_id: Some(3),
            discount_type: "fixed_amount".into(),
            discount_value: dec!(15.00),
            starts_at: datetime!(2025-09-10 03:00 UTC),
            ends_at: datetime!(2025-09-17 02:59 UTC),
            active: true,
        }
    }

    #[test]
    fn row_maps_scope_from_nullable_columns() {
        let promotion = Promotion::try_from(row()).expect("valid row");
        assert_eq!(promotion.target, PromotionTarget::Product(ProductId(3)));
        assert_eq!(promotion.kind, DiscountKind::Fixed);

        let catalog = Promotion::try_from(PromotionRow {
            product_id: None,
            ..row()
        })
        .expect("valid row");
        assert_eq!(catalog.target, PromotionTarget::Catalog);

        let variation = Promotion::try_from(PromotionRow {
            variation_id: Some(9),
            ..row()
        })
        .expect("valid row");
        assert_eq!(variation.target, PromotionTarget::Variation(VariationId(9)));
    }

    #[test]
    fn unknown_discount_type_is_invalid_row() {
        let result = Promotion::try_from(PromotionRow {
            discount_type: "bogo".into(),
            ..row()
        });
        assert!(matches!(result, Err(RepoError::InvalidRow { .. })));
    }

    #[test]
    fn failed_validation_is_invalid_row() {
        let result = Promotion::try_from(PromotionRow {
            ends_at: datetime!(2025-09-01 00:00 UTC),
            ..row()
        });
        assert!(matches!(result, Err(RepoError::InvalidRow { .. })));
    }
}
