use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{entities::product_variant, errors::ServiceError};

/// Inventory ledger over per-variant stock counts.
///
/// `reserve` and `release` are the only mutation paths the checkout core
/// uses. Both execute as single conditional/unconditional UPDATE statements
/// so concurrent checkouts can never oversell: the stock check and the
/// decrement are one atomic operation at the database, never a
/// read-check-write sequence in application code.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Decrements stock by `qty` only if at least `qty` units remain.
    /// Returns `InsufficientStock` naming the SKU when the condition fails;
    /// in that case nothing was mutated.
    #[instrument(skip(self, conn), fields(variant_id = %variant_id, qty = qty))]
    pub async fn reserve<C: ConnectionTrait>(
        &self,
        conn: &C,
        variant_id: Uuid,
        sku: &str,
        qty: i32,
    ) -> Result<(), ServiceError> {
        if qty <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Reservation quantity must be positive (got {qty})"
            )));
        }

        let result = product_variant::Entity::update_many()
            .col_expr(
                product_variant::Column::Stock,
                Expr::col(product_variant::Column::Stock).sub(qty),
            )
            .col_expr(
                product_variant::Column::UpdatedAt,
                Expr::value(Some(Utc::now())),
            )
            .filter(product_variant::Column::Id.eq(variant_id))
            .filter(product_variant::Column::Stock.gte(qty))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::InsufficientStock(sku.to_string()));
        }

        info!(sku, qty, "Stock reserved");
        Ok(())
    }

    /// Returns `qty` units to stock. Called exactly once per reserved unit
    /// by the cancellation compensation path.
    #[instrument(skip(self, conn), fields(variant_id = %variant_id, qty = qty))]
    pub async fn release<C: ConnectionTrait>(
        &self,
        conn: &C,
        variant_id: Uuid,
        qty: i32,
    ) -> Result<(), ServiceError> {
        let result = product_variant::Entity::update_many()
            .col_expr(
                product_variant::Column::Stock,
                Expr::col(product_variant::Column::Stock).add(qty),
            )
            .col_expr(
                product_variant::Column::UpdatedAt,
                Expr::value(Some(Utc::now())),
            )
            .filter(product_variant::Column::Id.eq(variant_id))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Product variant {variant_id} not found"
            )));
        }

        info!(qty, "Stock released");
        Ok(())
    }

    /// Current stock level, for handlers and tests.
    pub async fn stock_level(&self, variant_id: Uuid) -> Result<i32, ServiceError> {
        let variant = product_variant::Entity::find_by_id(variant_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product variant {variant_id} not found"))
            })?;
        Ok(variant.stock)
    }
}
