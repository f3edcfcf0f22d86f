use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::voucher,
    errors::{ServiceError, VoucherError},
};

/// The catalog facts about one order line that voucher scope matching
/// needs. Built by the orchestrator from the variants in the cart.
#[derive(Debug, Clone)]
pub struct ScopeLine {
    pub variant_id: Uuid,
    pub product_id: Uuid,
    pub category: String,
}

/// A successfully priced voucher application.
#[derive(Debug, Clone)]
pub struct VoucherQuote {
    pub voucher_id: Uuid,
    pub code: String,
    pub discount_amount: Decimal,
}

/// Validates a voucher against an order and computes the discount.
/// Checks run in a fixed order and the first failure wins: existence and
/// active flag, validity window, usage quota, order minimum, scope match.
///
/// The returned discount is not clamped here; the orchestrator clamps the
/// order total at zero.
pub fn evaluate(
    v: &voucher::Model,
    subtotal: Decimal,
    lines: &[ScopeLine],
    now: DateTime<Utc>,
) -> Result<Decimal, VoucherError> {
    if !v.is_active {
        return Err(VoucherError::NotFound);
    }
    if now < v.valid_from || now > v.valid_to {
        return Err(VoucherError::OutsideValidityWindow);
    }
    if v.used_count >= v.usage_limit {
        return Err(VoucherError::LimitReached);
    }
    if subtotal < v.min_order_value {
        return Err(VoucherError::BelowMinimum);
    }
    if !v.scope.is_unrestricted() {
        let matches = lines.iter().any(|line| {
            v.scope.categories.contains(&line.category)
                || v.scope.product_ids.contains(&line.product_id)
        });
        if !matches {
            return Err(VoucherError::ScopeMismatch);
        }
    }

    let discount = match v.discount_type.as_str() {
        "percent" => subtotal * v.discount_value / Decimal::from(100),
        _ => v.discount_value,
    };
    Ok(discount)
}

/// Voucher evaluator and consumption tracker. Stateless: both the lookup
/// and the consumption run on the caller's connection so they join the
/// checkout transaction.
#[derive(Clone, Default)]
pub struct VoucherService;

impl VoucherService {
    pub fn new() -> Self {
        Self
    }

    /// Prices `code` against the order and consumes one use, all against
    /// the supplied connection so consumption rolls back with a failing
    /// checkout.
    ///
    /// Consumption is a conditional increment (`used_count < usage_limit`);
    /// losing the race on the last remaining use surfaces as the same
    /// `LimitReached` an ordinary exhausted voucher produces.
    #[instrument(skip(self, conn, lines), fields(code = %code))]
    pub async fn apply<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
        subtotal: Decimal,
        lines: &[ScopeLine],
        now: DateTime<Utc>,
    ) -> Result<VoucherQuote, ServiceError> {
        let code = code.trim().to_uppercase();

        let v = voucher::Entity::find()
            .filter(voucher::Column::Code.eq(code.as_str()))
            .one(conn)
            .await?
            .ok_or(VoucherError::NotFound)?;

        let discount_amount = evaluate(&v, subtotal, lines, now)?;

        let consumed = voucher::Entity::update_many()
            .col_expr(
                voucher::Column::UsedCount,
                Expr::col(voucher::Column::UsedCount).add(1),
            )
            .col_expr(voucher::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(voucher::Column::Id.eq(v.id))
            .filter(voucher::Column::UsedCount.lt(v.usage_limit))
            .exec(conn)
            .await?;
        if consumed.rows_affected == 0 {
            return Err(VoucherError::LimitReached.into());
        }

        // Deactivate once the limit is reached
        voucher::Entity::update_many()
            .col_expr(voucher::Column::IsActive, Expr::value(false))
            .filter(voucher::Column::Id.eq(v.id))
            .filter(voucher::Column::UsedCount.gte(v.usage_limit))
            .exec(conn)
            .await?;

        info!(voucher_id = %v.id, %discount_amount, "Voucher applied");
        Ok(VoucherQuote {
            voucher_id: v.id,
            code,
            discount_amount,
        })
    }

}
