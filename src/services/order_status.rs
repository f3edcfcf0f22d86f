use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{order, order_item, payment},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{inventory::InventoryService, payments::PaymentStatus, wallets::WalletService},
};

/// Order lifecycle states. Forward-only on the happy path with
/// cancellation branches from `pending` and `paid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }
}

/// Allowed transitions. Same-state writes are treated as no-ops upstream.
fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (Pending, Paid) | (Pending, Cancelled) | (Paid, Shipped) | (Paid, Cancelled) | (Shipped, Delivered)
    )
}

/// State machine governing order status, including the compensation that
/// cancellation owes the rest of the system: stock back to the ledger, and
/// for paid orders the total refunded to the customer wallet with the
/// payment marked refunded.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    inventory: InventoryService,
    wallets: WalletService,
    events: EventSender,
}

impl OrderStatusService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        inventory: InventoryService,
        wallets: WalletService,
        events: EventSender,
    ) -> Self {
        Self {
            db,
            inventory,
            wallets,
            events,
        }
    }

    /// Applies a status transition with validation. The write is
    /// optimistic (`WHERE status = <old> AND version = <seen>`); losing a
    /// concurrent race surfaces as a conflict, not a silent overwrite.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status.as_str()))]
    pub async fn set_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        reason: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        let ord = self.fetch(order_id).await?;
        let old_status = OrderStatus::parse(&ord.status).ok_or_else(|| {
            ServiceError::InvalidOperation(format!("Order carries unknown status '{}'", ord.status))
        })?;

        if old_status == new_status {
            return Ok(ord);
        }
        if !is_valid_transition(old_status, new_status) {
            return Err(ServiceError::InvalidTransition {
                from: old_status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }
        if new_status == OrderStatus::Cancelled
            && reason.as_deref().map(str::trim).unwrap_or("").is_empty()
        {
            return Err(ServiceError::ValidationError(
                "Cancellation requires a non-empty reason".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let applied = self
            .apply_transition(&txn, &ord, old_status, new_status, reason.clone())
            .await?;
        if !applied {
            txn.rollback().await?;
            return Err(ServiceError::ConcurrentModification(order_id));
        }
        txn.commit().await?;

        self.emit_status_change(&ord, old_status, new_status, reason)
            .await;

        self.fetch(order_id).await
    }

    /// Customer-initiated cancellation; only permitted while the order is
    /// still pending.
    pub async fn cancel_by_customer(
        &self,
        order_id: Uuid,
        reason: String,
    ) -> Result<order::Model, ServiceError> {
        let ord = self.fetch(order_id).await?;
        if ord.status != OrderStatus::Pending.as_str() {
            return Err(ServiceError::InvalidOperation(format!(
                "Orders can only be cancelled by the customer while pending (order is '{}')",
                ord.status
            )));
        }
        self.set_status(order_id, OrderStatus::Cancelled, Some(reason))
            .await
    }

    /// Sweeper entry point: cancels the order only if it is still pending
    /// at the moment of the write. Returns whether this call cancelled it;
    /// a lost race (callback resolved the order first) is a quiet no-op.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel_if_pending(
        &self,
        order_id: Uuid,
        reason: &str,
    ) -> Result<bool, ServiceError> {
        let ord = self.fetch(order_id).await?;
        if ord.status != OrderStatus::Pending.as_str() {
            return Ok(false);
        }

        let txn = self.db.begin().await?;
        let applied = self
            .apply_transition(
                &txn,
                &ord,
                OrderStatus::Pending,
                OrderStatus::Cancelled,
                Some(reason.to_string()),
            )
            .await?;
        if !applied {
            txn.rollback().await?;
            return Ok(false);
        }
        txn.commit().await?;

        self.emit_status_change(
            &ord,
            OrderStatus::Pending,
            OrderStatus::Cancelled,
            Some(reason.to_string()),
        )
        .await;
        Ok(true)
    }

    /// The transition write plus its compensation, all on one transaction.
    /// Returns false when the optimistic check lost (order moved under us).
    async fn apply_transition(
        &self,
        txn: &DatabaseTransaction,
        ord: &order::Model,
        old_status: OrderStatus,
        new_status: OrderStatus,
        reason: Option<String>,
    ) -> Result<bool, ServiceError> {
        let mut update = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(new_status.as_str()))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())));
        if new_status == OrderStatus::Cancelled {
            update = update.col_expr(
                order::Column::CancellationReason,
                Expr::value(reason.clone()),
            );
        }
        let result = update
            .filter(order::Column::Id.eq(ord.id))
            .filter(order::Column::Status.eq(old_status.as_str()))
            .filter(order::Column::Version.eq(ord.version))
            .exec(txn)
            .await?;
        if result.rows_affected == 0 {
            return Ok(false);
        }

        match new_status {
            OrderStatus::Cancelled => {
                self.compensate_cancellation(txn, ord, old_status).await?;
            }
            OrderStatus::Delivered => {
                self.settle_cod_on_delivery(txn, ord).await?;
            }
            _ => {}
        }
        Ok(true)
    }

    /// Stock back for every line; for paid orders additionally refund the
    /// total to the customer wallet and mark the payment refunded.
    async fn compensate_cancellation(
        &self,
        txn: &DatabaseTransaction,
        ord: &order::Model,
        old_status: OrderStatus,
    ) -> Result<(), ServiceError> {
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(ord.id))
            .all(txn)
            .await?;
        for item in &items {
            self.inventory
                .release(txn, item.variant_id, item.quantity)
                .await?;
        }

        let payment_status_after = if old_status == OrderStatus::Paid {
            self.wallets
                .deposit(txn, ord.customer_id, ord.total_amount, Some(ord.payment_id))
                .await?;
            PaymentStatus::Refunded
        } else {
            PaymentStatus::Failed
        };

        payment::Entity::update_many()
            .col_expr(
                payment::Column::Status,
                Expr::value(payment_status_after.as_str()),
            )
            .col_expr(payment::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(payment::Column::Id.eq(ord.payment_id))
            .exec(txn)
            .await?;

        info!(
            order_id = %ord.id,
            released_lines = items.len(),
            refunded = old_status == OrderStatus::Paid,
            "Cancellation compensation applied"
        );
        Ok(())
    }

    /// Delivery implies collection for cash-on-delivery payments.
    async fn settle_cod_on_delivery(
        &self,
        txn: &DatabaseTransaction,
        ord: &order::Model,
    ) -> Result<(), ServiceError> {
        let updated = payment::Entity::update_many()
            .col_expr(
                payment::Column::Status,
                Expr::value(PaymentStatus::Paid.as_str()),
            )
            .col_expr(payment::Column::IsPaid, Expr::value(true))
            .col_expr(payment::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(payment::Column::Id.eq(ord.payment_id))
            .filter(payment::Column::Method.eq(crate::services::payments::METHOD_COD))
            .filter(payment::Column::IsPaid.eq(false))
            .exec(txn)
            .await?;
        if updated.rows_affected > 0 {
            info!(order_id = %ord.id, "COD payment settled on delivery");
        }
        Ok(())
    }

    async fn emit_status_change(
        &self,
        ord: &order::Model,
        old_status: OrderStatus,
        new_status: OrderStatus,
        reason: Option<String>,
    ) {
        self.events
            .send(Event::OrderStatusChanged {
                order_id: ord.id,
                customer_id: ord.customer_id,
                old_status: old_status.as_str().to_string(),
                new_status: new_status.as_str().to_string(),
                reason: reason.clone(),
            })
            .await;
        if new_status == OrderStatus::Cancelled && old_status == OrderStatus::Paid {
            self.events
                .send(Event::WalletRefundIssued {
                    customer_id: ord.customer_id,
                    order_id: ord.id,
                    amount: ord.total_amount,
                })
                .await;
        }
        if new_status == OrderStatus::Cancelled {
            if let Some(reason) = reason {
                warn!(order_id = %ord.id, %reason, "Order cancelled");
            }
        }
    }

    async fn fetch(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))
    }
}
