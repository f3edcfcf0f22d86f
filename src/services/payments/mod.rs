use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, Set, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::PaymentConfig,
    entities::{order, payment},
    errors::ServiceError,
    events::{Event, EventSender},
    services::wallets::WalletService,
};

pub mod cod;
pub mod redirect;
pub mod wallet;

use redirect::{ProviderTransactionState, RedirectGateway, RESPONSE_CODE_SUCCESS};

pub const METHOD_COD: &str = "cod";
pub const METHOD_WALLET: &str = "wallet";

/// Payment record states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Paid)
    }
}

/// Everything a gateway needs to originate one payment attempt.
#[derive(Debug, Clone)]
pub struct PaymentContext {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub amount: Decimal,
    pub client_ip: String,
}

/// What a gateway hands back from `create_pending`: the correlation id it
/// registered and where that attempt stands.
#[derive(Debug, Clone)]
pub struct PaymentArtifact {
    pub method: String,
    pub status: PaymentStatus,
    pub transaction_ref: String,
    pub redirect_url: Option<String>,
}

/// Uniform interface over heterogeneous payment providers. Gateways run on
/// the caller's transaction so synchronous settlement (wallet) commits or
/// rolls back with the surrounding checkout.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn method(&self) -> &str;

    /// Asynchronous gateways resolve via callback/poll and are subject to
    /// the expiry sweep.
    fn is_asynchronous(&self) -> bool;

    async fn create_pending(
        &self,
        txn: &DatabaseTransaction,
        ctx: &PaymentContext,
    ) -> Result<PaymentArtifact, ServiceError>;
}

/// Fresh gateway correlation id: millisecond timestamp plus random suffix.
pub fn new_transaction_ref() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("{}{:04}", Utc::now().timestamp_millis(), suffix)
}

/// All configured gateways, one instance per provider.
pub struct GatewayRegistry {
    gateways: HashMap<String, Arc<dyn PaymentGateway>>,
    redirect: HashMap<String, Arc<RedirectGateway>>,
}

impl GatewayRegistry {
    pub fn new(wallets: WalletService, cfg: &PaymentConfig) -> Self {
        let mut gateways: HashMap<String, Arc<dyn PaymentGateway>> = HashMap::new();
        let mut redirect = HashMap::new();

        gateways.insert(
            METHOD_COD.to_string(),
            Arc::new(cod::CashOnDeliveryGateway) as Arc<dyn PaymentGateway>,
        );
        gateways.insert(
            METHOD_WALLET.to_string(),
            Arc::new(wallet::WalletPaymentGateway::new(wallets)) as Arc<dyn PaymentGateway>,
        );

        for gw_cfg in &cfg.gateways {
            let gw = Arc::new(RedirectGateway::new(gw_cfg.clone(), cfg.expiry_minutes));
            redirect.insert(gw_cfg.name.clone(), gw.clone());
            gateways.insert(gw_cfg.name.clone(), gw as Arc<dyn PaymentGateway>);
        }

        Self { gateways, redirect }
    }

    pub fn resolve(&self, method: &str) -> Result<Arc<dyn PaymentGateway>, ServiceError> {
        self.gateways
            .get(method)
            .cloned()
            .ok_or_else(|| ServiceError::UnsupportedPaymentMethod(method.to_string()))
    }

    pub fn redirect_gateway(&self, provider: &str) -> Option<Arc<RedirectGateway>> {
        self.redirect.get(provider).cloned()
    }

    /// Methods whose pending orders the expiry sweeper is responsible for.
    pub fn asynchronous_methods(&self) -> Vec<String> {
        self.redirect.keys().cloned().collect()
    }
}

/// Provider-facing acknowledgement body. Always returned with HTTP 200 so
/// the provider stops retrying; the real outcome is recorded internally.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CallbackAck {
    #[serde(rename = "RspCode")]
    pub rsp_code: String,
    #[serde(rename = "Message")]
    pub message: String,
}

impl CallbackAck {
    fn new(rsp_code: &str, message: &str) -> Self {
        Self {
            rsp_code: rsp_code.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result of a payment retry: the now-current payment and, for redirect
/// gateways, where to send the customer.
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    pub payment: payment::Model,
    pub redirect_url: Option<String>,
}

/// Drives payment records to terminal state: callback reconciliation,
/// explicit retries, and wallet payment of existing orders.
#[derive(Clone)]
pub struct PaymentsService {
    db: Arc<DatabaseConnection>,
    registry: Arc<GatewayRegistry>,
    events: EventSender,
}

impl PaymentsService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        registry: Arc<GatewayRegistry>,
        events: EventSender,
    ) -> Self {
        Self {
            db,
            registry,
            events,
        }
    }

    pub async fn get_payment(&self, id: Uuid) -> Result<payment::Model, ServiceError> {
        payment::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {id} not found")))
    }

    /// Handles a provider callback. Signature verification precedes any
    /// state change; every logical outcome is expressed as an ack code the
    /// provider understands, never as an HTTP error.
    #[instrument(skip(self, params), fields(provider = %provider))]
    pub async fn resolve_callback(
        &self,
        provider: &str,
        params: HashMap<String, String>,
    ) -> Result<CallbackAck, ServiceError> {
        let gateway = self
            .registry
            .redirect_gateway(provider)
            .ok_or_else(|| ServiceError::NotFound(format!("Unknown provider {provider}")))?;

        let verified = match gateway.verify_callback(&params) {
            Ok(v) => v,
            Err(ServiceError::InvalidSignature) => {
                return Ok(CallbackAck::new("97", "Invalid Checksum"));
            }
            Err(_) => return Ok(CallbackAck::new("99", "Invalid Request")),
        };

        let Some(pay) = payment::Entity::find()
            .filter(payment::Column::TransactionRef.eq(verified.transaction_ref.as_str()))
            .one(&*self.db)
            .await?
        else {
            return Ok(CallbackAck::new("01", "Order not found"));
        };

        if redirect::to_minor_units(pay.amount) != verified.amount_minor {
            warn!(payment_id = %pay.id, "Callback amount mismatch");
            return Ok(CallbackAck::new("04", "Invalid amount"));
        }

        if pay.status != PaymentStatus::Pending.as_str() {
            return Ok(CallbackAck::new("02", "Order already confirmed"));
        }

        if verified.response_code == RESPONSE_CODE_SUCCESS {
            match self.mark_paid(pay.id, pay.order_id).await? {
                Some(ord) => {
                    self.events
                        .send(Event::PaymentResolved {
                            payment_id: pay.id,
                            order_id: pay.order_id,
                            status: PaymentStatus::Paid.as_str().to_string(),
                        })
                        .await;
                    self.events
                        .send(Event::OrderStatusChanged {
                            order_id: ord.id,
                            customer_id: ord.customer_id,
                            old_status: "pending".to_string(),
                            new_status: "paid".to_string(),
                            reason: None,
                        })
                        .await;
                    Ok(CallbackAck::new("00", "Success"))
                }
                // The order reached a terminal state first (expiry
                // cancellation); leave everything untouched.
                None => {
                    warn!(
                        payment_id = %pay.id,
                        order_id = %pay.order_id,
                        "Late success callback for a no-longer-pending order"
                    );
                    Ok(CallbackAck::new("02", "Order already confirmed"))
                }
            }
        } else {
            payment::Entity::update_many()
                .col_expr(
                    payment::Column::Status,
                    Expr::value(PaymentStatus::Failed.as_str()),
                )
                .col_expr(payment::Column::UpdatedAt, Expr::value(Some(Utc::now())))
                .filter(payment::Column::Id.eq(pay.id))
                .filter(payment::Column::Status.eq(PaymentStatus::Pending.as_str()))
                .exec(&*self.db)
                .await?;
            info!(payment_id = %pay.id, code = %verified.response_code, "Provider reported failure");
            Ok(CallbackAck::new("00", "Payment Failed"))
        }
    }

    /// Transitions payment and order to paid in one transaction, both
    /// guarded by optimistic pending checks. Returns the order when this
    /// call performed the transition, `None` when the order had already
    /// left `pending`.
    async fn mark_paid(
        &self,
        payment_id: Uuid,
        order_id: Uuid,
    ) -> Result<Option<order::Model>, ServiceError> {
        let txn = self.db.begin().await?;

        let order_updated = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value("paid"))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq("pending"))
            .exec(&txn)
            .await?;
        if order_updated.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(None);
        }

        let payment_updated = payment::Entity::update_many()
            .col_expr(
                payment::Column::Status,
                Expr::value(PaymentStatus::Paid.as_str()),
            )
            .col_expr(payment::Column::IsPaid, Expr::value(true))
            .col_expr(payment::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(payment::Column::Id.eq(payment_id))
            .filter(payment::Column::Status.eq(PaymentStatus::Pending.as_str()))
            .exec(&txn)
            .await?;
        if payment_updated.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(None);
        }

        txn.commit().await?;

        let ord = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;
        info!(%order_id, %payment_id, "Payment reconciled to paid");
        Ok(Some(ord))
    }

    /// Pays an existing pending order from the customer's wallet.
    pub async fn pay_with_wallet(
        &self,
        order_id: Uuid,
        client_ip: String,
    ) -> Result<RetryOutcome, ServiceError> {
        self.retry(order_id, METHOD_WALLET, client_ip).await
    }

    /// Creates a new payment attempt for a pending order.
    ///
    /// For the same redirect provider the in-flight provider transaction is
    /// polled first and reused while it is still actionable; a brand-new
    /// provider transaction is originated only when the prior one is
    /// terminally dead. This keeps retries from stacking duplicate charges.
    #[instrument(skip(self), fields(order_id = %order_id, method = %method))]
    pub async fn retry(
        &self,
        order_id: Uuid,
        method: &str,
        client_ip: String,
    ) -> Result<RetryOutcome, ServiceError> {
        let ord = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        if ord.status != "pending" {
            return Err(ServiceError::InvalidOperation(format!(
                "Only pending orders accept payment retries (order is '{}')",
                ord.status
            )));
        }

        let current = payment::Entity::find_by_id(ord.payment_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Payment {} not found", ord.payment_id))
            })?;
        if current.is_paid {
            return Err(ServiceError::InvalidOperation(
                "Order payment is already settled".to_string(),
            ));
        }

        let gateway = self.registry.resolve(method)?;

        // Same redirect provider: consult the provider before originating a
        // new transaction.
        if current.method == method {
            if let Some(redirect_gw) = self.registry.redirect_gateway(method) {
                match redirect_gw.query_status(&current.transaction_ref).await? {
                    ProviderTransactionState::Paid => {
                        // Settled out-of-band; reconcile as a callback would.
                        if let Some(updated) = self.mark_paid(current.id, ord.id).await? {
                            self.events
                                .send(Event::OrderStatusChanged {
                                    order_id: updated.id,
                                    customer_id: updated.customer_id,
                                    old_status: "pending".to_string(),
                                    new_status: "paid".to_string(),
                                    reason: None,
                                })
                                .await;
                        }
                        let payment = self.get_payment(current.id).await?;
                        return Ok(RetryOutcome {
                            payment,
                            redirect_url: None,
                        });
                    }
                    ProviderTransactionState::Actionable => {
                        info!(payment_id = %current.id, "Reusing in-flight provider transaction");
                        let redirect_url = current.redirect_url.clone();
                        return Ok(RetryOutcome {
                            payment: current,
                            redirect_url,
                        });
                    }
                    ProviderTransactionState::Dead => {
                        info!(payment_id = %current.id, "Prior provider transaction dead; originating a new one");
                    }
                }
            }
        }

        let txn = self.db.begin().await?;

        let payment_id = Uuid::new_v4();
        let ctx = PaymentContext {
            payment_id,
            order_id: ord.id,
            customer_id: ord.customer_id,
            amount: ord.total_amount,
            client_ip,
        };
        let artifact = gateway.create_pending(&txn, &ctx).await?;

        // Supersede the old attempt
        payment::Entity::update_many()
            .col_expr(
                payment::Column::Status,
                Expr::value(PaymentStatus::Failed.as_str()),
            )
            .col_expr(payment::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(payment::Column::Id.eq(current.id))
            .filter(payment::Column::Status.eq(PaymentStatus::Pending.as_str()))
            .exec(&txn)
            .await?;

        let now = Utc::now();
        let new_payment = payment::ActiveModel {
            id: Set(payment_id),
            order_id: Set(ord.id),
            method: Set(artifact.method.clone()),
            amount: Set(ord.total_amount),
            status: Set(artifact.status.as_str().to_string()),
            transaction_ref: Set(artifact.transaction_ref.clone()),
            is_paid: Set(artifact.status.is_paid()),
            redirect_url: Set(artifact.redirect_url.clone()),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&txn)
        .await?;

        let new_order_status = if artifact.status.is_paid() {
            "paid"
        } else {
            "pending"
        };
        let order_updated = order::Entity::update_many()
            .col_expr(order::Column::PaymentId, Expr::value(payment_id))
            .col_expr(order::Column::Status, Expr::value(new_order_status))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(order::Column::Id.eq(ord.id))
            .filter(order::Column::Status.eq("pending"))
            .exec(&txn)
            .await?;
        if order_updated.rows_affected == 0 {
            // Lost a race against a callback or the sweeper
            txn.rollback().await?;
            return Err(ServiceError::Conflict(format!(
                "Order {order_id} changed state during payment retry"
            )));
        }

        txn.commit().await?;

        if artifact.status.is_paid() {
            self.events
                .send(Event::OrderStatusChanged {
                    order_id: ord.id,
                    customer_id: ord.customer_id,
                    old_status: "pending".to_string(),
                    new_status: "paid".to_string(),
                    reason: None,
                })
                .await;
        }

        info!(payment_id = %payment_id, method = %artifact.method, "Payment attempt created");
        Ok(RetryOutcome {
            redirect_url: new_payment.redirect_url.clone(),
            payment: new_payment,
        })
    }
}
