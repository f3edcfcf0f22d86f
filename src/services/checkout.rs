use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{cart_item, order, order_item, payment, product, product_variant},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        inventory::InventoryService,
        payments::{GatewayRegistry, PaymentContext},
        vouchers::{ScopeLine, VoucherService},
    },
};

/// One submitted cart line. The unit price is the price the customer saw
/// at add-to-cart time and is treated as authoritative for this order.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CheckoutLine {
    pub variant_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    pub customer_id: Uuid,
    #[validate(length(min = 1, message = "Cart must not be empty"), nested)]
    pub items: Vec<CheckoutLine>,
    #[validate(length(min = 1, message = "Shipping address is required"))]
    pub shipping_address: String,
    #[validate(length(min = 1, message = "Recipient name is required"))]
    pub recipient_name: String,
    #[validate(length(min = 1, message = "Recipient phone is required"))]
    pub recipient_phone: String,
    #[serde(default)]
    pub shipping_fee: Decimal,
    pub payment_method: String,
    pub voucher_code: Option<String>,
}

/// Everything checkout produced, returned to the handler in one piece.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutOutcome {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub payment: payment::Model,
    /// Present for redirect gateways: where to send the customer next
    pub redirect_url: Option<String>,
}

/// `max(0, subtotal - discount) + shipping_fee`; the discount can never
/// push the payable total negative.
fn compute_total(subtotal: Decimal, discount: Decimal, shipping_fee: Decimal) -> Decimal {
    std::cmp::max(subtotal - discount, Decimal::ZERO) + shipping_fee
}

/// The transactional core of the storefront: turns a cart snapshot into an
/// order+payment pair as one atomic unit of work.
///
/// Voucher consumption, stock reservation, payment creation, order
/// persistence and cart clearing all ride the same database transaction;
/// any failure rolls every prior step back. There is no reachable state
/// where stock moved but no order exists.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    inventory: InventoryService,
    vouchers: VoucherService,
    registry: Arc<GatewayRegistry>,
    events: EventSender,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        inventory: InventoryService,
        vouchers: VoucherService,
        registry: Arc<GatewayRegistry>,
        events: EventSender,
    ) -> Self {
        Self {
            db,
            inventory,
            vouchers,
            registry,
            events,
        }
    }

    #[instrument(skip(self, req), fields(customer_id = %req.customer_id, method = %req.payment_method))]
    pub async fn checkout(
        &self,
        req: CheckoutRequest,
        client_ip: String,
    ) -> Result<CheckoutOutcome, ServiceError> {
        req.validate()?;
        for line in &req.items {
            if line.unit_price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Line price must not be negative".to_string(),
                ));
            }
        }
        if req.shipping_fee < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Shipping fee must not be negative".to_string(),
            ));
        }

        let gateway = self.registry.resolve(&req.payment_method)?;

        let txn = self.db.begin().await?;

        // Resolve every submitted line against the catalog; the voucher
        // scope check needs product categories.
        let variant_ids: Vec<Uuid> = req.items.iter().map(|l| l.variant_id).collect();
        let variants: HashMap<Uuid, product_variant::Model> = product_variant::Entity::find()
            .filter(product_variant::Column::Id.is_in(variant_ids.clone()))
            .all(&txn)
            .await?
            .into_iter()
            .map(|v| (v.id, v))
            .collect();
        for line in &req.items {
            if !variants.contains_key(&line.variant_id) {
                return Err(ServiceError::ValidationError(format!(
                    "Cart references an unknown product variant ({})",
                    line.variant_id
                )));
            }
        }

        let product_ids: Vec<Uuid> = variants.values().map(|v| v.product_id).collect();
        let categories: HashMap<Uuid, String> = product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(&txn)
            .await?
            .into_iter()
            .map(|p| (p.id, p.category))
            .collect();

        // Subtotal from the submitted snapshot prices
        let subtotal: Decimal = req
            .items
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity))
            .sum();

        let now = Utc::now();
        let scope_lines: Vec<ScopeLine> = req
            .items
            .iter()
            .map(|l| {
                let variant = &variants[&l.variant_id];
                ScopeLine {
                    variant_id: l.variant_id,
                    product_id: variant.product_id,
                    category: categories
                        .get(&variant.product_id)
                        .cloned()
                        .unwrap_or_default(),
                }
            })
            .collect();

        let quote = match &req.voucher_code {
            Some(code) => Some(
                self.vouchers
                    .apply(&txn, code, subtotal, &scope_lines, now)
                    .await?,
            ),
            None => None,
        };
        let discount_amount = quote
            .as_ref()
            .map(|q| q.discount_amount)
            .unwrap_or(Decimal::ZERO);
        let total_amount = compute_total(subtotal, discount_amount, req.shipping_fee);

        // Reserve stock line by line; the first insufficiency aborts the
        // transaction and with it every reservation already made.
        for line in &req.items {
            let variant = &variants[&line.variant_id];
            self.inventory
                .reserve(&txn, line.variant_id, &variant.sku, line.quantity)
                .await?;
        }

        let order_id = Uuid::new_v4();
        let payment_id = Uuid::new_v4();

        let ctx = PaymentContext {
            payment_id,
            order_id,
            customer_id: req.customer_id,
            amount: total_amount,
            client_ip,
        };
        let artifact = gateway.create_pending(&txn, &ctx).await?;

        let pay = payment::ActiveModel {
            id: Set(payment_id),
            order_id: Set(order_id),
            method: Set(artifact.method.clone()),
            amount: Set(total_amount),
            status: Set(artifact.status.as_str().to_string()),
            transaction_ref: Set(artifact.transaction_ref.clone()),
            is_paid: Set(artifact.status.is_paid()),
            redirect_url: Set(artifact.redirect_url.clone()),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&txn)
        .await?;

        let order_status = if artifact.status.is_paid() {
            "paid"
        } else {
            "pending"
        };
        let ord = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(format!(
                "ORD-{}",
                order_id.to_string()[..8].to_uppercase()
            )),
            customer_id: Set(req.customer_id),
            status: Set(order_status.to_string()),
            subtotal: Set(subtotal),
            discount_amount: Set(discount_amount),
            voucher_code: Set(quote.as_ref().map(|q| q.code.clone())),
            shipping_fee: Set(req.shipping_fee),
            total_amount: Set(total_amount),
            payment_id: Set(payment_id),
            shipping_address: Set(req.shipping_address.clone()),
            recipient_name: Set(req.recipient_name.clone()),
            recipient_phone: Set(req.recipient_phone.clone()),
            cancellation_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(None),
            version: Set(1),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(req.items.len());
        for line in &req.items {
            let variant = &variants[&line.variant_id];
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                variant_id: Set(line.variant_id),
                sku: Set(variant.sku.clone()),
                name: Set(display_name(variant)),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                total_price: Set(line.unit_price * Decimal::from(line.quantity)),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        // Purchased lines leave the cart in the same unit of work
        cart_item::Entity::delete_many()
            .filter(cart_item::Column::CustomerId.eq(req.customer_id))
            .filter(cart_item::Column::VariantId.is_in(variant_ids))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        self.events
            .send(Event::OrderCreated {
                order_id,
                customer_id: req.customer_id,
                status: ord.status.clone(),
                total_amount,
            })
            .await;

        info!(
            order_id = %order_id,
            order_number = %ord.order_number,
            %total_amount,
            "Checkout completed"
        );

        Ok(CheckoutOutcome {
            order: ord,
            items,
            redirect_url: pay.redirect_url.clone(),
            payment: pay,
        })
    }
}

fn display_name(variant: &product_variant::Model) -> String {
    match (&variant.size, &variant.color) {
        (Some(size), Some(color)) => format!("{} ({size}/{color})", variant.sku),
        (Some(size), None) => format!("{} ({size})", variant.sku),
        (None, Some(color)) => format!("{} ({color})", variant.sku),
        (None, None) => variant.sku.clone(),
    }
}
