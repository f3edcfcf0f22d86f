pub mod callbacks;
pub mod orders;
pub mod payments;
pub mod wallets;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::{
    config::PaymentConfig,
    events::EventSender,
    services::{
        checkout::CheckoutService,
        inventory::InventoryService,
        order_status::OrderStatusService,
        orders::OrderService,
        payments::{GatewayRegistry, PaymentsService},
        vouchers::VoucherService,
        wallets::WalletService,
    },
};

/// Aggregated service handles used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub checkout: Arc<CheckoutService>,
    pub order_status: Arc<OrderStatusService>,
    pub payments: Arc<PaymentsService>,
    pub wallets: WalletService,
    pub inventory: InventoryService,
    pub registry: Arc<GatewayRegistry>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        payment_cfg: &PaymentConfig,
    ) -> Self {
        let inventory = InventoryService::new(db.clone());
        let wallets = WalletService::new(db.clone());
        let vouchers = VoucherService::new();
        let registry = Arc::new(GatewayRegistry::new(wallets.clone(), payment_cfg));

        let order_status = Arc::new(OrderStatusService::new(
            db.clone(),
            inventory.clone(),
            wallets.clone(),
            event_sender.clone(),
        ));
        let checkout = Arc::new(CheckoutService::new(
            db.clone(),
            inventory.clone(),
            vouchers,
            registry.clone(),
            event_sender.clone(),
        ));
        let payments = Arc::new(PaymentsService::new(
            db.clone(),
            registry.clone(),
            event_sender,
        ));
        let orders = Arc::new(OrderService::new(db));

        Self {
            orders,
            checkout,
            order_status,
            payments,
            wallets,
            inventory,
            registry,
        }
    }
}
