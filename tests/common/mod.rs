//! Shared harness for integration tests: application services backed by an
//! in-memory SQLite database with the full schema applied.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectOptions, Database, DatabaseConnection,
    EntityTrait, QueryFilter, Set,
};
use sha2::Sha512;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use storefront_api::{
    config::{PaymentConfig, RedirectGatewayConfig},
    db,
    entities::voucher::VoucherScope,
    entities::{cart_item, order, payment, product, product_variant, voucher, wallet},
    events::EventSender,
    handlers::AppServices,
    notifications::LogNotificationService,
};

pub const GATEWAY: &str = "vnpay";
pub const GATEWAY_SECRET: &str = "TESTSECRETTESTSECRETTESTSECRET12";

/// Application services over a fresh in-memory database.
pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub services: AppServices,
    pub payment_cfg: PaymentConfig,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut opts = ConnectOptions::new("sqlite::memory:".to_string());
        // A single connection keeps the in-memory database alive and shared
        opts.max_connections(1).min_connections(1);
        let pool = Database::connect(opts)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(storefront_api::events::process_events(
            event_rx,
            Arc::new(LogNotificationService),
        ));

        let payment_cfg = PaymentConfig {
            expiry_minutes: 15,
            sweep_interval_secs: 60,
            gateways: vec![RedirectGatewayConfig {
                name: GATEWAY.to_string(),
                merchant_code: "TESTMERCHANT".to_string(),
                hash_secret: GATEWAY_SECRET.to_string(),
                pay_url: "https://sandbox.invalid/paymentv2/vpcpay.html".to_string(),
                query_url: "https://sandbox.invalid/merchant_webapi/api/transaction".to_string(),
                return_url: "http://localhost:8080/return".to_string(),
            }],
        };

        let services = AppServices::new(db.clone(), event_sender, &payment_cfg);

        Self {
            db,
            services,
            payment_cfg,
            _event_task: event_task,
        }
    }

    /// Seeds a product (category `category`) with one variant.
    pub async fn seed_variant(
        &self,
        sku: &str,
        category: &str,
        price: Decimal,
        stock: i32,
    ) -> product_variant::Model {
        let product_id = Uuid::new_v4();
        product::ActiveModel {
            id: Set(product_id),
            name: Set(format!("Product {sku}")),
            category: Set(category.to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed product");

        product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            sku: Set(sku.to_string()),
            size: Set(None),
            color: Set(None),
            price: Set(price),
            stock: Set(stock),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("seed variant")
    }

    pub async fn seed_voucher(
        &self,
        code: &str,
        discount_type: &str,
        discount_value: Decimal,
        usage_limit: i32,
        min_order_value: Decimal,
        scope: VoucherScope,
    ) -> voucher::Model {
        let now = Utc::now();
        voucher::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            discount_type: Set(discount_type.to_string()),
            discount_value: Set(discount_value),
            usage_limit: Set(usage_limit),
            used_count: Set(0),
            min_order_value: Set(min_order_value),
            valid_from: Set(now - Duration::days(1)),
            valid_to: Set(now + Duration::days(1)),
            scope: Set(scope),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("seed voucher")
    }

    pub async fn seed_wallet(&self, customer_id: Uuid, balance: Decimal) -> wallet::Model {
        wallet::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            balance: Set(balance),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("seed wallet")
    }

    pub async fn seed_cart_line(
        &self,
        customer_id: Uuid,
        variant_id: Uuid,
        quantity: i32,
        unit_price: Decimal,
    ) -> cart_item::Model {
        cart_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            variant_id: Set(variant_id),
            quantity: Set(quantity),
            unit_price: Set(unit_price),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed cart line")
    }

    pub async fn stock_of(&self, variant_id: Uuid) -> i32 {
        self.services
            .inventory
            .stock_level(variant_id)
            .await
            .expect("stock level")
    }

    pub async fn order_count(&self) -> u64 {
        use sea_orm::PaginatorTrait;
        order::Entity::find()
            .count(&*self.db)
            .await
            .expect("count orders")
    }

    pub async fn reload_order(&self, id: Uuid) -> order::Model {
        order::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .expect("query order")
            .expect("order exists")
    }

    pub async fn reload_payment(&self, id: Uuid) -> payment::Model {
        payment::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .expect("query payment")
            .expect("payment exists")
    }

    pub async fn reload_voucher(&self, code: &str) -> voucher::Model {
        voucher::Entity::find()
            .filter(voucher::Column::Code.eq(code))
            .one(&*self.db)
            .await
            .expect("query voucher")
            .expect("voucher exists")
    }

    /// Rewrites an order's creation time, for expiry tests.
    pub async fn backdate_order(&self, order_id: Uuid, created_at: DateTime<Utc>) {
        order::Entity::update_many()
            .col_expr(order::Column::CreatedAt, Expr::value(created_at))
            .filter(order::Column::Id.eq(order_id))
            .exec(&*self.db)
            .await
            .expect("backdate order");
    }
}

/// Signs callback parameters the way the provider does: HMAC-SHA512 over
/// the sorted unencoded `k=v` set.
pub fn signed_callback_params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    let sorted: BTreeMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let sign_data = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let mut mac = Hmac::<Sha512>::new_from_slice(GATEWAY_SECRET.as_bytes()).unwrap();
    mac.update(sign_data.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    let mut params: HashMap<String, String> = sorted.into_iter().collect();
    params.insert("vnp_SecureHash".to_string(), signature);
    params
}

/// Minor-unit amount string for callback params (major × 100).
pub fn minor_units(amount: Decimal) -> String {
    use rust_decimal::prelude::ToPrimitive;
    ((amount * Decimal::from(100)).round().to_i64().unwrap()).to_string()
}
