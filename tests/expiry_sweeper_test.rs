//! Integration tests for the expiry sweeper: stale pending orders on
//! asynchronous gateways are cancelled with compensation, exactly once.

mod common;

use chrono::{Duration, Utc};
use common::{TestApp, GATEWAY};
use rust_decimal_macros::dec;
use storefront_api::{
    services::checkout::{CheckoutLine, CheckoutRequest},
    tasks::expiry_sweeper::{ExpirySweeper, EXPIRY_REASON},
};
use uuid::Uuid;

fn sweeper(app: &TestApp) -> ExpirySweeper {
    ExpirySweeper::new(
        app.db.clone(),
        app.services.order_status.as_ref().clone(),
        app.services.registry.asynchronous_methods(),
        app.payment_cfg.expiry_minutes,
        app.payment_cfg.sweep_interval_secs,
    )
}

async fn place_order(
    app: &TestApp,
    variant_id: Uuid,
    method: &str,
) -> storefront_api::services::checkout::CheckoutOutcome {
    let req = CheckoutRequest {
        customer_id: Uuid::new_v4(),
        items: vec![CheckoutLine {
            variant_id,
            quantity: 1,
            unit_price: dec!(100),
        }],
        shipping_address: "12 Nguyen Trai, District 1".to_string(),
        recipient_name: "Nguyen Van A".to_string(),
        recipient_phone: "0901234567".to_string(),
        shipping_fee: dec!(30),
        payment_method: method.to_string(),
        voucher_code: None,
    };
    app.services
        .checkout
        .checkout(req, "127.0.0.1".to_string())
        .await
        .expect("checkout succeeds")
}

#[tokio::test]
async fn stale_gateway_order_is_cancelled_with_compensation() {
    let app = TestApp::new().await;
    let a = app.seed_variant("SKU-A", "shoes", dec!(100), 5).await;
    let outcome = place_order(&app, a.id, GATEWAY).await;
    assert_eq!(app.stock_of(a.id).await, 4);

    app.backdate_order(outcome.order.id, Utc::now() - Duration::minutes(20))
        .await;

    let cancelled = sweeper(&app).sweep_once().await.expect("sweep runs");
    assert_eq!(cancelled, 1);

    let ord = app.reload_order(outcome.order.id).await;
    assert_eq!(ord.status, "cancelled");
    assert_eq!(ord.cancellation_reason.as_deref(), Some(EXPIRY_REASON));
    assert_eq!(app.stock_of(a.id).await, 5);

    let pay = app.reload_payment(outcome.payment.id).await;
    assert_eq!(pay.status, "failed");
}

#[tokio::test]
async fn sweep_is_idempotent() {
    let app = TestApp::new().await;
    let a = app.seed_variant("SKU-A", "shoes", dec!(100), 5).await;
    let outcome = place_order(&app, a.id, GATEWAY).await;
    app.backdate_order(outcome.order.id, Utc::now() - Duration::minutes(20))
        .await;

    let s = sweeper(&app);
    assert_eq!(s.sweep_once().await.expect("first sweep"), 1);
    // Second pass finds the order already terminal: a no-op, not an error
    assert_eq!(s.sweep_once().await.expect("second sweep"), 0);

    // Compensation happened exactly once
    assert_eq!(app.stock_of(a.id).await, 5);
}

#[tokio::test]
async fn fresh_pending_order_is_left_alone() {
    let app = TestApp::new().await;
    let a = app.seed_variant("SKU-A", "shoes", dec!(100), 5).await;
    let outcome = place_order(&app, a.id, GATEWAY).await;

    assert_eq!(sweeper(&app).sweep_once().await.expect("sweep runs"), 0);
    assert_eq!(app.reload_order(outcome.order.id).await.status, "pending");
    assert_eq!(app.stock_of(a.id).await, 4);
}

#[tokio::test]
async fn cod_orders_have_no_payment_window() {
    let app = TestApp::new().await;
    let a = app.seed_variant("SKU-A", "shoes", dec!(100), 5).await;
    let outcome = place_order(&app, a.id, "cod").await;
    app.backdate_order(outcome.order.id, Utc::now() - Duration::days(2))
        .await;

    assert_eq!(sweeper(&app).sweep_once().await.expect("sweep runs"), 0);
    assert_eq!(app.reload_order(outcome.order.id).await.status, "pending");
}

#[tokio::test]
async fn resolved_order_is_not_expired() {
    let app = TestApp::new().await;
    let a = app.seed_variant("SKU-A", "shoes", dec!(100), 5).await;
    let outcome = place_order(&app, a.id, GATEWAY).await;

    // Callback resolves the payment before the sweep runs
    let params = common::signed_callback_params(&[
        ("vnp_TxnRef", &outcome.payment.transaction_ref),
        ("vnp_ResponseCode", "00"),
        ("vnp_Amount", &common::minor_units(dec!(130))),
        ("vnp_TransactionNo", "14422574"),
    ]);
    let ack = app
        .services
        .payments
        .resolve_callback(GATEWAY, params)
        .await
        .expect("callback resolves");
    assert_eq!(ack.rsp_code, "00");

    app.backdate_order(outcome.order.id, Utc::now() - Duration::minutes(20))
        .await;
    assert_eq!(sweeper(&app).sweep_once().await.expect("sweep runs"), 0);

    let ord = app.reload_order(outcome.order.id).await;
    assert_eq!(ord.status, "paid");
}
