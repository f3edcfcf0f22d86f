//! Integration tests for the order lifecycle manager: transition rules and
//! cancellation compensation (stock release, wallet refund, payment state).

mod common;

use common::TestApp;
use rust_decimal_macros::dec;
use storefront_api::{
    errors::ServiceError,
    services::checkout::{CheckoutLine, CheckoutRequest},
    services::order_status::OrderStatus,
};
use uuid::Uuid;

async fn place_order(
    app: &TestApp,
    customer: Uuid,
    variant_id: Uuid,
    method: &str,
) -> storefront_api::services::checkout::CheckoutOutcome {
    let req = CheckoutRequest {
        customer_id: customer,
        items: vec![CheckoutLine {
            variant_id,
            quantity: 2,
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
async fn cancelling_paid_order_compensates_fully() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let a = app.seed_variant("SKU-A", "shoes", dec!(100), 5).await;
    app.seed_wallet(customer, dec!(300)).await;

    // Wallet checkout: order is paid immediately, total 230
    let outcome = place_order(&app, customer, a.id, "wallet").await;
    assert_eq!(outcome.order.status, "paid");
    assert_eq!(app.stock_of(a.id).await, 3);

    let updated = app
        .services
        .order_status
        .set_status(outcome.order.id, OrderStatus::Cancelled, Some("X".to_string()))
        .await
        .expect("cancel succeeds");

    assert_eq!(updated.status, "cancelled");
    assert_eq!(updated.cancellation_reason.as_deref(), Some("X"));

    // Stock released back
    assert_eq!(app.stock_of(a.id).await, 5);

    // Wallet refunded exactly the payable total, with a deposit ledger row
    let (w, log) = app
        .services
        .wallets
        .get_wallet_with_transactions(customer)
        .await
        .unwrap();
    assert_eq!(w.balance, dec!(300));
    let deposit = log
        .iter()
        .find(|t| t.kind == "deposit")
        .expect("deposit entry exists");
    assert_eq!(deposit.amount, dec!(230));
    assert_eq!(deposit.payment_id, Some(outcome.payment.id));

    // Payment marked refunded
    let pay = app.reload_payment(outcome.payment.id).await;
    assert_eq!(pay.status, "refunded");
}

#[tokio::test]
async fn cancelling_pending_order_releases_stock_without_refund() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let a = app.seed_variant("SKU-A", "shoes", dec!(100), 5).await;

    let outcome = place_order(&app, customer, a.id, "cod").await;
    assert_eq!(outcome.order.status, "pending");
    assert_eq!(app.stock_of(a.id).await, 3);

    let updated = app
        .services
        .order_status
        .cancel_by_customer(outcome.order.id, "changed my mind".to_string())
        .await
        .expect("customer cancel succeeds");
    assert_eq!(updated.status, "cancelled");

    assert_eq!(app.stock_of(a.id).await, 5);
    // No payment was collected, so nothing to refund and no wallet appears
    assert!(app
        .services
        .wallets
        .find_wallet(customer)
        .await
        .unwrap()
        .is_none());
    let pay = app.reload_payment(outcome.payment.id).await;
    assert_eq!(pay.status, "failed");
}

#[tokio::test]
async fn cancellation_requires_a_reason() {
    let app = TestApp::new().await;
    let a = app.seed_variant("SKU-A", "shoes", dec!(100), 5).await;
    let outcome = place_order(&app, Uuid::new_v4(), a.id, "cod").await;

    let err = app
        .services
        .order_status
        .set_status(outcome.order.id, OrderStatus::Cancelled, None)
        .await
        .expect_err("missing reason");
    assert!(matches!(err, ServiceError::ValidationError(_)));

    let err = app
        .services
        .order_status
        .set_status(outcome.order.id, OrderStatus::Cancelled, Some("  ".to_string()))
        .await
        .expect_err("blank reason");
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn backward_and_skipping_transitions_rejected() {
    let app = TestApp::new().await;
    let a = app.seed_variant("SKU-A", "shoes", dec!(100), 10).await;
    let outcome = place_order(&app, Uuid::new_v4(), a.id, "cod").await;
    let id = outcome.order.id;

    // pending cannot jump to shipped or delivered
    for target in [OrderStatus::Shipped, OrderStatus::Delivered] {
        let err = app
            .services
            .order_status
            .set_status(id, target, None)
            .await
            .expect_err("invalid transition");
        assert!(matches!(err, ServiceError::InvalidTransition { .. }));
    }

    // Walk the happy path to delivered
    for target in [OrderStatus::Paid, OrderStatus::Shipped, OrderStatus::Delivered] {
        app.services
            .order_status
            .set_status(id, target, None)
            .await
            .expect("forward transition");
    }

    // Terminal: no going back, no cancelling
    let err = app
        .services
        .order_status
        .set_status(id, OrderStatus::Pending, None)
        .await
        .expect_err("backward from delivered");
    assert!(matches!(err, ServiceError::InvalidTransition { .. }));

    let err = app
        .services
        .order_status
        .set_status(id, OrderStatus::Cancelled, Some("too late".to_string()))
        .await
        .expect_err("cancel after delivery");
    assert!(matches!(err, ServiceError::InvalidTransition { .. }));
}

#[tokio::test]
async fn delivery_settles_cod_payment() {
    let app = TestApp::new().await;
    let a = app.seed_variant("SKU-A", "shoes", dec!(100), 5).await;
    let outcome = place_order(&app, Uuid::new_v4(), a.id, "cod").await;
    let id = outcome.order.id;

    for target in [OrderStatus::Paid, OrderStatus::Shipped, OrderStatus::Delivered] {
        app.services
            .order_status
            .set_status(id, target, None)
            .await
            .expect("forward transition");
    }

    // Delivery is implicit collection for COD
    let pay = app.reload_payment(outcome.payment.id).await;
    assert!(pay.is_paid);
    assert_eq!(pay.status, "paid");
}

#[tokio::test]
async fn customer_cannot_cancel_paid_order() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let a = app.seed_variant("SKU-A", "shoes", dec!(100), 5).await;
    app.seed_wallet(customer, dec!(300)).await;
    let outcome = place_order(&app, customer, a.id, "wallet").await;

    let err = app
        .services
        .order_status
        .cancel_by_customer(outcome.order.id, "please".to_string())
        .await
        .expect_err("customer cancel only while pending");
    assert!(matches!(err, ServiceError::InvalidOperation(_)));
}

#[tokio::test]
async fn same_status_write_is_a_noop() {
    let app = TestApp::new().await;
    let a = app.seed_variant("SKU-A", "shoes", dec!(100), 5).await;
    let outcome = place_order(&app, Uuid::new_v4(), a.id, "cod").await;

    let unchanged = app
        .services
        .order_status
        .set_status(outcome.order.id, OrderStatus::Pending, None)
        .await
        .expect("no-op accepted");
    assert_eq!(unchanged.status, "pending");
    assert_eq!(unchanged.version, outcome.order.version);
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = TestApp::new().await;
    let err = app
        .services
        .order_status
        .set_status(Uuid::new_v4(), OrderStatus::Paid, None)
        .await
        .expect_err("missing order");
    assert!(matches!(err, ServiceError::NotFound(_)));
}
