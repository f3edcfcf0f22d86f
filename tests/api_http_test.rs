//! HTTP-level tests: the axum router wired to real services, driven with
//! `tower::ServiceExt::oneshot`.

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use common::TestApp;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

async fn build_router(app: &TestApp) -> Router {
    let cfg = storefront_api::config::AppConfig::new(
        "sqlite::memory:".to_string(),
        "redis://127.0.0.1:6379".to_string(),
        "test".to_string(),
    );
    let (event_tx, _event_rx) = mpsc::channel(16);
    let state = storefront_api::AppState {
        db: app.db.clone(),
        config: cfg,
        event_sender: storefront_api::events::EventSender::new(event_tx),
        services: app.services.clone(),
        redis: Arc::new(redis::Client::open("redis://127.0.0.1:6379").unwrap()),
    };
    Router::new()
        .nest("/api/v1", storefront_api::api_v1_routes())
        .with_state(state)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("json body")
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn checkout_endpoint_returns_201_with_order_and_payment() {
    let app = TestApp::new().await;
    let router = build_router(&app).await;
    let a = app.seed_variant("SKU-A", "shoes", dec!(100), 5).await;

    let payload = json!({
        "customer_id": Uuid::new_v4(),
        "items": [{"variant_id": a.id, "quantity": 2, "unit_price": "100"}],
        "shipping_address": "12 Nguyen Trai, District 1",
        "recipient_name": "Nguyen Van A",
        "recipient_phone": "0901234567",
        "shipping_fee": "30",
        "payment_method": "cod"
    });
    let response = router
        .oneshot(json_request(Method::POST, "/api/v1/orders/checkout", payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["order"]["status"], json!("pending"));
    assert_eq!(body["data"]["payment"]["method"], json!("cod"));
}

#[tokio::test]
async fn stock_failure_maps_to_422_with_machine_readable_code() {
    let app = TestApp::new().await;
    let router = build_router(&app).await;
    let a = app.seed_variant("SKU-A", "shoes", dec!(100), 1).await;

    let payload = json!({
        "customer_id": Uuid::new_v4(),
        "items": [{"variant_id": a.id, "quantity": 2, "unit_price": "100"}],
        "shipping_address": "12 Nguyen Trai, District 1",
        "recipient_name": "Nguyen Van A",
        "recipient_phone": "0901234567",
        "shipping_fee": "30",
        "payment_method": "cod"
    });
    let response = router
        .oneshot(json_request(Method::POST, "/api/v1/orders/checkout", payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["code"], json!("insufficient_stock:SKU-A"));
}

#[tokio::test]
async fn order_status_update_and_detail_roundtrip() {
    let app = TestApp::new().await;
    let a = app.seed_variant("SKU-A", "shoes", dec!(100), 5).await;
    let customer = Uuid::new_v4();

    // Create through the service, then drive the HTTP surface
    let outcome = app
        .services
        .checkout
        .checkout(
            storefront_api::services::checkout::CheckoutRequest {
                customer_id: customer,
                items: vec![storefront_api::services::checkout::CheckoutLine {
                    variant_id: a.id,
                    quantity: 1,
                    unit_price: dec!(100),
                }],
                shipping_address: "12 Nguyen Trai, District 1".to_string(),
                recipient_name: "Nguyen Van A".to_string(),
                recipient_phone: "0901234567".to_string(),
                shipping_fee: dec!(30),
                payment_method: "cod".to_string(),
                voucher_code: None,
            },
            "127.0.0.1".to_string(),
        )
        .await
        .unwrap();

    let router = build_router(&app).await;
    let response = router
        .clone()
        .oneshot(json_request(
            Method::PUT,
            &format!("/api/v1/orders/{}", outcome.order.id),
            json!({"status": "paid"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["status"], json!("paid"));

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri(format!("/api/v1/orders/{}", outcome.order.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["order"]["status"], json!("paid"));
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);

    // Cancelling without a reason is a 400
    let response = router
        .oneshot(json_request(
            Method::PUT,
            &format!("/api/v1/orders/{}", outcome.order.id),
            json!({"status": "cancelled"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_order_is_404() {
    let app = TestApp::new().await;
    let router = build_router(&app).await;
    let response = router
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri(format!("/api/v1/orders/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn callback_endpoint_always_acks_200() {
    let app = TestApp::new().await;
    let router = build_router(&app).await;

    // Unsigned garbage: 200 with checksum-failure ack, nothing leaked
    let response = router
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri(format!(
                    "/api/v1/payments/callback/{}?vnp_TxnRef=x&vnp_ResponseCode=00&vnp_Amount=100",
                    common::GATEWAY
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["RspCode"], json!("97"));
}

#[tokio::test]
async fn wallet_endpoints_roundtrip() {
    let app = TestApp::new().await;
    let router = build_router(&app).await;
    let customer = Uuid::new_v4();

    let response = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/wallets",
            json!({"customer_id": customer}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/wallets/{customer}/deposit"),
            json!({"amount": "150"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["wallet"]["balance"], json!("150"));
    assert_eq!(body["data"]["transactions"].as_array().unwrap().len(), 1);

    // Double-create conflicts
    let response = router
        .oneshot(json_request(
            Method::POST,
            "/api/v1/wallets",
            json!({"customer_id": customer}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
