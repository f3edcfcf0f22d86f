//! Storefront API Library
//!
//! Order checkout, payment gateway reconciliation, and inventory-safe
//! order lifecycle management.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod notifications;
pub mod openapi;
pub mod services;
pub mod tasks;

use axum::{
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
    pub redis: Arc<redis::Client>,
}

// Common query parameters for list endpoints
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
        }
    }
}

// Full v1 API surface
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        // Orders
        .route("/orders/checkout", post(handlers::orders::checkout))
        .route("/orders", get(handlers::orders::list_orders))
        .route(
            "/orders/customer/{customer_id}",
            get(handlers::orders::list_customer_orders),
        )
        .route(
            "/orders/{id}",
            get(handlers::orders::get_order).put(handlers::orders::update_order_status),
        )
        .route("/orders/{id}/cancel", post(handlers::orders::cancel_order))
        .route(
            "/orders/{id}/retry-payment",
            post(handlers::orders::retry_payment),
        )
        .route(
            "/orders/{id}/pay-with-wallet",
            post(handlers::orders::pay_with_wallet),
        )
        // Payments
        .route("/payments/{id}", get(handlers::payments::get_payment))
        .route(
            "/payments/{id}/status",
            get(handlers::payments::get_payment_status),
        )
        .route(
            "/payments/callback/{provider}",
            get(handlers::callbacks::gateway_callback),
        )
        // Wallets
        .route("/wallets", post(handlers::wallets::create_wallet))
        .route("/wallets/{customer_id}", get(handlers::wallets::get_wallet))
        .route(
            "/wallets/{customer_id}/deposit",
            post(handlers::wallets::deposit),
        )
}
