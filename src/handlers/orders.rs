use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{order, order_item},
    errors::ServiceError,
    services::{
        checkout::{CheckoutOutcome, CheckoutRequest},
        order_status::OrderStatus,
        payments::RetryOutcome,
    },
    ApiResponse, AppState, ListQuery, PaginatedResponse,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelOrderRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RetryPaymentRequest {
    pub payment_method: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetailResponse {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RetryPaymentResponse {
    pub payment: crate::entities::payment::Model,
    pub redirect_url: Option<String>,
}

impl From<RetryOutcome> for RetryPaymentResponse {
    fn from(outcome: RetryOutcome) -> Self {
        Self {
            payment: outcome.payment,
            redirect_url: outcome.redirect_url,
        }
    }
}

/// Client address for gateway requests: proxy header first, matching how
/// the storefront terminates TLS.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

// POST /api/v1/orders/checkout
#[utoipa::path(
    post,
    path = "/api/v1/orders/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order and payment created"),
        (status = 400, description = "Validation or voucher failure", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome: CheckoutOutcome = state
        .services
        .checkout
        .checkout(payload, client_ip(&headers))
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(outcome))))
}

// GET /api/v1/orders
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(ListQuery),
    responses((status = 200, description = "Paginated orders, newest first")),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (orders, total) = state
        .services
        .orders
        .list_orders(query.page, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: orders,
        total,
        page: query.page,
        limit: query.limit,
    })))
}

// GET /api/v1/orders/{id}
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with line items"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let (ord, items) = state.services.orders.get_order(id).await?;
    Ok(Json(ApiResponse::success(OrderDetailResponse {
        order: ord,
        items,
    })))
}

// GET /api/v1/orders/customer/{customer_id}
#[utoipa::path(
    get,
    path = "/api/v1/orders/customer/{customer_id}",
    params(
        ("customer_id" = Uuid, Path, description = "Customer id"),
        ListQuery
    ),
    responses((status = 200, description = "The customer's orders, newest first")),
    tag = "Orders"
)]
pub async fn list_customer_orders(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (orders, total) = state
        .services
        .orders
        .list_orders_for_customer(customer_id, query.page, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: orders,
        total,
        page: query.page,
        limit: query.limit,
    })))
}

// PUT /api/v1/orders/{id}
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Order updated"),
        (status = 400, description = "Invalid status or missing reason", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let new_status = OrderStatus::parse(&payload.status).ok_or_else(|| {
        ServiceError::ValidationError(format!("Unknown order status: {}", payload.status))
    })?;
    let updated = state
        .services
        .order_status
        .set_status(id, new_status, payload.reason)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

// POST /api/v1/orders/{id}/cancel
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Order cancelled with compensation"),
        (status = 400, description = "Order is not cancellable by the customer", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let updated = state
        .services
        .order_status
        .cancel_by_customer(id, payload.reason)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

// POST /api/v1/orders/{id}/retry-payment
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/retry-payment",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = RetryPaymentRequest,
    responses(
        (status = 200, description = "New or reused payment attempt"),
        (status = 400, description = "Order not pending or already paid", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn retry_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<RetryPaymentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .services
        .payments
        .retry(id, &payload.payment_method, client_ip(&headers))
        .await?;
    Ok(Json(ApiResponse::success(RetryPaymentResponse::from(
        outcome,
    ))))
}

// POST /api/v1/orders/{id}/pay-with-wallet
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/pay-with-wallet",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Wallet debited, order paid"),
        (status = 402, description = "Insufficient wallet balance", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn pay_with_wallet(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .services
        .payments
        .pay_with_wallet(id, client_ip(&headers))
        .await?;
    Ok(Json(ApiResponse::success(RetryPaymentResponse::from(
        outcome,
    ))))
}
