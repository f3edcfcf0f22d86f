use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{errors::ServiceError, ApiResponse, AppState};

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentStatusResponse {
    pub status: String,
    pub is_paid: bool,
}

// GET /api/v1/payments/{id}
#[utoipa::path(
    get,
    path = "/api/v1/payments/{id}",
    params(("id" = Uuid, Path, description = "Payment id")),
    responses(
        (status = 200, description = "Payment record"),
        (status = 404, description = "Payment not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let payment = state.services.payments.get_payment(id).await?;
    Ok(Json(ApiResponse::success(payment)))
}

// GET /api/v1/payments/{id}/status
#[utoipa::path(
    get,
    path = "/api/v1/payments/{id}/status",
    params(("id" = Uuid, Path, description = "Payment id")),
    responses(
        (status = 200, description = "Current payment status"),
        (status = 404, description = "Payment not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn get_payment_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let payment = state.services.payments.get_payment(id).await?;
    Ok(Json(ApiResponse::success(PaymentStatusResponse {
        status: payment.status,
        is_paid: payment.is_paid,
    })))
}
