use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use std::collections::HashMap;

use crate::{errors::ServiceError, AppState};

// GET /api/v1/payments/callback/{provider}
//
// Inbound provider notification (IPN). The response is always HTTP 200
// with a provider ack code so the provider stops retrying; the signature
// check happens before any state is touched and a mismatch changes
// nothing.
#[utoipa::path(
    get,
    path = "/api/v1/payments/callback/{provider}",
    params(("provider" = String, Path, description = "Configured gateway name")),
    responses(
        (status = 200, description = "Provider acknowledgement", body = crate::services::payments::CallbackAck),
        (status = 404, description = "Unknown provider", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn gateway_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ServiceError> {
    let ack = state
        .services
        .payments
        .resolve_callback(&provider, params)
        .await?;
    Ok((StatusCode::OK, Json(ack)))
}
