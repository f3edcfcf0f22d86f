use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{wallet, wallet_transaction},
    errors::ServiceError,
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWalletRequest {
    pub customer_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DepositRequest {
    pub amount: Decimal,
    pub payment_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WalletResponse {
    pub wallet: wallet::Model,
    pub transactions: Vec<wallet_transaction::Model>,
}

// POST /api/v1/wallets
#[utoipa::path(
    post,
    path = "/api/v1/wallets",
    request_body = CreateWalletRequest,
    responses(
        (status = 201, description = "Wallet created"),
        (status = 409, description = "Customer already has a wallet", body = crate::errors::ErrorResponse)
    ),
    tag = "Wallets"
)]
pub async fn create_wallet(
    State(state): State<AppState>,
    Json(payload): Json<CreateWalletRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state
        .services
        .wallets
        .create_wallet(payload.customer_id)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

// GET /api/v1/wallets/{customer_id}
#[utoipa::path(
    get,
    path = "/api/v1/wallets/{customer_id}",
    params(("customer_id" = Uuid, Path, description = "Customer id")),
    responses(
        (status = 200, description = "Wallet with its transaction log"),
        (status = 404, description = "Wallet not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Wallets"
)]
pub async fn get_wallet(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let (w, transactions) = state
        .services
        .wallets
        .get_wallet_with_transactions(customer_id)
        .await?;
    Ok(Json(ApiResponse::success(WalletResponse {
        wallet: w,
        transactions,
    })))
}

// POST /api/v1/wallets/{customer_id}/deposit
#[utoipa::path(
    post,
    path = "/api/v1/wallets/{customer_id}/deposit",
    params(("customer_id" = Uuid, Path, description = "Customer id")),
    request_body = DepositRequest,
    responses(
        (status = 200, description = "Balance credited"),
        (status = 400, description = "Invalid amount", body = crate::errors::ErrorResponse)
    ),
    tag = "Wallets"
)]
pub async fn deposit(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Json(payload): Json<DepositRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .wallets
        .deposit(
            state.db.as_ref(),
            customer_id,
            payload.amount,
            payload.payment_id,
        )
        .await?;
    let (w, transactions) = state
        .services
        .wallets
        .get_wallet_with_transactions(customer_id)
        .await?;
    Ok(Json(ApiResponse::success(WalletResponse {
        wallet: w,
        transactions,
    })))
}
