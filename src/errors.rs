use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Error payload returned on every non-2xx response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Machine-readable code identifying the failed rule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Insufficient stock for SKU {0}")]
    InsufficientStock(String),

    #[error("Voucher error: {0}")]
    VoucherError(#[from] VoucherError),

    #[error("Insufficient wallet balance")]
    InsufficientBalance,

    #[error("Invalid status transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Unsupported payment method: {0}")]
    UnsupportedPaymentMethod(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal server error")]
    InternalServerError,

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Voucher validation failures, ordered the way the evaluator checks them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoucherError {
    #[error("Voucher code not found or inactive")]
    NotFound,
    #[error("Voucher is not valid at this time")]
    OutsideValidityWindow,
    #[error("Voucher usage limit reached")]
    LimitReached,
    #[error("Order subtotal below voucher minimum")]
    BelowMinimum,
    #[error("No order line matches the voucher scope")]
    ScopeMismatch,
}

impl VoucherError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "voucher_not_found",
            Self::OutsideValidityWindow => "voucher_expired",
            Self::LimitReached => "voucher_limit_reached",
            Self::BelowMinimum => "voucher_below_minimum",
            Self::ScopeMismatch => "voucher_scope_mismatch",
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalServerError | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::InvalidOperation(_)
            | Self::VoucherError(_)
            | Self::InvalidTransition { .. }
            | Self::UnsupportedPaymentMethod(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientStock(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InsufficientBalance | Self::PaymentFailed(_) => StatusCode::PAYMENT_REQUIRED,
            Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) | Self::ConcurrentModification(_) => StatusCode::CONFLICT,
            Self::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Machine-readable code identifying which rule failed.
    pub fn rule_code(&self) -> Option<String> {
        match self {
            Self::InsufficientStock(sku) => Some(format!("insufficient_stock:{sku}")),
            Self::VoucherError(v) => Some(v.code().to_string()),
            Self::InsufficientBalance => Some("insufficient_balance".to_string()),
            Self::InvalidTransition { .. } => Some("invalid_transition".to_string()),
            Self::UnsupportedPaymentMethod(_) => Some("unsupported_payment_method".to_string()),
            _ => None,
        }
    }

    /// Returns the message suitable for HTTP responses. Internal and
    /// security-sensitive errors collapse to generic text so no detail
    /// leaks to the caller.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) | Self::Other(_) => "Internal server error".to_string(),
            Self::InternalServerError => "Internal server error".to_string(),
            Self::InvalidSignature => "Unauthorized".to_string(),
            Self::ExternalServiceError(_) => "Upstream payment provider unavailable".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            code: self.rule_code(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InsufficientStock("SKU-A".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::InsufficientBalance.status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            ServiceError::InvalidSignature.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::ExternalServiceError("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ServiceError::VoucherError(VoucherError::LimitReached).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn rule_codes_identify_failed_rule() {
        assert_eq!(
            ServiceError::InsufficientStock("SKU-A".into()).rule_code(),
            Some("insufficient_stock:SKU-A".to_string())
        );
        assert_eq!(
            ServiceError::VoucherError(VoucherError::LimitReached).rule_code(),
            Some("voucher_limit_reached".to_string())
        );
        assert_eq!(
            ServiceError::InsufficientBalance.rule_code(),
            Some("insufficient_balance".to_string())
        );
        assert_eq!(ServiceError::NotFound("x".into()).rule_code(), None);
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("secret dsn".into())).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::InvalidSignature.response_message(),
            "Unauthorized"
        );
        // User-facing errors keep the actual message
        assert_eq!(
            ServiceError::NotFound("Order missing".into()).response_message(),
            "Not found: Order missing"
        );
    }

    #[tokio::test]
    async fn error_response_body_is_structured_json() {
        let response = ServiceError::InsufficientStock("SKU-B".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.code.as_deref(), Some("insufficient_stock:SKU-B"));
        assert!(payload.message.contains("SKU-B"));
    }
}
