use async_trait::async_trait;
use sea_orm::DatabaseTransaction;

use crate::errors::ServiceError;

use super::{
    new_transaction_ref, PaymentArtifact, PaymentContext, PaymentGateway, PaymentStatus,
    METHOD_COD,
};

/// Cash on delivery. No external call; the payment stays pending until the
/// order is delivered, at which point collection is implicit and the
/// lifecycle manager marks it paid.
pub struct CashOnDeliveryGateway;

#[async_trait]
impl PaymentGateway for CashOnDeliveryGateway {
    fn method(&self) -> &str {
        METHOD_COD
    }

    fn is_asynchronous(&self) -> bool {
        false
    }

    async fn create_pending(
        &self,
        _txn: &DatabaseTransaction,
        _ctx: &PaymentContext,
    ) -> Result<PaymentArtifact, ServiceError> {
        Ok(PaymentArtifact {
            method: METHOD_COD.to_string(),
            status: PaymentStatus::Pending,
            transaction_ref: format!("COD-{}", new_transaction_ref()),
            redirect_url: None,
        })
    }
}
