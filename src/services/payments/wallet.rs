use async_trait::async_trait;
use sea_orm::DatabaseTransaction;

use crate::{errors::ServiceError, services::wallets::WalletService};

use super::{
    new_transaction_ref, PaymentArtifact, PaymentContext, PaymentGateway, PaymentStatus,
    METHOD_WALLET,
};

/// Wallet balance payment. Settlement is synchronous: the conditional
/// debit, the withdraw ledger row, and the paid artifact happen in one
/// step on the caller's transaction, so this method has no pending state.
pub struct WalletPaymentGateway {
    wallets: WalletService,
}

impl WalletPaymentGateway {
    pub fn new(wallets: WalletService) -> Self {
        Self { wallets }
    }
}

#[async_trait]
impl PaymentGateway for WalletPaymentGateway {
    fn method(&self) -> &str {
        METHOD_WALLET
    }

    fn is_asynchronous(&self) -> bool {
        false
    }

    async fn create_pending(
        &self,
        txn: &DatabaseTransaction,
        ctx: &PaymentContext,
    ) -> Result<PaymentArtifact, ServiceError> {
        self.wallets
            .debit(txn, ctx.customer_id, ctx.amount, Some(ctx.payment_id))
            .await?;

        Ok(PaymentArtifact {
            method: METHOD_WALLET.to_string(),
            status: PaymentStatus::Paid,
            transaction_ref: format!("WAL-{}", new_transaction_ref()),
            redirect_url: None,
        })
    }
}
