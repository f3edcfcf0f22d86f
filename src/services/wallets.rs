use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{wallet, wallet_transaction},
    errors::ServiceError,
};

/// Per-customer stored-balance accounts with an append-only ledger.
///
/// Every balance mutation pairs with exactly one ledger row, written on the
/// same connection so wallet state and audit trail commit or roll back
/// together. Debits are conditional (`balance >= amount`) at the database,
/// which keeps concurrent wallet payments from driving a balance negative.
#[derive(Clone)]
pub struct WalletService {
    db: Arc<DatabaseConnection>,
}

impl WalletService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates a wallet for the customer; each customer has at most one.
    #[instrument(skip(self))]
    pub async fn create_wallet(&self, customer_id: Uuid) -> Result<wallet::Model, ServiceError> {
        if self.find_wallet(customer_id).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Customer {customer_id} already has a wallet"
            )));
        }
        let model = wallet::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            balance: Set(Decimal::ZERO),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        };
        let created = model.insert(&*self.db).await?;
        info!(wallet_id = %created.id, "Wallet created");
        Ok(created)
    }

    pub async fn find_wallet(
        &self,
        customer_id: Uuid,
    ) -> Result<Option<wallet::Model>, ServiceError> {
        Ok(wallet::Entity::find()
            .filter(wallet::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?)
    }

    /// Wallet plus its ledger, newest entries first.
    pub async fn get_wallet_with_transactions(
        &self,
        customer_id: Uuid,
    ) -> Result<(wallet::Model, Vec<wallet_transaction::Model>), ServiceError> {
        let w = self.find_wallet(customer_id).await?.ok_or_else(|| {
            ServiceError::NotFound(format!("Wallet for customer {customer_id} not found"))
        })?;
        let log = wallet_transaction::Entity::find()
            .filter(wallet_transaction::Column::WalletId.eq(w.id))
            .order_by_desc(wallet_transaction::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok((w, log))
    }

    /// Fetches the customer's wallet, creating it when absent. Runs on the
    /// caller's connection so refund compensation can create wallets inside
    /// its transaction.
    pub async fn ensure_wallet<C: ConnectionTrait>(
        &self,
        conn: &C,
        customer_id: Uuid,
    ) -> Result<wallet::Model, ServiceError> {
        if let Some(w) = wallet::Entity::find()
            .filter(wallet::Column::CustomerId.eq(customer_id))
            .one(conn)
            .await?
        {
            return Ok(w);
        }
        let model = wallet::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            balance: Set(Decimal::ZERO),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        };
        Ok(model.insert(conn).await?)
    }

    /// Credits `amount` and appends a `deposit` ledger row.
    #[instrument(skip(self, conn))]
    pub async fn deposit<C: ConnectionTrait>(
        &self,
        conn: &C,
        customer_id: Uuid,
        amount: Decimal,
        payment_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Deposit amount must be positive".to_string(),
            ));
        }
        let w = self.ensure_wallet(conn, customer_id).await?;

        wallet::Entity::update_many()
            .col_expr(
                wallet::Column::Balance,
                Expr::col(wallet::Column::Balance).add(amount),
            )
            .col_expr(wallet::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(wallet::Column::Id.eq(w.id))
            .exec(conn)
            .await?;

        self.append_ledger(conn, w.id, payment_id, "deposit", amount)
            .await?;
        info!(wallet_id = %w.id, %amount, "Wallet credited");
        Ok(())
    }

    /// Debits `amount` only if the balance covers it, and appends a
    /// `withdraw` ledger row. The balance check and subtraction are one
    /// conditional UPDATE.
    #[instrument(skip(self, conn))]
    pub async fn debit<C: ConnectionTrait>(
        &self,
        conn: &C,
        customer_id: Uuid,
        amount: Decimal,
        payment_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Debit amount must be positive".to_string(),
            ));
        }

        let result = wallet::Entity::update_many()
            .col_expr(
                wallet::Column::Balance,
                Expr::col(wallet::Column::Balance).sub(amount),
            )
            .col_expr(wallet::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(wallet::Column::CustomerId.eq(customer_id))
            .filter(wallet::Column::Balance.gte(amount))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            // Distinguish a missing wallet from an underfunded one; the
            // lookup is for the error shape only, no mutation follows it.
            let exists = wallet::Entity::find()
                .filter(wallet::Column::CustomerId.eq(customer_id))
                .one(conn)
                .await?
                .is_some();
            return if exists {
                Err(ServiceError::InsufficientBalance)
            } else {
                Err(ServiceError::NotFound(format!(
                    "Wallet for customer {customer_id} not found"
                )))
            };
        }

        let w = wallet::Entity::find()
            .filter(wallet::Column::CustomerId.eq(customer_id))
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Wallet for customer {customer_id} not found"))
            })?;
        self.append_ledger(conn, w.id, payment_id, "withdraw", amount)
            .await?;
        info!(wallet_id = %w.id, %amount, "Wallet debited");
        Ok(())
    }

    async fn append_ledger<C: ConnectionTrait>(
        &self,
        conn: &C,
        wallet_id: Uuid,
        payment_id: Option<Uuid>,
        kind: &str,
        amount: Decimal,
    ) -> Result<(), ServiceError> {
        let entry = wallet_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            wallet_id: Set(wallet_id),
            payment_id: Set(payment_id),
            kind: Set(kind.to_string()),
            amount: Set(amount),
            created_at: Set(Utc::now()),
        };
        entry.insert(conn).await?;
        Ok(())
    }
}
