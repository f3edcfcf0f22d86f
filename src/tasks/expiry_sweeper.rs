use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    entities::{order, payment},
    errors::ServiceError,
    services::order_status::OrderStatusService,
};

/// Reason recorded on orders the sweeper cancels.
pub const EXPIRY_REASON: &str = "payment window expired";

/// Recurring task that force-cancels orders stuck in `pending` past the
/// payment window of an asynchronous gateway, with the standard
/// compensation path.
///
/// Safe to run concurrently with live gateway callbacks: the lifecycle
/// manager only applies the cancellation if the order is still pending at
/// the moment of the write, so a last-moment successful payment is never
/// overwritten.
pub struct ExpirySweeper {
    db: Arc<DatabaseConnection>,
    order_status: OrderStatusService,
    /// Payment methods whose pending orders are subject to expiry
    async_methods: Vec<String>,
    timeout: ChronoDuration,
    sweep_interval: Duration,
}

impl ExpirySweeper {
    pub fn new(
        db: Arc<DatabaseConnection>,
        order_status: OrderStatusService,
        async_methods: Vec<String>,
        expiry_minutes: i64,
        sweep_interval_secs: u64,
    ) -> Self {
        Self {
            db,
            order_status,
            async_methods,
            timeout: ChronoDuration::minutes(expiry_minutes),
            sweep_interval: Duration::from_secs(sweep_interval_secs),
        }
    }

    /// Spawns the periodic sweep loop.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if self.async_methods.is_empty() {
                info!("No asynchronous gateways configured; expiry sweeper idle");
                return;
            }
            let mut ticker = interval(self.sweep_interval);
            loop {
                ticker.tick().await;
                match self.sweep_once().await {
                    Ok(0) => {}
                    Ok(n) => info!(cancelled = n, "Expiry sweep cancelled stale orders"),
                    Err(e) => error!("Expiry sweep failed: {}", e),
                }
            }
        })
    }

    /// One pass: find and cancel every expired pending order. Returns how
    /// many orders this pass actually cancelled; orders that resolve
    /// between the scan and the write count as no-ops, not errors.
    #[instrument(skip(self))]
    pub async fn sweep_once(&self) -> Result<usize, ServiceError> {
        let cutoff = Utc::now() - self.timeout;

        let stale = order::Entity::find()
            .filter(order::Column::Status.eq("pending"))
            .filter(order::Column::CreatedAt.lte(cutoff))
            .all(&*self.db)
            .await?;
        if stale.is_empty() {
            return Ok(0);
        }

        // Only orders whose current payment rides an asynchronous gateway
        // expire; COD and wallet orders have no payment window.
        let payment_ids: Vec<Uuid> = stale.iter().map(|o| o.payment_id).collect();
        let methods: HashMap<Uuid, String> = payment::Entity::find()
            .filter(payment::Column::Id.is_in(payment_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p.method))
            .collect();

        let mut cancelled = 0;
        for ord in stale {
            let Some(method) = methods.get(&ord.payment_id) else {
                continue;
            };
            if !self.async_methods.contains(method) {
                continue;
            }
            if self
                .order_status
                .cancel_if_pending(ord.id, EXPIRY_REASON)
                .await?
            {
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }
}
