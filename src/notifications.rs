use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

/// A customer-facing notification record.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Notification collaborator consumed by the event processor. The checkout
/// core only depends on this trait; delivery transport is swappable.
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn notify(
        &self,
        customer_id: Uuid,
        subject: &str,
        body: &str,
    ) -> Result<(), NotificationError>;
}

/// Redis-backed notification store: pushes per-customer notification
/// records that a delivery worker or the storefront app can drain.
#[derive(Clone)]
pub struct RedisNotificationService {
    client: Arc<redis::Client>,
    /// Retained notifications per customer
    cap: isize,
}

impl RedisNotificationService {
    pub fn new(client: Arc<redis::Client>) -> Self {
        Self { client, cap: 100 }
    }

    fn key(customer_id: Uuid) -> String {
        format!("notifications:{customer_id}")
    }
}

#[async_trait]
impl NotificationService for RedisNotificationService {
    #[instrument(skip(self, body))]
    async fn notify(
        &self,
        customer_id: Uuid,
        subject: &str,
        body: &str,
    ) -> Result<(), NotificationError> {
        let notification = Notification {
            id: Uuid::new_v4(),
            customer_id,
            subject: subject.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
        };
        let payload = serde_json::to_string(&notification)?;

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = Self::key(customer_id);
        let _: () = conn.lpush(&key, payload).await?;
        let _: () = conn.ltrim(&key, 0, self.cap - 1).await?;

        debug!(%customer_id, subject, "Notification stored");
        Ok(())
    }
}

/// Log-only notifier for environments without a Redis instance (tests).
#[derive(Clone, Default)]
pub struct LogNotificationService;

#[async_trait]
impl NotificationService for LogNotificationService {
    async fn notify(
        &self,
        customer_id: Uuid,
        subject: &str,
        body: &str,
    ) -> Result<(), NotificationError> {
        tracing::info!(%customer_id, subject, body, "notification");
        Ok(())
    }
}
