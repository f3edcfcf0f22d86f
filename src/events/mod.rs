use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::notifications::NotificationService;

/// Domain events emitted by the checkout and order lifecycle services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        customer_id: Uuid,
        status: String,
        total_amount: Decimal,
    },
    OrderStatusChanged {
        order_id: Uuid,
        customer_id: Uuid,
        old_status: String,
        new_status: String,
        reason: Option<String>,
    },
    PaymentResolved {
        payment_id: Uuid,
        order_id: Uuid,
        status: String,
    },
    WalletRefundIssued {
        customer_id: Uuid,
        order_id: Uuid,
        amount: Decimal,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously. Event delivery is best-effort and
    /// never fails the surrounding business operation.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!("Failed to enqueue event: {}", e);
        }
    }
}

/// Consumes the event stream and forwards customer-facing changes to the
/// notification collaborator. Runs as a spawned background task.
pub async fn process_events(
    mut receiver: mpsc::Receiver<Event>,
    notifier: Arc<dyn NotificationService>,
) {
    while let Some(event) = receiver.recv().await {
        info!(?event, "Processing event");
        match &event {
            Event::OrderCreated {
                order_id,
                customer_id,
                status,
                total_amount,
            } => {
                let subject = "Order received".to_string();
                let body = format!(
                    "Your order {} for {} was created and is now {}.",
                    order_id, total_amount, status
                );
                dispatch(&*notifier, *customer_id, &subject, &body).await;
            }
            Event::OrderStatusChanged {
                order_id,
                customer_id,
                new_status,
                reason,
                ..
            } => {
                let subject = format!("Order {}", new_status);
                let body = match reason {
                    Some(reason) => format!(
                        "Your order {} is now {} (reason: {}).",
                        order_id, new_status, reason
                    ),
                    None => format!("Your order {} is now {}.", order_id, new_status),
                };
                dispatch(&*notifier, *customer_id, &subject, &body).await;
            }
            Event::WalletRefundIssued {
                customer_id,
                order_id,
                amount,
            } => {
                let subject = "Refund issued".to_string();
                let body = format!(
                    "{} was credited to your wallet for order {}.",
                    amount, order_id
                );
                dispatch(&*notifier, *customer_id, &subject, &body).await;
            }
            Event::PaymentResolved { .. } => {
                // Payment resolution is customer-visible through the order
                // status change that accompanies it.
            }
        }
    }
    info!("Event channel closed; processor exiting");
}

async fn dispatch(notifier: &dyn NotificationService, customer_id: Uuid, subject: &str, body: &str) {
    if let Err(e) = notifier.notify(customer_id, subject, body).await {
        warn!(%customer_id, "Notification dispatch failed: {}", e);
    }
}
