//! Background processor for the email outbox. Status changes only enqueue;
//! this loop owns delivery, retries with backoff, and dead-letters rows
//! that keep failing, so a broken SMTP relay never surfaces to the caller
//! that changed the status.

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio::time;
use tracing::{error, info, warn};

use shared::FulfillmentStatus;

use crate::mailer::Mailer;
use crate::models::EmailNotification;
use crate::store::OrderStore;

const TICK_SECS: u64 = 5;
const BATCH_LIMIT: i64 = 100;
const MAX_ATTEMPTS: i32 = 5;

pub struct OutboxProcessor {
    store: OrderStore,
    mailer: Mailer,
}

impl OutboxProcessor {
    pub fn new(store: OrderStore, mailer: Mailer) -> Self {
        Self { store, mailer }
    }

    pub async fn run(&self) {
        let mut interval = time::interval(Duration::from_secs(TICK_SECS));

        loop {
            interval.tick().await;

            if let Err(e) = self.process_due().await {
                error!("Error processing email outbox: {}", e);
            }
        }
    }

    async fn process_due(&self) -> Result<()> {
        let due = self.store.due_notifications(BATCH_LIMIT).await?;

        for notification in due {
            match self.deliver(&notification).await {
                Ok(()) => {
                    self.store.mark_notification_sent(notification.id).await?;
                    info!(
                        "Sent {} status email for order {}",
                        notification.status, notification.order_id
                    );
                }
                Err(e) => {
                    let attempts = notification.attempts + 1;
                    let dead = attempts >= MAX_ATTEMPTS;
                    let next_attempt_at = Utc::now() + backoff_delay(attempts);
                    if dead {
                        error!(
                            "Dead-lettering {} status email for order {} after {} attempts: {:#}",
                            notification.status, notification.order_id, attempts, e
                        );
                    } else {
                        warn!(
                            "Failed to send {} status email for order {} (attempt {}): {:#}",
                            notification.status, notification.order_id, attempts, e
                        );
                    }
                    self.store
                        .record_notification_failure(
                            notification.id,
                            attempts,
                            next_attempt_at,
                            dead,
                            &format!("{:#}", e),
                        )
                        .await?;
                }
            }
        }

        Ok(())
    }

    async fn deliver(&self, notification: &EmailNotification) -> Result<()> {
        let status: FulfillmentStatus = notification.status.parse().unwrap_or_default();

        // Re-read the order so the email carries the current tracking number,
        // not whatever was set at enqueue time.
        let tracking_number = self
            .store
            .find_by_order_id(&notification.order_id)
            .await?
            .and_then(|order| order.tracking_number);

        self.mailer
            .send_status_email(
                &notification.recipient,
                &notification.order_id,
                status,
                tracking_number.as_deref(),
            )
            .await
    }
}

/// Exponential backoff: 30s, 60s, 120s, ... capped at one hour.
pub fn backoff_delay(attempts: i32) -> ChronoDuration {
    let exponent = attempts.clamp(1, 8) - 1;
    let seconds = (30i64 << exponent).min(3600);
    ChronoDuration::seconds(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(1).num_seconds(), 30);
        assert_eq!(backoff_delay(2).num_seconds(), 60);
        assert_eq!(backoff_delay(3).num_seconds(), 120);
    }

    #[test]
    fn backoff_is_capped_at_one_hour() {
        assert_eq!(backoff_delay(8).num_seconds(), 3600);
        assert_eq!(backoff_delay(50).num_seconds(), 3600);
    }

    #[test]
    fn backoff_never_underflows_on_zero_attempts() {
        assert_eq!(backoff_delay(0).num_seconds(), 30);
    }
}
