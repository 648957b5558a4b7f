//! The four reconciliation jobs: Push, Pull/Sync, Push-Status, Poll-Status.
//! Each is a standalone operation over the local store and the external
//! client; none of them shares state with another invocation.

use futures::{stream, StreamExt};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};

use shared::{FulfillmentStatus, OrderPayload, ShippingAddress, VALID_UPDATE_STATUSES};

use crate::ecwid::{
    local_order_key, EcwidClient, EcwidError, EcwidOrder, EcwidOrderItem, EcwidOrderPatch,
    EcwidPerson, EcwidShippingOption, ListQuery, NewEcwidOrder,
};
use crate::models::{NewOrder, Order};
use crate::store::OrderStore;

/// In-flight external fetches during Poll-Status. The external API documents
/// no concurrency guarantee.
const POLL_CONCURRENCY: usize = 4;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    External(#[from] EcwidError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug)]
pub struct PushOutcome {
    pub ecwid_order_id: String,
    pub order_number: Option<i64>,
}

#[derive(Debug, Default)]
pub struct SyncSummary {
    pub synced: usize,
    pub created: usize,
    pub updated: usize,
    pub total: i64,
}

#[derive(Debug, Default)]
pub struct PollSummary {
    pub checked: usize,
    pub updated: usize,
    pub emails_sent: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub order_id: String,
    #[serde(default)]
    pub ecwid_order_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

#[derive(Debug, Default)]
struct CheckOutcome {
    updated: bool,
    emailed: bool,
}

enum SyncOutcome {
    Created,
    Updated,
    Unchanged,
}

#[derive(Clone)]
pub struct Reconciler {
    store: OrderStore,
    ecwid: EcwidClient,
}

impl Reconciler {
    pub fn new(store: OrderStore, ecwid: EcwidClient) -> Self {
        Self { store, ecwid }
    }

    /// Push: create the external representation of a freshly paid order.
    ///
    /// The local row stays valid and un-linked when the external create
    /// fails; nothing retries automatically, a human re-triggers.
    pub async fn push_order(&self, payload: OrderPayload) -> Result<PushOutcome, JobError> {
        let Some(payment_id) = payload.payment_id.clone() else {
            return Err(JobError::Validation(format!(
                "Order {} has no captured payment and cannot be pushed as PAID",
                payload.order_id
            )));
        };

        let row = NewOrder::from_payload(&payload)?;
        self.store.insert_if_absent(&row).await?;

        let external = build_ecwid_order(&payload, &payment_id);
        let created = self.ecwid.create_order(&external).await?;

        let ecwid_order_id = created.id.to_string();
        self.store
            .set_ecwid_order_id(&payload.order_id, &ecwid_order_id)
            .await?;
        info!(
            "Pushed order {} to Ecwid as {}",
            payload.order_id, ecwid_order_id
        );

        Ok(PushOutcome {
            ecwid_order_id,
            order_number: created.order_number,
        })
    }

    /// Pull/Sync: import a page of recent external orders. Safe to re-run;
    /// unchanged orders are recognized and skipped.
    pub async fn sync_orders(&self, query: ListQuery) -> Result<SyncSummary, JobError> {
        let page = self.ecwid.list_orders(&query).await?;

        let mut summary = SyncSummary {
            total: page.total,
            ..SyncSummary::default()
        };

        for remote in &page.items {
            let key = local_order_key(remote);
            match self.sync_one(&key, remote).await {
                Ok(SyncOutcome::Created) => {
                    summary.created += 1;
                    summary.synced += 1;
                }
                Ok(SyncOutcome::Updated) => {
                    summary.updated += 1;
                    summary.synced += 1;
                }
                Ok(SyncOutcome::Unchanged) => summary.synced += 1,
                Err(e) => error!("Failed to sync external order {}: {:#}", key, e),
            }
        }

        info!(
            "Synced {} external orders ({} created, {} updated)",
            summary.synced, summary.created, summary.updated
        );
        Ok(summary)
    }

    async fn sync_one(&self, key: &str, remote: &EcwidOrder) -> anyhow::Result<SyncOutcome> {
        let status = remote.local_status();
        let existing = self.store.find_by_order_id(key).await?;

        if let Some(current) = &existing {
            let remote_link = remote.id.to_string();
            let same_status = current.fulfillment_status == status.as_str();
            let same_tracking = current.tracking_number == remote.tracking_number;
            let same_link = current.ecwid_order_id.as_deref() == Some(remote_link.as_str());
            if same_status && same_tracking && same_link {
                return Ok(SyncOutcome::Unchanged);
            }
        }

        let row = NewOrder::from_remote(key, remote, status)?;
        self.store.upsert_from_remote(&row).await?;

        Ok(if existing.is_some() {
            SyncOutcome::Updated
        } else {
            SyncOutcome::Created
        })
    }

    /// Push-Status: propagate a local status change outward, then queue the
    /// customer notification. The external update is best-effort; the local
    /// write is what decides success.
    pub async fn push_status(&self, update: StatusUpdate) -> Result<String, JobError> {
        let status = update
            .status
            .parse::<FulfillmentStatus>()
            .ok()
            .filter(|s| s.to_external().is_some())
            .ok_or_else(|| {
                JobError::Validation(format!(
                    "Invalid status: {}. Valid values: {}",
                    update.status,
                    VALID_UPDATE_STATUSES.join(", ")
                ))
            })?;

        let order = self
            .store
            .find_by_order_id(&update.order_id)
            .await?
            .ok_or_else(|| JobError::NotFound(format!("Order {} not found", update.order_id)))?;

        let ecwid_order_id = update.ecwid_order_id.or_else(|| order.ecwid_order_id.clone());
        if let Some(ecwid_id) = ecwid_order_id {
            let patch = EcwidOrderPatch {
                fulfillment_status: status.to_external().map(|s| s.as_str().to_string()),
                tracking_number: update.tracking_number.clone(),
            };
            if let Err(e) = self.ecwid.update_order(&ecwid_id, &patch).await {
                warn!(
                    "Best-effort Ecwid update for order {} failed: {:#}",
                    update.order_id, e
                );
            }
        }

        let applied = self
            .store
            .update_status(
                &order.order_id,
                order.version,
                status,
                update.tracking_number.as_deref(),
            )
            .await?;
        if !applied {
            return Err(JobError::Conflict(format!(
                "Order {} was modified concurrently, re-read and retry",
                update.order_id
            )));
        }

        // Queued, not sent: the outbox processor owns delivery, so a broken
        // SMTP relay cannot fail the status change.
        if let Err(e) = self.store.enqueue_notification(&order, status).await {
            warn!(
                "Failed to queue {} notification for order {}: {:#}",
                status, update.order_id, e
            );
        }

        Ok(format!("Order status updated to {}", status))
    }

    /// Poll-Status: detect drift for every linked, undelivered order. One
    /// order's failure never aborts the batch.
    pub async fn poll_status(&self) -> Result<PollSummary, JobError> {
        let orders = self.store.find_needing_status_check().await?;
        let checked = orders.len();

        let outcomes: Vec<CheckOutcome> = stream::iter(orders.into_iter().map(|order| {
            let reconciler = self.clone();
            async move {
                let order_id = order.order_id.clone();
                match reconciler.check_one(order).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("Status check failed for order {}: {:#}", order_id, e);
                        CheckOutcome::default()
                    }
                }
            }
        }))
        .buffer_unordered(POLL_CONCURRENCY)
        .collect()
        .await;

        let summary = PollSummary {
            checked,
            updated: outcomes.iter().filter(|o| o.updated).count(),
            emails_sent: outcomes.iter().filter(|o| o.emailed).count(),
        };
        info!(
            "Checked {} orders, {} drifted, {} notifications queued",
            summary.checked, summary.updated, summary.emails_sent
        );
        Ok(summary)
    }

    async fn check_one(&self, order: Order) -> anyhow::Result<CheckOutcome> {
        let Some(ecwid_id) = order.ecwid_order_id.clone() else {
            return Ok(CheckOutcome::default());
        };

        let remote = self.ecwid.get_order(&ecwid_id).await?;
        let remote_status = remote.local_status();
        if remote_status == order.status() {
            return Ok(CheckOutcome::default());
        }

        let tracking_number = match (&remote.tracking_number, &order.tracking_number) {
            (Some(remote_tracking), stored) if stored.as_deref() != Some(remote_tracking) => {
                Some(remote_tracking.as_str())
            }
            _ => None,
        };

        let applied = self
            .store
            .update_status(&order.order_id, order.version, remote_status, tracking_number)
            .await?;
        if !applied {
            warn!(
                "Order {} changed while polling, leaving it for the next run",
                order.order_id
            );
            return Ok(CheckOutcome::default());
        }

        info!(
            "Order {} drifted: {} -> {}",
            order.order_id,
            order.fulfillment_status,
            remote_status.as_str()
        );
        let emailed = self.store.enqueue_notification(&order, remote_status).await?;
        Ok(CheckOutcome {
            updated: true,
            emailed,
        })
    }
}

fn person(address: &ShippingAddress) -> EcwidPerson {
    EcwidPerson {
        name: address.name.clone(),
        street: address.street.clone(),
        city: address.city.clone(),
        state_or_province_name: address.state.clone(),
        postal_code: address.postal_code.clone(),
        country_code: address.country_code.clone(),
        phone: address.phone.clone(),
    }
}

/// External-format payload for a paid local order.
fn build_ecwid_order(payload: &OrderPayload, payment_id: &str) -> NewEcwidOrder {
    let items = payload
        .items
        .iter()
        .map(|item| EcwidOrderItem {
            name: item.name.clone(),
            quantity: item.quantity,
            price: item.unit_price,
            sku: item.sku.clone(),
            product_id: item.product_id.as_deref().and_then(|id| id.parse().ok()),
        })
        .collect();

    NewEcwidOrder {
        email: payload.shipping_address.email.clone(),
        payment_status: "PAID".to_string(),
        fulfillment_status: FulfillmentStatus::AwaitingProcessing.as_str().to_string(),
        external_transaction_id: payment_id.to_string(),
        subtotal: payload.totals.subtotal,
        total: payload.totals.grand_total,
        coupon_discount: payload.totals.coupon_discount,
        shipping_option: EcwidShippingOption {
            shipping_rate: payload.totals.delivery_fee,
        },
        items,
        billing_person: person(&payload.shipping_address),
        shipping_person: person(&payload.shipping_address),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{OrderItem, Totals};

    fn payload() -> OrderPayload {
        OrderPayload {
            order_id: "ORD123".into(),
            payment_id: Some("pay_42".into()),
            items: vec![
                OrderItem {
                    product_id: Some("41".into()),
                    sku: Some("MUG-1".into()),
                    name: "Mug".into(),
                    quantity: 2,
                    unit_price: 9.5,
                },
                OrderItem {
                    product_id: None,
                    sku: None,
                    name: "Gift wrap".into(),
                    quantity: 1,
                    unit_price: 1.0,
                },
            ],
            totals: Totals {
                subtotal: 20.0,
                delivery_fee: 3.0,
                coupon_discount: 1.0,
                grand_total: 22.0,
            },
            shipping_address: ShippingAddress {
                name: "A. Customer".into(),
                street: "1 Main St".into(),
                city: "Pune".into(),
                postal_code: "411001".into(),
                email: Some("a@example.com".into()),
                phone: Some("+91 1234".into()),
                ..ShippingAddress::default()
            },
        }
    }

    #[test]
    fn external_payload_is_marked_paid_with_transaction_reference() {
        let order = build_ecwid_order(&payload(), "pay_42");
        assert_eq!(order.payment_status, "PAID");
        assert_eq!(order.fulfillment_status, "AWAITING_PROCESSING");
        assert_eq!(order.external_transaction_id, "pay_42");
        assert_eq!(order.email.as_deref(), Some("a@example.com"));
    }

    #[test]
    fn external_payload_maps_items_and_totals() {
        let order = build_ecwid_order(&payload(), "pay_42");
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].product_id, Some(41));
        assert_eq!(order.items[0].price, 9.5);
        assert_eq!(order.items[1].product_id, None);
        assert_eq!(order.subtotal, 20.0);
        assert_eq!(order.total, 22.0);
        assert_eq!(order.shipping_option.shipping_rate, 3.0);
        assert_eq!(order.billing_person.name, "A. Customer");
        assert_eq!(order.shipping_person.city, "Pune");
    }

    #[test]
    fn wire_status_update_parses_camel_case() {
        let update: StatusUpdate = serde_json::from_str(
            r#"{"orderId": "ORD123", "ecwidOrderId": "999", "status": "SHIPPED", "trackingNumber": "TRK456"}"#,
        )
        .unwrap();
        assert_eq!(update.order_id, "ORD123");
        assert_eq!(update.ecwid_order_id.as_deref(), Some("999"));
        assert_eq!(update.status, "SHIPPED");
        assert_eq!(update.tracking_number.as_deref(), Some("TRK456"));
    }
}
