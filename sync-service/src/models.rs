use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use num_traits::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared::{FulfillmentStatus, OrderItem, OrderPayload, ShippingAddress};

use crate::ecwid::EcwidOrder;

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::orders)]
pub struct Order {
    pub order_id: String,
    pub ecwid_order_id: Option<String>,
    pub payment_id: Option<String>,
    pub fulfillment_status: String,
    pub tracking_number: Option<String>,
    pub items: serde_json::Value,
    pub subtotal: BigDecimal,
    pub delivery_fee: BigDecimal,
    pub coupon_discount: BigDecimal,
    pub grand_total: BigDecimal,
    pub shipping_address: serde_json::Value,
    pub version: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn status(&self) -> FulfillmentStatus {
        self.fulfillment_status.parse().unwrap_or_default()
    }

    pub fn shipping(&self) -> Option<ShippingAddress> {
        serde_json::from_value(self.shipping_address.clone()).ok()
    }

    pub fn shipping_email(&self) -> Option<String> {
        self.shipping().and_then(|a| a.email)
    }

    pub fn grand_total_f64(&self) -> f64 {
        self.grand_total.to_f64().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::orders)]
pub struct NewOrder {
    pub order_id: String,
    pub ecwid_order_id: Option<String>,
    pub payment_id: Option<String>,
    pub fulfillment_status: String,
    pub tracking_number: Option<String>,
    pub items: serde_json::Value,
    pub subtotal: BigDecimal,
    pub delivery_fee: BigDecimal,
    pub coupon_discount: BigDecimal,
    pub grand_total: BigDecimal,
    pub shipping_address: serde_json::Value,
}

fn decimal(value: f64) -> BigDecimal {
    BigDecimal::from_f64(value).unwrap_or_default()
}

impl NewOrder {
    /// Local row for a freshly checked-out order.
    pub fn from_payload(payload: &OrderPayload) -> anyhow::Result<Self> {
        Ok(Self {
            order_id: payload.order_id.clone(),
            ecwid_order_id: None,
            payment_id: payload.payment_id.clone(),
            fulfillment_status: FulfillmentStatus::AwaitingProcessing.as_str().to_string(),
            tracking_number: None,
            items: serde_json::to_value(&payload.items)?,
            subtotal: decimal(payload.totals.subtotal),
            delivery_fee: decimal(payload.totals.delivery_fee),
            coupon_discount: decimal(payload.totals.coupon_discount),
            grand_total: decimal(payload.totals.grand_total),
            shipping_address: serde_json::to_value(&payload.shipping_address)?,
        })
    }

    /// Local mirror of an external order, keyed by the derived order id.
    pub fn from_remote(
        key: &str,
        remote: &EcwidOrder,
        status: FulfillmentStatus,
    ) -> anyhow::Result<Self> {
        let items: Vec<OrderItem> = remote
            .items
            .iter()
            .map(|item| OrderItem {
                product_id: item.product_id.map(|id| id.to_string()),
                sku: item.sku.clone(),
                name: item.name.clone(),
                quantity: item.quantity,
                unit_price: item.price,
            })
            .collect();

        let address = remote
            .shipping_person
            .as_ref()
            .map(|person| ShippingAddress {
                name: person.name.clone(),
                street: person.street.clone(),
                city: person.city.clone(),
                state: person.state_or_province_name.clone(),
                postal_code: person.postal_code.clone(),
                country_code: person.country_code.clone(),
                email: remote.email.clone(),
                phone: person.phone.clone(),
            })
            .unwrap_or_else(|| ShippingAddress {
                email: remote.email.clone(),
                ..ShippingAddress::default()
            });

        Ok(Self {
            order_id: key.to_string(),
            ecwid_order_id: Some(remote.id.to_string()),
            payment_id: None,
            fulfillment_status: status.as_str().to_string(),
            tracking_number: remote.tracking_number.clone(),
            items: serde_json::to_value(&items)?,
            subtotal: decimal(remote.subtotal.unwrap_or_default()),
            delivery_fee: BigDecimal::default(),
            coupon_discount: decimal(remote.coupon_discount.unwrap_or_default()),
            grand_total: decimal(remote.total.unwrap_or_default()),
            shipping_address: serde_json::to_value(&address)?,
        })
    }
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::email_outbox)]
pub struct EmailNotification {
    pub id: Uuid,
    pub order_id: String,
    pub status: String,
    pub recipient: String,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub state: String,
    pub last_error: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::email_outbox)]
pub struct NewEmailNotification {
    pub id: Uuid,
    pub order_id: String,
    pub status: String,
    pub recipient: String,
}

impl NewEmailNotification {
    pub fn new(order_id: &str, status: FulfillmentStatus, recipient: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: order_id.to_string(),
            status: status.as_str().to_string(),
            recipient: recipient.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Totals;

    fn payload() -> OrderPayload {
        OrderPayload {
            order_id: "ORD123".into(),
            payment_id: Some("pay_42".into()),
            items: vec![OrderItem {
                product_id: Some("41".into()),
                sku: Some("MUG-1".into()),
                name: "Mug".into(),
                quantity: 2,
                unit_price: 9.5,
            }],
            totals: Totals {
                subtotal: 19.0,
                delivery_fee: 3.0,
                coupon_discount: 0.0,
                grand_total: 22.0,
            },
            shipping_address: ShippingAddress {
                name: "A. Customer".into(),
                street: "1 Main St".into(),
                city: "Pune".into(),
                postal_code: "411001".into(),
                email: Some("a@example.com".into()),
                ..ShippingAddress::default()
            },
        }
    }

    #[test]
    fn new_checkout_row_starts_unlinked_and_awaiting() {
        let row = NewOrder::from_payload(&payload()).unwrap();
        assert_eq!(row.order_id, "ORD123");
        assert_eq!(row.ecwid_order_id, None);
        assert_eq!(row.fulfillment_status, "AWAITING_PROCESSING");
        assert_eq!(row.payment_id.as_deref(), Some("pay_42"));
        assert_eq!(row.grand_total, decimal(22.0));
    }

    #[test]
    fn remote_row_carries_external_identity_and_email() {
        let remote = EcwidOrder {
            id: 555,
            order_number: None,
            email: Some("b@example.com".into()),
            fulfillment_status: Some("PROCESSING".into()),
            tracking_number: Some("TRK1".into()),
            subtotal: Some(10.0),
            total: Some(12.0),
            coupon_discount: None,
            items: vec![],
            shipping_person: None,
        };
        let row = NewOrder::from_remote("ecwid_555", &remote, remote.local_status()).unwrap();
        assert_eq!(row.order_id, "ecwid_555");
        assert_eq!(row.ecwid_order_id.as_deref(), Some("555"));
        assert_eq!(row.fulfillment_status, "PACKED");
        assert_eq!(row.tracking_number.as_deref(), Some("TRK1"));

        let address: ShippingAddress =
            serde_json::from_value(row.shipping_address).unwrap();
        assert_eq!(address.email.as_deref(), Some("b@example.com"));
    }
}
