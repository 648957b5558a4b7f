use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fulfillment lifecycle of a local order.
///
/// Transitions are not restricted: admins correct mis-set statuses by hand,
/// so a DELIVERED order may legally move back to PACKED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillmentStatus {
    AwaitingProcessing,
    Packed,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
    Returned,
}

/// Fulfillment vocabulary of the external commerce system (Ecwid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EcwidStatus {
    AwaitingProcessing,
    Processing,
    Shipped,
    Delivered,
    WillNotDeliver,
    Returned,
}

/// Local statuses that have an external equivalent and are therefore
/// accepted by the status-update endpoint.
pub const VALID_UPDATE_STATUSES: [&str; 5] = [
    "AWAITING_PROCESSING",
    "PACKED",
    "SHIPPED",
    "OUT_FOR_DELIVERY",
    "DELIVERED",
];

impl FulfillmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::AwaitingProcessing => "AWAITING_PROCESSING",
            FulfillmentStatus::Packed => "PACKED",
            FulfillmentStatus::Shipped => "SHIPPED",
            FulfillmentStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            FulfillmentStatus::Delivered => "DELIVERED",
            FulfillmentStatus::Cancelled => "CANCELLED",
            FulfillmentStatus::Returned => "RETURNED",
        }
    }

    /// Translate to the external vocabulary.
    ///
    /// The mapping is lossy: OUT_FOR_DELIVERY collapses into SHIPPED because
    /// the external system has no equivalent. Statuses with no forward
    /// mapping (CANCELLED, RETURNED) yield `None`; callers treat that as a
    /// validation failure rather than inventing an external value.
    pub fn to_external(self) -> Option<EcwidStatus> {
        match self {
            FulfillmentStatus::AwaitingProcessing => Some(EcwidStatus::AwaitingProcessing),
            FulfillmentStatus::Packed => Some(EcwidStatus::Processing),
            FulfillmentStatus::Shipped => Some(EcwidStatus::Shipped),
            FulfillmentStatus::OutForDelivery => Some(EcwidStatus::Shipped),
            FulfillmentStatus::Delivered => Some(EcwidStatus::Delivered),
            FulfillmentStatus::Cancelled | FulfillmentStatus::Returned => None,
        }
    }
}

impl Default for FulfillmentStatus {
    fn default() -> Self {
        FulfillmentStatus::AwaitingProcessing
    }
}

impl fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FulfillmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AWAITING_PROCESSING" => Ok(FulfillmentStatus::AwaitingProcessing),
            "PACKED" => Ok(FulfillmentStatus::Packed),
            "SHIPPED" => Ok(FulfillmentStatus::Shipped),
            "OUT_FOR_DELIVERY" => Ok(FulfillmentStatus::OutForDelivery),
            "DELIVERED" => Ok(FulfillmentStatus::Delivered),
            "CANCELLED" => Ok(FulfillmentStatus::Cancelled),
            "RETURNED" => Ok(FulfillmentStatus::Returned),
            other => Err(format!("unknown fulfillment status: {}", other)),
        }
    }
}

impl EcwidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EcwidStatus::AwaitingProcessing => "AWAITING_PROCESSING",
            EcwidStatus::Processing => "PROCESSING",
            EcwidStatus::Shipped => "SHIPPED",
            EcwidStatus::Delivered => "DELIVERED",
            EcwidStatus::WillNotDeliver => "WILL_NOT_DELIVER",
            EcwidStatus::Returned => "RETURNED",
        }
    }

    /// Translate to the local vocabulary.
    ///
    /// PROCESSING maps back to PACKED, so a round trip through the external
    /// system does not restore OUT_FOR_DELIVERY. Inherent to the protocol.
    pub fn to_local(self) -> FulfillmentStatus {
        match self {
            EcwidStatus::AwaitingProcessing => FulfillmentStatus::AwaitingProcessing,
            EcwidStatus::Processing => FulfillmentStatus::Packed,
            EcwidStatus::Shipped => FulfillmentStatus::Shipped,
            EcwidStatus::Delivered => FulfillmentStatus::Delivered,
            EcwidStatus::WillNotDeliver => FulfillmentStatus::Cancelled,
            EcwidStatus::Returned => FulfillmentStatus::Returned,
        }
    }

    /// Parse an external status string, defaulting to AWAITING_PROCESSING
    /// for anything the vocabulary does not recognize.
    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "AWAITING_PROCESSING" => EcwidStatus::AwaitingProcessing,
            "PROCESSING" => EcwidStatus::Processing,
            "SHIPPED" => EcwidStatus::Shipped,
            "DELIVERED" => EcwidStatus::Delivered,
            "WILL_NOT_DELIVER" => EcwidStatus::WillNotDeliver,
            "RETURNED" => EcwidStatus::Returned,
            _ => EcwidStatus::AwaitingProcessing,
        }
    }
}

impl fmt::Display for EcwidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    pub name: String,
    pub quantity: i32,
    pub unit_price: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub subtotal: f64,
    #[serde(default)]
    pub delivery_fee: f64,
    #[serde(default)]
    pub coupon_discount: f64,
    pub grand_total: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub name: String,
    pub street: String,
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    pub postal_code: String,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Full order payload as produced by checkout completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub order_id: String,
    #[serde(default)]
    pub payment_id: Option<String>,
    pub items: Vec<OrderItem>,
    pub totals: Totals,
    pub shipping_address: ShippingAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_mapping_matches_table() {
        assert_eq!(
            FulfillmentStatus::Packed.to_external(),
            Some(EcwidStatus::Processing)
        );
        assert_eq!(
            FulfillmentStatus::Shipped.to_external(),
            Some(EcwidStatus::Shipped)
        );
        assert_eq!(
            FulfillmentStatus::OutForDelivery.to_external(),
            Some(EcwidStatus::Shipped)
        );
        assert_eq!(
            FulfillmentStatus::Delivered.to_external(),
            Some(EcwidStatus::Delivered)
        );
        assert_eq!(
            FulfillmentStatus::AwaitingProcessing.to_external(),
            Some(EcwidStatus::AwaitingProcessing)
        );
        assert_eq!(FulfillmentStatus::Cancelled.to_external(), None);
        assert_eq!(FulfillmentStatus::Returned.to_external(), None);
    }

    #[test]
    fn reverse_mapping_matches_table() {
        assert_eq!(
            EcwidStatus::AwaitingProcessing.to_local(),
            FulfillmentStatus::AwaitingProcessing
        );
        assert_eq!(EcwidStatus::Processing.to_local(), FulfillmentStatus::Packed);
        assert_eq!(EcwidStatus::Shipped.to_local(), FulfillmentStatus::Shipped);
        assert_eq!(EcwidStatus::Delivered.to_local(), FulfillmentStatus::Delivered);
        assert_eq!(
            EcwidStatus::WillNotDeliver.to_local(),
            FulfillmentStatus::Cancelled
        );
        assert_eq!(EcwidStatus::Returned.to_local(), FulfillmentStatus::Returned);
    }

    #[test]
    fn mapping_is_lossy_for_out_for_delivery() {
        // OUT_FOR_DELIVERY survives the forward map only as SHIPPED, and the
        // reverse map of PROCESSING loses the PACKED distinction too.
        let ext = FulfillmentStatus::OutForDelivery.to_external().unwrap();
        assert_eq!(ext.to_local(), FulfillmentStatus::Shipped);

        let ext = FulfillmentStatus::Packed.to_external().unwrap();
        assert_eq!(ext.to_local(), FulfillmentStatus::Packed);
    }

    #[test]
    fn unknown_external_status_defaults_to_awaiting_processing() {
        assert_eq!(
            EcwidStatus::parse_or_default("SOMETHING_NEW"),
            EcwidStatus::AwaitingProcessing
        );
        assert_eq!(
            EcwidStatus::parse_or_default(""),
            EcwidStatus::AwaitingProcessing
        );
    }

    #[test]
    fn unknown_local_status_is_rejected() {
        assert!("bogus_status".parse::<FulfillmentStatus>().is_err());
    }

    #[test]
    fn valid_update_statuses_are_exactly_the_forward_mappable_ones() {
        for s in VALID_UPDATE_STATUSES {
            let status: FulfillmentStatus = s.parse().unwrap();
            assert!(status.to_external().is_some(), "{} must map forward", s);
        }
        assert!(FulfillmentStatus::Cancelled.to_external().is_none());
        assert!(FulfillmentStatus::Returned.to_external().is_none());
    }

    #[test]
    fn order_payload_uses_camel_case_wire_format() {
        let json = r#"{
            "orderId": "ORD123",
            "paymentId": "pay_42",
            "items": [{"name": "Mug", "quantity": 2, "unitPrice": 9.5, "sku": "MUG-1"}],
            "totals": {"subtotal": 19.0, "deliveryFee": 3.0, "couponDiscount": 0.0, "grandTotal": 22.0},
            "shippingAddress": {"name": "A. Customer", "street": "1 Main St", "city": "Pune", "postalCode": "411001", "email": "a@example.com"}
        }"#;
        let payload: OrderPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.order_id, "ORD123");
        assert_eq!(payload.payment_id.as_deref(), Some("pay_42"));
        assert_eq!(payload.items[0].unit_price, 9.5);
        assert_eq!(payload.totals.grand_total, 22.0);
        assert_eq!(
            payload.shipping_address.email.as_deref(),
            Some("a@example.com")
        );
    }
}
