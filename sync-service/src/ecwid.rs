//! Client for the Ecwid REST API. All network I/O against the external
//! commerce system goes through here; callers receive typed errors and
//! decide for themselves what to persist.

use chrono::{Duration, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use shared::EcwidStatus;
use thiserror::Error;

/// How far back `list_orders` looks when the caller supplies no date filter.
const DEFAULT_LOOKBACK_DAYS: i64 = 30;

const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct EcwidConfig {
    pub api_url: String,
    pub store_id: String,
    pub token: String,
}

#[derive(Debug, Error)]
pub enum EcwidError {
    #[error("request to Ecwid failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Ecwid API returned {status}: {body}")]
    Api { status: u16, body: String },
}

impl EcwidError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            EcwidError::Api { status, .. } => Some(*status),
            EcwidError::Http(_) => None,
        }
    }

    /// Raw error body as returned by Ecwid, for troubleshooting output.
    pub fn body(&self) -> Option<&str> {
        match self {
            EcwidError::Api { body, .. } => Some(body),
            EcwidError::Http(_) => None,
        }
    }

    /// Operator guidance keyed by HTTP status.
    pub fn hint(&self) -> Option<&'static str> {
        match self.status_code() {
            Some(401) | Some(403) => Some(
                "The access token was rejected. Verify the app is installed on \
                 this store and the token has the orders scope.",
            ),
            Some(400) => Some(
                "Ecwid rejected the payload shape. Check that items, totals and \
                 person fields match the order schema.",
            ),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcwidOrderItem {
    pub name: String,
    pub quantity: i32,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcwidPerson {
    pub name: String,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_or_province_name: Option<String>,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EcwidShippingOption {
    pub shipping_rate: f64,
}

/// Order-creation payload (POST /orders).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEcwidOrder {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub payment_status: String,
    pub fulfillment_status: String,
    pub external_transaction_id: String,
    pub subtotal: f64,
    pub total: f64,
    pub coupon_discount: f64,
    pub shipping_option: EcwidShippingOption,
    pub items: Vec<EcwidOrderItem>,
    pub billing_person: EcwidPerson,
    pub shipping_person: EcwidPerson,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEcwidOrder {
    pub id: i64,
    #[serde(default)]
    pub order_number: Option<i64>,
}

/// An order as returned by the external system.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcwidOrder {
    pub id: i64,
    #[serde(default)]
    pub order_number: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub fulfillment_status: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub subtotal: Option<f64>,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub coupon_discount: Option<f64>,
    #[serde(default)]
    pub items: Vec<EcwidOrderItem>,
    #[serde(default)]
    pub shipping_person: Option<EcwidPerson>,
}

impl EcwidOrder {
    pub fn local_status(&self) -> shared::FulfillmentStatus {
        EcwidStatus::parse_or_default(self.fulfillment_status.as_deref().unwrap_or(""))
            .to_local()
    }
}

/// Local key an external order maps onto: its own order number, or a
/// synthesized `ecwid_<id>` key when the number is absent.
pub fn local_order_key(order: &EcwidOrder) -> String {
    match order.order_number {
        Some(number) => number.to_string(),
        None => format!("ecwid_{}", order.id),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EcwidOrderPage {
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub items: Vec<EcwidOrder>,
}

#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub created_from_date: Option<String>,
}

/// Partial update (PUT /orders/{id}).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EcwidOrderPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulfillment_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
}

#[derive(Clone)]
pub struct EcwidClient {
    http: reqwest::Client,
    config: EcwidConfig,
}

impl EcwidClient {
    pub fn new(config: EcwidConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http, config })
    }

    fn orders_url(&self) -> String {
        format!("{}/{}/orders", self.config.api_url, self.config.store_id)
    }

    fn order_url(&self, id: &str) -> String {
        format!("{}/{}", self.orders_url(), id)
    }

    pub async fn create_order(
        &self,
        order: &NewEcwidOrder,
    ) -> Result<CreatedEcwidOrder, EcwidError> {
        let response = self
            .http
            .post(self.orders_url())
            .bearer_auth(&self.config.token)
            .json(order)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn get_order(&self, id: &str) -> Result<EcwidOrder, EcwidError> {
        let response = self
            .http
            .get(self.order_url(id))
            .bearer_auth(&self.config.token)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn list_orders(&self, query: &ListQuery) -> Result<EcwidOrderPage, EcwidError> {
        let created_from = query.created_from_date.clone().unwrap_or_else(|| {
            (Utc::now() - Duration::days(DEFAULT_LOOKBACK_DAYS))
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        });
        let mut params = vec![("createdFromDate".to_string(), created_from)];
        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = query.offset {
            params.push(("offset".to_string(), offset.to_string()));
        }

        let response = self
            .http
            .get(self.orders_url())
            .bearer_auth(&self.config.token)
            .query(&params)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn update_order(
        &self,
        id: &str,
        patch: &EcwidOrderPatch,
    ) -> Result<(), EcwidError> {
        let response = self
            .http
            .put(self.order_url(id))
            .bearer_auth(&self.config.token)
            .json(patch)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::api_error(status, response).await)
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, EcwidError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json::<T>().await?)
        } else {
            Err(Self::api_error(status, response).await)
        }
    }

    async fn api_error(status: StatusCode, response: reqwest::Response) -> EcwidError {
        let body = response.text().await.unwrap_or_default();
        EcwidError::Api {
            status: status.as_u16(),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_order(id: i64, order_number: Option<i64>) -> EcwidOrder {
        EcwidOrder {
            id,
            order_number,
            email: None,
            fulfillment_status: None,
            tracking_number: None,
            subtotal: None,
            total: None,
            coupon_discount: None,
            items: vec![],
            shipping_person: None,
        }
    }

    #[test]
    fn key_prefers_external_order_number() {
        assert_eq!(local_order_key(&remote_order(555, Some(1001))), "1001");
    }

    #[test]
    fn key_falls_back_to_synthesized_ecwid_prefix() {
        assert_eq!(local_order_key(&remote_order(555, None)), "ecwid_555");
    }

    #[test]
    fn missing_remote_status_defaults_to_awaiting_processing() {
        let order = remote_order(1, None);
        assert_eq!(
            order.local_status(),
            shared::FulfillmentStatus::AwaitingProcessing
        );
    }

    #[test]
    fn api_error_hints_follow_http_status() {
        let unauthorized = EcwidError::Api {
            status: 403,
            body: "{}".into(),
        };
        assert!(unauthorized.hint().unwrap().contains("token"));

        let bad_request = EcwidError::Api {
            status: 400,
            body: "{}".into(),
        };
        assert!(bad_request.hint().unwrap().contains("payload"));

        let server_error = EcwidError::Api {
            status: 500,
            body: "{}".into(),
        };
        assert!(server_error.hint().is_none());
    }

    #[test]
    fn patch_serializes_only_present_fields() {
        let patch = EcwidOrderPatch {
            fulfillment_status: Some("SHIPPED".into()),
            tracking_number: None,
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({"fulfillmentStatus": "SHIPPED"}));
    }
}
