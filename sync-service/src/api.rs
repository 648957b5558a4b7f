use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use shared::OrderPayload;

use crate::ecwid::ListQuery;
use crate::jobs::{JobError, Reconciler, StatusUpdate};
use crate::models::Order;
use crate::store::OrderStore;

#[derive(Clone)]
pub struct AppState {
    pub reconciler: Reconciler,
    pub store: OrderStore,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ErrorResponse {
    fn plain(error: String) -> Self {
        Self {
            success: false,
            error,
            details: None,
            suggestion: None,
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(e: JobError) -> ApiError {
    match e {
        JobError::Validation(message) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::plain(message)),
        ),
        JobError::NotFound(message) => (StatusCode::NOT_FOUND, Json(ErrorResponse::plain(message))),
        JobError::Conflict(message) => (StatusCode::CONFLICT, Json(ErrorResponse::plain(message))),
        JobError::External(e) => {
            let error = match e.status_code() {
                Some(code) => format!("Ecwid API returned {}", code),
                None => e.to_string(),
            };
            let response = ErrorResponse {
                success: false,
                error,
                details: e.body().map(str::to_string),
                suggestion: e.hint().map(str::to_string),
            };
            (StatusCode::BAD_GATEWAY, Json(response))
        }
        JobError::Store(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::plain(e.to_string())),
        ),
    }
}

fn internal_error(e: anyhow::Error) -> ApiError {
    error_response(JobError::Store(e))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/push-order", post(push_order))
        .route("/sync-orders", post(sync_orders))
        .route("/update-order-status", post(update_order_status))
        .route("/check-tracking", post(check_tracking))
        .route("/orders/:order_id", get(get_order))
        .route("/revenue-summary", get(revenue_summary))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOrderResponse {
    pub success: bool,
    pub ecwid_order_id: String,
    pub order_number: Option<i64>,
}

pub async fn push_order(
    State(state): State<AppState>,
    Json(payload): Json<OrderPayload>,
) -> Result<Json<PushOrderResponse>, ApiError> {
    let outcome = state
        .reconciler
        .push_order(payload)
        .await
        .map_err(error_response)?;
    Ok(Json(PushOrderResponse {
        success: true,
        ecwid_order_id: outcome.ecwid_order_id,
        order_number: outcome.order_number,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncOrdersRequest {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub created_from_date: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOrdersResponse {
    pub success: bool,
    pub synced: usize,
    pub created: usize,
    pub updated: usize,
    pub total: i64,
}

pub async fn sync_orders(
    State(state): State<AppState>,
    Json(request): Json<SyncOrdersRequest>,
) -> Result<Json<SyncOrdersResponse>, ApiError> {
    let query = ListQuery {
        limit: request.limit,
        offset: request.offset,
        created_from_date: request.created_from_date,
    };
    let summary = state
        .reconciler
        .sync_orders(query)
        .await
        .map_err(error_response)?;
    Ok(Json(SyncOrdersResponse {
        success: true,
        synced: summary.synced,
        created: summary.created,
        updated: summary.updated,
        total: summary.total,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusResponse {
    pub success: bool,
    pub message: String,
}

pub async fn update_order_status(
    State(state): State<AppState>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<UpdateStatusResponse>, ApiError> {
    let message = state
        .reconciler
        .push_status(update)
        .await
        .map_err(error_response)?;
    Ok(Json(UpdateStatusResponse {
        success: true,
        message,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckTrackingResponse {
    pub success: bool,
    pub checked: usize,
    pub updated: usize,
    pub emails_sent: usize,
}

pub async fn check_tracking(
    State(state): State<AppState>,
) -> Result<Json<CheckTrackingResponse>, ApiError> {
    let summary = state
        .reconciler
        .poll_status()
        .await
        .map_err(error_response)?;
    Ok(Json(CheckTrackingResponse {
        success: true,
        checked: summary.checked,
        updated: summary.updated,
        emails_sent: summary.emails_sent,
    }))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    state
        .store
        .find_by_order_id(&order_id)
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| {
            error_response(JobError::NotFound(format!("Order {} not found", order_id)))
        })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedPaymentEntry {
    pub order_id: String,
    pub grand_total: f64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSummaryResponse {
    pub success: bool,
    pub paid_orders: i64,
    pub revenue: f64,
    pub failed_payments: Vec<FailedPaymentEntry>,
}

/// Revenue counts only orders with a captured payment; everything else is a
/// failed or abandoned attempt and shows up in the second list.
pub async fn revenue_summary(
    State(state): State<AppState>,
) -> Result<Json<RevenueSummaryResponse>, ApiError> {
    let (paid_orders, revenue) = state
        .store
        .count_paid_orders()
        .await
        .map_err(internal_error)?;
    let failed = state
        .store
        .list_failed_payments(50)
        .await
        .map_err(internal_error)?;

    Ok(Json(RevenueSummaryResponse {
        success: true,
        paid_orders,
        revenue: revenue.to_f64().unwrap_or_default(),
        failed_payments: failed
            .into_iter()
            .map(|order| FailedPaymentEntry {
                order_id: order.order_id,
                grand_total: order.grand_total.to_f64().unwrap_or_default(),
                created_at: order.created_at,
            })
            .collect(),
    }))
}

pub async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_bad_request() {
        let (status, Json(body)) =
            error_response(JobError::Validation("Invalid status: X".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.success);
        assert!(body.error.contains("Invalid status"));
    }

    #[test]
    fn external_errors_carry_body_and_suggestion() {
        let e = crate::ecwid::EcwidError::Api {
            status: 403,
            body: r#"{"errorMessage":"app not installed"}"#.into(),
        };
        let (status, Json(body)) = error_response(JobError::External(e));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.error, "Ecwid API returned 403");
        assert!(body.details.unwrap().contains("app not installed"));
        assert!(body.suggestion.is_some());
    }

    #[test]
    fn conflict_errors_map_to_409() {
        let (status, _) = error_response(JobError::Conflict("busy".into()));
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
