//! # Order Routes
//!
//! Order creation runs the full fulfilment pipeline (fee, debit, shipment,
//! rollback) through [`crate::orchestration::Orchestrator`].
//!
//! | Method | Path                                | Handler            |
//! |--------|-------------------------------------|--------------------|
//! | POST   | `/v1/orders`                        | [`create_order`]   |
//! | GET    | `/v1/orders/:id`                    | [`get_order`]      |
//! | POST   | `/v1/orders/:id/tracking/refresh`   | [`refresh_tracking`] |

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fulfil_core::{Order, OrderDraft, OrderId};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_account_access, CallerIdentity};
use crate::error::AppError;
use crate::extractors::extract_json;
use crate::orchestration::{FulfillmentError, Orchestrator};
use crate::routes::shipments::TrackingEventResponse;
use crate::state::AppState;

/// Build the orders router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/orders", post(create_order))
        .route("/v1/orders/:id", get(get_order))
        .route("/v1/orders/:id/tracking/refresh", post(refresh_tracking))
}

/// The orchestrator, or 503 when no carrier is configured.
fn require_orchestrator(state: &AppState) -> Result<&Orchestrator, AppError> {
    state.orchestrator.as_ref().ok_or_else(|| {
        AppError::service_unavailable(
            "carrier not configured; set CARRIER_BASE_URL, CARRIER_MCH_ID and CARRIER_SECRET_KEY",
        )
    })
}

// -- DTOs ---------------------------------------------------------------------

/// Request to create and ship an order.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    /// Client-chosen order id. Resubmitting the same id never charges twice.
    #[serde(default)]
    pub order_id: Option<Uuid>,
    /// Order data from the order entry layer.
    #[schema(value_type = Object)]
    pub order: OrderDraft,
}

/// A shipped order.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub success: bool,
    pub order_id: Uuid,
    pub tracking_number: Option<String>,
    /// Total fee charged, in minor units.
    #[schema(value_type = i64)]
    pub total_fee: fulfil_core::Amount,
    /// Balance after the charge, in minor units.
    #[schema(value_type = i64)]
    pub remaining_balance: fulfil_core::Amount,
    /// True when an earlier request already shipped this order.
    pub replayed: bool,
}

/// A failed order. The balance was not decremented.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderFailureResponse {
    pub success: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
}

impl OrderFailureResponse {
    fn new(reason: String, order_id: Option<OrderId>) -> Self {
        Self {
            success: false,
            reason,
            order_id: order_id.map(|id| *id.as_uuid()),
        }
    }
}

/// Outcome of a tracking refresh.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackingRefreshResponse {
    #[schema(value_type = Object)]
    pub order: Order,
    /// Whether the order status moved.
    pub changed: bool,
    pub events: Vec<TrackingEventResponse>,
}

// -- Handlers -----------------------------------------------------------------

/// POST /v1/orders: Price, charge, and ship an order.
#[utoipa::path(
    post,
    path = "/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order shipped", body = CreateOrderResponse),
        (status = 200, description = "Order was already shipped", body = CreateOrderResponse),
        (status = 402, description = "Insufficient balance", body = OrderFailureResponse),
        (status = 404, description = "Order id not available", body = crate::error::ErrorBody),
        (status = 409, description = "Order is being processed", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid order", body = crate::error::ErrorBody),
        (status = 502, description = "Carrier failed; charge reversed", body = OrderFailureResponse),
        (status = 503, description = "Carrier not configured", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let req = extract_json(body)?;
    require_account_access(&caller, req.order.user_id)?;
    let orchestrator = require_orchestrator(&state)?;

    let id = req.order_id.map(OrderId::from_uuid).unwrap_or_default();
    match orchestrator.fulfil(id, req.order).await {
        Ok(outcome) => {
            let status = if outcome.replayed {
                StatusCode::OK
            } else {
                StatusCode::CREATED
            };
            let body = CreateOrderResponse {
                success: true,
                order_id: *outcome.order.id.as_uuid(),
                tracking_number: outcome.tracking_number().map(str::to_owned),
                total_fee: outcome.order.total_fee,
                remaining_balance: outcome.remaining_balance,
                replayed: outcome.replayed,
            };
            Ok((status, Json(body)).into_response())
        }
        Err(err @ FulfillmentError::InsufficientBalance { .. }) => Ok((
            StatusCode::PAYMENT_REQUIRED,
            Json(OrderFailureResponse::new(err.to_string(), None)),
        )
            .into_response()),
        Err(
            err @ (FulfillmentError::CarrierTransport { .. }
            | FulfillmentError::CarrierRejected { .. }
            | FulfillmentError::PreviouslyFailed { .. }),
        ) => Ok((
            StatusCode::BAD_GATEWAY,
            Json(OrderFailureResponse::new(err.to_string(), err.order_id())),
        )
            .into_response()),
        Err(other) => Err(other.into()),
    }
}

/// GET /v1/orders/:id: Fetch an order.
#[utoipa::path(
    get,
    path = "/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order found", body = Object),
        (status = 404, description = "Order not found", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = visible_order(&state, &caller, OrderId::from_uuid(id))?;
    Ok(Json(order))
}

/// POST /v1/orders/:id/tracking/refresh: Poll the carrier and advance the
/// order status.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/tracking/refresh",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Tracking refreshed", body = TrackingRefreshResponse),
        (status = 404, description = "Order not found", body = crate::error::ErrorBody),
        (status = 409, description = "Order not shipped yet", body = crate::error::ErrorBody),
        (status = 502, description = "Carrier error", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub async fn refresh_tracking(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<TrackingRefreshResponse>, AppError> {
    let id = OrderId::from_uuid(id);
    visible_order(&state, &caller, id)?;
    let orchestrator = require_orchestrator(&state)?;
    let refresh = orchestrator.refresh_tracking(id).await?;
    Ok(Json(TrackingRefreshResponse {
        order: refresh.order,
        changed: refresh.changed,
        events: refresh
            .snapshot
            .events
            .into_iter()
            .map(TrackingEventResponse::from)
            .collect(),
    }))
}

/// The order, if it exists and the caller may see it. Other users' orders
/// read as not found.
fn visible_order(
    state: &AppState,
    caller: &CallerIdentity,
    id: OrderId,
) -> Result<Order, AppError> {
    state
        .orders
        .get(id)
        .filter(|o| caller.can_act_for(o.user_id()))
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))
}
