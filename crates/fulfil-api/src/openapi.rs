//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI spec served
//! at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Fulfilment API",
        version = "0.3.2",
        description = "Order fulfilment for the shipping platform: fee calculation, prepaid balance debits, carrier shipment creation with rollback, quotes, and tracking.",
        license(name = "BUSL-1.1")
    ),
    paths(
        // Orders
        crate::routes::orders::create_order,
        crate::routes::orders::get_order,
        crate::routes::orders::refresh_tracking,
        // Shipments
        crate::routes::shipments::quote,
        crate::routes::shipments::track,
        // Accounts
        crate::routes::accounts::get_balance,
        crate::routes::accounts::get_history,
        crate::routes::accounts::list_orders,
        crate::routes::accounts::deposit,
    ),
    components(schemas(
        // Error types
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        // Order DTOs
        crate::routes::orders::CreateOrderRequest,
        crate::routes::orders::CreateOrderResponse,
        crate::routes::orders::OrderFailureResponse,
        crate::routes::orders::TrackingRefreshResponse,
        // Shipment DTOs
        crate::routes::shipments::QuoteResponse,
        crate::routes::shipments::TrackingEventResponse,
        // Account DTOs
        crate::routes::accounts::BalanceResponse,
        crate::routes::accounts::DepositRequest,
    )),
    tags(
        (name = "orders", description = "Order fulfilment"),
        (name = "shipments", description = "Carrier quotes and tracking"),
        (name = "accounts", description = "Prepaid balances and fee history"),
    )
)]
pub struct ApiDoc;

/// Router serving the OpenAPI document.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_lists_every_route() {
        let spec = ApiDoc::openapi();
        for path in [
            "/v1/orders",
            "/v1/orders/{id}",
            "/v1/orders/{id}/tracking/refresh",
            "/v1/shipments/quote",
            "/v1/tracking/{tracking_number}",
            "/v1/accounts/{user_id}/balance",
            "/v1/accounts/{user_id}/history",
            "/v1/accounts/{user_id}/orders",
            "/v1/accounts/{user_id}/deposits",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn spec_serializes_to_json() {
        let json = ApiDoc::openapi().to_json().unwrap();
        assert!(json.contains("Fulfilment API"));
    }
}
