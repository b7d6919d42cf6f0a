//! # Carrier Pass-Through Routes
//!
//! Rate quotes and raw tracking history, straight from the carrier. These
//! never touch balances or orders.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use fulfil_carrier::{CarrierGateway, TrackingEvent};
use fulfil_core::{Address, Parcel};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::Validate;
use crate::state::AppState;

/// Build the shipments router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/shipments/quote", get(quote))
        .route("/v1/tracking/:tracking_number", get(track))
}

/// The carrier gateway, or 503 when none is configured.
fn require_carrier(state: &AppState) -> Result<&Arc<dyn CarrierGateway>, AppError> {
    state.carrier.as_ref().ok_or_else(|| {
        AppError::service_unavailable(
            "carrier not configured; set CARRIER_BASE_URL, CARRIER_MCH_ID and CARRIER_SECRET_KEY",
        )
    })
}

// -- DTOs ---------------------------------------------------------------------

/// Route and parcel for a rate quote.
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct QuoteQuery {
    pub origin_province: String,
    pub origin_city: String,
    pub origin_postal_code: String,
    pub destination_province: String,
    pub destination_city: String,
    pub destination_postal_code: String,
    pub weight_grams: u32,
    pub length_cm: u32,
    pub width_cm: u32,
    pub height_cm: u32,
}

impl QuoteQuery {
    fn origin(&self) -> Address {
        route_address(&self.origin_province, &self.origin_city, &self.origin_postal_code)
    }

    fn destination(&self) -> Address {
        route_address(
            &self.destination_province,
            &self.destination_city,
            &self.destination_postal_code,
        )
    }

    fn parcel(&self) -> Parcel {
        Parcel {
            weight_grams: self.weight_grams,
            length_cm: self.length_cm,
            width_cm: self.width_cm,
            height_cm: self.height_cm,
        }
    }
}

/// Quotes only need the routing fields of an address.
fn route_address(province: &str, city: &str, postal_code: &str) -> Address {
    Address {
        name: String::new(),
        phone: String::new(),
        province: province.to_string(),
        city: city.to_string(),
        district: None,
        postal_code: postal_code.to_string(),
        detail: String::new(),
    }
}

fn check_route(side: &str, province: &str, city: &str, postal_code: &str) -> Result<(), String> {
    if province.trim().is_empty() {
        return Err(format!("{side} province must not be empty"));
    }
    if city.trim().is_empty() {
        return Err(format!("{side} city must not be empty"));
    }
    if postal_code.len() != 5 || !postal_code.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!(
            "{side} postal code must be 5 digits, got {postal_code:?}"
        ));
    }
    Ok(())
}

impl Validate for QuoteQuery {
    fn validate(&self) -> Result<(), String> {
        check_route(
            "origin",
            &self.origin_province,
            &self.origin_city,
            &self.origin_postal_code,
        )?;
        check_route(
            "destination",
            &self.destination_province,
            &self.destination_city,
            &self.destination_postal_code,
        )?;
        self.parcel().validate().map_err(|e| e.to_string())
    }
}

/// One carrier service with its price.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub service_id: String,
    pub name: String,
    /// Price in minor units.
    pub price: i64,
    pub estimated_delivery_days: u32,
}

/// One tracking scan.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEventResponse {
    pub timestamp: DateTime<Utc>,
    pub location_or_stage: String,
    pub status_text: String,
}

impl From<TrackingEvent> for TrackingEventResponse {
    fn from(e: TrackingEvent) -> Self {
        Self {
            timestamp: e.timestamp,
            location_or_stage: e.location_or_stage,
            status_text: e.status_text,
        }
    }
}

// -- Handlers -----------------------------------------------------------------

/// GET /v1/shipments/quote: Carrier services and prices for a route.
#[utoipa::path(
    get,
    path = "/v1/shipments/quote",
    params(QuoteQuery),
    responses(
        (status = 200, description = "Available services", body = Vec<QuoteResponse>),
        (status = 422, description = "Invalid route or parcel", body = crate::error::ErrorBody),
        (status = 502, description = "Carrier error", body = crate::error::ErrorBody),
        (status = 503, description = "Carrier not configured", body = crate::error::ErrorBody),
    ),
    tag = "shipments"
)]
pub async fn quote(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    query: Result<Query<QuoteQuery>, QueryRejection>,
) -> Result<Json<Vec<QuoteResponse>>, AppError> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    query.validate().map_err(AppError::Validation)?;
    let carrier = require_carrier(&state)?;

    let quotes = carrier
        .quote_rate(&query.origin(), &query.destination(), &query.parcel())
        .await?;
    Ok(Json(
        quotes
            .into_iter()
            .map(|q| QuoteResponse {
                service_id: q.service_id,
                name: q.name,
                price: q.price.minor(),
                estimated_delivery_days: q.estimated_delivery_days,
            })
            .collect(),
    ))
}

/// GET /v1/tracking/:tracking_number: Scan history, oldest first.
#[utoipa::path(
    get,
    path = "/v1/tracking/{tracking_number}",
    params(("tracking_number" = String, Path, description = "Carrier tracking number")),
    responses(
        (status = 200, description = "Tracking events", body = Vec<TrackingEventResponse>),
        (status = 422, description = "Malformed tracking number", body = crate::error::ErrorBody),
        (status = 502, description = "Carrier error", body = crate::error::ErrorBody),
        (status = 503, description = "Carrier not configured", body = crate::error::ErrorBody),
    ),
    tag = "shipments"
)]
pub async fn track(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Path(tracking_number): Path<String>,
) -> Result<Json<Vec<TrackingEventResponse>>, AppError> {
    let carrier = require_carrier(&state)?;
    let snapshot = carrier.track_shipment(&tracking_number).await?;
    Ok(Json(
        snapshot
            .events
            .into_iter()
            .map(TrackingEventResponse::from)
            .collect(),
    ))
}
