//! Request and response types for the carrier open API.
//!
//! Wire structs (`Wire*`) mirror the carrier's JSON and stay private to the
//! crate; callers only see the domain types.

use chrono::{DateTime, Utc};
use fulfil_core::{Address, Amount, CodInfo, Order, OrderItem, OrderStatus, Parcel};
use serde::{Deserialize, Serialize};

/// Provider code for a successful call.
pub const SUCCESS_CODE: i64 = 1;

/// One service offered by the carrier for a route and parcel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Carrier service identifier.
    pub service_id: String,
    /// Display name.
    pub name: String,
    /// Price in minor units.
    pub price: Amount,
    /// Expected transit time.
    pub estimated_delivery_days: u32,
}

/// Everything the carrier needs to create a shipment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentRequest {
    /// Our reference number; the carrier deduplicates on it.
    pub out_trade_no: String,
    pub sender: Address,
    pub recipient: Address,
    pub parcel: Parcel,
    pub cod: CodInfo,
    pub insured: bool,
    pub declared_value: Option<Amount>,
    /// Carrier service; the carrier's standard service when `None`.
    pub service_id: Option<String>,
    pub items: Vec<OrderItem>,
    pub remark: Option<String>,
}

impl ShipmentRequest {
    /// Build the request for an order. The reference number is derived from
    /// the order id, so every attempt for one order carries the same one.
    pub fn from_order(order: &Order) -> Self {
        let d = &order.draft;
        Self {
            out_trade_no: order.id.out_trade_no(),
            sender: d.sender.clone(),
            recipient: d.recipient.clone(),
            parcel: d.parcel,
            cod: d.cod,
            insured: d.insured,
            declared_value: d.declared_value,
            service_id: d.service_id.clone(),
            items: d.items.clone(),
            remark: d.remark.clone(),
        }
    }
}

/// A confirmed shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentResult {
    /// Carrier tracking number (never empty).
    pub tracking_number: String,
    /// Our reference number, echoed.
    pub out_trade_no: String,
}

/// Carrier-side shipment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentState {
    PickedUp,
    InTransit,
    OutForDelivery,
    Exception,
    Delivered,
    Returned,
    Cancelled,
    Unknown,
}

impl ShipmentState {
    /// Map the carrier's numeric state code.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::PickedUp,
            2 => Self::InTransit,
            3 => Self::OutForDelivery,
            4 => Self::Exception,
            5 => Self::Delivered,
            7 => Self::Returned,
            9 => Self::Cancelled,
            _ => Self::Unknown,
        }
    }

    /// Order status implied by this state, if any.
    pub fn order_status(&self) -> Option<OrderStatus> {
        match self {
            Self::PickedUp | Self::InTransit | Self::OutForDelivery | Self::Exception => {
                Some(OrderStatus::Shipped)
            }
            Self::Delivered => Some(OrderStatus::Delivered),
            Self::Cancelled => Some(OrderStatus::Cancelled),
            Self::Returned | Self::Unknown => None,
        }
    }
}

/// One tracking scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEvent {
    pub timestamp: DateTime<Utc>,
    pub location_or_stage: String,
    pub status_text: String,
}

/// Current tracking state and the scan history, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSnapshot {
    pub tracking_number: String,
    pub state: ShipmentState,
    pub events: Vec<TrackingEvent>,
}

// -- Wire types ---------------------------------------------------------------

/// Response envelope shared by every endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireCreated {
    #[serde(default)]
    pub pno: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireQuotes {
    #[serde(default)]
    pub services: Vec<WireService>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireService {
    pub service_id: String,
    #[serde(default)]
    pub name: String,
    pub price: i64,
    #[serde(default)]
    pub estimated_delivery_days: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireTracking {
    pub state: i64,
    #[serde(default)]
    pub routes: Vec<WireRoute>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireRoute {
    /// Unix seconds.
    pub routed_at: i64,
    #[serde(default)]
    pub route_action: String,
    #[serde(default)]
    pub message: String,
}

impl From<WireService> for Quote {
    fn from(s: WireService) -> Self {
        Self {
            service_id: s.service_id,
            name: s.name,
            price: Amount::from_minor(s.price),
            estimated_delivery_days: s.estimated_delivery_days,
        }
    }
}
