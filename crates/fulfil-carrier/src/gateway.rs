//! The carrier seam used by the orchestrator.

use async_trait::async_trait;
use fulfil_core::{Address, Parcel};

use crate::error::CarrierError;
use crate::types::{Quote, ShipmentRequest, ShipmentResult, TrackingSnapshot};

/// Operations the fulfilment layer needs from a carrier.
///
/// [`crate::CarrierClient`] is the HTTP implementation. Tests substitute
/// scripted gateways.
#[async_trait]
pub trait CarrierGateway: Send + Sync {
    /// Services and prices for a route and parcel.
    async fn quote_rate(
        &self,
        origin: &Address,
        destination: &Address,
        parcel: &Parcel,
    ) -> Result<Vec<Quote>, CarrierError>;

    /// Create a shipment. Succeeds only with a confirmed, non-empty tracking
    /// number.
    async fn create_shipment(&self, request: &ShipmentRequest) -> Result<ShipmentResult, CarrierError>;

    /// Current state and scan history of a shipment.
    async fn track_shipment(&self, tracking_number: &str) -> Result<TrackingSnapshot, CarrierError>;
}
