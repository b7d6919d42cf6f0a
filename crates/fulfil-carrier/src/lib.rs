//! # fulfil-carrier -- Typed client for the carrier open API
//!
//! Three operations behind the [`CarrierGateway`] trait:
//! - **Quote** a rate for a route and parcel
//! - **Create** a shipment and obtain its tracking number
//! - **Track** a shipment's scan history
//!
//! ## Architecture
//!
//! This crate is the only path to the carrier. Requests are signed with
//! `fulfil-signing`, sent once with a fixed timeout, and mapped into
//! [`CarrierError`] variants that separate transport failures (retryable
//! with the same reference number) from carrier rejections (final).
//!
//! A call counts as successful only when the HTTP status is 2xx, the envelope
//! `code` is `1`, and, for shipment creation, a tracking number is present.

pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod types;

pub use client::{CarrierClient, SIGNATURE_HEADER};
pub use config::{CarrierConfig, ConfigError, SignatureTransport};
pub use error::{CarrierError, CarrierErrorKind};
pub use gateway::CarrierGateway;
pub use types::{
    Quote, ShipmentRequest, ShipmentResult, ShipmentState, TrackingEvent, TrackingSnapshot,
};
