//! Typed client for the carrier open API.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST   | `/open/v1/orders/estimate_rate` | Rate quote |
//! | POST   | `/open/v3/orders` | Create shipment |
//! | POST   | `/open/v1/orders/{pno}/routes` | Tracking routes |
//!
//! Every call is a signed `application/x-www-form-urlencoded` POST. The
//! client makes exactly one attempt per call; retry policy belongs to the
//! caller.

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use fulfil_core::{Address, Parcel};
use fulfil_signing::{CarrierParams, ParamValue, SignatureContext};
use serde::de::DeserializeOwned;

use crate::config::{CarrierConfig, SignatureTransport};
use crate::error::CarrierError;
use crate::gateway::CarrierGateway;
use crate::types::{
    Envelope, Quote, ShipmentRequest, ShipmentResult, ShipmentState, TrackingEvent,
    TrackingSnapshot, WireCreated, WireQuotes, WireTracking, SUCCESS_CODE,
};

const QUOTE_PATH: &str = "/open/v1/orders/estimate_rate";
const CREATE_PATH: &str = "/open/v3/orders";

/// Header carrying the signature in [`SignatureTransport::Header`] mode.
pub const SIGNATURE_HEADER: &str = "X-Sign";

/// Default express category when the order names no service.
const STANDARD_EXPRESS_CATEGORY: &str = "1";

/// Article category for general merchandise.
const GENERAL_ARTICLE_CATEGORY: i64 = 99;

/// HTTP client for the carrier.
#[derive(Debug, Clone)]
pub struct CarrierClient {
    http: reqwest::Client,
    config: CarrierConfig,
}

impl CarrierClient {
    /// Create a client from configuration.
    pub fn new(config: CarrierConfig) -> Result<Self, CarrierError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CarrierError::Transport {
                endpoint: "client_init".into(),
                source: e,
            })?;
        Ok(Self { http, config })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &CarrierConfig {
        &self.config
    }

    fn context(&self, timestamped: bool) -> SignatureContext {
        let ctx = SignatureContext::new(self.config.mch_id.as_str(), &self.config.secret_key);
        if timestamped {
            ctx.with_current_timestamp()
        } else {
            ctx
        }
    }

    /// Sign, send, and unwrap the response envelope.
    ///
    /// Returns the envelope's `data`, which may be absent even on success.
    async fn call<T: DeserializeOwned>(
        &self,
        path: &str,
        params: CarrierParams,
        timestamped: bool,
    ) -> Result<Option<T>, CarrierError> {
        let endpoint = format!("POST {path}");
        let url = format!("{}{}", self.config.base_url.as_str().trim_end_matches('/'), path);

        let signed = self.context(timestamped).sign(params)?;
        let header_mode = self.config.signature_transport == SignatureTransport::Header;
        let body = signed.to_form_body(!header_mode);

        let mut req = self
            .http
            .post(&url)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(body);
        if header_mode {
            req = req.header(SIGNATURE_HEADER, signed.signature());
        }

        tracing::debug!(%endpoint, "calling carrier");
        let resp = req.send().await.map_err(|e| CarrierError::Transport {
            endpoint: endpoint.clone(),
            source: e,
        })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(CarrierError::Status {
                endpoint,
                status,
                body,
            });
        }

        let text = resp.text().await.map_err(|e| CarrierError::Transport {
            endpoint: endpoint.clone(),
            source: e,
        })?;
        let envelope: Envelope<T> =
            serde_json::from_str(&text).map_err(|e| CarrierError::Decode {
                endpoint: endpoint.clone(),
                source: e,
            })?;

        if envelope.code != SUCCESS_CODE {
            tracing::warn!(%endpoint, code = envelope.code, message = %envelope.message, "carrier rejected request");
            return Err(CarrierError::Rejected {
                endpoint,
                code: envelope.code,
                message: envelope.message,
            });
        }
        Ok(envelope.data)
    }
}

fn address_fields(params: &mut CarrierParams, prefix: &str, a: &Address) {
    params.insert(format!("{prefix}Name"), a.name.as_str());
    params.insert(format!("{prefix}Phone"), a.phone.as_str());
    params.insert(format!("{prefix}ProvinceName"), a.province.as_str());
    params.insert(format!("{prefix}CityName"), a.city.as_str());
    params.insert(format!("{prefix}DistrictName"), a.district.as_deref());
    params.insert(format!("{prefix}PostalCode"), a.postal_code.as_str());
    params.insert(format!("{prefix}DetailAddress"), a.detail.as_str());
}

fn parcel_fields(params: &mut CarrierParams, p: &Parcel) {
    params.insert("weight", p.weight_grams);
    params.insert("length", p.length_cm);
    params.insert("width", p.width_cm);
    params.insert("height", p.height_cm);
}

fn quote_params(origin: &Address, destination: &Address, parcel: &Parcel) -> CarrierParams {
    let mut params = CarrierParams::new();
    params.insert("srcProvinceName", origin.province.as_str());
    params.insert("srcCityName", origin.city.as_str());
    params.insert("srcPostalCode", origin.postal_code.as_str());
    params.insert("dstProvinceName", destination.province.as_str());
    params.insert("dstCityName", destination.city.as_str());
    params.insert("dstPostalCode", destination.postal_code.as_str());
    parcel_fields(&mut params, parcel);
    params
}

fn shipment_params(req: &ShipmentRequest) -> CarrierParams {
    let mut params = CarrierParams::new();
    params.insert("outTradeNo", req.out_trade_no.as_str());
    params.insert(
        "expressCategory",
        req.service_id.as_deref().unwrap_or(STANDARD_EXPRESS_CATEGORY),
    );
    params.insert("articleCategory", GENERAL_ARTICLE_CATEGORY);
    address_fields(&mut params, "src", &req.sender);
    address_fields(&mut params, "dst", &req.recipient);
    parcel_fields(&mut params, &req.parcel);

    params.insert("insured", req.insured);
    if req.insured {
        params.insert("insureDeclareValue", req.declared_value.map(|v| v.minor()));
    }
    params.insert("codEnabled", req.cod.enabled);
    if req.cod.enabled {
        params.insert("codAmount", req.cod.amount.minor());
    }
    params.insert("remark", req.remark.as_deref());

    if !req.items.is_empty() {
        let items = req
            .items
            .iter()
            .map(|i| serde_json::json!({"itemName": i.name, "number": i.quantity}))
            .collect();
        params.insert("subItemTypes", ParamValue::Items(items));
    }
    params
}

fn valid_tracking_number(tn: &str) -> bool {
    !tn.is_empty() && tn.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[async_trait]
impl CarrierGateway for CarrierClient {
    async fn quote_rate(
        &self,
        origin: &Address,
        destination: &Address,
        parcel: &Parcel,
    ) -> Result<Vec<Quote>, CarrierError> {
        let data: Option<WireQuotes> = self
            .call(QUOTE_PATH, quote_params(origin, destination, parcel), true)
            .await?;
        Ok(data
            .map(|d| d.services.into_iter().map(Quote::from).collect())
            .unwrap_or_default())
    }

    async fn create_shipment(&self, req: &ShipmentRequest) -> Result<ShipmentResult, CarrierError> {
        let data: Option<WireCreated> = self.call(CREATE_PATH, shipment_params(req), true).await?;
        let pno = data
            .and_then(|d| d.pno)
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| CarrierError::MissingTrackingNumber {
                out_trade_no: req.out_trade_no.clone(),
            })?;
        tracing::info!(out_trade_no = %req.out_trade_no, tracking_number = %pno, "shipment created");
        Ok(ShipmentResult {
            tracking_number: pno,
            out_trade_no: req.out_trade_no.clone(),
        })
    }

    async fn track_shipment(&self, tracking_number: &str) -> Result<TrackingSnapshot, CarrierError> {
        if !valid_tracking_number(tracking_number) {
            return Err(CarrierError::InvalidTrackingNumber(tracking_number.to_string()));
        }
        let path = format!("/open/v1/orders/{tracking_number}/routes");
        let data: Option<WireTracking> = self.call(&path, CarrierParams::new(), false).await?;
        let Some(data) = data else {
            return Ok(TrackingSnapshot {
                tracking_number: tracking_number.to_string(),
                state: ShipmentState::Unknown,
                events: Vec::new(),
            });
        };

        let mut events = Vec::with_capacity(data.routes.len());
        for route in data.routes {
            let timestamp = DateTime::from_timestamp(route.routed_at, 0).ok_or_else(|| {
                CarrierError::InvalidResponse {
                    endpoint: format!("POST {path}"),
                    detail: format!("route timestamp {} out of range", route.routed_at),
                }
            })?;
            events.push(TrackingEvent {
                timestamp,
                location_or_stage: route.route_action,
                status_text: route.message,
            });
        }
        events.sort_by_key(|e| e.timestamp);

        Ok(TrackingSnapshot {
            tracking_number: tracking_number.to_string(),
            state: ShipmentState::from_code(data.state),
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulfil_core::{Amount, CodInfo, OrderItem};

    fn address() -> Address {
        Address {
            name: "Somchai".into(),
            phone: "0812345678".into(),
            province: "Bangkok".into(),
            city: "Chatuchak".into(),
            district: None,
            postal_code: "10900".into(),
            detail: "99/1 Phahonyothin Rd".into(),
        }
    }

    fn request() -> ShipmentRequest {
        ShipmentRequest {
            out_trade_no: "FO123".into(),
            sender: address(),
            recipient: address(),
            parcel: Parcel {
                weight_grams: 1200,
                length_cm: 20,
                width_cm: 10,
                height_cm: 5,
            },
            cod: CodInfo::NONE,
            insured: false,
            declared_value: None,
            service_id: None,
            items: vec![],
            remark: None,
        }
    }

    #[test]
    fn shipment_params_omit_cod_and_insurance_when_off() {
        let params = shipment_params(&request());
        assert_eq!(params.get("codEnabled"), Some(&ParamValue::Bool(false)));
        assert!(params.get("codAmount").is_none());
        assert!(params.get("insureDeclareValue").is_none());
        assert_eq!(params.get("weight"), Some(&ParamValue::Int(1200)));
        assert_eq!(
            params.get("expressCategory"),
            Some(&ParamValue::Str(STANDARD_EXPRESS_CATEGORY.into()))
        );
    }

    #[test]
    fn shipment_params_carry_cod_in_minor_units() {
        let mut req = request();
        req.cod = CodInfo::collect(Amount::from_major(350));
        req.insured = true;
        req.declared_value = Some(Amount::from_major(1000));
        let params = shipment_params(&req);
        assert_eq!(params.get("codAmount"), Some(&ParamValue::Int(35_000)));
        assert_eq!(params.get("insureDeclareValue"), Some(&ParamValue::Int(100_000)));
    }

    #[test]
    fn items_are_an_item_list() {
        let mut req = request();
        req.items.push(OrderItem {
            name: "Shirt".into(),
            quantity: 2,
        });
        let params = shipment_params(&req);
        assert!(params.get("subItemTypes").is_some_and(ParamValue::is_items));
    }

    #[test]
    fn quote_params_only_carry_quote_fields() {
        let params = quote_params(&address(), &address(), &request().parcel);
        assert!(params.get("outTradeNo").is_none());
        assert!(params.get("srcName").is_none());
        assert!(params.get("dstPostalCode").is_some());
    }

    #[test]
    fn tracking_number_charset() {
        assert!(valid_tracking_number("TH0123-45"));
        assert!(!valid_tracking_number("TH01/../x"));
        assert!(!valid_tracking_number(""));
    }
}
