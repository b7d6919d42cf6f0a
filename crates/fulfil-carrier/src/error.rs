//! Carrier client error types.

use fulfil_signing::SigningError;

/// Errors from carrier API calls.
#[derive(Debug, thiserror::Error)]
pub enum CarrierError {
    /// Network failure or timeout. The request may not have reached the
    /// carrier.
    #[error("transport error calling {endpoint}: {source}")]
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },
    /// The carrier answered with a non-2xx HTTP status.
    #[error("carrier {endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// The carrier answered but declined the request.
    #[error("carrier {endpoint} rejected request (code {code}): {message}")]
    Rejected {
        endpoint: String,
        code: i64,
        message: String,
    },
    /// Shipment creation reported success without a tracking number.
    #[error("carrier confirmed {out_trade_no} without a tracking number")]
    MissingTrackingNumber { out_trade_no: String },
    /// The response body does not match the expected shape.
    #[error("failed to decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        source: serde_json::Error,
    },
    /// The response parsed but carries a value outside its domain.
    #[error("invalid response from {endpoint}: {detail}")]
    InvalidResponse { endpoint: String, detail: String },
    /// Tracking numbers are restricted to ASCII letters, digits, and `-`.
    #[error("invalid tracking number {0:?}")]
    InvalidTrackingNumber(String),
    /// The request could not be signed.
    #[error("signing error: {0}")]
    Signing(#[from] SigningError),
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),
}

/// Coarse classification used by callers to pick a recovery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrierErrorKind {
    /// The call failed before the carrier could act on it: no response, or
    /// a gateway status (502, 503, 504) from in front of the carrier. Safe
    /// to retry with the same reference number.
    Transport,
    /// The carrier responded and the answer is final.
    Rejected,
}

impl CarrierError {
    /// Classify this error.
    pub fn kind(&self) -> CarrierErrorKind {
        match self {
            Self::Transport { .. } => CarrierErrorKind::Transport,
            Self::Status { status, .. } if is_gateway_status(*status) => {
                CarrierErrorKind::Transport
            }
            _ => CarrierErrorKind::Rejected,
        }
    }

    /// Whether this is a transport failure.
    pub fn is_transport(&self) -> bool {
        self.kind() == CarrierErrorKind::Transport
    }
}

fn is_gateway_status(status: u16) -> bool {
    matches!(status, 502..=504)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> CarrierError {
        CarrierError::Status {
            endpoint: "/open/v3/orders".into(),
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn gateway_statuses_are_transport() {
        for code in [502, 503, 504] {
            assert_eq!(status(code).kind(), CarrierErrorKind::Transport, "{code}");
            assert!(status(code).is_transport());
        }
    }

    #[test]
    fn other_statuses_are_final() {
        for code in [400, 401, 404, 500, 501, 505] {
            assert_eq!(status(code).kind(), CarrierErrorKind::Rejected, "{code}");
        }
    }

    #[test]
    fn business_rejection_is_final() {
        let err = CarrierError::Rejected {
            endpoint: "/open/v3/orders".into(),
            code: 1002,
            message: "not serviceable".into(),
        };
        assert!(!err.is_transport());
        assert!(!CarrierError::InvalidTrackingNumber("x y".into()).is_transport());
    }
}
