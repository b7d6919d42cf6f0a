//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps domain errors from fulfil-core, fulfil-ledger and the orchestrator to
//! HTTP status codes with a JSON body carrying an error code, message, and
//! optional details. Internal error details never reach the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use fulfil_fees::FeeError;
use fulfil_ledger::LedgerError;

use crate::orchestration::FulfillmentError;

/// Structured JSON error response body.
///
/// All error responses use this format for consistency across the API surface.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "VALIDATION_ERROR").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Authentication failure: missing or invalid token (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The account balance does not cover the charge (402).
    #[error("payment required: {0}")]
    PaymentRequired(String),

    /// Authorization failure: insufficient permissions (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Conflict with current resource state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),

    /// The carrier failed or declined the request (502).
    #[error("upstream error: {0}")]
    Upstream(String),

    /// A required collaborator is not configured (503).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    /// Convenience constructor for 503 responses.
    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::PaymentRequired(_) => (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_BALANCE"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::Upstream(_) => (StatusCode::BAD_GATEWAY, "CARRIER_ERROR"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<fulfil_core::ValidationError> for AppError {
    fn from(err: fulfil_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match &err {
            LedgerError::InsufficientBalance { .. } => Self::PaymentRequired(err.to_string()),
            LedgerError::InvalidAmount { .. } => Self::Validation(err.to_string()),
            LedgerError::NothingToReverse { .. }
            | LedgerError::AmountMismatch { .. }
            | LedgerError::AlreadyReversed { .. } => Self::Conflict(err.to_string()),
            LedgerError::Overflow | LedgerError::BrokenChain { .. } | LedgerError::Storage(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<fulfil_carrier::CarrierError> for AppError {
    fn from(err: fulfil_carrier::CarrierError) -> Self {
        match &err {
            fulfil_carrier::CarrierError::InvalidTrackingNumber(_) => {
                Self::Validation(err.to_string())
            }
            fulfil_carrier::CarrierError::Signing(_) | fulfil_carrier::CarrierError::Config(_) => {
                Self::Internal(err.to_string())
            }
            _ => Self::Upstream(err.to_string()),
        }
    }
}

impl From<FulfillmentError> for AppError {
    fn from(err: FulfillmentError) -> Self {
        match err {
            FulfillmentError::Validation(e) => e.into(),
            FulfillmentError::Fee(
                e @ (FeeError::WeightOutOfRange { .. } | FeeError::NegativeComponent { .. }),
            ) => Self::Validation(e.to_string()),
            FulfillmentError::Fee(e) => Self::Internal(e.to_string()),
            FulfillmentError::Ledger(e) => e.into(),
            FulfillmentError::Tracking(e) => e.into(),
            FulfillmentError::NotFound(id) | FulfillmentError::OrderIdConflict(id) => {
                Self::NotFound(format!("order {id} not found"))
            }
            e @ FulfillmentError::InsufficientBalance { .. } => Self::PaymentRequired(e.to_string()),
            e @ (FulfillmentError::CarrierTransport { .. }
            | FulfillmentError::CarrierRejected { .. }
            | FulfillmentError::PreviouslyFailed { .. }) => Self::Upstream(e.to_string()),
            e @ (FulfillmentError::AlreadyInProgress(_)
            | FulfillmentError::NotShipped(_)
            | FulfillmentError::Order(_)) => Self::Conflict(e.to_string()),
            e @ (FulfillmentError::LedgerInconsistency { .. } | FulfillmentError::Persistence(_)) => {
                Self::Internal(e.to_string())
            }
        }
    }
}
