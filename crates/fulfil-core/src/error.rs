//! # Error Hierarchy
//!
//! Structured error types for the domain model, built with `thiserror`.
//! Each variant carries the offending input so operators can diagnose a
//! rejected order without reproducing it.

use thiserror::Error;

use crate::order::OrderStatus;

/// Validation errors for user-submitted order data.
///
/// Raised before any ledger or carrier interaction takes place.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required text field is empty or whitespace.
    #[error("{field} must not be empty")]
    EmptyField {
        /// Name of the offending field.
        field: &'static str,
    },

    /// Postal code is not a 5-digit code.
    #[error("invalid postal code for {field}: \"{value}\" (expected 5 digits)")]
    InvalidPostalCode {
        /// Which address the code belongs to.
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// Phone number has characters other than digits or is the wrong length.
    #[error("invalid phone number for {field}: \"{value}\" (expected 9-15 digits)")]
    InvalidPhone {
        /// Which address the number belongs to.
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// Weight is zero or above the carrier maximum.
    #[error("invalid weight: {grams} g (expected 1..={max} g)")]
    InvalidWeight {
        /// The rejected weight in grams.
        grams: u32,
        /// The accepted maximum.
        max: u32,
    },

    /// A parcel dimension is zero or above the carrier maximum.
    #[error("invalid {field}: {value} cm (expected 1..={max} cm)")]
    InvalidDimension {
        /// Dimension name.
        field: &'static str,
        /// The rejected value in centimetres.
        value: u32,
        /// The accepted maximum.
        max: u32,
    },

    /// A monetary field is negative, or zero where a positive value is required.
    #[error("invalid amount for {field}: {value}")]
    InvalidAmount {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value in minor units.
        value: i64,
    },

    /// An item line carries a zero quantity.
    #[error("item \"{name}\" has zero quantity")]
    ZeroQuantity {
        /// Item name.
        name: String,
    },
}

/// Errors raised by the order lifecycle guards.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// A tracking number was already assigned to this order.
    #[error("order already has tracking number {existing}")]
    TrackingAlreadyAssigned {
        /// The tracking number already on the order.
        existing: String,
    },

    /// The tracking number offered is empty.
    #[error("tracking number must not be empty")]
    EmptyTrackingNumber,

    /// The requested status change would move the order backwards or out of
    /// a terminal state.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: OrderStatus,
        /// Requested status.
        to: OrderStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_messages_carry_input() {
        let err = ValidationError::InvalidPostalCode {
            field: "recipient.postal_code",
            value: "10a00".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("recipient.postal_code"));
        assert!(msg.contains("10a00"));
    }

    #[test]
    fn weight_error_mentions_bounds() {
        let err = ValidationError::InvalidWeight {
            grams: 0,
            max: 50_000,
        };
        assert!(err.to_string().contains("50000"));
    }

    #[test]
    fn order_error_transition_display() {
        let err = OrderError::InvalidTransition {
            from: OrderStatus::Delivered,
            to: OrderStatus::Shipped,
        };
        let msg = err.to_string();
        assert!(msg.contains("delivered"));
        assert!(msg.contains("shipped"));
    }
}
