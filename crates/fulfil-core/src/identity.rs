//! # Identity Newtypes
//!
//! UUID-backed identifiers. Always valid by construction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a fulfilment order.
///
/// The order id doubles as the idempotency key for orchestration and is the
/// source of the provider-facing reference number (`outTradeNo`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Create a new random order identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an order identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Provider-facing reference number for this order.
    ///
    /// Deterministic, so every retry for the same order presents the same
    /// reference and the provider can deduplicate.
    pub fn out_trade_no(&self) -> String {
        format!("FO{}", self.0.simple()).to_uppercase()
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a user (account holder).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Create a new random user identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a user identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_trade_no_is_stable_for_an_order() {
        let id = OrderId::new();
        assert_eq!(id.out_trade_no(), id.out_trade_no());
        assert!(id.out_trade_no().starts_with("FO"));
        assert_eq!(id.out_trade_no().len(), 34);
    }

    #[test]
    fn distinct_orders_have_distinct_references() {
        assert_ne!(OrderId::new().out_trade_no(), OrderId::new().out_trade_no());
    }

    #[test]
    fn ids_serialize_as_plain_uuid() {
        let uuid = Uuid::new_v4();
        let id = UserId::from_uuid(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{uuid}\""));
    }
}
