#![deny(missing_docs)]

//! # fulfil-core: Foundational Types for the Fulfilment Stack
//!
//! Every other crate in the workspace depends on this one. It has no internal
//! crate dependencies: only `serde`, `serde_json`, `thiserror`, `chrono`, and
//! `uuid` from the external ecosystem.
//!
//! ## Design Principles
//!
//! 1. **Newtype identifiers.** You cannot pass a [`UserId`] where an
//!    [`OrderId`] is expected.
//!
//! 2. **Money is an integer.** [`Amount`] counts the smallest currency unit
//!    (satang for THB). No floating point anywhere near a balance.
//!
//! 3. **The order owns its invariants.** [`Order`] only exposes mutations that
//!    keep the tracking number write-once and the status monotone.

pub mod error;
pub mod identity;
pub mod money;
pub mod order;
pub mod parcel;

pub use error::{OrderError, ValidationError};
pub use identity::{OrderId, UserId};
pub use money::Amount;
pub use order::{FulfillmentStage, Order, OrderDraft, OrderItem, OrderStatus};
pub use parcel::{Address, CodInfo, Parcel, Role};
