//! # Route Modules
//!
//! Each module exposes `router() -> Router<AppState>`; [`crate::app`] merges
//! them behind the auth middleware.

pub mod accounts;
pub mod orders;
pub mod shipments;
