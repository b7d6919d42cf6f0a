//! # fulfil-cli: Fulfilment Operator Tooling
//!
//! ## Subcommands
//!
//! - `sign`: canonical string and signature for a set of carrier fields
//! - `fee`: fee breakdown for a parcel under a schedule
//!
//! Handlers parse nothing themselves and delegate to the domain crates; each
//! returns the process exit code.

pub mod fee;
pub mod sign;
