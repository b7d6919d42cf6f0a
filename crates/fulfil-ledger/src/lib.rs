#![deny(missing_docs)]

//! # fulfil-ledger: Credit Ledger
//!
//! Owns every user's prepaid balance. Nothing else in the workspace writes a
//! balance: all changes go through [`LedgerStore`], and each change appends
//! exactly one [`FeeHistoryEntry`] in the same atomic step.
//!
//! ## Guarantees
//!
//! - A debit either applies fully (balance decremented, row written) or not
//!   at all. Balances never go negative.
//! - Debits and reversals are idempotent per order: replaying either returns
//!   the original row without touching the balance.
//! - For one user, check-and-apply is serialized, so two concurrent debits
//!   cannot both pass a balance check against the same funds.
//! - Per user, `balance_after` of each row equals `balance_before` of the next
//!   (see [`verify_chain`]).

pub mod entry;
pub mod error;
pub mod memory;
pub mod store;

pub use entry::{verify_chain, EntryKind, FeeHistoryEntry, LedgerResult};
pub use error::LedgerError;
pub use memory::InMemoryLedger;
pub use store::LedgerStore;
