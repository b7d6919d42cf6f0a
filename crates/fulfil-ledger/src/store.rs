//! # Ledger Store Trait
//!
//! The seam between the orchestrator and balance storage. The in-memory
//! implementation lives in [`crate::memory`]; the API crate provides a
//! Postgres one.

use async_trait::async_trait;
use fulfil_core::{Amount, OrderId, UserId};

use crate::entry::{FeeHistoryEntry, LedgerResult};
use crate::error::LedgerError;

/// Balance storage with atomic, audited writes.
///
/// Implementations must serialize check-and-apply per user and write the
/// history row in the same atomic step as the balance change.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Current balance. Unknown users have a zero balance.
    async fn balance(&self, user: UserId) -> Result<Amount, LedgerError>;

    /// Debit `amount` for `order` if the balance covers it.
    ///
    /// Replaying a debit that is still outstanding returns the original row
    /// with `replayed = true`.
    async fn reserve_and_debit(
        &self,
        user: UserId,
        amount: Amount,
        order: OrderId,
        description: &str,
    ) -> Result<LedgerResult, LedgerError>;

    /// Reverse the outstanding debit for `order`. `amount` must equal it.
    ///
    /// Replaying a reversal returns the original reversal row.
    async fn credit(
        &self,
        user: UserId,
        amount: Amount,
        order: OrderId,
        description: &str,
    ) -> Result<LedgerResult, LedgerError>;

    /// Add funds not tied to an order.
    async fn deposit(
        &self,
        user: UserId,
        amount: Amount,
        description: &str,
    ) -> Result<LedgerResult, LedgerError>;

    /// The user's history, oldest first.
    async fn history(&self, user: UserId) -> Result<Vec<FeeHistoryEntry>, LedgerError>;
}
