//! # Fee History
//!
//! Append-only audit rows. A row is never updated or deleted; a reversal is a
//! new row with the opposite sign.

use chrono::{DateTime, Utc};
use fulfil_core::{Amount, OrderId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

/// What a history row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Fee charged for an order (negative amount).
    Debit,
    /// Compensating credit for a failed order (positive amount).
    Reversal,
    /// Top-up not tied to an order (positive amount).
    Deposit,
}

impl EntryKind {
    /// Return the string representation of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Reversal => "reversal",
            Self::Deposit => "deposit",
        }
    }

    /// Parse the string form produced by [`EntryKind::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debit" => Some(Self::Debit),
            "reversal" => Some(Self::Reversal),
            "deposit" => Some(Self::Deposit),
            _ => None,
        }
    }
}

/// One row of a user's fee history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeHistoryEntry {
    /// Row identifier.
    pub id: Uuid,
    /// Account holder.
    pub user_id: UserId,
    /// Order the row belongs to; `None` for deposits.
    pub order_id: Option<OrderId>,
    /// Row kind.
    pub kind: EntryKind,
    /// Position in the user's history, starting at 1.
    pub sequence: u64,
    /// Signed change applied to the balance.
    pub amount: Amount,
    /// Balance before the change.
    pub balance_before: Amount,
    /// Balance after the change.
    pub balance_after: Amount,
    /// Free-text description.
    pub description: String,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

/// Outcome of a ledger write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerResult {
    /// The row written, or the original row on replay.
    pub entry: FeeHistoryEntry,
    /// The account balance after the call.
    pub balance: Amount,
    /// True when the call matched an earlier identical write and changed
    /// nothing.
    pub replayed: bool,
}

/// Check that `entries` (one user's history, oldest first) is internally
/// consistent.
///
/// Every row must satisfy `balance_after = balance_before + amount` with a
/// non-negative `balance_after`, and each row must start where the previous
/// one ended.
pub fn verify_chain(entries: &[FeeHistoryEntry]) -> Result<(), LedgerError> {
    let mut prev: Option<&FeeHistoryEntry> = None;
    for (index, row) in entries.iter().enumerate() {
        let broken = |detail: String| LedgerError::BrokenChain { index, detail };

        let expected = row
            .balance_before
            .checked_add(row.amount)
            .ok_or_else(|| broken("balance overflow".into()))?;
        if expected != row.balance_after {
            return Err(broken(format!(
                "balance_after {} != balance_before {} + amount {}",
                row.balance_after, row.balance_before, row.amount
            )));
        }
        if row.balance_after.is_negative() {
            return Err(broken(format!("negative balance {}", row.balance_after)));
        }

        if let Some(p) = prev {
            if p.user_id != row.user_id {
                return Err(broken(format!(
                    "row belongs to {}, chain belongs to {}",
                    row.user_id, p.user_id
                )));
            }
            if row.sequence <= p.sequence {
                return Err(broken(format!(
                    "sequence {} does not follow {}",
                    row.sequence, p.sequence
                )));
            }
            if p.balance_after != row.balance_before {
                return Err(broken(format!(
                    "balance_before {} does not continue previous balance_after {}",
                    row.balance_before, p.balance_after
                )));
            }
        }
        prev = Some(row);
    }
    Ok(())
}
