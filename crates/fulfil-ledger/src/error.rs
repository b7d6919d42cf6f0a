//! Ledger errors.

use fulfil_core::{Amount, OrderId};
use thiserror::Error;

/// Errors raised by ledger operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The balance does not cover the debit. Nothing was changed.
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Amount requested.
        required: Amount,
        /// Balance at the time of the check.
        available: Amount,
    },

    /// Amounts passed to the ledger must be strictly positive.
    #[error("ledger amounts must be positive, got {amount}")]
    InvalidAmount {
        /// The rejected amount.
        amount: Amount,
    },

    /// A reversal was requested for an order with no debit.
    #[error("order {order} has no debit to reverse")]
    NothingToReverse {
        /// The order.
        order: OrderId,
    },

    /// A replay or reversal named a different amount than the recorded debit.
    #[error("order {order} was debited {debited}, not {requested}")]
    AmountMismatch {
        /// The order.
        order: OrderId,
        /// Amount of the recorded debit.
        debited: Amount,
        /// Amount in the request.
        requested: Amount,
    },

    /// The order's debit was already reversed; it cannot be charged again.
    #[error("order {order} was already debited and reversed")]
    AlreadyReversed {
        /// The order.
        order: OrderId,
    },

    /// The resulting balance does not fit in an amount.
    #[error("balance overflow")]
    Overflow,

    /// History rows do not form a continuous chain.
    #[error("fee history chain broken at row {index}: {detail}")]
    BrokenChain {
        /// Position of the offending row.
        index: usize,
        /// What is wrong with it.
        detail: String,
    },

    /// The backing store failed.
    #[error("ledger storage error: {0}")]
    Storage(String),
}
