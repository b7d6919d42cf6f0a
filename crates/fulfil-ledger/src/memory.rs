//! # In-Memory Ledger
//!
//! One [`AccountBook`] per user behind its own `parking_lot::Mutex`, held in
//! a `DashMap`. Holding the book's lock for the whole check-and-apply
//! serializes writers for one user while leaving other users independent.
//! No lock is held across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use fulfil_core::{Amount, OrderId, UserId};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::entry::{EntryKind, FeeHistoryEntry, LedgerResult};
use crate::error::LedgerError;
use crate::store::LedgerStore;

/// Ledger held in process memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLedger {
    accounts: Arc<DashMap<UserId, Arc<Mutex<AccountBook>>>>,
}

impl InMemoryLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    fn book(&self, user: UserId) -> Arc<Mutex<AccountBook>> {
        self.accounts.entry(user).or_default().value().clone()
    }

    fn existing_book(&self, user: UserId) -> Option<Arc<Mutex<AccountBook>>> {
        self.accounts.get(&user).map(|b| b.value().clone())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn balance(&self, user: UserId) -> Result<Amount, LedgerError> {
        Ok(self
            .existing_book(user)
            .map_or(Amount::ZERO, |b| b.lock().balance))
    }

    async fn reserve_and_debit(
        &self,
        user: UserId,
        amount: Amount,
        order: OrderId,
        description: &str,
    ) -> Result<LedgerResult, LedgerError> {
        require_positive(amount)?;
        let Some(book) = self.existing_book(user) else {
            return Err(LedgerError::InsufficientBalance {
                required: amount,
                available: Amount::ZERO,
            });
        };
        let mut book = book.lock();
        book.debit(user, amount, order, description)
    }

    async fn credit(
        &self,
        user: UserId,
        amount: Amount,
        order: OrderId,
        description: &str,
    ) -> Result<LedgerResult, LedgerError> {
        require_positive(amount)?;
        let Some(book) = self.existing_book(user) else {
            return Err(LedgerError::NothingToReverse { order });
        };
        let mut book = book.lock();
        book.reverse(user, amount, order, description)
    }

    async fn deposit(
        &self,
        user: UserId,
        amount: Amount,
        description: &str,
    ) -> Result<LedgerResult, LedgerError> {
        require_positive(amount)?;
        let book = self.book(user);
        let mut book = book.lock();
        let entry = book.append(user, None, EntryKind::Deposit, amount, description)?;
        tracing::info!(user = %user, amount = %amount, "deposit recorded");
        Ok(LedgerResult {
            entry,
            balance: book.balance,
            replayed: false,
        })
    }

    async fn history(&self, user: UserId) -> Result<Vec<FeeHistoryEntry>, LedgerError> {
        Ok(self
            .existing_book(user)
            .map(|b| b.lock().entries.clone())
            .unwrap_or_default())
    }
}

fn require_positive(amount: Amount) -> Result<(), LedgerError> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount { amount })
    }
}

/// One user's balance, history, and per-order indexes.
#[derive(Debug, Default)]
struct AccountBook {
    balance: Amount,
    entries: Vec<FeeHistoryEntry>,
    debits: HashMap<OrderId, usize>,
    reversals: HashMap<OrderId, usize>,
}

impl AccountBook {
    fn append(
        &mut self,
        user: UserId,
        order: Option<OrderId>,
        kind: EntryKind,
        amount: Amount,
        description: &str,
    ) -> Result<FeeHistoryEntry, LedgerError> {
        let before = self.balance;
        let after = before.checked_add(amount).ok_or(LedgerError::Overflow)?;
        if after.is_negative() {
            return Err(LedgerError::InsufficientBalance {
                required: amount.checked_neg().ok_or(LedgerError::Overflow)?,
                available: before,
            });
        }
        let entry = FeeHistoryEntry {
            id: Uuid::new_v4(),
            user_id: user,
            order_id: order,
            kind,
            sequence: self.entries.len() as u64 + 1,
            amount,
            balance_before: before,
            balance_after: after,
            description: description.to_string(),
            created_at: Utc::now(),
        };
        self.balance = after;
        self.entries.push(entry.clone());
        Ok(entry)
    }

    fn replay(&self, index: usize) -> Result<LedgerResult, LedgerError> {
        let entry = self
            .entries
            .get(index)
            .cloned()
            .ok_or_else(|| LedgerError::Storage(format!("missing history row {index}")))?;
        Ok(LedgerResult {
            entry,
            balance: self.balance,
            replayed: true,
        })
    }

    fn debit(
        &mut self,
        user: UserId,
        amount: Amount,
        order: OrderId,
        description: &str,
    ) -> Result<LedgerResult, LedgerError> {
        if let Some(&index) = self.debits.get(&order) {
            if self.reversals.contains_key(&order) {
                return Err(LedgerError::AlreadyReversed { order });
            }
            let debited = self.debited_amount(index);
            if debited != amount {
                return Err(LedgerError::AmountMismatch {
                    order,
                    debited,
                    requested: amount,
                });
            }
            tracing::debug!(order = %order, "debit replayed");
            return self.replay(index);
        }

        if self.balance < amount {
            return Err(LedgerError::InsufficientBalance {
                required: amount,
                available: self.balance,
            });
        }
        let negated = amount.checked_neg().ok_or(LedgerError::Overflow)?;
        let entry = self.append(user, Some(order), EntryKind::Debit, negated, description)?;
        self.debits.insert(order, self.entries.len() - 1);
        tracing::info!(user = %user, order = %order, amount = %amount, "balance debited");
        Ok(LedgerResult {
            entry,
            balance: self.balance,
            replayed: false,
        })
    }

    fn reverse(
        &mut self,
        user: UserId,
        amount: Amount,
        order: OrderId,
        description: &str,
    ) -> Result<LedgerResult, LedgerError> {
        let Some(&debit_index) = self.debits.get(&order) else {
            return Err(LedgerError::NothingToReverse { order });
        };
        let debited = self.debited_amount(debit_index);
        if debited != amount {
            return Err(LedgerError::AmountMismatch {
                order,
                debited,
                requested: amount,
            });
        }
        if let Some(&index) = self.reversals.get(&order) {
            tracing::debug!(order = %order, "reversal replayed");
            return self.replay(index);
        }

        let entry = self.append(user, Some(order), EntryKind::Reversal, amount, description)?;
        self.reversals.insert(order, self.entries.len() - 1);
        tracing::info!(user = %user, order = %order, amount = %amount, "debit reversed");
        Ok(LedgerResult {
            entry,
            balance: self.balance,
            replayed: false,
        })
    }

    fn debited_amount(&self, index: usize) -> Amount {
        self.entries
            .get(index)
            .and_then(|e| e.amount.checked_neg())
            .unwrap_or(Amount::ZERO)
    }
}
