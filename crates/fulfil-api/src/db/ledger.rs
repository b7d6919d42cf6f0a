//! Postgres-backed [`LedgerStore`].
//!
//! Each write is one transaction that locks the user's `credit_accounts` row
//! with `SELECT ... FOR UPDATE`, checks the balance, appends the
//! `fee_history` row, and updates the balance. Concurrent debits for one user
//! therefore serialize at the database; different users do not contend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fulfil_core::{Amount, OrderId, UserId};
use fulfil_ledger::{EntryKind, FeeHistoryEntry, LedgerError, LedgerResult, LedgerStore};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Ledger stored in Postgres.
#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    /// Ledger over `pool`. Migrations must already have run.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn storage(e: sqlx::Error) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

fn require_positive(amount: Amount) -> Result<(), LedgerError> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount { amount })
    }
}

const ENTRY_COLUMNS: &str = "id, user_id, order_id, kind, sequence, amount, balance_before, \
                             balance_after, description, created_at";

/// Lock the account row. `None` when the user has no account.
async fn lock_balance(
    tx: &mut Transaction<'_, Postgres>,
    user: UserId,
) -> Result<Option<Amount>, LedgerError> {
    let balance: Option<i64> =
        sqlx::query_scalar("SELECT balance FROM credit_accounts WHERE user_id = $1 FOR UPDATE")
            .bind(user.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(storage)?;
    Ok(balance.map(Amount::from_minor))
}

async fn order_entry(
    tx: &mut Transaction<'_, Postgres>,
    user: UserId,
    order: OrderId,
    kind: EntryKind,
) -> Result<Option<FeeHistoryEntry>, LedgerError> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM fee_history WHERE user_id = $1 AND order_id = $2 AND kind = $3"
    );
    let row = sqlx::query_as::<_, EntryRow>(&sql)
        .bind(user.as_uuid())
        .bind(order.as_uuid())
        .bind(kind.as_str())
        .fetch_optional(&mut **tx)
        .await
        .map_err(storage)?;
    row.map(EntryRow::into_entry).transpose()
}

/// Append a row and move the balance. The account row must be locked.
async fn append(
    tx: &mut Transaction<'_, Postgres>,
    user: UserId,
    order: Option<OrderId>,
    kind: EntryKind,
    before: Amount,
    amount: Amount,
    description: &str,
) -> Result<FeeHistoryEntry, LedgerError> {
    let after = before.checked_add(amount).ok_or(LedgerError::Overflow)?;
    if after.is_negative() {
        return Err(LedgerError::InsufficientBalance {
            required: amount.checked_neg().ok_or(LedgerError::Overflow)?,
            available: before,
        });
    }
    let sequence: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(sequence), 0) + 1 FROM fee_history WHERE user_id = $1",
    )
    .bind(user.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(storage)?;

    let entry = FeeHistoryEntry {
        id: Uuid::new_v4(),
        user_id: user,
        order_id: order,
        kind,
        sequence: u64::try_from(sequence)
            .map_err(|_| LedgerError::Storage(format!("invalid sequence {sequence}")))?,
        amount,
        balance_before: before,
        balance_after: after,
        description: description.to_string(),
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO fee_history (id, user_id, order_id, kind, sequence, amount, balance_before, balance_after, description, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(entry.id)
    .bind(user.as_uuid())
    .bind(order.map(|o| *o.as_uuid()))
    .bind(kind.as_str())
    .bind(sequence)
    .bind(amount.minor())
    .bind(before.minor())
    .bind(after.minor())
    .bind(description)
    .bind(entry.created_at)
    .execute(&mut **tx)
    .await
    .map_err(storage)?;

    sqlx::query("UPDATE credit_accounts SET balance = $1, updated_at = $2 WHERE user_id = $3")
        .bind(after.minor())
        .bind(entry.created_at)
        .bind(user.as_uuid())
        .execute(&mut **tx)
        .await
        .map_err(storage)?;

    Ok(entry)
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn balance(&self, user: UserId) -> Result<Amount, LedgerError> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance FROM credit_accounts WHERE user_id = $1")
                .bind(user.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;
        Ok(balance.map_or(Amount::ZERO, Amount::from_minor))
    }

    async fn reserve_and_debit(
        &self,
        user: UserId,
        amount: Amount,
        order: OrderId,
        description: &str,
    ) -> Result<LedgerResult, LedgerError> {
        require_positive(amount)?;
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let Some(balance) = lock_balance(&mut tx, user).await? else {
            return Err(LedgerError::InsufficientBalance {
                required: amount,
                available: Amount::ZERO,
            });
        };

        if let Some(debit) = order_entry(&mut tx, user, order, EntryKind::Debit).await? {
            if order_entry(&mut tx, user, order, EntryKind::Reversal)
                .await?
                .is_some()
            {
                return Err(LedgerError::AlreadyReversed { order });
            }
            let debited = debit.amount.checked_neg().ok_or(LedgerError::Overflow)?;
            if debited != amount {
                return Err(LedgerError::AmountMismatch {
                    order,
                    debited,
                    requested: amount,
                });
            }
            tracing::debug!(order = %order, "debit replayed");
            return Ok(LedgerResult {
                entry: debit,
                balance,
                replayed: true,
            });
        }

        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                required: amount,
                available: balance,
            });
        }

        let delta = amount.checked_neg().ok_or(LedgerError::Overflow)?;
        let entry = append(&mut tx, user, Some(order), EntryKind::Debit, balance, delta, description)
            .await?;
        tx.commit().await.map_err(storage)?;
        tracing::info!(user = %user, order = %order, amount = %amount, "balance debited");
        Ok(LedgerResult {
            balance: entry.balance_after,
            entry,
            replayed: false,
        })
    }

    async fn credit(
        &self,
        user: UserId,
        amount: Amount,
        order: OrderId,
        description: &str,
    ) -> Result<LedgerResult, LedgerError> {
        require_positive(amount)?;
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let Some(balance) = lock_balance(&mut tx, user).await? else {
            return Err(LedgerError::NothingToReverse { order });
        };
        let Some(debit) = order_entry(&mut tx, user, order, EntryKind::Debit).await? else {
            return Err(LedgerError::NothingToReverse { order });
        };
        let debited = debit.amount.checked_neg().ok_or(LedgerError::Overflow)?;
        if debited != amount {
            return Err(LedgerError::AmountMismatch {
                order,
                debited,
                requested: amount,
            });
        }
        if let Some(reversal) = order_entry(&mut tx, user, order, EntryKind::Reversal).await? {
            tracing::debug!(order = %order, "reversal replayed");
            return Ok(LedgerResult {
                entry: reversal,
                balance,
                replayed: true,
            });
        }

        let entry = append(&mut tx, user, Some(order), EntryKind::Reversal, balance, amount, description)
            .await?;
        tx.commit().await.map_err(storage)?;
        tracing::info!(user = %user, order = %order, amount = %amount, "debit reversed");
        Ok(LedgerResult {
            balance: entry.balance_after,
            entry,
            replayed: false,
        })
    }

    async fn deposit(
        &self,
        user: UserId,
        amount: Amount,
        description: &str,
    ) -> Result<LedgerResult, LedgerError> {
        require_positive(amount)?;
        let mut tx = self.pool.begin().await.map_err(storage)?;

        sqlx::query(
            "INSERT INTO credit_accounts (user_id, balance) VALUES ($1, 0) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        let balance = lock_balance(&mut tx, user)
            .await?
            .ok_or_else(|| LedgerError::Storage(format!("account {user} vanished")))?;
        let entry = append(&mut tx, user, None, EntryKind::Deposit, balance, amount, description)
            .await?;
        tx.commit().await.map_err(storage)?;
        tracing::info!(user = %user, amount = %amount, "deposit recorded");
        Ok(LedgerResult {
            balance: entry.balance_after,
            entry,
            replayed: false,
        })
    }

    async fn history(&self, user: UserId) -> Result<Vec<FeeHistoryEntry>, LedgerError> {
        let sql =
            format!("SELECT {ENTRY_COLUMNS} FROM fee_history WHERE user_id = $1 ORDER BY sequence");
        let rows = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(user.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        rows.into_iter().map(EntryRow::into_entry).collect()
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct EntryRow {
    id: Uuid,
    user_id: Uuid,
    order_id: Option<Uuid>,
    kind: String,
    sequence: i64,
    amount: i64,
    balance_before: i64,
    balance_after: i64,
    description: String,
    created_at: DateTime<Utc>,
}

impl EntryRow {
    fn into_entry(self) -> Result<FeeHistoryEntry, LedgerError> {
        let kind = EntryKind::parse(&self.kind)
            .ok_or_else(|| LedgerError::Storage(format!("unknown entry kind {:?}", self.kind)))?;
        let sequence = u64::try_from(self.sequence)
            .map_err(|_| LedgerError::Storage(format!("invalid sequence {}", self.sequence)))?;
        Ok(FeeHistoryEntry {
            id: self.id,
            user_id: UserId::from_uuid(self.user_id),
            order_id: self.order_id.map(OrderId::from_uuid),
            kind,
            sequence,
            amount: Amount::from_minor(self.amount),
            balance_before: Amount::from_minor(self.balance_before),
            balance_after: Amount::from_minor(self.balance_after),
            description: self.description,
            created_at: self.created_at,
        })
    }
}
