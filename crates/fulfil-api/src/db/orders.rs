//! Order persistence operations.
//!
//! The whole order is stored as JSON in `data`; lifecycle rules are enforced
//! by [`fulfil_core::Order`], not in SQL.

use chrono::{DateTime, Utc};
use fulfil_core::Order;
use sqlx::PgPool;
use uuid::Uuid;

/// Insert or replace an order.
pub async fn upsert(pool: &PgPool, order: &Order) -> Result<(), sqlx::Error> {
    let data = serde_json::to_value(order)
        .map_err(|e| sqlx::Error::Protocol(format!("failed to serialize order: {e}")))?;

    sqlx::query(
        "INSERT INTO orders (id, user_id, status, stage, tracking_number, total_fee, data, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         ON CONFLICT (id) DO UPDATE SET
             status = EXCLUDED.status,
             stage = EXCLUDED.stage,
             tracking_number = EXCLUDED.tracking_number,
             total_fee = EXCLUDED.total_fee,
             data = EXCLUDED.data,
             updated_at = EXCLUDED.updated_at",
    )
    .bind(order.id.as_uuid())
    .bind(order.user_id().as_uuid())
    .bind(order.status().as_str())
    .bind(order.stage().as_str())
    .bind(order.tracking_number())
    .bind(order.total_fee.minor())
    .bind(&data)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load all orders, oldest first. Rows that no longer deserialize are
/// skipped with a warning.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Order>, sqlx::Error> {
    let rows = sqlx::query_as::<_, OrderRow>(
        "SELECT id, data, updated_at FROM orders ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().filter_map(OrderRow::into_order).collect())
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    data: serde_json::Value,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self) -> Option<Order> {
        match serde_json::from_value::<Order>(self.data) {
            Ok(order) => Some(order),
            Err(e) => {
                tracing::warn!(
                    id = %self.id,
                    updated_at = %self.updated_at,
                    error = %e,
                    "failed to deserialize stored order, skipping"
                );
                None
            }
        }
    }
}
