//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! ## Architecture
//!
//! - **Orders**: in-memory [`OrderBook`], written through to Postgres when a
//!   pool is configured and hydrated from it at start-up.
//! - **Ledger**: any [`LedgerStore`]. In-memory by default, Postgres-backed
//!   when a pool is configured. The ledger is the only writer of balances.
//! - **Fee schedule**: immutable after start-up.
//! - **Carrier**: optional. Without it, carrier-backed endpoints return 503.

use std::collections::HashMap;
use std::sync::Arc;

use fulfil_carrier::CarrierGateway;
use fulfil_core::{Order, OrderId, UserId};
use fulfil_fees::FeeSchedule;
use fulfil_ledger::{InMemoryLedger, LedgerStore};
use parking_lot::RwLock;
use sqlx::PgPool;
use zeroize::Zeroizing;

use crate::orchestration::{Orchestrator, RetryPolicy};

// -- Orders -------------------------------------------------------------------

/// Order records. Reads are served from memory; writes go to memory first
/// and then, when a pool is configured, to the `orders` table.
///
/// Clones share the same map. The lock is never held across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    db_pool: Option<PgPool>,
}

impl OrderBook {
    /// Memory-only order book.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Order book writing through to `pool` when present.
    pub fn with_pool(db_pool: Option<PgPool>) -> Self {
        Self {
            orders: Arc::default(),
            db_pool,
        }
    }

    /// Fetch an order.
    pub fn get(&self, id: OrderId) -> Option<Order> {
        self.orders.read().get(&id).cloned()
    }

    /// A user's orders, newest first.
    pub fn list_for_user(&self, user: UserId) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .values()
            .filter(|o| o.user_id() == user)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }

    /// Orders charged but left without a settled outcome, oldest first.
    pub fn interrupted(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .values()
            .filter(|o| o.stage().is_interrupted())
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        orders
    }

    /// Number of orders held in memory.
    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    /// Whether no orders are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store the order's current state.
    ///
    /// The in-memory copy is always updated. The returned error, if any,
    /// comes from the database write.
    pub async fn save(&self, order: &Order) -> Result<(), sqlx::Error> {
        self.orders.write().insert(order.id, order.clone());
        if let Some(pool) = &self.db_pool {
            crate::db::orders::upsert(pool, order).await?;
        }
        Ok(())
    }

    /// Load every persisted order into memory. Returns the count loaded.
    pub async fn hydrate(&self) -> Result<usize, sqlx::Error> {
        let Some(pool) = &self.db_pool else {
            return Ok(0);
        };
        let orders = crate::db::orders::load_all(pool).await?;
        let count = orders.len();
        let mut map = self.orders.write();
        for order in orders {
            map.insert(order.id, order);
        }
        Ok(count)
    }
}

// -- Application State --------------------------------------------------------

/// Application configuration.
///
/// Custom `Debug` redacts the `auth_token`.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Shared bearer secret. If `None`, authentication is disabled.
    pub auth_token: Option<Zeroizing<String>>,
    /// Attempts per shipment creation when the carrier is unreachable.
    pub carrier_max_attempts: u32,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("carrier_max_attempts", &self.carrier_max_attempts)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            carrier_max_attempts: RetryPolicy::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Order records.
    pub orders: OrderBook,
    /// Balance owner.
    pub ledger: Arc<dyn LedgerStore>,
    /// Active fee schedule.
    pub fees: Arc<FeeSchedule>,
    /// Carrier gateway, when configured.
    pub carrier: Option<Arc<dyn CarrierGateway>>,
    /// Fulfilment orchestrator. Present exactly when `carrier` is.
    pub orchestrator: Option<Orchestrator>,
    /// PostgreSQL pool. `None` means in-memory only.
    pub db_pool: Option<PgPool>,
    pub config: AppConfig,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("orders", &self.orders.len())
            .field("carrier", &self.carrier.is_some())
            .field("db_pool", &self.db_pool.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// In-memory state with the default fee schedule and no carrier.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default(), None)
    }

    /// In-memory state with the given configuration and carrier.
    pub fn with_config(config: AppConfig, carrier: Option<Arc<dyn CarrierGateway>>) -> Self {
        Self::from_parts(
            config,
            Arc::new(InMemoryLedger::new()),
            Arc::new(FeeSchedule::default()),
            carrier,
            None,
        )
    }

    /// Assemble state from explicit collaborators.
    pub fn from_parts(
        config: AppConfig,
        ledger: Arc<dyn LedgerStore>,
        fees: Arc<FeeSchedule>,
        carrier: Option<Arc<dyn CarrierGateway>>,
        db_pool: Option<PgPool>,
    ) -> Self {
        let orders = OrderBook::with_pool(db_pool.clone());
        let orchestrator = carrier.as_ref().map(|carrier| {
            Orchestrator::new(
                Arc::clone(&ledger),
                Arc::clone(carrier),
                Arc::clone(&fees),
                orders.clone(),
            )
            .with_retry(RetryPolicy::new(config.carrier_max_attempts))
        });
        Self {
            orders,
            ledger,
            fees,
            carrier,
            orchestrator,
            db_pool,
            config,
        }
    }

    /// Load persisted orders into memory. Called once on start-up.
    pub async fn hydrate_from_db(&self) -> Result<(), String> {
        if self.db_pool.is_none() {
            return Ok(());
        }
        let count = self
            .orders
            .hydrate()
            .await
            .map_err(|e| format!("failed to load orders: {e}"))?;
        tracing::info!(count, "hydrated orders from database");
        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use fulfil_core::{Address, CodInfo, FulfillmentStage, OrderDraft, Parcel};

    use super::*;

    fn order(user: UserId) -> Order {
        let address = Address {
            name: "A".into(),
            phone: "0812345678".into(),
            province: "Bangkok".into(),
            city: "Bang Rak".into(),
            district: None,
            postal_code: "10500".into(),
            detail: "1 Silom Rd".into(),
        };
        Order::new(
            OrderId::new(),
            OrderDraft {
                user_id: user,
                sender: address.clone(),
                recipient: address,
                parcel: Parcel {
                    weight_grams: 500,
                    length_cm: 10,
                    width_cm: 10,
                    height_cm: 10,
                },
                cod: CodInfo::NONE,
                insured: false,
                declared_value: None,
                service_id: None,
                items: vec![],
                remark: None,
            },
        )
    }

    #[tokio::test]
    async fn saved_order_is_visible_to_clones() {
        let book = OrderBook::in_memory();
        let other = book.clone();
        let o = order(UserId::new());
        book.save(&o).await.unwrap();
        assert_eq!(other.get(o.id), Some(o));
        assert_eq!(other.len(), 1);
    }

    #[tokio::test]
    async fn list_for_user_filters_and_sorts_newest_first() {
        let book = OrderBook::in_memory();
        let user = UserId::new();
        let mut first = order(user);
        first.created_at -= chrono::Duration::minutes(5);
        let second = order(user);
        book.save(&first).await.unwrap();
        book.save(&second).await.unwrap();
        book.save(&order(UserId::new())).await.unwrap();

        let ids: Vec<OrderId> = book.list_for_user(user).iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn interrupted_lists_only_unsettled_charged_orders() {
        let book = OrderBook::in_memory();
        let user = UserId::new();
        let mut debited = order(user);
        debited.set_stage(FulfillmentStage::Debited);
        let mut requested = order(user);
        requested.set_stage(FulfillmentStage::ShipmentRequested);
        requested.created_at -= chrono::Duration::minutes(1);
        let mut settled = order(user);
        settled.set_stage(FulfillmentStage::RolledBack);
        for o in [&debited, &requested, &settled, &order(user)] {
            book.save(o).await.unwrap();
        }

        let ids: Vec<OrderId> = book.interrupted().iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![requested.id, debited.id]);
    }

    #[tokio::test]
    async fn hydrate_without_pool_loads_nothing() {
        assert_eq!(OrderBook::in_memory().hydrate().await.unwrap(), 0);
    }

    #[test]
    fn config_debug_redacts_token() {
        let config = AppConfig {
            auth_token: Some(Zeroizing::new("tok-123".into())),
            ..AppConfig::default()
        };
        let out = format!("{config:?}");
        assert!(out.contains("[REDACTED]"));
        assert!(!out.contains("tok-123"));
    }

    #[test]
    fn no_carrier_means_no_orchestrator() {
        let state = AppState::new();
        assert!(state.carrier.is_none());
        assert!(state.orchestrator.is_none());
    }
}
