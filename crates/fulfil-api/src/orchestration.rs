//! # Fulfilment Orchestration
//!
//! Sequences fee calculation, balance debit and shipment creation for one
//! order:
//!
//! ```text
//! Created → FeeComputed → Debited → ShipmentRequested → Fulfilled
//!                                                     ↘ RolledBack
//!                                                     ↘ ReversalFailed
//! ```
//!
//! 1. **Price** the order with the fee schedule, optionally from a live
//!    carrier quote with the tiered schedule as fallback.
//! 2. **Debit** the user's balance. Insufficient funds abort here, before
//!    the order is stored and before any carrier call.
//! 3. **Ship** through the carrier gateway. Transport failures are retried
//!    under [`RetryPolicy`] with the same `outTradeNo`; rejections are final.
//! 4. On success the tracking number is assigned and the debit stands. On
//!    failure the debit is reversed with a compensating credit and the order
//!    is marked failed.
//!
//! An order never stays `Debited` without either a tracking number or a
//! reversal. If the reversal itself fails the order is parked at
//! `ReversalFailed` and [`FulfillmentError::LedgerInconsistency`] is
//! returned and logged at `error`.
//!
//! ## Idempotency
//!
//! The order id is the idempotency key. Re-running an order that already has
//! a tracking number returns it without touching the ledger. A run that died
//! after the debit resumes at the shipment step with the same reference
//! number, after the ledger confirms the debit still stands. Two runs for
//! one order id never overlap: the second gets
//! [`FulfillmentError::AlreadyInProgress`].
//!
//! After a restart, [`Orchestrator::recover_interrupted`] settles every
//! order the previous process left charged without an outcome.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fulfil_carrier::{
    CarrierError, CarrierErrorKind, CarrierGateway, Quote, ShipmentRequest, TrackingSnapshot,
};
use fulfil_core::{
    Amount, FulfillmentStage, Order, OrderDraft, OrderError, OrderId, ValidationError,
};
use fulfil_fees::{FeeBreakdown, FeeError, FeeSchedule};
use fulfil_ledger::{LedgerError, LedgerResult, LedgerStore};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors and outcomes
// ---------------------------------------------------------------------------

/// Why a fulfilment run did not produce a shipped order.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// The order data is malformed. Nothing was charged.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The order could not be priced. Nothing was charged.
    #[error("fee calculation failed: {0}")]
    Fee(#[from] FeeError),

    /// The balance does not cover the fee. Nothing was charged and the
    /// carrier was not called.
    #[error("insufficient balance: fee {required}, available {available}")]
    InsufficientBalance { required: Amount, available: Amount },

    /// The carrier could not be reached. The debit has been reversed.
    #[error("carrier unreachable for order {order_id}: {message}")]
    CarrierTransport { order_id: OrderId, message: String },

    /// The carrier declined the shipment. The debit has been reversed.
    #[error("carrier rejected order {order_id}: {message}")]
    CarrierRejected { order_id: OrderId, message: String },

    /// An earlier run already failed this order and reversed its debit.
    #[error("order {order_id} already failed: {reason}")]
    PreviouslyFailed { order_id: OrderId, reason: String },

    /// The compensating credit could not be applied. The order is debited
    /// without a shipment and needs manual reconciliation.
    #[error("LEDGER INCONSISTENCY: order {order_id} debited {amount} without shipment; reversal failed: {source}")]
    LedgerInconsistency {
        order_id: OrderId,
        amount: Amount,
        source: LedgerError,
    },

    /// Another run for the same order is still in progress.
    #[error("order {0} is already being processed")]
    AlreadyInProgress(OrderId),

    /// The order id is taken by another user's order. Callers see it as
    /// not found.
    #[error("order id {0} is already taken")]
    OrderIdConflict(OrderId),

    /// A ledger call failed before anything was charged.
    #[error("ledger error: {0}")]
    Ledger(LedgerError),

    /// The debited order could not be stored. The debit has been reversed.
    #[error("order could not be stored: {0}")]
    Persistence(String),

    /// The order lifecycle refused a transition.
    #[error("order state error: {0}")]
    Order(#[from] OrderError),

    /// No such order.
    #[error("order {0} not found")]
    NotFound(OrderId),

    /// The order has no tracking number yet.
    #[error("order {0} has not been shipped")]
    NotShipped(OrderId),

    /// Tracking lookup failed. Nothing was changed.
    #[error("tracking lookup failed: {0}")]
    Tracking(CarrierError),
}

impl FulfillmentError {
    /// The order id of a failure that happened after the order was stored.
    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            Self::CarrierTransport { order_id, .. }
            | Self::CarrierRejected { order_id, .. }
            | Self::PreviouslyFailed { order_id, .. }
            | Self::LedgerInconsistency { order_id, .. } => Some(*order_id),
            _ => None,
        }
    }
}

/// A shipped order.
#[derive(Debug, Clone)]
pub struct FulfillmentOutcome {
    /// The order, at stage `Fulfilled` with a tracking number.
    pub order: Order,
    /// The user's balance after the charge.
    pub remaining_balance: Amount,
    /// Fee breakdown; `None` when the result was replayed.
    pub fee: Option<FeeBreakdown>,
    /// True when the order had already been fulfilled by an earlier run.
    pub replayed: bool,
}

impl FulfillmentOutcome {
    /// The carrier tracking number.
    pub fn tracking_number(&self) -> Option<&str> {
        self.order.tracking_number()
    }
}

/// Result of a tracking refresh.
#[derive(Debug, Clone)]
pub struct TrackingRefresh {
    /// The order after the refresh.
    pub order: Order,
    /// What the carrier reported.
    pub snapshot: TrackingSnapshot,
    /// Whether the order status moved.
    pub changed: bool,
}

/// What a start-up recovery pass did with interrupted orders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Shipped with the debit standing.
    pub fulfilled: usize,
    /// Debit reversed, or never owed.
    pub rolled_back: usize,
    /// Still charged without an outcome; retried on the next pass.
    pub unresolved: usize,
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Retries for shipment creation.
///
/// Only transport errors are retried, with exponential backoff from
/// `base_delay`. Every attempt sends the same request, so the carrier sees
/// one `outTradeNo` and can deduplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each further one.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Default total attempts.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;
    /// Default delay before the first retry.
    pub const BASE_DELAY: Duration = Duration::from_millis(200);

    /// Policy with `max_attempts` attempts (at least one).
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Self::BASE_DELAY,
        }
    }

    /// A single attempt.
    pub fn no_retry() -> Self {
        Self::new(1)
    }

    /// Override the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Run `call` until it succeeds, fails with a non-transport error, or
    /// the attempts are used up.
    pub async fn run<T, F, Fut>(&self, reference: &str, mut call: F) -> Result<T, CarrierError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CarrierError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Err(e) if e.is_transport() && attempt < attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        reference,
                        attempt,
                        max_attempts = attempts,
                        "carrier call failed, retrying in {delay:?}: {e}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS)
    }
}

// ---------------------------------------------------------------------------
// In-flight guard
// ---------------------------------------------------------------------------

/// Marks an order id as being processed until dropped.
struct InFlight {
    active: Arc<DashMap<OrderId, ()>>,
    id: OrderId,
}

impl InFlight {
    fn acquire(active: &Arc<DashMap<OrderId, ()>>, id: OrderId) -> Result<Self, FulfillmentError> {
        match active.entry(id) {
            Entry::Occupied(_) => Err(FulfillmentError::AlreadyInProgress(id)),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(Self {
                    active: Arc::clone(active),
                    id,
                })
            }
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.active.remove(&self.id);
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs orders from draft to shipment or rollback.
#[derive(Clone)]
pub struct Orchestrator {
    ledger: Arc<dyn LedgerStore>,
    carrier: Arc<dyn CarrierGateway>,
    fees: Arc<FeeSchedule>,
    orders: crate::state::OrderBook,
    retry: RetryPolicy,
    active: Arc<DashMap<OrderId, ()>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("retry", &self.retry)
            .field("in_flight", &self.active.len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Orchestrator with the default retry policy.
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        carrier: Arc<dyn CarrierGateway>,
        fees: Arc<FeeSchedule>,
        orders: crate::state::OrderBook,
    ) -> Self {
        Self {
            ledger,
            carrier,
            fees,
            orders,
            retry: RetryPolicy::default(),
            active: Arc::new(DashMap::new()),
        }
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The order store this orchestrator writes to.
    pub fn orders(&self) -> &crate::state::OrderBook {
        &self.orders
    }

    /// Fulfil order `id` from `draft`.
    ///
    /// Returns the shipped order, or an error describing why not. Carrier
    /// failures are returned only after the debit has been reversed.
    pub async fn fulfil(
        &self,
        id: OrderId,
        draft: OrderDraft,
    ) -> Result<FulfillmentOutcome, FulfillmentError> {
        draft.validate()?;
        let _guard = InFlight::acquire(&self.active, id)?;

        if let Some(existing) = self.orders.get(id) {
            if existing.user_id() != draft.user_id {
                tracing::warn!(order = %id, user = %draft.user_id, "order id reused by another user");
                return Err(FulfillmentError::OrderIdConflict(id));
            }
            let charged = !matches!(
                existing.stage(),
                FulfillmentStage::Created | FulfillmentStage::FeeComputed
            );
            if charged {
                return self.resume(existing).await;
            }
        }

        let breakdown = self.price(&draft).await?;
        let mut order = Order::new(id, draft);
        order.total_fee = breakdown.total;
        order.set_stage(FulfillmentStage::FeeComputed);
        tracing::info!(
            order = %id,
            user = %order.user_id(),
            total = %breakdown.total,
            "fee computed"
        );

        let debit = match self
            .ledger
            .reserve_and_debit(
                order.user_id(),
                order.total_fee,
                id,
                &debit_description(id),
            )
            .await
        {
            Ok(debit) => debit,
            Err(LedgerError::InsufficientBalance {
                required,
                available,
            }) => {
                tracing::info!(order = %id, %required, %available, "insufficient balance");
                return Err(FulfillmentError::InsufficientBalance {
                    required,
                    available,
                });
            }
            Err(e) => return Err(FulfillmentError::Ledger(e)),
        };
        order.set_stage(FulfillmentStage::Debited);

        if let Err(e) = self.orders.save(&order).await {
            tracing::error!(order = %id, error = %e, "failed to store debited order");
            return Err(self.abandon_unstored(order, e).await);
        }

        let mut outcome = self.ship(order, debit.balance).await?;
        outcome.fee = Some(breakdown);
        Ok(outcome)
    }

    /// Settle every order a previous run left charged without an outcome.
    ///
    /// Call once after the order book is hydrated. Orders at `Debited` or
    /// `ShipmentRequested` ship if their debit still stands and roll back
    /// otherwise; orders at `ReversalFailed` get their reversal retried.
    pub async fn recover_interrupted(&self) -> RecoveryReport {
        let mut report = RecoveryReport::default();
        for order in self.orders.interrupted() {
            let id = order.id;
            let Ok(_guard) = InFlight::acquire(&self.active, id) else {
                report.unresolved += 1;
                continue;
            };
            let result = self.resume(order).await;
            match self.orders.get(id).map(|o| o.stage()) {
                Some(FulfillmentStage::Fulfilled) => report.fulfilled += 1,
                Some(FulfillmentStage::RolledBack) => report.rolled_back += 1,
                stage => {
                    report.unresolved += 1;
                    if let Err(e) = result {
                        tracing::error!(
                            order = %id,
                            ?stage,
                            error = %e,
                            "interrupted order still unsettled"
                        );
                    }
                }
            }
        }
        if report != RecoveryReport::default() {
            tracing::info!(
                fulfilled = report.fulfilled,
                rolled_back = report.rolled_back,
                unresolved = report.unresolved,
                "interrupted orders recovered"
            );
        }
        report
    }

    /// Poll the carrier for order `id` and move its status forward.
    pub async fn refresh_tracking(&self, id: OrderId) -> Result<TrackingRefresh, FulfillmentError> {
        let _guard = InFlight::acquire(&self.active, id)?;
        let mut order = self.orders.get(id).ok_or(FulfillmentError::NotFound(id))?;
        let tracking = order
            .tracking_number()
            .map(str::to_owned)
            .ok_or(FulfillmentError::NotShipped(id))?;

        let snapshot = self
            .carrier
            .track_shipment(&tracking)
            .await
            .map_err(FulfillmentError::Tracking)?;

        let mut changed = false;
        if let Some(next) = snapshot.state.order_status() {
            match order.advance_status(next) {
                Ok(moved) => changed = moved,
                Err(e) => {
                    tracing::debug!(order = %id, error = %e, "ignoring non-forward tracking state")
                }
            }
        }
        if changed {
            tracing::info!(order = %id, status = %order.status(), "order status advanced");
            self.persist(&order).await;
        }
        Ok(TrackingRefresh {
            order,
            snapshot,
            changed,
        })
    }

    /// Base rate from a live quote when enabled, then the full breakdown.
    async fn price(&self, draft: &OrderDraft) -> Result<FeeBreakdown, FulfillmentError> {
        let quoted = if self.fees.use_live_quote {
            self.live_base_rate(draft).await
        } else {
            None
        };
        Ok(self.fees.price(
            draft.parcel.weight_grams,
            draft.insured,
            draft.cod,
            quoted,
        )?)
    }

    async fn live_base_rate(&self, draft: &OrderDraft) -> Option<Amount> {
        match self
            .carrier
            .quote_rate(&draft.sender, &draft.recipient, &draft.parcel)
            .await
        {
            Ok(quotes) => {
                let chosen = select_quote(&quotes, draft.service_id.as_deref()).map(|q| q.price);
                if chosen.is_none() {
                    tracing::warn!("no usable carrier quote, falling back to tiered rate");
                }
                chosen
            }
            Err(e) => {
                tracing::warn!(error = %e, "carrier quote failed, falling back to tiered rate");
                None
            }
        }
    }

    /// Continue an order that an earlier run already debited.
    async fn resume(&self, order: Order) -> Result<FulfillmentOutcome, FulfillmentError> {
        let id = order.id;
        if order.tracking_number().is_some() {
            tracing::debug!(order = %id, "order already fulfilled, returning existing result");
            let remaining = self
                .ledger
                .balance(order.user_id())
                .await
                .map_err(FulfillmentError::Ledger)?;
            return Ok(FulfillmentOutcome {
                order,
                remaining_balance: remaining,
                fee: None,
                replayed: true,
            });
        }

        match order.stage() {
            FulfillmentStage::Debited | FulfillmentStage::ShipmentRequested => {
                tracing::warn!(order = %id, stage = %order.stage(), "resuming interrupted order");
                let remaining = self.confirm_debit(order.clone()).await?;
                self.ship(order, remaining).await
            }
            FulfillmentStage::ReversalFailed => {
                let mut order = order;
                self.compensate(&order).await?;
                order.set_stage(FulfillmentStage::RolledBack);
                self.persist(&order).await;
                tracing::info!(order = %id, "outstanding reversal applied");
                Err(previously_failed(&order))
            }
            _ => Err(previously_failed(&order)),
        }
    }

    /// Make sure the order's debit is outstanding before it ships again.
    ///
    /// Replays the original debit, or takes it now if the ledger has none.
    /// A debit that was already reversed, or cannot be taken, settles the
    /// order as rolled back without contacting the carrier.
    async fn confirm_debit(&self, mut order: Order) -> Result<Amount, FulfillmentError> {
        let id = order.id;
        let result = self
            .ledger
            .reserve_and_debit(order.user_id(), order.total_fee, id, &debit_description(id))
            .await;
        let (reason, err) = match result {
            Ok(debit) => {
                if !debit.replayed {
                    tracing::warn!(
                        order = %id,
                        amount = %order.total_fee,
                        "debit missing on resume, charged now"
                    );
                }
                return Ok(debit.balance);
            }
            Err(LedgerError::AlreadyReversed { .. }) => ("debit was already reversed".to_string(), None),
            Err(LedgerError::InsufficientBalance {
                required,
                available,
            }) => (
                format!("insufficient balance: required {required}, available {available}"),
                Some(FulfillmentError::InsufficientBalance {
                    required,
                    available,
                }),
            ),
            Err(e) => return Err(FulfillmentError::Ledger(e)),
        };
        tracing::warn!(order = %id, reason = %reason, "unpaid order will not be shipped");
        order.mark_failed(reason, FulfillmentStage::RolledBack)?;
        self.persist(&order).await;
        Err(err.unwrap_or_else(|| previously_failed(&order)))
    }

    /// Settle a debited order whose record could not be stored.
    ///
    /// The debit is reversed and the in-memory copy marked failed, so a
    /// resubmission of the same id cannot find it still `Debited`.
    async fn abandon_unstored(&self, mut order: Order, cause: sqlx::Error) -> FulfillmentError {
        let id = order.id;
        let reason = format!("order could not be stored: {cause}");
        let (stage, err) = match self.compensate(&order).await {
            Ok(_) => (
                FulfillmentStage::RolledBack,
                FulfillmentError::Persistence(cause.to_string()),
            ),
            Err(inconsistency) => (FulfillmentStage::ReversalFailed, inconsistency),
        };
        if let Err(e) = order.mark_failed(reason, stage) {
            tracing::error!(order = %id, error = %e, "could not mark order failed");
        }
        self.persist(&order).await;
        err
    }

    /// Request the shipment and settle the order either way.
    async fn ship(
        &self,
        mut order: Order,
        remaining_balance: Amount,
    ) -> Result<FulfillmentOutcome, FulfillmentError> {
        order.set_stage(FulfillmentStage::ShipmentRequested);
        self.persist(&order).await;

        let request = ShipmentRequest::from_order(&order);
        let carrier: &dyn CarrierGateway = self.carrier.as_ref();
        let request_ref = &request;
        let result = self
            .retry
            .run(&request.out_trade_no, || carrier.create_shipment(request_ref))
            .await;

        match result {
            Ok(shipment) => {
                order.assign_tracking_number(&shipment.tracking_number)?;
                order.set_stage(FulfillmentStage::Fulfilled);
                self.persist(&order).await;
                tracing::info!(
                    order = %order.id,
                    tracking = %shipment.tracking_number,
                    "order fulfilled"
                );
                Ok(FulfillmentOutcome {
                    order,
                    remaining_balance,
                    fee: None,
                    replayed: false,
                })
            }
            Err(err) => Err(self.roll_back(order, err).await),
        }
    }

    /// Reverse the debit after a carrier failure and record the outcome.
    async fn roll_back(&self, mut order: Order, err: CarrierError) -> FulfillmentError {
        let id = order.id;
        let reason = err.to_string();
        tracing::warn!(order = %id, error = %reason, "shipment failed, reversing debit");

        match self.compensate(&order).await {
            Ok(_) => {
                if let Err(e) = order.mark_failed(&reason, FulfillmentStage::RolledBack) {
                    return FulfillmentError::Order(e);
                }
                self.persist(&order).await;
                match err.kind() {
                    CarrierErrorKind::Transport => FulfillmentError::CarrierTransport {
                        order_id: id,
                        message: reason,
                    },
                    CarrierErrorKind::Rejected => FulfillmentError::CarrierRejected {
                        order_id: id,
                        message: reason,
                    },
                }
            }
            Err(inconsistency) => {
                let detail = format!("{reason}; debit reversal failed");
                if let Err(e) = order.mark_failed(detail, FulfillmentStage::ReversalFailed) {
                    tracing::error!(order = %id, error = %e, "could not mark order failed");
                }
                self.persist(&order).await;
                inconsistency
            }
        }
    }

    /// Credit back the order's debit. Failure is a ledger inconsistency.
    async fn compensate(&self, order: &Order) -> Result<LedgerResult, FulfillmentError> {
        self.ledger
            .credit(
                order.user_id(),
                order.total_fee,
                order.id,
                &format!("reversal {}", order.id.out_trade_no()),
            )
            .await
            .map_err(|source| {
                tracing::error!(
                    order = %order.id,
                    user = %order.user_id(),
                    amount = %order.total_fee,
                    error = %source,
                    "LEDGER INCONSISTENCY: debited order has no shipment and the reversal failed"
                );
                FulfillmentError::LedgerInconsistency {
                    order_id: order.id,
                    amount: order.total_fee,
                    source,
                }
            })
    }

    /// Store the order. The in-memory copy is always current, so a database
    /// failure here is logged rather than returned.
    async fn persist(&self, order: &Order) {
        if let Err(e) = self.orders.save(order).await {
            tracing::error!(order = %order.id, stage = %order.stage(), error = %e, "failed to persist order");
        }
    }
}

fn debit_description(id: OrderId) -> String {
    format!("shipping fee {}", id.out_trade_no())
}

fn previously_failed(order: &Order) -> FulfillmentError {
    FulfillmentError::PreviouslyFailed {
        order_id: order.id,
        reason: order
            .failure_reason
            .clone()
            .unwrap_or_else(|| format!("order is {}", order.status())),
    }
}

/// The quote for `service`, or the cheapest one when no service is named.
/// Quotes with a negative price are ignored.
pub fn select_quote<'a>(quotes: &'a [Quote], service: Option<&str>) -> Option<&'a Quote> {
    let mut usable = quotes.iter().filter(|q| !q.price.is_negative());
    match service {
        Some(id) => usable.find(|q| q.service_id == id),
        None => usable.min_by_key(|q| q.price),
    }
}
