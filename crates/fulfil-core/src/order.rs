//! # Order Lifecycle
//!
//! An [`Order`] is created by the fulfilment orchestrator from an
//! [`OrderDraft`] and afterwards mutated only through the guarded methods
//! below, which enforce:
//!
//! - the tracking number is assigned at most once;
//! - once a tracking number is set the status is at least `processing`;
//! - status only moves forward (`pending → processing → shipped → delivered`)
//!   and terminal statuses never change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OrderError, ValidationError};
use crate::identity::{OrderId, UserId};
use crate::money::Amount;
use crate::parcel::{non_empty, Address, CodInfo, Parcel, Role};

/// Customer-visible order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Accepted, shipment not yet confirmed by the carrier.
    Pending,
    /// Carrier confirmed the shipment and issued a tracking number.
    Processing,
    /// Parcel is moving through the carrier network.
    Shipped,
    /// Parcel reached the recipient.
    Delivered,
    /// Shipment was cancelled after creation.
    Cancelled,
    /// Fulfilment failed; any debit was reversed.
    Failed,
}

impl OrderStatus {
    /// Return the string representation of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Parse the string form produced by [`OrderStatus::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled | Self::Failed)
    }

    /// Position on the forward path, `None` for the side exits.
    fn rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Processing => Some(1),
            Self::Shipped => Some(2),
            Self::Delivered => Some(3),
            Self::Cancelled | Self::Failed => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the orchestrator is in the fulfilment state machine.
///
/// `Created → FeeComputed → Debited → ShipmentRequested → {Fulfilled | RolledBack}`.
/// `ReversalFailed` marks the one state the design otherwise prevents: a
/// debit whose compensating credit could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStage {
    /// Draft accepted, nothing computed yet.
    Created,
    /// Total fee computed.
    FeeComputed,
    /// Balance debited for the total fee.
    Debited,
    /// Create-shipment call issued to the carrier.
    ShipmentRequested,
    /// Carrier confirmed; the debit is final.
    Fulfilled,
    /// Carrier failed; the debit was reversed.
    RolledBack,
    /// Carrier failed and the reversal could not be applied.
    ReversalFailed,
}

impl FulfillmentStage {
    /// Whether orchestration has finished for this order.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Fulfilled | Self::RolledBack | Self::ReversalFailed
        )
    }

    /// Whether the order was charged and then left without a settled
    /// outcome: no shipment yet, or a reversal still owed.
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            Self::Debited | Self::ShipmentRequested | Self::ReversalFailed
        )
    }

    /// Return the string representation of this stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::FeeComputed => "fee_computed",
            Self::Debited => "debited",
            Self::ShipmentRequested => "shipment_requested",
            Self::Fulfilled => "fulfilled",
            Self::RolledBack => "rolled_back",
            Self::ReversalFailed => "reversal_failed",
        }
    }
}

impl std::fmt::Display for FulfillmentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the parcel's content declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Item description.
    pub name: String,
    /// Number of units.
    pub quantity: u32,
}

/// Validated-on-demand order data supplied by the order entry layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    /// Account that pays for the shipment.
    pub user_id: UserId,
    /// Sender address snapshot.
    pub sender: Address,
    /// Recipient address snapshot.
    pub recipient: Address,
    /// Physical parcel attributes.
    pub parcel: Parcel,
    /// Cash-on-delivery instruction.
    #[serde(default)]
    pub cod: CodInfo,
    /// Whether the parcel is insured.
    #[serde(default)]
    pub insured: bool,
    /// Declared value for insurance, required when `insured`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_value: Option<Amount>,
    /// Carrier service requested, when the user picked one from a quote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    /// Content declaration.
    #[serde(default)]
    pub items: Vec<OrderItem>,
    /// Free-text note for the courier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
}

impl OrderDraft {
    /// Check every field. Runs before any ledger or carrier interaction.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.sender.validate(Role::Sender)?;
        self.recipient.validate(Role::Recipient)?;
        self.parcel.validate()?;
        self.cod.validate()?;

        if self.insured {
            match self.declared_value {
                Some(v) if v.is_positive() => {}
                Some(v) => {
                    return Err(ValidationError::InvalidAmount {
                        field: "declared_value",
                        value: v.minor(),
                    })
                }
                None => {
                    return Err(ValidationError::EmptyField {
                        field: "declared_value",
                    })
                }
            }
        }
        if let Some(service) = &self.service_id {
            non_empty(service, "service_id")?;
        }
        for item in &self.items {
            non_empty(&item.name, "items.name")?;
            if item.quantity == 0 {
                return Err(ValidationError::ZeroQuantity {
                    name: item.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// A fulfilment order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order identifier and orchestration idempotency key.
    pub id: OrderId,
    /// The draft the order was created from.
    #[serde(flatten)]
    pub draft: OrderDraft,
    /// Total fee charged to the user's balance.
    pub total_fee: Amount,
    status: OrderStatus,
    stage: FulfillmentStage,
    #[serde(default)]
    tracking_number: Option<String>,
    /// Human-readable reason when the order failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a pending order at stage `Created`.
    pub fn new(id: OrderId, draft: OrderDraft) -> Self {
        let now = Utc::now();
        Self {
            id,
            draft,
            total_fee: Amount::ZERO,
            status: OrderStatus::Pending,
            stage: FulfillmentStage::Created,
            tracking_number: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Paying user.
    pub fn user_id(&self) -> UserId {
        self.draft.user_id
    }

    /// Current status.
    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Current orchestration stage.
    pub fn stage(&self) -> FulfillmentStage {
        self.stage
    }

    /// Carrier tracking number, once assigned.
    pub fn tracking_number(&self) -> Option<&str> {
        self.tracking_number.as_deref()
    }

    /// Record a new orchestration stage.
    pub fn set_stage(&mut self, stage: FulfillmentStage) {
        self.stage = stage;
        self.touch();
    }

    /// Assign the carrier tracking number and move to `processing`.
    ///
    /// Fails if a tracking number is already present, even an identical one.
    pub fn assign_tracking_number(&mut self, tracking: &str) -> Result<(), OrderError> {
        if let Some(existing) = &self.tracking_number {
            return Err(OrderError::TrackingAlreadyAssigned {
                existing: existing.clone(),
            });
        }
        if tracking.trim().is_empty() {
            return Err(OrderError::EmptyTrackingNumber);
        }
        if self.status.is_terminal() {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: OrderStatus::Processing,
            });
        }
        self.tracking_number = Some(tracking.to_string());
        if self.status == OrderStatus::Pending {
            self.status = OrderStatus::Processing;
        }
        self.touch();
        Ok(())
    }

    /// Move the status forward. Returns `Ok(false)` when already there.
    ///
    /// `processing`, `shipped`, and `delivered` require a tracking number;
    /// `failed` is only reachable before a shipment exists (see
    /// [`Order::mark_failed`]).
    pub fn advance_status(&mut self, next: OrderStatus) -> Result<bool, OrderError> {
        if next == self.status {
            return Ok(false);
        }
        let invalid = OrderError::InvalidTransition {
            from: self.status,
            to: next,
        };
        if self.status.is_terminal() {
            return Err(invalid);
        }
        let allowed = match next {
            OrderStatus::Cancelled => true,
            OrderStatus::Failed => self.tracking_number.is_none(),
            _ => match (self.status.rank(), next.rank()) {
                (Some(from), Some(to)) => to > from && self.tracking_number.is_some(),
                _ => false,
            },
        };
        if !allowed {
            return Err(invalid);
        }
        self.status = next;
        self.touch();
        Ok(true)
    }

    /// Mark the order failed with a reason, recording the final stage.
    pub fn mark_failed(
        &mut self,
        reason: impl Into<String>,
        stage: FulfillmentStage,
    ) -> Result<(), OrderError> {
        self.advance_status(OrderStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        self.stage = stage;
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
