//! Audit records: the append-only history of every quantity change.
//!
//! One record is written per mutation, in the same critical section as the
//! quantity write, so the history and the counter can never be observed out
//! of sync. Records are immutable; the ledger never updates or deletes them.

use crate::ids::{ActorId, AuditRecordId, OrderId};
use crate::subject::SubjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Cause of a quantity change.
///
/// Order-driven types are only ever written on behalf of an order lifecycle
/// transition and carry an `order_id`; manual types are admin or import
/// actions and carry an `actor_id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditType {
    /// Stock reserved at order placement (decrement).
    OrderPlaced,
    /// Stock restored on pre-fulfillment cancellation (increment).
    OrderCancelled,
    /// Stock restored on post-fulfillment refund (increment).
    RefundRestock,
    /// Free-form admin correction (either sign).
    ManualAdjustment,
    /// Units written off as damaged (decrement).
    Damaged,
    /// New units received (increment).
    Restock,
    /// Initial or bulk quantity set via CSV import.
    Import,
}

/// Error type for [`AuditType`] parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid audit type: {0}")]
pub struct ParseAuditTypeError(String);

impl AuditType {
    /// Whether this type is written on behalf of an order transition.
    ///
    /// Order-driven types require an `order_id` and must come through the
    /// order lifecycle bridge.
    #[must_use]
    pub const fn is_order_driven(&self) -> bool {
        matches!(
            self,
            Self::OrderPlaced | Self::OrderCancelled | Self::RefundRestock
        )
    }

    /// Whether this type is a manual admin or import action.
    ///
    /// Manual types require an `actor_id` and never carry an `order_id`.
    #[must_use]
    pub const fn is_manual(&self) -> bool {
        !self.is_order_driven()
    }

    /// Convert the type to its storage string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OrderPlaced => "order_placed",
            Self::OrderCancelled => "order_cancelled",
            Self::RefundRestock => "refund_restock",
            Self::ManualAdjustment => "manual_adjustment",
            Self::Damaged => "damaged",
            Self::Restock => "restock",
            Self::Import => "import",
        }
    }

    /// Parse a type from its storage string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string doesn't name a known audit type.
    pub fn parse(s: &str) -> Result<Self, ParseAuditTypeError> {
        match s {
            "order_placed" => Ok(Self::OrderPlaced),
            "order_cancelled" => Ok(Self::OrderCancelled),
            "refund_restock" => Ok(Self::RefundRestock),
            "manual_adjustment" => Ok(Self::ManualAdjustment),
            "damaged" => Ok(Self::Damaged),
            "restock" => Ok(Self::Restock),
            "import" => Ok(Self::Import),
            _ => Err(ParseAuditTypeError(s.to_string())),
        }
    }
}

impl fmt::Display for AuditType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable entry in a subject's quantity history.
///
/// For every record, `new_quantity = previous_quantity + quantity_change`,
/// and replaying a subject's records in id order from its initial value
/// reproduces its current quantity exactly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Store-assigned sequence id.
    pub id: AuditRecordId,
    /// The subject whose quantity changed.
    pub subject: SubjectId,
    /// Cause of the change.
    pub audit_type: AuditType,
    /// Signed delta; negative for decrements.
    pub quantity_change: i64,
    /// Quantity observed under the row lock, before the change.
    pub previous_quantity: u64,
    /// Quantity written, after the change.
    pub new_quantity: u64,
    /// Present for order-driven types.
    pub order_id: Option<OrderId>,
    /// Present for manual types.
    pub actor_id: Option<ActorId>,
    /// Optional free-text justification.
    pub reason: Option<String>,
    /// When the record was written.
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Check the per-record arithmetic invariant.
    ///
    /// True when `previous_quantity + quantity_change == new_quantity`
    /// without over- or underflow.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        apply_change(self.previous_quantity, self.quantity_change) == Some(self.new_quantity)
    }
}

/// Apply a signed change to a non-negative quantity.
///
/// Returns `None` when the change would take the quantity below zero (or
/// overflow `u64`, which no realistic catalog reaches). This is the single
/// place the never-negative rule is computed.
#[must_use]
pub const fn apply_change(quantity: u64, change: i64) -> Option<u64> {
    if change >= 0 {
        quantity.checked_add(change.unsigned_abs())
    } else {
        quantity.checked_sub(change.unsigned_abs())
    }
}
