//! Error taxonomy for ledger operations.

use crate::audit::AuditType;
use crate::subject::SubjectId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One subject that could not cover a requested decrement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockShortage {
    /// The subject that came up short.
    pub subject: SubjectId,
    /// Quantity available under the row lock.
    pub available: u64,
    /// Quantity the failing command asked to remove.
    pub requested: u64,
}

/// Errors that can occur during ledger operations.
///
/// Only [`LedgerError::LockTimeout`] is transient; callers may retry the whole
/// enclosing operation, since nothing is persisted on timeout.
/// [`LedgerError::InsufficientStock`] is an expected business outcome the
/// caller surfaces to the user. Everything else indicates a caller programming
/// error and is never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// One or more decrements would have taken a quantity below zero.
    ///
    /// The enclosing operation was rolled back in full: no quantity was
    /// changed and no audit record was written, including for subjects that
    /// had sufficient stock.
    #[error("Insufficient stock for {} subject(s)", shortages.len())]
    InsufficientStock {
        /// Every subject that could not cover its requested decrement.
        shortages: Vec<StockShortage>,
    },

    /// A row lock could not be acquired within the bounded wait.
    ///
    /// Nothing was persisted; the whole operation is safe to retry.
    #[error("Timed out waiting for the row lock on {subject}")]
    LockTimeout {
        /// The subject whose lock acquisition timed out.
        subject: SubjectId,
    },

    /// A mutation was attempted against an `untracked` product.
    #[error("Subject is not tracked; there is no quantity to mutate")]
    SubjectNotTracked,

    /// The product/variant pair does not resolve to a subject.
    #[error("Invalid subject: {0}")]
    InvalidSubject(String),

    /// A zero delta was supplied.
    #[error("Delta must be non-zero")]
    InvalidDelta,

    /// The attribution fields don't match the audit type: order-driven types
    /// require exactly an `order_id`, manual types exactly an `actor_id`.
    #[error("Audit type {audit_type} requires matching attribution")]
    InvalidAttribution {
        /// The audit type whose attribution requirement was violated.
        audit_type: AuditType,
    },

    /// Storage backend failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Whether the whole enclosing operation may be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}
