//! Storage traits for the stock ledger.
//!
//! Two seams separate the engine from its storage:
//!
//! - [`LedgerStore`]: the transactional write path (atomic batch apply) plus
//!   the non-locking read paths (quantity snapshots, audit queries).
//! - [`SubjectCatalog`]: read access to product/variant records, used by the
//!   subject resolver.
//!
//! The in-memory backend in the `stock-ledger` crate implements both; a
//! database-backed implementation would map the batch apply onto a single
//! `SELECT ... FOR UPDATE` transaction.
//!
//! # Dyn Compatibility
//!
//! Both traits use explicit `Pin<Box<dyn Future>>` returns instead of
//! `async fn` to enable trait object usage (`Arc<dyn LedgerStore>`), which is
//! how the engine components hold their storage.

use crate::audit::{AuditRecord, AuditType};
use crate::error::LedgerError;
use crate::ids::{ActorId, OrderId, ProductId, VariantId};
use crate::query::{AuditFilter, AuditSummary, Page, PageRequest};
use crate::subject::{Product, SubjectId, Variant};
use std::future::Future;
use std::pin::Pin;

/// One requested quantity mutation against one subject.
///
/// A batch of commands is the unit of atomicity: either every command in the
/// batch is applied and audited, or none is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeltaCommand {
    /// The subject to mutate.
    pub subject: SubjectId,
    /// Signed change; negative for decrements. Never zero.
    pub delta: i64,
    /// Cause recorded in the audit trail.
    pub audit_type: AuditType,
    /// Attribution for order-driven types.
    pub order_id: Option<OrderId>,
    /// Attribution for manual types.
    pub actor_id: Option<ActorId>,
    /// Optional free-text justification.
    pub reason: Option<String>,
}

impl DeltaCommand {
    /// Validate the command shape before any locking happens.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidDelta`] if `delta` is zero.
    /// - [`LedgerError::InvalidAttribution`] if the `order_id`/`actor_id`
    ///   pair doesn't match the audit type: order-driven types require
    ///   exactly an order id, manual types exactly an actor id.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.delta == 0 {
            return Err(LedgerError::InvalidDelta);
        }
        let attribution_ok = if self.audit_type.is_order_driven() {
            self.order_id.is_some() && self.actor_id.is_none()
        } else {
            self.actor_id.is_some() && self.order_id.is_none()
        };
        if !attribution_ok {
            return Err(LedgerError::InvalidAttribution {
                audit_type: self.audit_type,
            });
        }
        Ok(())
    }
}

/// Transactional storage for subject quantities and their audit history.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the ledger is driven by many
/// concurrent request-handling tasks.
///
/// # Guarantees
///
/// - [`apply`](Self::apply) is all-or-nothing: row locks for every subject in
///   the batch are acquired in `SubjectId` order, every command is validated
///   against the locked quantities, and only then is anything written. A
///   quantity write and its audit record are committed together.
/// - For any single subject, applies are totally ordered; its audit trail is
///   a faithful serial history.
/// - The read methods never take subject row locks.
pub trait LedgerStore: Send + Sync {
    /// Atomically apply a batch of delta commands.
    ///
    /// Commands are applied in batch order; when several commands target the
    /// same subject, each sees the staged quantity left by the previous one.
    ///
    /// # Returns
    ///
    /// The audit records written for the batch, in batch order.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InsufficientStock`] with one shortage per failing
    ///   subject; nothing was written, including for the passing subjects.
    /// - [`LedgerError::LockTimeout`] if any row lock could not be acquired
    ///   within the bounded wait; nothing was written.
    /// - [`LedgerError::InvalidSubject`] if a command names a subject with no
    ///   row.
    /// - [`LedgerError::InvalidDelta`] / [`LedgerError::InvalidAttribution`]
    ///   for malformed commands, rejected before any locking.
    fn apply(
        &self,
        commands: Vec<DeltaCommand>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AuditRecord>, LedgerError>> + Send + '_>>;

    /// Non-locking snapshot of a subject's quantity.
    ///
    /// Returns `None` for subjects with no row. The value may be stale by the
    /// time the caller acts on it; decisions that must be race-free go
    /// through [`apply`](Self::apply).
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Storage`] on backend failure.
    fn quantity(
        &self,
        subject: SubjectId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<u64>, LedgerError>> + Send + '_>>;

    /// Page through audit records matching a filter, in creation order.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Storage`] on backend failure.
    fn audit_records(
        &self,
        filter: AuditFilter,
        page: PageRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Page<AuditRecord>, LedgerError>> + Send + '_>>;

    /// Aggregate all audit records matching a filter.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Storage`] on backend failure.
    fn audit_summary(
        &self,
        filter: AuditFilter,
    ) -> Pin<Box<dyn Future<Output = Result<AuditSummary, LedgerError>> + Send + '_>>;

    /// Whether any audit record of `audit_type` exists for `order_id`.
    ///
    /// This is the idempotency check behind the order lifecycle bridge.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Storage`] on backend failure.
    fn order_has_audit(
        &self,
        order_id: OrderId,
        audit_type: AuditType,
    ) -> Pin<Box<dyn Future<Output = Result<bool, LedgerError>> + Send + '_>>;
}

/// Read access to the product/variant catalog.
///
/// Snapshots report the live authoritative quantity at the moment of the
/// read, but carry no lock; they are display-grade data.
pub trait SubjectCatalog: Send + Sync {
    /// Load a product snapshot.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Storage`] on backend failure.
    fn product(
        &self,
        id: ProductId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Product>, LedgerError>> + Send + '_>>;

    /// Load a variant snapshot.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Storage`] on backend failure.
    fn variant(
        &self,
        id: VariantId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Variant>, LedgerError>> + Send + '_>>;

    /// Load all variants belonging to a product.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Storage`] on backend failure.
    fn variants_of(
        &self,
        product_id: ProductId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Variant>, LedgerError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(audit_type: AuditType, delta: i64) -> DeltaCommand {
        DeltaCommand {
            subject: SubjectId::Variant(VariantId::new()),
            delta,
            audit_type,
            order_id: None,
            actor_id: None,
            reason: None,
        }
    }

    #[test]
    fn zero_delta_is_rejected() {
        let mut cmd = command(AuditType::Restock, 0);
        cmd.actor_id = Some(ActorId::new());
        assert_eq!(cmd.validate(), Err(LedgerError::InvalidDelta));
    }

    #[test]
    fn order_driven_requires_order_id() {
        let mut cmd = command(AuditType::OrderPlaced, -1);
        assert!(matches!(
            cmd.validate(),
            Err(LedgerError::InvalidAttribution { .. })
        ));

        cmd.order_id = Some(OrderId::new());
        assert_eq!(cmd.validate(), Ok(()));
    }

    #[test]
    fn manual_rejects_order_id() {
        let mut cmd = command(AuditType::Damaged, -2);
        cmd.actor_id = Some(ActorId::new());
        assert_eq!(cmd.validate(), Ok(()));

        cmd.order_id = Some(OrderId::new());
        assert!(matches!(
            cmd.validate(),
            Err(LedgerError::InvalidAttribution { .. })
        ));
    }

    #[test]
    fn order_driven_rejects_actor_id() {
        let mut cmd = command(AuditType::OrderCancelled, 3);
        cmd.order_id = Some(OrderId::new());
        cmd.actor_id = Some(ActorId::new());
        assert!(matches!(
            cmd.validate(),
            Err(LedgerError::InvalidAttribution { .. })
        ));
    }
}
