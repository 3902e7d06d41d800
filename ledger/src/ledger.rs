//! The stock ledger: validated single-subject mutations.
//!
//! One call, one subject, one atomic unit: lock the row, validate, write the
//! quantity and its audit record together, commit. Multi-item orders go
//! through the checkout validator instead, which batches subjects into a
//! single all-or-nothing apply.

use std::sync::Arc;
use stock_ledger_core::audit::{AuditRecord, AuditType};
use stock_ledger_core::error::LedgerError;
use stock_ledger_core::ids::{ActorId, OrderId};
use stock_ledger_core::store::{DeltaCommand, LedgerStore};
use stock_ledger_core::subject::SubjectRef;

/// Attribution and justification for one mutation.
///
/// Order-driven audit types require [`MutationContext::for_order`]; manual
/// types require [`MutationContext::for_actor`]. Supplying the wrong kind is
/// rejected before any locking.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MutationContext {
    /// The order behind an order-driven mutation.
    pub order_id: Option<OrderId>,
    /// The actor behind a manual mutation.
    pub actor_id: Option<ActorId>,
    /// Optional free-text justification, kept on the audit record.
    pub reason: Option<String>,
}

impl MutationContext {
    /// Context for an order-driven mutation.
    #[must_use]
    pub const fn for_order(order_id: OrderId) -> Self {
        Self {
            order_id: Some(order_id),
            actor_id: None,
            reason: None,
        }
    }

    /// Context for a manual mutation.
    #[must_use]
    pub const fn for_actor(actor_id: ActorId) -> Self {
        Self {
            order_id: None,
            actor_id: Some(actor_id),
            reason: None,
        }
    }

    /// Attach a free-text reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Non-locking view of a subject's quantity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuantitySnapshot {
    /// The product does not track stock.
    Untracked,
    /// Snapshot of a tracked counter; may be stale by the time it is read.
    Tracked(u64),
}

/// Validated, audited single-subject mutations over a [`LedgerStore`].
#[derive(Clone)]
pub struct StockLedger {
    store: Arc<dyn LedgerStore>,
}

impl StockLedger {
    /// Create a ledger over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Atomically apply one signed delta to one subject.
    ///
    /// # Returns
    ///
    /// The new quantity and the audit record written for it.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::SubjectNotTracked`] for the untracked sentinel;
    ///   there is no quantity to mutate.
    /// - [`LedgerError::InvalidDelta`] / [`LedgerError::InvalidAttribution`]
    ///   for malformed input, rejected before any locking.
    /// - [`LedgerError::InsufficientStock`] if the delta would take the
    ///   quantity below zero; nothing is written.
    /// - [`LedgerError::LockTimeout`] if the row lock wait expires; nothing
    ///   is written and the call may be retried.
    #[tracing::instrument(skip(self, context), fields(audit_type = %audit_type))]
    pub async fn apply_delta(
        &self,
        subject_ref: SubjectRef,
        delta: i64,
        audit_type: AuditType,
        context: MutationContext,
    ) -> Result<(u64, AuditRecord), LedgerError> {
        let Some(subject) = subject_ref.subject_id() else {
            return Err(LedgerError::SubjectNotTracked);
        };

        let command = DeltaCommand {
            subject,
            delta,
            audit_type,
            order_id: context.order_id,
            actor_id: context.actor_id,
            reason: context.reason,
        };
        command.validate()?;

        let records = self.store.apply(vec![command]).await?;
        let record = records.into_iter().next().ok_or_else(|| {
            LedgerError::Storage("store returned no audit record for applied delta".to_string())
        })?;
        Ok((record.new_quantity, record))
    }

    /// Non-locking snapshot read for display purposes.
    ///
    /// Not usable for decisions that must be race-free; checkout authority
    /// always comes from a locked apply.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidSubject`] if a tracked reference has no row.
    pub async fn read_quantity(
        &self,
        subject_ref: SubjectRef,
    ) -> Result<QuantitySnapshot, LedgerError> {
        let Some(subject) = subject_ref.subject_id() else {
            return Ok(QuantitySnapshot::Untracked);
        };
        match self.store.quantity(subject).await? {
            Some(quantity) => Ok(QuantitySnapshot::Tracked(quantity)),
            None => Err(LedgerError::InvalidSubject(format!(
                "no tracked row for {subject}"
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory::MemoryLedgerStore;
    use stock_ledger_core::subject::{InventoryMode, SubjectId};
    use stock_ledger_core::{ProductId, VariantId};

    async fn ledger_with_variant(initial: i64) -> (StockLedger, SubjectRef) {
        let store = Arc::new(MemoryLedgerStore::default());
        let product_id = ProductId::new();
        let variant_id = VariantId::new();
        store
            .register_product(product_id, InventoryMode::VariantLevel, true)
            .await
            .unwrap();
        store.register_variant(variant_id, product_id).await.unwrap();

        let ledger = StockLedger::new(store);
        let subject_ref = SubjectRef::Tracked(SubjectId::Variant(variant_id));
        if initial > 0 {
            ledger
                .apply_delta(
                    subject_ref,
                    initial,
                    AuditType::Import,
                    MutationContext::for_actor(ActorId::new()),
                )
                .await
                .unwrap();
        }
        (ledger, subject_ref)
    }

    #[tokio::test]
    async fn apply_delta_returns_new_quantity_and_record() {
        let (ledger, subject_ref) = ledger_with_variant(10).await;

        let (new_quantity, record) = ledger
            .apply_delta(
                subject_ref,
                -2,
                AuditType::Damaged,
                MutationContext::for_actor(ActorId::new()).with_reason("dropped in warehouse"),
            )
            .await
            .unwrap();

        assert_eq!(new_quantity, 8);
        assert_eq!(record.quantity_change, -2);
        assert_eq!(record.audit_type, AuditType::Damaged);
        assert_eq!(record.reason.as_deref(), Some("dropped in warehouse"));
        assert!(record.actor_id.is_some());
        assert!(record.order_id.is_none());
    }

    #[tokio::test]
    async fn untracked_subject_is_rejected() {
        let (ledger, _) = ledger_with_variant(0).await;
        let err = ledger
            .apply_delta(
                SubjectRef::Untracked,
                -1,
                AuditType::OrderPlaced,
                MutationContext::for_order(OrderId::new()),
            )
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::SubjectNotTracked);
    }

    #[tokio::test]
    async fn zero_delta_is_rejected_before_locking() {
        let (ledger, subject_ref) = ledger_with_variant(5).await;
        let err = ledger
            .apply_delta(
                subject_ref,
                0,
                AuditType::Restock,
                MutationContext::for_actor(ActorId::new()),
            )
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::InvalidDelta);
    }

    #[tokio::test]
    async fn order_driven_type_with_actor_attribution_is_rejected() {
        let (ledger, subject_ref) = ledger_with_variant(5).await;
        let err = ledger
            .apply_delta(
                subject_ref,
                -1,
                AuditType::OrderPlaced,
                MutationContext::for_actor(ActorId::new()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAttribution { .. }));
    }

    #[tokio::test]
    async fn read_quantity_reports_untracked_marker() {
        let (ledger, subject_ref) = ledger_with_variant(3).await;
        assert_eq!(
            ledger.read_quantity(SubjectRef::Untracked).await.unwrap(),
            QuantitySnapshot::Untracked
        );
        assert_eq!(
            ledger.read_quantity(subject_ref).await.unwrap(),
            QuantitySnapshot::Tracked(3)
        );
    }
}
