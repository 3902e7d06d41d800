//! Checkout-time reservation: all-or-nothing multi-item stock claims.
//!
//! Two checkout attempts racing for the last unit of one variant serialize on
//! that variant's row lock; the second to acquire it sees the decremented
//! quantity and fails deterministically. Subjects are locked in `SubjectId`
//! order by the store, so two orders touching the same subjects in different
//! cart order can never deadlock.

use crate::ledger::StockLedger;
use crate::metrics::ReservationMetrics;
use crate::resolver::SubjectResolver;
use crate::retry::{RetryPolicy, retry_with_predicate};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::sync::Arc;
use stock_ledger_core::audit::{AuditRecord, AuditType};
use stock_ledger_core::error::LedgerError;
use stock_ledger_core::ids::{LineItemId, OrderId, ProductId, VariantId};
use stock_ledger_core::store::{DeltaCommand, LedgerStore, SubjectCatalog};
use stock_ledger_core::subject::SubjectId;
use thiserror::Error;

/// One line item of an order, as seen by the checkout validator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Line item identifier, echoed back on reservation issues.
    pub id: LineItemId,
    /// The ordered product.
    pub product_id: ProductId,
    /// The ordered variant, where the product has variants.
    pub variant_id: Option<VariantId>,
    /// Requested units. Must be non-zero.
    pub quantity: u32,
}

/// One line item that could not be reserved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockIssue {
    /// The line item that failed.
    pub item_id: LineItemId,
    /// The subject that came up short.
    pub subject: SubjectId,
    /// Quantity available under the row lock.
    pub available_quantity: u64,
    /// Quantity this line item requested.
    pub requested_quantity: u64,
    /// User-facing description of the shortfall.
    pub message: String,
}

/// Why an order reservation failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReservationFailure {
    /// One or more items had insufficient stock. The whole reservation was
    /// rolled back; no item was reserved and no audit record written.
    #[error("Insufficient stock for {} item(s)", .0.len())]
    Insufficient(Vec<StockIssue>),

    /// A non-business error (lock timeout after retries, bad subject, ...).
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Receipt for a committed reservation or release.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReservationReceipt {
    /// The order the stock was claimed for.
    pub order_id: OrderId,
    /// Audit records written, one per distinct tracked subject.
    pub records: Vec<AuditRecord>,
}

/// All-or-nothing multi-item reservation over a [`StockLedger`]'s store.
#[derive(Clone)]
pub struct CheckoutStockValidator {
    resolver: SubjectResolver,
    store: Arc<dyn LedgerStore>,
    retry: RetryPolicy,
}

/// Per-subject aggregation of an order's line items.
struct ResolvedItems {
    /// Net delta per subject, in lock order.
    totals: BTreeMap<SubjectId, i64>,
    /// The line items behind each subject, for issue expansion.
    items: BTreeMap<SubjectId, SmallVec<[(LineItemId, u64); 2]>>,
}

impl CheckoutStockValidator {
    /// Create a validator with the default retry policy.
    #[must_use]
    pub fn new(catalog: Arc<dyn SubjectCatalog>, store: Arc<dyn LedgerStore>) -> Self {
        Self {
            resolver: SubjectResolver::new(catalog),
            store,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the lock-timeout retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// A [`StockLedger`] over the same store, for single-subject callers.
    #[must_use]
    pub fn ledger(&self) -> StockLedger {
        StockLedger::new(Arc::clone(&self.store))
    }

    /// Resolve and aggregate line items; untracked items are dropped.
    async fn resolve_items(
        &self,
        line_items: &[LineItem],
    ) -> Result<ResolvedItems, LedgerError> {
        let mut resolved = ResolvedItems {
            totals: BTreeMap::new(),
            items: BTreeMap::new(),
        };
        for item in line_items {
            if item.quantity == 0 {
                return Err(LedgerError::InvalidDelta);
            }
            let subject_ref = self.resolver.resolve(item.product_id, item.variant_id).await?;
            let Some(subject) = subject_ref.subject_id() else {
                // Untracked items are always reservable and never locked.
                continue;
            };
            *resolved.totals.entry(subject).or_insert(0) += i64::from(item.quantity);
            resolved
                .items
                .entry(subject)
                .or_default()
                .push((item.id, u64::from(item.quantity)));
        }
        Ok(resolved)
    }

    /// Apply a batch with bounded retries on lock timeouts.
    async fn apply_with_retry(
        &self,
        commands: Vec<DeltaCommand>,
    ) -> Result<Vec<AuditRecord>, LedgerError> {
        retry_with_predicate(
            self.retry.clone(),
            || self.store.apply(commands.clone()),
            LedgerError::is_retryable,
        )
        .await
    }

    /// Reserve stock for every line item of an order, or nothing at all.
    ///
    /// Untracked items are skipped; duplicate items on one subject are
    /// aggregated into a single decrement. All affected subjects are locked
    /// in the global `SubjectId` order and committed in one batch, so two
    /// racing checkouts serialize rather than both claiming the last unit.
    ///
    /// # Errors
    ///
    /// - [`ReservationFailure::Insufficient`] with one issue per
    ///   insufficient line item; nothing was reserved.
    /// - [`ReservationFailure::Ledger`] for resolution failures, malformed
    ///   items, or a lock timeout that survived the retry budget.
    #[tracing::instrument(skip(self, line_items), fields(order_id = %order_id, items = line_items.len()))]
    pub async fn reserve_for_order(
        &self,
        order_id: OrderId,
        line_items: &[LineItem],
    ) -> Result<ReservationReceipt, ReservationFailure> {
        let resolved = self.resolve_items(line_items).await?;
        if resolved.totals.is_empty() {
            // Every item untracked: nothing to lock, nothing to audit.
            return Ok(ReservationReceipt {
                order_id,
                records: Vec::new(),
            });
        }

        let commands: Vec<DeltaCommand> = resolved
            .totals
            .iter()
            .map(|(subject, total)| DeltaCommand {
                subject: *subject,
                delta: -total,
                audit_type: AuditType::OrderPlaced,
                order_id: Some(order_id),
                actor_id: None,
                reason: None,
            })
            .collect();

        match self.apply_with_retry(commands).await {
            Ok(records) => {
                tracing::info!(subjects = records.len(), "Reserved stock for order");
                ReservationMetrics::record_success();
                Ok(ReservationReceipt { order_id, records })
            }
            Err(LedgerError::InsufficientStock { shortages }) => {
                let mut issues = Vec::new();
                for shortage in shortages {
                    let Some(subject_items) = resolved.items.get(&shortage.subject) else {
                        continue;
                    };
                    for (item_id, requested) in subject_items {
                        issues.push(StockIssue {
                            item_id: *item_id,
                            subject: shortage.subject,
                            available_quantity: shortage.available,
                            requested_quantity: *requested,
                            message: format!(
                                "Only {} available, requested {}",
                                shortage.available, requested
                            ),
                        });
                    }
                }
                tracing::info!(issues = issues.len(), "Order reservation rejected");
                ReservationMetrics::record_insufficient();
                Err(ReservationFailure::Insufficient(issues))
            }
            Err(err) => Err(ReservationFailure::Ledger(err)),
        }
    }

    /// Restore stock previously reserved for an order.
    ///
    /// The mirror of [`reserve_for_order`](Self::reserve_for_order): same
    /// resolution, same aggregation, same lock order, positive deltas. It
    /// cannot fail on insufficient stock, but still locks so the audit trail
    /// stays a faithful serial history. Idempotency is the lifecycle
    /// bridge's job; this method applies unconditionally.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAttribution`] unless `audit_type` is
    ///   `order_cancelled` or `refund_restock`.
    /// - [`LedgerError::InvalidSubject`] / [`LedgerError::InvalidDelta`] for
    ///   malformed items.
    /// - [`LedgerError::LockTimeout`] after the retry budget.
    #[tracing::instrument(skip(self, line_items), fields(order_id = %order_id, audit_type = %audit_type))]
    pub async fn release_for_order(
        &self,
        order_id: OrderId,
        line_items: &[LineItem],
        audit_type: AuditType,
    ) -> Result<Vec<AuditRecord>, LedgerError> {
        if !matches!(
            audit_type,
            AuditType::OrderCancelled | AuditType::RefundRestock
        ) {
            return Err(LedgerError::InvalidAttribution { audit_type });
        }

        let resolved = self.resolve_items(line_items).await?;
        if resolved.totals.is_empty() {
            return Ok(Vec::new());
        }

        let commands: Vec<DeltaCommand> = resolved
            .totals
            .iter()
            .map(|(subject, total)| DeltaCommand {
                subject: *subject,
                delta: *total,
                audit_type,
                order_id: Some(order_id),
                actor_id: None,
                reason: None,
            })
            .collect();

        let records = self.apply_with_retry(commands).await?;
        tracing::info!(subjects = records.len(), "Released stock for order");
        ReservationMetrics::record_release();
        Ok(records)
    }
}
