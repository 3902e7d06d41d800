//! Read-only audit trail queries: filtered pages and summaries.

use std::sync::Arc;
use stock_ledger_core::audit::AuditRecord;
use stock_ledger_core::error::LedgerError;
use stock_ledger_core::query::{AuditFilter, AuditSummary, Page, PageRequest};
use stock_ledger_core::store::LedgerStore;

/// Read-side facade over the audit trail.
///
/// Never takes row locks: queries observe committed records only and can run
/// concurrently with mutations. A record whose batch is still staging is
/// simply not visible yet.
#[derive(Clone)]
pub struct AuditQueryService {
    store: Arc<dyn LedgerStore>,
}

impl AuditQueryService {
    /// Create a query service over a ledger store.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Fetch one page of audit records matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Storage`] if the backend fails.
    #[tracing::instrument(skip(self, filter))]
    pub async fn query(
        &self,
        filter: AuditFilter,
        page: PageRequest,
    ) -> Result<Page<AuditRecord>, LedgerError> {
        let result = self.store.audit_records(filter, page).await?;
        tracing::debug!(
            returned = result.items.len(),
            total = result.total,
            page = result.page,
            "Audit query"
        );
        Ok(result)
    }

    /// Aggregate every record matching `filter` into one summary.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Storage`] if the backend fails.
    #[tracing::instrument(skip(self, filter))]
    pub async fn summarize(&self, filter: AuditFilter) -> Result<AuditSummary, LedgerError> {
        self.store.audit_summary(filter).await
    }
}
