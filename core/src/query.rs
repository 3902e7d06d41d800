//! Read-side types: audit filters, pagination, and summary aggregates.
//!
//! Nothing here touches subject row locks; these types describe what the
//! read path returns, not how it is stored.

use crate::audit::{AuditRecord, AuditType};
use crate::ids::OrderId;
use crate::subject::{SubjectId, SubjectKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Filter over audit history. Empty fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFilter {
    /// Match records for products or variants only.
    pub subject_kind: Option<SubjectKind>,
    /// Match records for one specific subject.
    pub subject: Option<SubjectId>,
    /// Match one audit type.
    pub audit_type: Option<AuditType>,
    /// Match records written for one order.
    pub order_id: Option<OrderId>,
    /// Match records created at or after this instant.
    pub from: Option<DateTime<Utc>>,
    /// Match records created strictly before this instant.
    pub to: Option<DateTime<Utc>>,
}

impl AuditFilter {
    /// Filter matching every record.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to one subject kind.
    #[must_use]
    pub fn with_subject_kind(mut self, kind: SubjectKind) -> Self {
        self.subject_kind = Some(kind);
        self
    }

    /// Restrict to one subject.
    #[must_use]
    pub fn with_subject(mut self, subject: SubjectId) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Restrict to one audit type.
    #[must_use]
    pub fn with_audit_type(mut self, audit_type: AuditType) -> Self {
        self.audit_type = Some(audit_type);
        self
    }

    /// Restrict to one order.
    #[must_use]
    pub fn with_order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    /// Restrict to records in `[from, to)`.
    #[must_use]
    pub fn with_date_range(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    /// Restrict to records created at or after `from`, with no upper bound.
    #[must_use]
    pub fn with_from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    /// Restrict to records created strictly before `to`, with no lower bound.
    #[must_use]
    pub fn with_to(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    /// Whether `record` passes every populated field of this filter.
    #[must_use]
    pub fn matches(&self, record: &AuditRecord) -> bool {
        if self.subject_kind.is_some_and(|kind| record.subject.kind() != kind) {
            return false;
        }
        if self.subject.is_some_and(|subject| record.subject != subject) {
            return false;
        }
        if self
            .audit_type
            .is_some_and(|audit_type| record.audit_type != audit_type)
        {
            return false;
        }
        if self
            .order_id
            .is_some_and(|order_id| record.order_id != Some(order_id))
        {
            return false;
        }
        if self.from.is_some_and(|from| record.created_at < from) {
            return false;
        }
        if self.to.is_some_and(|to| record.created_at >= to) {
            return false;
        }
        true
    }
}

/// One page of a paginated query. Pages are 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: u32,
    /// Records per page.
    pub per_page: u32,
}

impl PageRequest {
    /// Default records per page.
    pub const DEFAULT_PER_PAGE: u32 = 50;

    /// Create a page request. A zero `page` or `per_page` is bumped to 1.
    #[must_use]
    pub const fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: if page == 0 { 1 } else { page },
            per_page: if per_page == 0 { 1 } else { per_page },
        }
    }

    /// First page with the default size.
    #[must_use]
    pub const fn first() -> Self {
        Self::new(1, Self::DEFAULT_PER_PAGE)
    }

    /// Number of records to skip before this page.
    #[must_use]
    pub const fn offset(self) -> usize {
        (self.page as usize - 1) * self.per_page as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first()
    }
}

/// A page of results plus the total match count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Records on this page, newest first.
    pub items: Vec<T>,
    /// Total records matching the filter, across all pages.
    pub total: u64,
    /// Echo of the requested page number.
    pub page: u32,
    /// Echo of the requested page size.
    pub per_page: u32,
}

/// Aggregate view over a set of audit records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    /// Sum of positive quantity changes.
    pub total_added: u64,
    /// Sum of absolute values of negative quantity changes.
    pub total_removed: u64,
    /// `total_added - total_removed`.
    pub net_change: i64,
    /// Number of records counted.
    pub count: u64,
}

impl AuditSummary {
    /// Fold one record into the summary.
    pub fn accumulate(&mut self, record: &AuditRecord) {
        if record.quantity_change >= 0 {
            self.total_added += record.quantity_change.unsigned_abs();
        } else {
            self.total_removed += record.quantity_change.unsigned_abs();
        }
        self.net_change += record.quantity_change;
        self.count += 1;
    }
}
