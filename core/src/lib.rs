//! # Stock Ledger Core
//!
//! Core types and storage traits for the inventory reservation and audit
//! ledger.
//!
//! The ledger keeps one non-negative integer quantity per tracked subject (a
//! product or a variant, depending on the product's inventory mode) and an
//! append-only, typed history of every change to it. This crate defines:
//!
//! - **Identifiers** ([`ids`]): newtypes for products, variants, orders,
//!   line items, actors, and audit records.
//! - **Subjects** ([`subject`]): the three inventory modes and the resolved
//!   subject references the engine operates on.
//! - **Audit records** ([`audit`]): the immutable history entries and the
//!   quantity arithmetic behind the never-negative rule.
//! - **Queries** ([`query`]): filters, pagination, and summary aggregates
//!   for the read path.
//! - **Errors** ([`error`]): the ledger error taxonomy.
//! - **Storage traits** ([`store`]): the transactional [`store::LedgerStore`]
//!   seam and the [`store::SubjectCatalog`] read seam.
//! - **Clock** ([`clock`]): injected time for deterministic tests.
//!
//! The engine components live in the `stock-ledger` crate; this crate holds
//! only what both sides of the storage boundary need to agree on.

pub mod audit;
pub mod clock;
pub mod error;
pub mod ids;
pub mod query;
pub mod store;
pub mod subject;

pub use audit::{AuditRecord, AuditType, apply_change};
pub use clock::{Clock, SystemClock};
pub use error::{LedgerError, StockShortage};
pub use ids::{ActorId, AuditRecordId, LineItemId, OrderId, ProductId, VariantId};
pub use query::{AuditFilter, AuditSummary, Page, PageRequest};
pub use store::{DeltaCommand, LedgerStore, SubjectCatalog};
pub use subject::{InventoryMode, Product, SubjectId, SubjectKind, SubjectRef, Variant};
