//! Stock reservation engine and audit trail services.
//!
//! The pieces layer from storage up:
//!
//! - [`MemoryLedgerStore`]: per-subject row locks, atomic quantity cells,
//!   and the append-only audit log.
//! - [`StockLedger`]: validated single-subject mutations.
//! - [`SubjectResolver`]: maps products and variants to the ledger subject
//!   their inventory mode dictates.
//! - [`CheckoutStockValidator`]: all-or-nothing multi-item reservations with
//!   a global lock order and bounded retries on lock timeouts.
//! - [`AuditQueryService`]: filtered pages and summaries over the trail.
//! - [`OrderLifecycleBridge`]: idempotent order transitions plus manual
//!   admin mutations.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use stock_ledger::memory::MemoryLedgerStore;
//! use stock_ledger::validator::{CheckoutStockValidator, LineItem};
//! use stock_ledger_core::ids::{ActorId, LineItemId, OrderId, ProductId, VariantId};
//! use stock_ledger_core::subject::{InventoryMode, SubjectId, SubjectRef};
//! use stock_ledger::bridge::OrderLifecycleBridge;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryLedgerStore::default());
//! let product_id = ProductId::new();
//! let variant_id = VariantId::new();
//! store
//!     .register_product(product_id, InventoryMode::VariantLevel, true)
//!     .await?;
//! store.register_variant(variant_id, product_id).await?;
//!
//! let bridge = OrderLifecycleBridge::new(Arc::clone(&store) as _, Arc::clone(&store) as _);
//! bridge
//!     .import_initial(
//!         SubjectRef::Tracked(SubjectId::Variant(variant_id)),
//!         25,
//!         ActorId::new(),
//!     )
//!     .await?;
//!
//! let validator = CheckoutStockValidator::new(Arc::clone(&store) as _, Arc::clone(&store) as _);
//! let receipt = validator
//!     .reserve_for_order(
//!         OrderId::new(),
//!         &[LineItem {
//!             id: LineItemId::new(),
//!             product_id,
//!             variant_id: Some(variant_id),
//!             quantity: 2,
//!         }],
//!     )
//!     .await?;
//! assert_eq!(receipt.records.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod ledger;
pub mod memory;
pub mod metrics;
pub mod query;
pub mod resolver;
pub mod retry;
pub mod validator;

pub use bridge::{BridgeOutcome, OrderLifecycleBridge};
pub use ledger::{MutationContext, QuantitySnapshot, StockLedger};
pub use memory::MemoryLedgerStore;
pub use metrics::MetricsServer;
pub use query::AuditQueryService;
pub use resolver::SubjectResolver;
pub use retry::{RetryPolicy, RetryPolicyBuilder, retry_with_predicate};
pub use validator::{
    CheckoutStockValidator, LineItem, ReservationFailure, ReservationReceipt, StockIssue,
};
