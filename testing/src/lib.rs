//! # Stock Ledger Testing
//!
//! Testing utilities and fixtures for the stock ledger.
//!
//! This crate provides:
//! - A deterministic [`FixedClock`]
//! - [`LedgerFixture`]: a pre-wired in-memory store with catalog seeding
//!   helpers
//! - Tracing initialization for tests
//!
//! ## Example
//!
//! ```
//! use stock_ledger_testing::LedgerFixture;
//! use stock_ledger::validator::CheckoutStockValidator;
//! use stock_ledger_core::ids::OrderId;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let fixture = LedgerFixture::new();
//! let (product_id, variant_id, subject) = fixture.variant_level_product(10).await?;
//!
//! let validator = fixture.validator();
//! let receipt = validator
//!     .reserve_for_order(
//!         OrderId::new(),
//!         &[LedgerFixture::line_item(product_id, Some(variant_id), 3)],
//!     )
//!     .await?;
//! assert_eq!(receipt.records.len(), 1);
//! assert_eq!(fixture.quantity(subject).await, 7);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use std::sync::Arc;
use stock_ledger::bridge::OrderLifecycleBridge;
use stock_ledger::ledger::StockLedger;
use stock_ledger::memory::MemoryLedgerStore;
use stock_ledger::query::AuditQueryService;
use stock_ledger::validator::{CheckoutStockValidator, LineItem};
use stock_ledger_core::clock::Clock;
use stock_ledger_core::error::LedgerError;
use stock_ledger_core::ids::{ActorId, LineItemId, ProductId, VariantId};
use stock_ledger_core::store::LedgerStore;
use stock_ledger_core::subject::{InventoryMode, SubjectId, SubjectRef};

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use stock_ledger_testing::mocks::FixedClock;
    /// use stock_ledger_core::clock::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Initialize tracing for a test binary. Safe to call more than once.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

/// An in-memory ledger plus catalog seeding helpers.
///
/// The store uses a [`FixedClock`](mocks::FixedClock), so audit timestamps
/// are deterministic. Every service handed out by this fixture shares the
/// same store.
pub struct LedgerFixture {
    store: Arc<MemoryLedgerStore>,
    actor_id: ActorId,
}

impl LedgerFixture {
    /// Create a fixture with a fixed clock and a fresh seeding actor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryLedgerStore::new(Arc::new(mocks::test_clock()))),
            actor_id: ActorId::new(),
        }
    }

    /// The shared store.
    #[must_use]
    pub fn store(&self) -> Arc<MemoryLedgerStore> {
        Arc::clone(&self.store)
    }

    /// The actor used for seeding imports.
    #[must_use]
    pub const fn actor_id(&self) -> ActorId {
        self.actor_id
    }

    /// A checkout validator over the shared store.
    #[must_use]
    pub fn validator(&self) -> CheckoutStockValidator {
        CheckoutStockValidator::new(self.store(), self.store())
    }

    /// A lifecycle bridge over the shared store.
    #[must_use]
    pub fn bridge(&self) -> OrderLifecycleBridge {
        OrderLifecycleBridge::new(self.store(), self.store())
    }

    /// A single-subject ledger over the shared store.
    #[must_use]
    pub fn ledger(&self) -> StockLedger {
        StockLedger::new(self.store())
    }

    /// A query service over the shared store.
    #[must_use]
    pub fn query_service(&self) -> AuditQueryService {
        AuditQueryService::new(self.store())
    }

    /// Register an untracked product.
    ///
    /// # Errors
    ///
    /// Propagates registration failures from the store.
    pub async fn untracked_product(&self) -> Result<ProductId, LedgerError> {
        let product_id = ProductId::new();
        self.store
            .register_product(product_id, InventoryMode::Untracked, true)
            .await?;
        Ok(product_id)
    }

    /// Register a product-level product seeded with `quantity` units.
    ///
    /// # Errors
    ///
    /// Propagates registration or import failures from the store.
    pub async fn product_level_product(
        &self,
        quantity: u64,
    ) -> Result<(ProductId, SubjectId), LedgerError> {
        let product_id = ProductId::new();
        self.store
            .register_product(product_id, InventoryMode::ProductLevel, true)
            .await?;
        let subject = SubjectId::Product(product_id);
        self.seed(subject, quantity).await?;
        Ok((product_id, subject))
    }

    /// Register a variant-level product with one variant seeded with
    /// `quantity` units.
    ///
    /// # Errors
    ///
    /// Propagates registration or import failures from the store.
    pub async fn variant_level_product(
        &self,
        quantity: u64,
    ) -> Result<(ProductId, VariantId, SubjectId), LedgerError> {
        let product_id = ProductId::new();
        self.store
            .register_product(product_id, InventoryMode::VariantLevel, true)
            .await?;
        let variant_id = self.add_variant(product_id, quantity).await?;
        Ok((product_id, variant_id, SubjectId::Variant(variant_id)))
    }

    /// Add another variant to an existing product, seeded with `quantity`.
    ///
    /// # Errors
    ///
    /// Propagates registration or import failures from the store.
    pub async fn add_variant(
        &self,
        product_id: ProductId,
        quantity: u64,
    ) -> Result<VariantId, LedgerError> {
        let variant_id = VariantId::new();
        self.store.register_variant(variant_id, product_id).await?;
        self.seed(SubjectId::Variant(variant_id), quantity).await?;
        Ok(variant_id)
    }

    async fn seed(&self, subject: SubjectId, quantity: u64) -> Result<(), LedgerError> {
        if quantity == 0 {
            return Ok(());
        }
        self.bridge()
            .import_initial(SubjectRef::Tracked(subject), quantity, self.actor_id)
            .await?;
        Ok(())
    }

    /// Build a line item with a fresh id.
    #[must_use]
    pub fn line_item(
        product_id: ProductId,
        variant_id: Option<VariantId>,
        quantity: u32,
    ) -> LineItem {
        LineItem {
            id: LineItemId::new(),
            product_id,
            variant_id,
            quantity,
        }
    }

    /// Current quantity of a tracked subject.
    ///
    /// # Panics
    ///
    /// Panics if the subject has no row; fixtures only hand out tracked
    /// subjects, so this indicates a broken test.
    #[allow(clippy::expect_used)]
    pub async fn quantity(&self, subject: SubjectId) -> u64 {
        self.store
            .quantity(subject)
            .await
            .expect("in-memory quantity read cannot fail")
            .expect("fixture subjects always have a row")
    }
}

impl Default for LedgerFixture {
    fn default() -> Self {
        Self::new()
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[tokio::test]
    async fn fixture_seeds_variant_stock() {
        let fixture = LedgerFixture::new();
        let (_, _, subject) = fixture.variant_level_product(10).await.unwrap();
        assert_eq!(fixture.quantity(subject).await, 10);
    }
}
