//! In-memory transactional backend.
//!
//! Implements [`LedgerStore`] and [`SubjectCatalog`] over per-subject row
//! locks:
//!
//! - Each tracked subject owns a `tokio::sync::Mutex` row lock and an atomic
//!   quantity cell. Mutations hold the lock; snapshot reads load the cell
//!   without coordination.
//! - A batch apply acquires every affected row lock in `SubjectId` order
//!   (the global lock order shared by all callers), validates every command
//!   against the locked quantities, and only then writes quantities and audit
//!   records together. Any failure before that point releases the locks with
//!   nothing written.
//! - Lock acquisition is bounded by a configurable timeout; expiry aborts the
//!   whole batch with `LockTimeout`.
//!
//! A database-backed implementation would map the same protocol onto
//! `SELECT ... FOR UPDATE` in one transaction; the trait contract is written
//! so callers can't tell the difference.

use crate::metrics::LedgerMetrics;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use stock_ledger_core::audit::apply_change;
use stock_ledger_core::clock::{Clock, SystemClock};
use stock_ledger_core::error::{LedgerError, StockShortage};
use stock_ledger_core::ids::{AuditRecordId, OrderId, ProductId, VariantId};
use stock_ledger_core::query::{AuditFilter, AuditSummary, Page, PageRequest};
use stock_ledger_core::store::{DeltaCommand, LedgerStore, SubjectCatalog};
use stock_ledger_core::subject::{InventoryMode, Product, SubjectId, Variant};
use stock_ledger_core::{AuditRecord, AuditType};
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;

/// Default bounded wait for a row lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// One subject's row: the lock serializing mutations and the quantity cell.
///
/// The lock guards the read-check-write critical section; the cell itself is
/// atomic so display reads never block behind it.
struct SubjectRow {
    lock: Arc<Mutex<()>>,
    quantity: AtomicU64,
}

impl SubjectRow {
    fn new() -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            quantity: AtomicU64::new(0),
        }
    }
}

/// Catalog attributes of a product (quantity lives in its subject row).
struct ProductMeta {
    inventory_mode: InventoryMode,
    manually_enabled: bool,
}

/// Catalog attributes of a variant.
struct VariantMeta {
    owner_product_id: ProductId,
}

/// In-memory [`LedgerStore`] and [`SubjectCatalog`] implementation.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use stock_ledger::memory::MemoryLedgerStore;
/// use stock_ledger_core::{InventoryMode, ProductId, SystemClock};
///
/// # async fn example() -> Result<(), stock_ledger_core::LedgerError> {
/// let store = MemoryLedgerStore::new(Arc::new(SystemClock));
/// let product_id = ProductId::new();
/// store
///     .register_product(product_id, InventoryMode::ProductLevel, true)
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct MemoryLedgerStore {
    products: RwLock<HashMap<ProductId, ProductMeta>>,
    variants: RwLock<HashMap<VariantId, VariantMeta>>,
    rows: RwLock<HashMap<SubjectId, Arc<SubjectRow>>>,
    audit: RwLock<Vec<AuditRecord>>,
    next_audit_id: AtomicU64,
    clock: Arc<dyn Clock>,
    lock_timeout: Duration,
}

impl MemoryLedgerStore {
    /// Create a store with the given clock and the default lock timeout.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            products: RwLock::new(HashMap::new()),
            variants: RwLock::new(HashMap::new()),
            rows: RwLock::new(HashMap::new()),
            audit: RwLock::new(Vec::new()),
            next_audit_id: AtomicU64::new(1),
            clock,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Override the bounded wait for row locks.
    #[must_use]
    pub const fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Register a product in the catalog.
    ///
    /// Product-level products get a subject row starting at quantity 0; the
    /// initial stock arrives as a separate `import` or `manual_adjustment`
    /// mutation so the audit trail starts at the true beginning.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidSubject`] if the product is already registered.
    pub async fn register_product(
        &self,
        id: ProductId,
        inventory_mode: InventoryMode,
        manually_enabled: bool,
    ) -> Result<(), LedgerError> {
        let mut products = self.products.write().await;
        if products.contains_key(&id) {
            return Err(LedgerError::InvalidSubject(format!(
                "product {id} is already registered"
            )));
        }
        products.insert(
            id,
            ProductMeta {
                inventory_mode,
                manually_enabled,
            },
        );
        drop(products);

        if inventory_mode == InventoryMode::ProductLevel {
            self.rows
                .write()
                .await
                .insert(SubjectId::Product(id), Arc::new(SubjectRow::new()));
        }
        tracing::debug!(product_id = %id, mode = %inventory_mode, "Registered product");
        Ok(())
    }

    /// Register a variant under an existing product.
    ///
    /// Variants of variant-level products get their own subject row; under
    /// any other mode the variant has no counter of its own.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidSubject`] if the owner product is unknown or
    ///   the variant is already registered.
    pub async fn register_variant(
        &self,
        id: VariantId,
        owner_product_id: ProductId,
    ) -> Result<(), LedgerError> {
        let owner_mode = {
            let products = self.products.read().await;
            products
                .get(&owner_product_id)
                .map(|meta| meta.inventory_mode)
                .ok_or_else(|| {
                    LedgerError::InvalidSubject(format!(
                        "variant {id} references unknown product {owner_product_id}"
                    ))
                })?
        };

        let mut variants = self.variants.write().await;
        if variants.contains_key(&id) {
            return Err(LedgerError::InvalidSubject(format!(
                "variant {id} is already registered"
            )));
        }
        variants.insert(id, VariantMeta { owner_product_id });
        drop(variants);

        if owner_mode == InventoryMode::VariantLevel {
            self.rows
                .write()
                .await
                .insert(SubjectId::Variant(id), Arc::new(SubjectRow::new()));
        }
        tracing::debug!(variant_id = %id, product_id = %owner_product_id, "Registered variant");
        Ok(())
    }

    /// Flip a product's manual availability toggle.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidSubject`] if the product is unknown.
    pub async fn set_manually_enabled(
        &self,
        id: ProductId,
        enabled: bool,
    ) -> Result<(), LedgerError> {
        let mut products = self.products.write().await;
        let meta = products.get_mut(&id).ok_or_else(|| {
            LedgerError::InvalidSubject(format!("unknown product {id}"))
        })?;
        meta.manually_enabled = enabled;
        Ok(())
    }

    /// Resolve the row arcs for a sorted set of subjects.
    async fn rows_for(
        &self,
        subjects: &BTreeSet<SubjectId>,
    ) -> Result<Vec<(SubjectId, Arc<SubjectRow>)>, LedgerError> {
        let rows = self.rows.read().await;
        subjects
            .iter()
            .map(|subject| {
                rows.get(subject)
                    .map(|row| (*subject, Arc::clone(row)))
                    .ok_or_else(|| {
                        LedgerError::InvalidSubject(format!("no tracked row for {subject}"))
                    })
            })
            .collect()
    }

    async fn apply_inner(
        &self,
        commands: Vec<DeltaCommand>,
    ) -> Result<Vec<AuditRecord>, LedgerError> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        for command in &commands {
            command.validate()?;
        }

        let started = Instant::now();

        // Fix the global lock order: BTreeSet iteration is SubjectId order.
        let subjects: BTreeSet<SubjectId> =
            commands.iter().map(|command| command.subject).collect();
        let locked_rows = self.rows_for(&subjects).await?;

        let mut guards = Vec::with_capacity(locked_rows.len());
        for (subject, row) in &locked_rows {
            match timeout(self.lock_timeout, Arc::clone(&row.lock).lock_owned()).await {
                Ok(guard) => guards.push(guard),
                Err(_) => {
                    tracing::warn!(subject = %subject, "Row lock wait exceeded bounded timeout");
                    LedgerMetrics::record_lock_timeout();
                    return Err(LedgerError::LockTimeout { subject: *subject });
                }
            }
        }

        // All locks held: stage every command against the locked quantities.
        let mut staged: HashMap<SubjectId, u64> = locked_rows
            .iter()
            .map(|(subject, row)| (*subject, row.quantity.load(Ordering::SeqCst)))
            .collect();
        let mut drafts = Vec::with_capacity(commands.len());
        let mut shortages = Vec::new();

        for command in &commands {
            let previous = staged[&command.subject];
            match apply_change(previous, command.delta) {
                Some(new) => {
                    staged.insert(command.subject, new);
                    drafts.push((previous, new));
                }
                None if command.delta < 0 => {
                    shortages.push(StockShortage {
                        subject: command.subject,
                        available: previous,
                        requested: command.delta.unsigned_abs(),
                    });
                }
                None => {
                    return Err(LedgerError::Storage(format!(
                        "quantity overflow on {}",
                        command.subject
                    )));
                }
            }
        }

        if !shortages.is_empty() {
            tracing::warn!(
                shortages = shortages.len(),
                commands = commands.len(),
                "Rejected delta batch for insufficient stock"
            );
            LedgerMetrics::record_shortages(shortages.len());
            return Err(LedgerError::InsufficientStock { shortages });
        }

        // Commit: quantities and audit records together, locks still held.
        for (subject, row) in &locked_rows {
            row.quantity.store(staged[subject], Ordering::SeqCst);
        }

        let mut log = self.audit.write().await;
        let mut records = Vec::with_capacity(commands.len());
        for (command, (previous, new)) in commands.iter().zip(drafts) {
            let record = AuditRecord {
                id: AuditRecordId::new(self.next_audit_id.fetch_add(1, Ordering::SeqCst)),
                subject: command.subject,
                audit_type: command.audit_type,
                quantity_change: command.delta,
                previous_quantity: previous,
                new_quantity: new,
                order_id: command.order_id,
                actor_id: command.actor_id,
                reason: command.reason.clone(),
                created_at: self.clock.now(),
            };
            log.push(record.clone());
            records.push(record);
        }
        drop(log);
        drop(guards);

        tracing::debug!(
            commands = records.len(),
            subjects = locked_rows.len(),
            "Committed delta batch"
        );
        LedgerMetrics::record_apply(records.len(), started.elapsed());
        Ok(records)
    }

    async fn quantity_inner(&self, subject: SubjectId) -> Option<u64> {
        let rows = self.rows.read().await;
        rows.get(&subject)
            .map(|row| row.quantity.load(Ordering::SeqCst))
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn apply(
        &self,
        commands: Vec<DeltaCommand>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AuditRecord>, LedgerError>> + Send + '_>> {
        Box::pin(self.apply_inner(commands))
    }

    fn quantity(
        &self,
        subject: SubjectId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<u64>, LedgerError>> + Send + '_>> {
        Box::pin(async move { Ok(self.quantity_inner(subject).await) })
    }

    fn audit_records(
        &self,
        filter: AuditFilter,
        page: PageRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Page<AuditRecord>, LedgerError>> + Send + '_>> {
        Box::pin(async move {
            let log = self.audit.read().await;
            // Newest first: admin surfaces read the trail backwards.
            let matching: Vec<&AuditRecord> = log
                .iter()
                .rev()
                .filter(|record| filter.matches(record))
                .collect();
            let total = matching.len() as u64;
            let items = matching
                .into_iter()
                .skip(page.offset())
                .take(page.per_page as usize)
                .cloned()
                .collect();
            Ok(Page {
                items,
                total,
                page: page.page,
                per_page: page.per_page,
            })
        })
    }

    fn audit_summary(
        &self,
        filter: AuditFilter,
    ) -> Pin<Box<dyn Future<Output = Result<AuditSummary, LedgerError>> + Send + '_>> {
        Box::pin(async move {
            let log = self.audit.read().await;
            let mut summary = AuditSummary::default();
            for record in log.iter().filter(|record| filter.matches(record)) {
                summary.accumulate(record);
            }
            Ok(summary)
        })
    }

    fn order_has_audit(
        &self,
        order_id: OrderId,
        audit_type: AuditType,
    ) -> Pin<Box<dyn Future<Output = Result<bool, LedgerError>> + Send + '_>> {
        Box::pin(async move {
            let log = self.audit.read().await;
            Ok(log
                .iter()
                .any(|record| record.order_id == Some(order_id) && record.audit_type == audit_type))
        })
    }
}

impl SubjectCatalog for MemoryLedgerStore {
    fn product(
        &self,
        id: ProductId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Product>, LedgerError>> + Send + '_>> {
        Box::pin(async move {
            let products = self.products.read().await;
            let Some(meta) = products.get(&id) else {
                return Ok(None);
            };
            let snapshot = Product {
                id,
                inventory_mode: meta.inventory_mode,
                quantity: 0,
                manually_enabled: meta.manually_enabled,
            };
            drop(products);
            let quantity = self
                .quantity_inner(SubjectId::Product(id))
                .await
                .unwrap_or(0);
            Ok(Some(Product {
                quantity,
                ..snapshot
            }))
        })
    }

    fn variant(
        &self,
        id: VariantId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Variant>, LedgerError>> + Send + '_>> {
        Box::pin(async move {
            let variants = self.variants.read().await;
            let Some(meta) = variants.get(&id) else {
                return Ok(None);
            };
            let owner_product_id = meta.owner_product_id;
            drop(variants);
            let quantity = self
                .quantity_inner(SubjectId::Variant(id))
                .await
                .unwrap_or(0);
            Ok(Some(Variant {
                id,
                owner_product_id,
                quantity,
            }))
        })
    }

    fn variants_of(
        &self,
        product_id: ProductId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Variant>, LedgerError>> + Send + '_>> {
        Box::pin(async move {
            let ids: Vec<VariantId> = {
                let variants = self.variants.read().await;
                variants
                    .iter()
                    .filter(|(_, meta)| meta.owner_product_id == product_id)
                    .map(|(id, _)| *id)
                    .collect()
            };
            let rows = self.rows.read().await;
            Ok(ids
                .into_iter()
                .map(|id| Variant {
                    id,
                    owner_product_id: product_id,
                    quantity: rows
                        .get(&SubjectId::Variant(id))
                        .map_or(0, |row| row.quantity.load(Ordering::SeqCst)),
                })
                .collect())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use stock_ledger_core::ids::ActorId;

    async fn seeded_variant(store: &MemoryLedgerStore, initial: i64) -> SubjectId {
        let product_id = ProductId::new();
        let variant_id = VariantId::new();
        store
            .register_product(product_id, InventoryMode::VariantLevel, true)
            .await
            .unwrap();
        store.register_variant(variant_id, product_id).await.unwrap();
        let subject = SubjectId::Variant(variant_id);
        if initial > 0 {
            store
                .apply(vec![DeltaCommand {
                    subject,
                    delta: initial,
                    audit_type: AuditType::Import,
                    order_id: None,
                    actor_id: Some(ActorId::new()),
                    reason: None,
                }])
                .await
                .unwrap();
        }
        subject
    }

    fn manual_command(subject: SubjectId, delta: i64) -> DeltaCommand {
        DeltaCommand {
            subject,
            delta,
            audit_type: AuditType::ManualAdjustment,
            order_id: None,
            actor_id: Some(ActorId::new()),
            reason: None,
        }
    }

    #[tokio::test]
    async fn apply_writes_quantity_and_audit_together() {
        let store = MemoryLedgerStore::default();
        let subject = seeded_variant(&store, 10).await;

        let records = store.apply(vec![manual_command(subject, -4)]).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].previous_quantity, 10);
        assert_eq!(records[0].new_quantity, 6);
        assert!(records[0].is_consistent());
        assert_eq!(store.quantity(subject).await.unwrap(), Some(6));

        let page = store
            .audit_records(AuditFilter::all().with_subject(subject), PageRequest::first())
            .await
            .unwrap();
        assert_eq!(page.total, 2); // import + adjustment
    }

    #[tokio::test]
    async fn insufficient_stock_writes_nothing() {
        let store = MemoryLedgerStore::default();
        let subject = seeded_variant(&store, 2).await;

        let err = store
            .apply(vec![manual_command(subject, -3)])
            .await
            .unwrap_err();

        match err {
            LedgerError::InsufficientStock { shortages } => {
                assert_eq!(shortages.len(), 1);
                assert_eq!(shortages[0].available, 2);
                assert_eq!(shortages[0].requested, 3);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        assert_eq!(store.quantity(subject).await.unwrap(), Some(2));
        let summary = store
            .audit_summary(AuditFilter::all().with_subject(subject))
            .await
            .unwrap();
        assert_eq!(summary.count, 1); // only the import
    }

    #[tokio::test]
    async fn batch_is_all_or_nothing() {
        let store = MemoryLedgerStore::default();
        let plenty = seeded_variant(&store, 10).await;
        let scarce = seeded_variant(&store, 1).await;

        let err = store
            .apply(vec![
                manual_command(plenty, -2),
                manual_command(scarce, -5),
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientStock { .. }));
        // The sufficient subject was rolled back too.
        assert_eq!(store.quantity(plenty).await.unwrap(), Some(10));
        assert_eq!(store.quantity(scarce).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn same_subject_commands_see_staged_quantity() {
        let store = MemoryLedgerStore::default();
        let subject = seeded_variant(&store, 5).await;

        // 5 - 3 - 3 fails on the second command with 2 available.
        let err = store
            .apply(vec![manual_command(subject, -3), manual_command(subject, -3)])
            .await
            .unwrap_err();

        match err {
            LedgerError::InsufficientStock { shortages } => {
                assert_eq!(shortages[0].available, 2);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        assert_eq!(store.quantity(subject).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn unknown_subject_is_invalid() {
        let store = MemoryLedgerStore::default();
        let err = store
            .apply(vec![manual_command(SubjectId::Variant(VariantId::new()), 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidSubject(_)));
    }

    #[tokio::test]
    async fn held_row_lock_times_out_the_batch() {
        let store = MemoryLedgerStore::default().with_lock_timeout(Duration::from_millis(20));
        let subject = seeded_variant(&store, 5).await;

        let row = {
            let rows = store.rows.read().await;
            Arc::clone(&rows[&subject])
        };
        let _held = Arc::clone(&row.lock).lock_owned().await;

        let err = store
            .apply(vec![manual_command(subject, -1)])
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::LockTimeout { subject });
        assert_eq!(store.quantity(subject).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn untracked_product_has_no_row() {
        let store = MemoryLedgerStore::default();
        let product_id = ProductId::new();
        store
            .register_product(product_id, InventoryMode::Untracked, true)
            .await
            .unwrap();

        assert_eq!(
            store.quantity(SubjectId::Product(product_id)).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let store = MemoryLedgerStore::default();
        let product_id = ProductId::new();
        store
            .register_product(product_id, InventoryMode::ProductLevel, true)
            .await
            .unwrap();
        let err = store
            .register_product(product_id, InventoryMode::ProductLevel, true)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidSubject(_)));
    }
}
