//! Subject resolution: from product/variant ids to the authoritative counter.
//!
//! The three-mode decision lives here and nowhere else; the ledger itself is
//! mode-agnostic and only ever operates on a resolved [`SubjectRef`].

use std::sync::Arc;
use stock_ledger_core::error::LedgerError;
use stock_ledger_core::ids::{ProductId, VariantId};
use stock_ledger_core::store::SubjectCatalog;
use stock_ledger_core::subject::{InventoryMode, Product, SubjectId, SubjectRef};

/// Resolves products and variants to trackable subjects.
#[derive(Clone)]
pub struct SubjectResolver {
    catalog: Arc<dyn SubjectCatalog>,
}

impl SubjectResolver {
    /// Create a resolver over the given catalog.
    #[must_use]
    pub fn new(catalog: Arc<dyn SubjectCatalog>) -> Self {
        Self { catalog }
    }

    async fn load_product(&self, product_id: ProductId) -> Result<Product, LedgerError> {
        self.catalog
            .product(product_id)
            .await?
            .ok_or_else(|| LedgerError::InvalidSubject(format!("unknown product {product_id}")))
    }

    /// Resolve a product (and optional variant) to its trackable subject.
    ///
    /// - `untracked` products resolve to the [`SubjectRef::Untracked`]
    ///   sentinel: always reservable, excluded from locking.
    /// - `product-level` products resolve to the product itself, whether or
    ///   not a variant id was supplied, since all variants share one counter.
    /// - `variant-level` products require a variant id and resolve to that
    ///   variant.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidSubject`] if the product is unknown, a
    ///   variant-level product is queried without a variant, the variant is
    ///   unknown, or the variant belongs to a different product.
    pub async fn resolve(
        &self,
        product_id: ProductId,
        variant_id: Option<VariantId>,
    ) -> Result<SubjectRef, LedgerError> {
        let product = self.load_product(product_id).await?;
        match product.inventory_mode {
            InventoryMode::Untracked => Ok(SubjectRef::Untracked),
            InventoryMode::ProductLevel => Ok(SubjectRef::Tracked(SubjectId::Product(product_id))),
            InventoryMode::VariantLevel => {
                let Some(variant_id) = variant_id else {
                    return Err(LedgerError::InvalidSubject(format!(
                        "product {product_id} tracks stock per variant; a variant id is required"
                    )));
                };
                let variant = self.catalog.variant(variant_id).await?.ok_or_else(|| {
                    LedgerError::InvalidSubject(format!("unknown variant {variant_id}"))
                })?;
                if variant.owner_product_id != product_id {
                    return Err(LedgerError::InvalidSubject(format!(
                        "variant {variant_id} does not belong to product {product_id}"
                    )));
                }
                Ok(SubjectRef::Tracked(SubjectId::Variant(variant_id)))
            }
        }
    }

    /// Display-grade purchasability: the manual toggle gated by stock where
    /// stock is tracked at the product level.
    ///
    /// Variant-level products gate on the manual flag only; their product
    /// quantity field is not authoritative. The result may be stale;
    /// purchase authorization always re-validates through a locked
    /// reservation.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidSubject`] if the product is unknown.
    pub async fn effective_available(&self, product_id: ProductId) -> Result<bool, LedgerError> {
        let product = self.load_product(product_id).await?;
        if !product.manually_enabled {
            return Ok(false);
        }
        Ok(match product.inventory_mode {
            InventoryMode::Untracked | InventoryMode::VariantLevel => true,
            InventoryMode::ProductLevel => product.quantity > 0,
        })
    }

    /// Display-grade total stock across a product's variants.
    ///
    /// Never used for reservation decisions.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidSubject`] if the product is unknown.
    pub async fn aggregate_quantity(&self, product_id: ProductId) -> Result<u64, LedgerError> {
        self.load_product(product_id).await?;
        let variants = self.catalog.variants_of(product_id).await?;
        Ok(variants.iter().map(|variant| variant.quantity).sum())
    }
}
