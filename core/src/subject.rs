//! Trackable subjects and the three inventory-tracking modes.
//!
//! A *subject* is the entity whose quantity the ledger manages: the product
//! itself for `product-level` tracking, or a single variant for
//! `variant-level` tracking. Products in `untracked` mode have no subject at
//! all; availability is their manual-enable flag alone.

use crate::ids::{ProductId, VariantId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Per-product inventory tracking mode.
///
/// The mode is owned by the product, never the variant. A product is in
/// exactly one mode at a time, and the mode decides which row holds the
/// authoritative quantity:
///
/// - `Untracked`: no quantity anywhere; availability is the manual flag.
/// - `ProductLevel`: one counter on the product, shared by all its variants.
/// - `VariantLevel`: one counter per variant; the product's own quantity
///   field is not authoritative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryMode {
    /// Stock is not tracked for this product.
    Untracked,
    /// One shared counter on the product.
    ProductLevel,
    /// One counter per variant.
    VariantLevel,
}

/// Error type for [`InventoryMode`] parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid inventory mode: {0}")]
pub struct ParseInventoryModeError(String);

impl InventoryMode {
    /// Convert the mode to its storage string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Untracked => "untracked",
            Self::ProductLevel => "product_level",
            Self::VariantLevel => "variant_level",
        }
    }

    /// Parse a mode from its storage string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string doesn't name a known mode.
    pub fn parse(s: &str) -> Result<Self, ParseInventoryModeError> {
        match s {
            "untracked" => Ok(Self::Untracked),
            "product_level" => Ok(Self::ProductLevel),
            "variant_level" => Ok(Self::VariantLevel),
            _ => Err(ParseInventoryModeError(s.to_string())),
        }
    }
}

impl fmt::Display for InventoryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse subject classification used in audit records and filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectKind {
    /// The subject is a product (`product-level` tracking).
    Product,
    /// The subject is a variant (`variant-level` tracking).
    Variant,
}

/// Identity of a tracked subject.
///
/// # Ordering
///
/// `SubjectId` carries a derived total order (products before variants, then
/// by id). Multi-subject operations acquire row locks in this order, which is
/// what rules out circular wait between concurrent reservations. The order
/// has no business meaning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SubjectId {
    /// A product-level counter.
    Product(ProductId),
    /// A variant-level counter.
    Variant(VariantId),
}

impl SubjectId {
    /// The coarse classification of this subject.
    #[must_use]
    pub const fn kind(&self) -> SubjectKind {
        match self {
            Self::Product(_) => SubjectKind::Product,
            Self::Variant(_) => SubjectKind::Variant,
        }
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Product(id) => write!(f, "product/{id}"),
            Self::Variant(id) => write!(f, "variant/{id}"),
        }
    }
}

/// Resolved reference to the entity a ledger call operates on.
///
/// `Untracked` is the sentinel the resolver returns for products whose mode is
/// `untracked`: always reservable, excluded from locking, rejected by
/// mutation paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectRef {
    /// The product does not track stock; there is nothing to mutate.
    Untracked,
    /// A subject holding an authoritative quantity.
    Tracked(SubjectId),
}

impl SubjectRef {
    /// Returns the tracked subject id, if any.
    #[must_use]
    pub const fn subject_id(&self) -> Option<SubjectId> {
        match self {
            Self::Untracked => None,
            Self::Tracked(id) => Some(*id),
        }
    }

    /// Whether this reference points at a tracked counter.
    #[must_use]
    pub const fn is_tracked(&self) -> bool {
        matches!(self, Self::Tracked(_))
    }
}

/// Catalog snapshot of a product.
///
/// `quantity` is only authoritative when `inventory_mode` is `ProductLevel`;
/// for `VariantLevel` products it is ignored, and for `Untracked` products it
/// is meaningless.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product identifier.
    pub id: ProductId,
    /// Tracking mode, owned by the product.
    pub inventory_mode: InventoryMode,
    /// Current quantity snapshot (product-level tracking only).
    pub quantity: u64,
    /// Manual availability toggle, independent of quantity.
    pub manually_enabled: bool,
}

/// Catalog snapshot of a product variant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    /// Variant identifier.
    pub id: VariantId,
    /// The product this variant belongs to.
    pub owner_product_id: ProductId,
    /// Current quantity snapshot (variant-level tracking only).
    pub quantity: u64,
}
