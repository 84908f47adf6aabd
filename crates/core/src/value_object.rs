//! Value objects: equality by value, not identity.

use serde::{Deserialize, Serialize};

use crate::id::{ProductId, SizeId};

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. Two stock keys
/// naming the same product and size are the same key, regardless of which box
/// or collection they were read from.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Size of the items in a box: either a catalogue size or a measured amount.
///
/// Measures are stored in thousandths of `unit` (e.g. `500_000` of `"g"` is
/// 500 g) so that keys stay hashable and totally ordered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SizeSpec {
    Size { size_id: SizeId },
    Measure { milli_value: u64, unit: String },
}

impl ValueObject for SizeSpec {}

/// The (product, size) pair under which quantities are reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub size: SizeSpec,
}

impl StockKey {
    pub fn new(product_id: ProductId, size: SizeSpec) -> Self {
        Self { product_id, size }
    }

    pub fn sized(product_id: ProductId, size_id: SizeId) -> Self {
        Self::new(product_id, SizeSpec::Size { size_id })
    }
}

impl ValueObject for StockKey {}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.size {
            SizeSpec::Size { size_id } => write!(f, "{}/{}", self.product_id, size_id),
            SizeSpec::Measure { milli_value, unit } => {
                write!(f, "{}/{}m{}", self.product_id, milli_value, unit)
            }
        }
    }
}
