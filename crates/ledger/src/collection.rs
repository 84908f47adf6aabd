use serde::{Deserialize, Serialize};

use boxflow_core::{
    BaseId, BoxLabel, CollectionId, DistributionEventId, LocationId, ShipmentId, StockKey,
};

use crate::stock_box::StockBox;

/// The single place a box or collection belongs to at any instant.
///
/// This is the owner field that every assignment check-and-sets against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Custody {
    Location(LocationId),
    Shipment {
        shipment_id: ShipmentId,
        target_base: BaseId,
    },
    DistributionEvent(DistributionEventId),
    Lost,
    /// Handed out to beneficiaries.
    Distributed,
}

impl Custody {
    pub fn is_location(&self) -> bool {
        matches!(self, Custody::Location(_))
    }
}

/// Address of an items collection, whichever kind it is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CollectionRef {
    Box(BoxLabel),
    Unboxed(CollectionId),
}

impl core::fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CollectionRef::Box(label) => write!(f, "box {label}"),
            CollectionRef::Unboxed(id) => write!(f, "collection {id}"),
        }
    }
}

/// A loose quantity of one product/size that is not tied to a box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnboxedItemsCollection {
    pub(crate) id: CollectionId,
    pub(crate) base_id: BaseId,
    pub(crate) key: StockKey,
    pub(crate) quantity: u64,
    pub(crate) custody: Custody,
    /// Box the items were split from, if any.
    pub(crate) origin: Option<BoxLabel>,
    pub(crate) version: u64,
}

impl UnboxedItemsCollection {
    pub fn id(&self) -> CollectionId {
        self.id
    }

    pub fn base_id(&self) -> BaseId {
        self.base_id
    }

    pub fn key(&self) -> &StockKey {
        &self.key
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn custody(&self) -> &Custody {
        &self.custody
    }

    pub fn origin(&self) -> Option<&BoxLabel> {
        self.origin.as_ref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Either a whole box or an unboxed collection.
///
/// Both share the (product/size, quantity, custody) projection that the packing
/// reconciler and return aggregator work on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemsCollection {
    Boxed(StockBox),
    Unboxed(UnboxedItemsCollection),
}

impl ItemsCollection {
    pub fn reference(&self) -> CollectionRef {
        match self {
            ItemsCollection::Boxed(b) => CollectionRef::Box(b.label.clone()),
            ItemsCollection::Unboxed(c) => CollectionRef::Unboxed(c.id),
        }
    }

    pub fn key(&self) -> &StockKey {
        match self {
            ItemsCollection::Boxed(b) => &b.key,
            ItemsCollection::Unboxed(c) => &c.key,
        }
    }

    pub fn quantity(&self) -> u64 {
        match self {
            ItemsCollection::Boxed(b) => b.quantity,
            ItemsCollection::Unboxed(c) => c.quantity,
        }
    }

    pub fn custody(&self) -> &Custody {
        match self {
            ItemsCollection::Boxed(b) => &b.custody,
            ItemsCollection::Unboxed(c) => &c.custody,
        }
    }

    pub fn base_id(&self) -> BaseId {
        match self {
            ItemsCollection::Boxed(b) => b.base_id,
            ItemsCollection::Unboxed(c) => c.base_id,
        }
    }
}
