use serde::{Deserialize, Serialize};

use boxflow_core::{BaseId, BoxLabel, LocationId, StockKey};

use crate::collection::Custody;

/// Box lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoxState {
    InStock,
    Donated,
    MarkedForShipment,
    InTransit,
    Receiving,
    NotDelivered,
    Lost,
    Scrap,
}

impl BoxState {
    /// Whether a box in this state is physically at its recorded location.
    pub fn is_at_location(self) -> bool {
        matches!(
            self,
            BoxState::InStock | BoxState::Donated | BoxState::MarkedForShipment | BoxState::Scrap
        )
    }

    /// States an operator may set directly on a box sitting at a location.
    pub fn is_manually_settable(self) -> bool {
        matches!(
            self,
            BoxState::InStock | BoxState::Donated | BoxState::Scrap | BoxState::Lost
        )
    }
}

/// A labelled physical box holding a quantity of one product/size.
///
/// `location` is the last physical location the box was recorded at; it is
/// kept while the box is away so it can be put back.
/// [`StockBox::current_location`] is the "where is it now" answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBox {
    pub(crate) label: BoxLabel,
    pub(crate) base_id: BaseId,
    pub(crate) location: Option<LocationId>,
    pub(crate) key: StockKey,
    pub(crate) quantity: u64,
    pub(crate) intake_quantity: u64,
    pub(crate) state: BoxState,
    pub(crate) custody: Custody,
    pub(crate) deleted: bool,
    pub(crate) version: u64,
}

impl StockBox {
    pub fn label(&self) -> &BoxLabel {
        &self.label
    }

    pub fn base_id(&self) -> BaseId {
        self.base_id
    }

    /// Location the box currently sits at, `None` while in transit, lost or distributed.
    pub fn current_location(&self) -> Option<LocationId> {
        match self.custody {
            Custody::Location(id) => Some(id),
            Custody::Shipment { .. } | Custody::DistributionEvent(_)
                if self.state.is_at_location() =>
            {
                self.location
            }
            _ => None,
        }
    }

    pub fn last_location(&self) -> Option<LocationId> {
        self.location
    }

    pub fn key(&self) -> &StockKey {
        &self.key
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn intake_quantity(&self) -> u64 {
        self.intake_quantity
    }

    pub fn state(&self) -> BoxState {
        self.state
    }

    pub fn custody(&self) -> &Custody {
        &self.custody
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Bases whose members may touch this box: the owner, plus the receiving
    /// base while the box sits in a shipment.
    pub fn involved_bases(&self) -> Vec<BaseId> {
        match self.custody {
            Custody::Shipment { target_base, .. } => vec![self.base_id, target_base],
            _ => vec![self.base_id],
        }
    }
}
