use serde::{Deserialize, Serialize};

use boxflow_core::{BaseId, LocationId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    Warehouse,
    DistributionSpot,
}

/// A place a box may physically sit. Belongs to exactly one base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub base_id: BaseId,
    pub name: String,
    pub kind: LocationKind,
}

impl Location {
    pub fn warehouse(id: LocationId, base_id: BaseId, name: impl Into<String>) -> Self {
        Self {
            id,
            base_id,
            name: name.into(),
            kind: LocationKind::Warehouse,
        }
    }

    pub fn distribution_spot(id: LocationId, base_id: BaseId, name: impl Into<String>) -> Self {
        Self {
            id,
            base_id,
            name: name.into(),
            kind: LocationKind::DistributionSpot,
        }
    }

    pub fn is_distribution_spot(&self) -> bool {
        self.kind == LocationKind::DistributionSpot
    }
}
