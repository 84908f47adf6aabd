use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use boxflow_core::{BaseId, CollectionId, LocationId, StockKey, UserId};

use crate::collection::{CollectionRef, Custody};
use crate::stock_box::BoxState;

/// What a ledger operation did to one box or collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum LedgerChange {
    Intake { location: LocationId, key: StockKey },
    Moved { from: LocationId, to: LocationId },
    SplitOff { into: CollectionId },
    SplitFrom { source: CollectionRef },
    Merged { from: CollectionRef },
    MergedInto { target: CollectionRef },
    StateChanged { from: BoxState, to: BoxState },
    CustodyChanged { from: Custody, to: Custody },
    Reclassified { from: StockKey, to: StockKey },
    Rebased { from: BaseId, to: BaseId },
    Deleted,
}

/// Immutable audit record appended by every ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub sequence: u64,
    pub actor: UserId,
    pub at: DateTime<Utc>,
    pub subject: CollectionRef,
    pub change: LedgerChange,
    pub quantity_before: u64,
    pub quantity_after: u64,
}
