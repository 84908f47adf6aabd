//! Read-side shapes returned by commands and queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use boxflow_core::{
    AggregateRoot, AuditTrail, BaseId, BoxLabel, DistributionEventId, LocationId, ShipmentId,
    StockKey, TrackingGroupId, TransferAgreementId,
};
use boxflow_distribution::{
    DistributionEvent, DistributionEventState, FlowTotals, KeyedQuantity, PackingListEntry,
    PackingPolicy, PackingReport, TrackingEntry, TrackingGroup, TrackingGroupState, packing,
};
use boxflow_ledger::{BoxState, CollectionRef, Custody, ItemsCollection, Location, QuantityLedger, StockBox};
use boxflow_shipments::{Shipment, ShipmentDetail, ShipmentState};

/// One-line identity of a command result, used for the commit log line.
pub trait Summary {
    fn subject(&self) -> String;
    fn status(&self) -> String;
}

impl Summary for () {
    fn subject(&self) -> String {
        "-".to_string()
    }

    fn status(&self) -> String {
        "ok".to_string()
    }
}

impl Summary for Location {
    fn subject(&self) -> String {
        self.id.to_string()
    }

    fn status(&self) -> String {
        format!("{:?}", self.kind)
    }
}

impl Summary for ItemsCollection {
    fn subject(&self) -> String {
        self.reference().to_string()
    }

    fn status(&self) -> String {
        format!("{} x {}", self.quantity(), self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxView {
    pub label: BoxLabel,
    pub base_id: BaseId,
    pub key: StockKey,
    pub quantity: u64,
    pub intake_quantity: u64,
    pub state: BoxState,
    pub custody: Custody,
    pub location: Option<LocationId>,
    pub deleted: bool,
    pub version: u64,
}

impl From<&StockBox> for BoxView {
    fn from(b: &StockBox) -> Self {
        Self {
            label: b.label().clone(),
            base_id: b.base_id(),
            key: b.key().clone(),
            quantity: b.quantity(),
            intake_quantity: b.intake_quantity(),
            state: b.state(),
            custody: b.custody().clone(),
            location: b.current_location(),
            deleted: b.is_deleted(),
            version: b.version(),
        }
    }
}

impl Summary for BoxView {
    fn subject(&self) -> String {
        self.label.to_string()
    }

    fn status(&self) -> String {
        format!("{:?}", self.state)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentView {
    pub id: ShipmentId,
    pub source_base: BaseId,
    pub target_base: BaseId,
    pub agreement: Option<TransferAgreementId>,
    pub state: ShipmentState,
    pub details: Vec<ShipmentDetail>,
    pub history: AuditTrail<ShipmentState>,
    pub version: u64,
}

impl From<&Shipment> for ShipmentView {
    fn from(s: &Shipment) -> Self {
        Self {
            id: *s.id(),
            source_base: s.source_base(),
            target_base: s.target_base(),
            agreement: s.agreement(),
            state: s.state(),
            details: s.details().to_vec(),
            history: s.history().clone(),
            version: s.version(),
        }
    }
}

impl Summary for ShipmentView {
    fn subject(&self) -> String {
        self.id.to_string()
    }

    fn status(&self) -> String {
        format!("{:?}", self.state)
    }
}

/// A distribution event with its packing list fulfillment derived from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionEventView {
    pub id: DistributionEventId,
    pub base_id: BaseId,
    pub name: String,
    pub spot: LocationId,
    pub planned_start: DateTime<Utc>,
    pub planned_end: DateTime<Utc>,
    pub state: DistributionEventState,
    pub packing_list: Vec<PackingListEntry>,
    pub packing: PackingReport,
    pub is_fully_packed: bool,
    pub assigned: Vec<CollectionRef>,
    pub tracking_group: Option<TrackingGroupId>,
    pub history: AuditTrail<DistributionEventState>,
    pub version: u64,
}

impl DistributionEventView {
    pub fn new(event: &DistributionEvent, ledger: &QuantityLedger, policy: &PackingPolicy) -> Self {
        let held = ledger.collections_held_by(&Custody::DistributionEvent(*event.id()));
        let packing = packing::reconcile(event.packing_list(), &held, policy.over_packing);
        Self {
            id: *event.id(),
            base_id: event.base_id(),
            name: event.name().to_string(),
            spot: event.spot(),
            planned_start: event.planned_start(),
            planned_end: event.planned_end(),
            state: event.state(),
            packing_list: event.packing_list().to_vec(),
            is_fully_packed: packing.is_fully_packed(),
            packing,
            assigned: event.assigned().iter().cloned().collect(),
            tracking_group: event.tracking_group(),
            history: event.history().clone(),
            version: event.version(),
        }
    }
}

impl Summary for DistributionEventView {
    fn subject(&self) -> String {
        self.id.to_string()
    }

    fn status(&self) -> String {
        format!("{:?}", self.state)
    }
}

/// Per product/size flow totals of a tracking group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowTotalsRow {
    pub key: StockKey,
    pub out: u64,
    pub returned: u64,
    pub back_to_box: u64,
    /// `None` while more has come back than went out.
    pub distributed: Option<u64>,
}

impl FlowTotalsRow {
    fn new(key: StockKey, totals: FlowTotals) -> Self {
        Self {
            key,
            out: totals.out,
            returned: totals.returned,
            back_to_box: totals.back_to_box,
            distributed: totals.distributed(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingGroupView {
    pub id: TrackingGroupId,
    pub base_id: BaseId,
    pub events: Vec<DistributionEventId>,
    pub state: TrackingGroupState,
    pub totals: Vec<FlowTotalsRow>,
    pub entries: Vec<TrackingEntry>,
    /// Persisted when the group completes.
    pub distributed: Vec<KeyedQuantity>,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

impl From<&TrackingGroup> for TrackingGroupView {
    fn from(g: &TrackingGroup) -> Self {
        Self {
            id: *g.id(),
            base_id: g.base_id(),
            events: g.events().to_vec(),
            state: g.state(),
            totals: g
                .totals()
                .into_iter()
                .map(|(key, totals)| FlowTotalsRow::new(key, totals))
                .collect(),
            entries: g.entries().to_vec(),
            distributed: g.distributed().to_vec(),
            created_at: g.created_at(),
            version: g.version(),
        }
    }
}

impl Summary for TrackingGroupView {
    fn subject(&self) -> String {
        self.id.to_string()
    }

    fn status(&self) -> String {
        format!("{:?}", self.state)
    }
}
