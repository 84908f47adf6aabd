use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use boxflow_core::{
    Aggregate, AggregateRoot, AuditTrail, BaseId, BoxLabel, DistributionEventId, DomainError,
    DomainResult, StockKey, TrackingEntryId, TrackingGroupId, UserId,
};
use boxflow_events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingGroupState {
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowDirection {
    /// Went out to the distribution.
    Out,
    /// Came back as leftovers.
    In,
    /// Came back and was merged into a box.
    BackToBox,
}

/// One append-only tracking record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEntry {
    pub id: TrackingEntryId,
    pub key: StockKey,
    pub quantity: u64,
    pub direction: FlowDirection,
    pub target_box: Option<BoxLabel>,
    pub actor: UserId,
    pub at: DateTime<Utc>,
}

/// A quantity for one product/size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedQuantity {
    pub key: StockKey,
    pub quantity: u64,
}

/// Out, In and BackToBox sums for one product/size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlowTotals {
    pub out: u64,
    pub returned: u64,
    pub back_to_box: u64,
}

impl FlowTotals {
    pub fn add(&mut self, direction: FlowDirection, quantity: u64) {
        match direction {
            FlowDirection::Out => self.out += quantity,
            FlowDirection::In => self.returned += quantity,
            FlowDirection::BackToBox => self.back_to_box += quantity,
        }
    }

    /// `out - in - back_to_box`, or `None` when more came back than went out.
    pub fn distributed(&self) -> Option<u64> {
        self.out
            .checked_sub(self.returned)
            .and_then(|rest| rest.checked_sub(self.back_to_box))
    }
}

/// Per product/size flow totals of a set of entries.
pub fn flow_totals<'a>(
    entries: impl IntoIterator<Item = &'a TrackingEntry>,
) -> BTreeMap<StockKey, FlowTotals> {
    let mut totals: BTreeMap<StockKey, FlowTotals> = BTreeMap::new();
    for entry in entries {
        totals
            .entry(entry.key.clone())
            .or_default()
            .add(entry.direction, entry.quantity);
    }
    totals
}

/// Net distributed quantity per product/size.
///
/// Fails with `OverReturn` naming the first product/size where returns exceed
/// what went out; nothing is clamped.
pub fn net_distributed(totals: &BTreeMap<StockKey, FlowTotals>) -> DomainResult<Vec<KeyedQuantity>> {
    totals
        .iter()
        .map(|(key, t)| {
            t.distributed()
                .map(|quantity| KeyedQuantity {
                    key: key.clone(),
                    quantity,
                })
                .ok_or_else(|| {
                    DomainError::over_return(format!(
                        "{key}: out {}, in {}, back to box {}",
                        t.out, t.returned, t.back_to_box
                    ))
                })
        })
        .collect()
}

/// Aggregate root: DistributionEventsTrackingGroup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingGroup {
    id: TrackingGroupId,
    base_id: BaseId,
    events: Vec<DistributionEventId>,
    state: TrackingGroupState,
    entries: Vec<TrackingEntry>,
    distributed: Vec<KeyedQuantity>,
    created_at: DateTime<Utc>,
    history: AuditTrail<TrackingGroupState>,
    created: bool,
    version: u64,
}

impl TrackingGroup {
    pub fn empty(id: TrackingGroupId) -> Self {
        Self {
            id,
            base_id: BaseId::from_uuid(Default::default()),
            events: Vec::new(),
            state: TrackingGroupState::InProgress,
            entries: Vec::new(),
            distributed: Vec::new(),
            created_at: DateTime::<Utc>::MIN_UTC,
            history: AuditTrail::new(),
            created: false,
            version: 0,
        }
    }

    pub fn base_id(&self) -> BaseId {
        self.base_id
    }

    pub fn events(&self) -> &[DistributionEventId] {
        &self.events
    }

    pub fn state(&self) -> TrackingGroupState {
        self.state
    }

    pub fn entries(&self) -> &[TrackingEntry] {
        &self.entries
    }

    /// Persisted distributed counts, set on completion.
    pub fn distributed(&self) -> &[KeyedQuantity] {
        &self.distributed
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn history(&self) -> &AuditTrail<TrackingGroupState> {
        &self.history
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn totals(&self) -> BTreeMap<StockKey, FlowTotals> {
        flow_totals(&self.entries)
    }

    fn went_out(&self, key: &StockKey) -> bool {
        self.entries
            .iter()
            .any(|e| e.direction == FlowDirection::Out && &e.key == key)
    }
}

impl AggregateRoot for TrackingGroup {
    type Id = TrackingGroupId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Command: StartGroup. `out` is the snapshot of what the events held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartGroup {
    pub group_id: TrackingGroupId,
    pub base_id: BaseId,
    pub events: Vec<DistributionEventId>,
    pub out: Vec<KeyedQuantity>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordFlow (In or BackToBox).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFlow {
    pub group_id: TrackingGroupId,
    pub entry_id: TrackingEntryId,
    pub key: StockKey,
    pub quantity: u64,
    pub target_box: Option<BoxLabel>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteGroup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteGroup {
    pub group_id: TrackingGroupId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingCommand {
    Start(StartGroup),
    RecordReturn(RecordFlow),
    MoveToBox(RecordFlow),
    Complete(CompleteGroup),
}

impl TrackingCommand {
    pub fn group_id(&self) -> TrackingGroupId {
        match self {
            TrackingCommand::Start(c) => c.group_id,
            TrackingCommand::RecordReturn(c) | TrackingCommand::MoveToBox(c) => c.group_id,
            TrackingCommand::Complete(c) => c.group_id,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Event: TrackingGroupStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingGroupStarted {
    pub group_id: TrackingGroupId,
    pub base_id: BaseId,
    pub events: Vec<DistributionEventId>,
    pub out: Vec<TrackingEntry>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FlowRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecorded {
    pub group_id: TrackingGroupId,
    pub entry: TrackingEntry,
}

/// Event: TrackingGroupCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingGroupCompleted {
    pub group_id: TrackingGroupId,
    pub base_id: BaseId,
    pub events: Vec<DistributionEventId>,
    pub distributed: Vec<KeyedQuantity>,
    /// `In` totals, booked back into stock on completion.
    pub returned: Vec<KeyedQuantity>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingEvent {
    Started(TrackingGroupStarted),
    FlowRecorded(FlowRecorded),
    Completed(TrackingGroupCompleted),
}

impl Event for TrackingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TrackingEvent::Started(_) => "tracking_group.started",
            TrackingEvent::FlowRecorded(e) => match e.entry.direction {
                FlowDirection::BackToBox => "tracking_group.moved_to_box",
                _ => "tracking_group.return_recorded",
            },
            TrackingEvent::Completed(_) => "tracking_group.completed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TrackingEvent::Started(e) => e.occurred_at,
            TrackingEvent::FlowRecorded(e) => e.entry.at,
            TrackingEvent::Completed(e) => e.occurred_at,
        }
    }

    fn actor(&self) -> UserId {
        match self {
            TrackingEvent::Started(e) => e.actor,
            TrackingEvent::FlowRecorded(e) => e.entry.actor,
            TrackingEvent::Completed(e) => e.actor,
        }
    }
}

impl Aggregate for TrackingGroup {
    type Command = TrackingCommand;
    type Event = TrackingEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TrackingEvent::Started(e) => {
                self.id = e.group_id;
                self.base_id = e.base_id;
                self.events = e.events.clone();
                self.state = TrackingGroupState::InProgress;
                self.entries = e.out.clone();
                self.created_at = e.occurred_at;
                self.created = true;
                self.history
                    .record(e.actor, e.occurred_at, TrackingGroupState::InProgress);
            }
            TrackingEvent::FlowRecorded(e) => {
                self.entries.push(e.entry.clone());
            }
            TrackingEvent::Completed(e) => {
                self.state = TrackingGroupState::Completed;
                self.distributed = e.distributed.clone();
                self.history
                    .record(e.actor, e.occurred_at, TrackingGroupState::Completed);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if self.id != command.group_id() {
            return Err(DomainError::validation("group_id mismatch"));
        }
        match command {
            TrackingCommand::Start(cmd) => self.handle_start(cmd),
            TrackingCommand::RecordReturn(cmd) => self.handle_flow(cmd, FlowDirection::In),
            TrackingCommand::MoveToBox(cmd) => self.handle_flow(cmd, FlowDirection::BackToBox),
            TrackingCommand::Complete(cmd) => self.handle_complete(cmd),
        }
    }
}

impl TrackingGroup {
    fn ensure_in_progress(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("tracking group {}", self.id)));
        }
        if self.state != TrackingGroupState::InProgress {
            return Err(DomainError::invalid_transition(format!(
                "tracking group {} is {:?}",
                self.id, self.state
            )));
        }
        Ok(())
    }

    fn handle_start(&self, cmd: &StartGroup) -> Result<Vec<TrackingEvent>, DomainError> {
        if self.created {
            return Err(DomainError::validation(format!(
                "tracking group {} already exists",
                self.id
            )));
        }
        if cmd.events.is_empty() {
            return Err(DomainError::validation(
                "a tracking group needs at least one event",
            ));
        }
        let mut seen = cmd.events.clone();
        seen.sort();
        seen.dedup();
        if seen.len() != cmd.events.len() {
            return Err(DomainError::validation("events must be distinct"));
        }

        let out = cmd
            .out
            .iter()
            .filter(|q| q.quantity > 0)
            .map(|q| TrackingEntry {
                id: TrackingEntryId::new(),
                key: q.key.clone(),
                quantity: q.quantity,
                direction: FlowDirection::Out,
                target_box: None,
                actor: cmd.actor,
                at: cmd.occurred_at,
            })
            .collect();
        Ok(vec![TrackingEvent::Started(TrackingGroupStarted {
            group_id: cmd.group_id,
            base_id: cmd.base_id,
            events: cmd.events.clone(),
            out,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_flow(
        &self,
        cmd: &RecordFlow,
        direction: FlowDirection,
    ) -> Result<Vec<TrackingEvent>, DomainError> {
        self.ensure_in_progress()?;
        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if !self.went_out(&cmd.key) {
            return Err(DomainError::validation(format!(
                "{} was not distributed by this group",
                cmd.key
            )));
        }
        if self.entries.iter().any(|e| e.id == cmd.entry_id) {
            return Err(DomainError::validation(format!(
                "tracking entry {} already exists",
                cmd.entry_id
            )));
        }
        let target_box = match (direction, &cmd.target_box) {
            (FlowDirection::BackToBox, None) => {
                return Err(DomainError::validation("moving to a box needs a target box"));
            }
            (FlowDirection::BackToBox, Some(label)) => Some(label.clone()),
            _ => None,
        };
        Ok(vec![TrackingEvent::FlowRecorded(FlowRecorded {
            group_id: self.id,
            entry: TrackingEntry {
                id: cmd.entry_id,
                key: cmd.key.clone(),
                quantity: cmd.quantity,
                direction,
                target_box,
                actor: cmd.actor,
                at: cmd.occurred_at,
            },
        })])
    }

    fn handle_complete(&self, cmd: &CompleteGroup) -> Result<Vec<TrackingEvent>, DomainError> {
        self.ensure_in_progress()?;
        let totals = self.totals();
        let distributed = net_distributed(&totals)?;
        let returned = totals
            .iter()
            .filter(|(_, t)| t.returned > 0)
            .map(|(key, t)| KeyedQuantity {
                key: key.clone(),
                quantity: t.returned,
            })
            .collect();
        Ok(vec![TrackingEvent::Completed(TrackingGroupCompleted {
            group_id: self.id,
            base_id: self.base_id,
            events: self.events.clone(),
            distributed,
            returned,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}
