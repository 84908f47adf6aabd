use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use boxflow_core::{
    Aggregate, AggregateRoot, AuditTrail, BaseId, DistributionEventId, DomainError,
    LocationId, PackingListEntryId, StockKey, TrackingGroupId, UserId,
};
use boxflow_events::Event;
use boxflow_ledger::CollectionRef;

/// Distribution event lifecycle. Only `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DistributionEventState {
    Planning,
    Packing,
    OnDistro,
    ReturnedFromDistribution,
    ReturnTrackingInProgress,
    Completed,
}

impl DistributionEventState {
    /// The state a plain `AdvanceState` command may move to from here.
    ///
    /// Return tracking is entered and left only through a tracking group.
    pub fn next_manual(self) -> Option<Self> {
        match self {
            Self::Planning => Some(Self::Packing),
            Self::Packing => Some(Self::OnDistro),
            Self::OnDistro => Some(Self::ReturnedFromDistribution),
            Self::ReturnedFromDistribution | Self::ReturnTrackingInProgress | Self::Completed => None,
        }
    }

    pub fn is_assignment_open(self) -> bool {
        matches!(self, Self::Planning | Self::Packing)
    }
}

/// Target quantity of one product/size for an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackingListEntry {
    pub id: PackingListEntryId,
    pub key: StockKey,
    pub target: u64,
}

/// Aggregate root: DistributionEvent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionEvent {
    id: DistributionEventId,
    base_id: BaseId,
    name: String,
    spot: LocationId,
    planned_start: DateTime<Utc>,
    planned_end: DateTime<Utc>,
    state: DistributionEventState,
    packing_list: Vec<PackingListEntry>,
    assigned: BTreeSet<CollectionRef>,
    tracking_group: Option<TrackingGroupId>,
    history: AuditTrail<DistributionEventState>,
    created: bool,
    version: u64,
}

impl DistributionEvent {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: DistributionEventId) -> Self {
        Self {
            id,
            base_id: BaseId::from_uuid(Default::default()),
            name: String::new(),
            spot: LocationId::from_uuid(Default::default()),
            planned_start: DateTime::<Utc>::MIN_UTC,
            planned_end: DateTime::<Utc>::MIN_UTC,
            state: DistributionEventState::Planning,
            packing_list: Vec::new(),
            assigned: BTreeSet::new(),
            tracking_group: None,
            history: AuditTrail::new(),
            created: false,
            version: 0,
        }
    }

    pub fn base_id(&self) -> BaseId {
        self.base_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spot(&self) -> LocationId {
        self.spot
    }

    pub fn planned_start(&self) -> DateTime<Utc> {
        self.planned_start
    }

    pub fn planned_end(&self) -> DateTime<Utc> {
        self.planned_end
    }

    pub fn state(&self) -> DistributionEventState {
        self.state
    }

    /// Packing list in insertion order.
    pub fn packing_list(&self) -> &[PackingListEntry] {
        &self.packing_list
    }

    pub fn assigned(&self) -> &BTreeSet<CollectionRef> {
        &self.assigned
    }

    pub fn tracking_group(&self) -> Option<TrackingGroupId> {
        self.tracking_group
    }

    pub fn history(&self) -> &AuditTrail<DistributionEventState> {
        &self.history
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for DistributionEvent {
    type Id = DistributionEventId;

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

/// Command: CreateDistributionEvent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDistributionEvent {
    pub event_id: DistributionEventId,
    pub base_id: BaseId,
    pub name: String,
    pub spot: LocationId,
    pub planned_start: DateTime<Utc>,
    pub planned_end: DateTime<Utc>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddPackingListEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddPackingListEntry {
    pub event_id: DistributionEventId,
    pub entry_id: PackingListEntryId,
    pub key: StockKey,
    pub target: u64,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdatePackingListEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePackingListEntry {
    pub event_id: DistributionEventId,
    pub entry_id: PackingListEntryId,
    pub target: u64,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemovePackingListEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovePackingListEntry {
    pub event_id: DistributionEventId,
    pub entry_id: PackingListEntryId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AssignCollection.
///
/// With `split_from` set, `quantity` units are split off that collection into a
/// new unboxed collection identified by `collection`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignCollection {
    pub event_id: DistributionEventId,
    pub collection: CollectionRef,
    pub key: StockKey,
    pub quantity: u64,
    pub split_from: Option<CollectionRef>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UnassignCollection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnassignCollection {
    pub event_id: DistributionEventId,
    pub collection: CollectionRef,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdvanceState.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceState {
    pub event_id: DistributionEventId,
    pub to: DistributionEventState,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Commands issued by a tracking group on each of its events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnTrackingStep {
    pub event_id: DistributionEventId,
    pub group_id: TrackingGroupId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionCommand {
    Create(CreateDistributionEvent),
    AddPackingListEntry(AddPackingListEntry),
    UpdatePackingListEntry(UpdatePackingListEntry),
    RemovePackingListEntry(RemovePackingListEntry),
    Assign(AssignCollection),
    Unassign(UnassignCollection),
    Advance(AdvanceState),
    StartReturnTracking(ReturnTrackingStep),
    CompleteReturnTracking(ReturnTrackingStep),
}

impl DistributionCommand {
    pub fn event_id(&self) -> DistributionEventId {
        match self {
            DistributionCommand::Create(c) => c.event_id,
            DistributionCommand::AddPackingListEntry(c) => c.event_id,
            DistributionCommand::UpdatePackingListEntry(c) => c.event_id,
            DistributionCommand::RemovePackingListEntry(c) => c.event_id,
            DistributionCommand::Assign(c) => c.event_id,
            DistributionCommand::Unassign(c) => c.event_id,
            DistributionCommand::Advance(c) => c.event_id,
            DistributionCommand::StartReturnTracking(c)
            | DistributionCommand::CompleteReturnTracking(c) => c.event_id,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Event: DistributionEventCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionEventCreated {
    pub event_id: DistributionEventId,
    pub base_id: BaseId,
    pub name: String,
    pub spot: LocationId,
    pub planned_start: DateTime<Utc>,
    pub planned_end: DateTime<Utc>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PackingListEntryAdded / PackingListEntryUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackingListEntrySet {
    pub event_id: DistributionEventId,
    pub entry: PackingListEntry,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PackingListEntryRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackingListEntryRemoved {
    pub event_id: DistributionEventId,
    pub entry_id: PackingListEntryId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CollectionAssigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionAssigned {
    pub event_id: DistributionEventId,
    pub collection: CollectionRef,
    pub key: StockKey,
    pub quantity: u64,
    pub split_from: Option<CollectionRef>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CollectionUnassigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionUnassigned {
    pub event_id: DistributionEventId,
    pub collection: CollectionRef,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StateAdvanced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateAdvanced {
    pub event_id: DistributionEventId,
    pub from: DistributionEventState,
    pub to: DistributionEventState,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnTrackingStarted / ReturnTrackingCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnTrackingChanged {
    pub event_id: DistributionEventId,
    pub group_id: TrackingGroupId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionEventEvent {
    Created(DistributionEventCreated),
    PackingListEntryAdded(PackingListEntrySet),
    PackingListEntryUpdated(PackingListEntrySet),
    PackingListEntryRemoved(PackingListEntryRemoved),
    CollectionAssigned(CollectionAssigned),
    CollectionUnassigned(CollectionUnassigned),
    StateAdvanced(StateAdvanced),
    ReturnTrackingStarted(ReturnTrackingChanged),
    Completed(ReturnTrackingChanged),
}

impl DistributionEventEvent {
    pub fn event_id(&self) -> DistributionEventId {
        match self {
            Self::Created(e) => e.event_id,
            Self::PackingListEntryAdded(e) | Self::PackingListEntryUpdated(e) => e.event_id,
            Self::PackingListEntryRemoved(e) => e.event_id,
            Self::CollectionAssigned(e) => e.event_id,
            Self::CollectionUnassigned(e) => e.event_id,
            Self::StateAdvanced(e) => e.event_id,
            Self::ReturnTrackingStarted(e) | Self::Completed(e) => e.event_id,
        }
    }
}

impl Event for DistributionEventEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Created(_) => "distribution_event.created",
            Self::PackingListEntryAdded(_) => "distribution_event.packing_list_entry_added",
            Self::PackingListEntryUpdated(_) => "distribution_event.packing_list_entry_updated",
            Self::PackingListEntryRemoved(_) => "distribution_event.packing_list_entry_removed",
            Self::CollectionAssigned(_) => "distribution_event.collection_assigned",
            Self::CollectionUnassigned(_) => "distribution_event.collection_unassigned",
            Self::StateAdvanced(_) => "distribution_event.state_advanced",
            Self::ReturnTrackingStarted(_) => "distribution_event.return_tracking_started",
            Self::Completed(_) => "distribution_event.completed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::Created(e) => e.occurred_at,
            Self::PackingListEntryAdded(e) | Self::PackingListEntryUpdated(e) => e.occurred_at,
            Self::PackingListEntryRemoved(e) => e.occurred_at,
            Self::CollectionAssigned(e) => e.occurred_at,
            Self::CollectionUnassigned(e) => e.occurred_at,
            Self::StateAdvanced(e) => e.occurred_at,
            Self::ReturnTrackingStarted(e) | Self::Completed(e) => e.occurred_at,
        }
    }

    fn actor(&self) -> UserId {
        match self {
            Self::Created(e) => e.actor,
            Self::PackingListEntryAdded(e) | Self::PackingListEntryUpdated(e) => e.actor,
            Self::PackingListEntryRemoved(e) => e.actor,
            Self::CollectionAssigned(e) => e.actor,
            Self::CollectionUnassigned(e) => e.actor,
            Self::StateAdvanced(e) => e.actor,
            Self::ReturnTrackingStarted(e) | Self::Completed(e) => e.actor,
        }
    }
}

impl Aggregate for DistributionEvent {
    type Command = DistributionCommand;
    type Event = DistributionEventEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DistributionEventEvent::Created(e) => {
                self.id = e.event_id;
                self.base_id = e.base_id;
                self.name = e.name.clone();
                self.spot = e.spot;
                self.planned_start = e.planned_start;
                self.planned_end = e.planned_end;
                self.state = DistributionEventState::Planning;
                self.created = true;
                self.history
                    .record(e.actor, e.occurred_at, DistributionEventState::Planning);
            }
            DistributionEventEvent::PackingListEntryAdded(e) => {
                self.packing_list.push(e.entry.clone());
            }
            DistributionEventEvent::PackingListEntryUpdated(e) => {
                if let Some(entry) = self.packing_list.iter_mut().find(|x| x.id == e.entry.id) {
                    entry.target = e.entry.target;
                }
            }
            DistributionEventEvent::PackingListEntryRemoved(e) => {
                self.packing_list.retain(|x| x.id != e.entry_id);
            }
            DistributionEventEvent::CollectionAssigned(e) => {
                self.assigned.insert(e.collection.clone());
            }
            DistributionEventEvent::CollectionUnassigned(e) => {
                self.assigned.remove(&e.collection);
            }
            DistributionEventEvent::StateAdvanced(e) => {
                self.state = e.to;
                self.history.record(e.actor, e.occurred_at, e.to);
            }
            DistributionEventEvent::ReturnTrackingStarted(e) => {
                self.state = DistributionEventState::ReturnTrackingInProgress;
                self.tracking_group = Some(e.group_id);
                self.history.record(
                    e.actor,
                    e.occurred_at,
                    DistributionEventState::ReturnTrackingInProgress,
                );
            }
            DistributionEventEvent::Completed(e) => {
                self.state = DistributionEventState::Completed;
                self.history
                    .record(e.actor, e.occurred_at, DistributionEventState::Completed);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if self.id != command.event_id() {
            return Err(DomainError::validation("event_id mismatch"));
        }
        match command {
            DistributionCommand::Create(cmd) => self.handle_create(cmd),
            DistributionCommand::AddPackingListEntry(cmd) => self.handle_add_entry(cmd),
            DistributionCommand::UpdatePackingListEntry(cmd) => self.handle_update_entry(cmd),
            DistributionCommand::RemovePackingListEntry(cmd) => self.handle_remove_entry(cmd),
            DistributionCommand::Assign(cmd) => self.handle_assign(cmd),
            DistributionCommand::Unassign(cmd) => self.handle_unassign(cmd),
            DistributionCommand::Advance(cmd) => self.handle_advance(cmd),
            DistributionCommand::StartReturnTracking(cmd) => self.handle_start_tracking(cmd),
            DistributionCommand::CompleteReturnTracking(cmd) => self.handle_complete(cmd),
        }
    }
}

impl DistributionEvent {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!(
                "distribution event {}",
                self.id
            )));
        }
        Ok(())
    }

    fn ensure_state(
        &self,
        allowed: &[DistributionEventState],
        action: &str,
    ) -> Result<(), DomainError> {
        self.ensure_created()?;
        if !allowed.contains(&self.state) {
            return Err(DomainError::invalid_transition(format!(
                "cannot {action} in state {:?}",
                self.state
            )));
        }
        Ok(())
    }

    /// Assignment is frozen once the event leaves Packing.
    pub fn ensure_assignment_open(&self) -> Result<(), DomainError> {
        self.ensure_created()?;
        if !self.state.is_assignment_open() {
            return Err(DomainError::invalid_transition(format!(
                "assignment is frozen in state {:?}",
                self.state
            )));
        }
        Ok(())
    }

    fn entry(&self, id: PackingListEntryId) -> Result<&PackingListEntry, DomainError> {
        self.packing_list
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| DomainError::not_found(format!("packing list entry {id}")))
    }

    fn handle_create(
        &self,
        cmd: &CreateDistributionEvent,
    ) -> Result<Vec<DistributionEventEvent>, DomainError> {
        if self.created {
            return Err(DomainError::validation(format!(
                "distribution event {} already exists",
                self.id
            )));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.planned_end < cmd.planned_start {
            return Err(DomainError::validation(
                "planned end cannot be before planned start",
            ));
        }
        Ok(vec![DistributionEventEvent::Created(DistributionEventCreated {
            event_id: cmd.event_id,
            base_id: cmd.base_id,
            name: cmd.name.trim().to_string(),
            spot: cmd.spot,
            planned_start: cmd.planned_start,
            planned_end: cmd.planned_end,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_entry(
        &self,
        cmd: &AddPackingListEntry,
    ) -> Result<Vec<DistributionEventEvent>, DomainError> {
        self.ensure_state(
            &[DistributionEventState::Planning, DistributionEventState::Packing],
            "add a packing list entry",
        )?;
        if cmd.target == 0 {
            return Err(DomainError::validation("target quantity must be positive"));
        }
        if self.packing_list.iter().any(|e| e.id == cmd.entry_id) {
            return Err(DomainError::validation(format!(
                "packing list entry {} already exists",
                cmd.entry_id
            )));
        }
        if self.packing_list.iter().any(|e| e.key == cmd.key) {
            return Err(DomainError::validation(format!(
                "packing list already has an entry for {}",
                cmd.key
            )));
        }
        Ok(vec![DistributionEventEvent::PackingListEntryAdded(
            PackingListEntrySet {
                event_id: self.id,
                entry: PackingListEntry {
                    id: cmd.entry_id,
                    key: cmd.key.clone(),
                    target: cmd.target,
                },
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_update_entry(
        &self,
        cmd: &UpdatePackingListEntry,
    ) -> Result<Vec<DistributionEventEvent>, DomainError> {
        self.ensure_state(
            &[DistributionEventState::Planning, DistributionEventState::Packing],
            "update a packing list entry",
        )?;
        if cmd.target == 0 {
            return Err(DomainError::validation("target quantity must be positive"));
        }
        let entry = self.entry(cmd.entry_id)?;
        Ok(vec![DistributionEventEvent::PackingListEntryUpdated(
            PackingListEntrySet {
                event_id: self.id,
                entry: PackingListEntry {
                    target: cmd.target,
                    ..entry.clone()
                },
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_remove_entry(
        &self,
        cmd: &RemovePackingListEntry,
    ) -> Result<Vec<DistributionEventEvent>, DomainError> {
        self.ensure_state(
            &[DistributionEventState::Planning],
            "remove a packing list entry",
        )?;
        self.entry(cmd.entry_id)?;
        Ok(vec![DistributionEventEvent::PackingListEntryRemoved(
            PackingListEntryRemoved {
                event_id: self.id,
                entry_id: cmd.entry_id,
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_assign(
        &self,
        cmd: &AssignCollection,
    ) -> Result<Vec<DistributionEventEvent>, DomainError> {
        self.ensure_assignment_open()?;
        if cmd.quantity == 0 && cmd.split_from.is_some() {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if self.assigned.contains(&cmd.collection) {
            return Err(DomainError::validation(format!(
                "{} is already assigned to event {}",
                cmd.collection, self.id
            )));
        }
        Ok(vec![DistributionEventEvent::CollectionAssigned(
            CollectionAssigned {
                event_id: self.id,
                collection: cmd.collection.clone(),
                key: cmd.key.clone(),
                quantity: cmd.quantity,
                split_from: cmd.split_from.clone(),
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_unassign(
        &self,
        cmd: &UnassignCollection,
    ) -> Result<Vec<DistributionEventEvent>, DomainError> {
        self.ensure_assignment_open()?;
        if !self.assigned.contains(&cmd.collection) {
            return Err(DomainError::not_found(format!(
                "{} in event {}",
                cmd.collection, self.id
            )));
        }
        Ok(vec![DistributionEventEvent::CollectionUnassigned(
            CollectionUnassigned {
                event_id: self.id,
                collection: cmd.collection.clone(),
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_advance(&self, cmd: &AdvanceState) -> Result<Vec<DistributionEventEvent>, DomainError> {
        self.ensure_created()?;
        match self.state.next_manual() {
            Some(next) if next == cmd.to => Ok(vec![DistributionEventEvent::StateAdvanced(
                StateAdvanced {
                    event_id: self.id,
                    from: self.state,
                    to: cmd.to,
                    actor: cmd.actor,
                    occurred_at: cmd.occurred_at,
                },
            )]),
            _ => Err(DomainError::invalid_transition(format!(
                "cannot advance distribution event from {:?} to {:?}",
                self.state, cmd.to
            ))),
        }
    }

    fn handle_start_tracking(
        &self,
        cmd: &ReturnTrackingStep,
    ) -> Result<Vec<DistributionEventEvent>, DomainError> {
        self.ensure_state(
            &[DistributionEventState::ReturnedFromDistribution],
            "start return tracking",
        )?;
        Ok(vec![DistributionEventEvent::ReturnTrackingStarted(
            ReturnTrackingChanged {
                event_id: self.id,
                group_id: cmd.group_id,
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_complete(
        &self,
        cmd: &ReturnTrackingStep,
    ) -> Result<Vec<DistributionEventEvent>, DomainError> {
        self.ensure_state(
            &[DistributionEventState::ReturnTrackingInProgress],
            "complete",
        )?;
        if self.tracking_group != Some(cmd.group_id) {
            return Err(DomainError::validation(format!(
                "event {} is not tracked by group {}",
                self.id, cmd.group_id
            )));
        }
        Ok(vec![DistributionEventEvent::Completed(ReturnTrackingChanged {
            event_id: self.id,
            group_id: cmd.group_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxflow_core::{ProductId, SizeId};
    use boxflow_events::execute;

    fn created() -> DistributionEvent {
        let id = DistributionEventId::new();
        let mut e = DistributionEvent::empty(id);
        let now = Utc::now();
        execute(
            &mut e,
            &DistributionCommand::Create(CreateDistributionEvent {
                event_id: id,
                base_id: BaseId::new(),
                name: "Camp north".to_string(),
                spot: LocationId::new(),
                planned_start: now,
                planned_end: now + chrono::Duration::hours(4),
                actor: UserId::new(),
                occurred_at: now,
            }),
        )
        .unwrap();
        e
    }

    fn advance(e: &DistributionEvent, to: DistributionEventState) -> DistributionCommand {
        DistributionCommand::Advance(AdvanceState {
            event_id: *e.id(),
            to,
            actor: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    fn add_entry(e: &DistributionEvent, key: StockKey, target: u64) -> DistributionCommand {
        DistributionCommand::AddPackingListEntry(AddPackingListEntry {
            event_id: *e.id(),
            entry_id: PackingListEntryId::new(),
            key,
            target,
            actor: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn lifecycle_advances_one_step_at_a_time() {
        let mut e = created();
        let cmd = advance(&e, DistributionEventState::OnDistro);
        assert!(matches!(
            e.handle(&cmd),
            Err(DomainError::InvalidStateTransition(_))
        ));

        for to in [
            DistributionEventState::Packing,
            DistributionEventState::OnDistro,
            DistributionEventState::ReturnedFromDistribution,
        ] {
            let cmd = advance(&e, to);
            execute(&mut e, &cmd).unwrap();
            assert_eq!(e.state(), to);
        }
        assert_eq!(e.history().len(), 4);
    }

    #[test]
    fn completed_cannot_be_reached_by_advancing() {
        let mut e = created();
        for to in [
            DistributionEventState::Packing,
            DistributionEventState::OnDistro,
            DistributionEventState::ReturnedFromDistribution,
        ] {
            let cmd = advance(&e, to);
            execute(&mut e, &cmd).unwrap();
        }
        for to in [
            DistributionEventState::ReturnTrackingInProgress,
            DistributionEventState::Completed,
        ] {
            assert!(matches!(
                e.handle(&advance(&e, to)),
                Err(DomainError::InvalidStateTransition(_))
            ));
        }
        let complete = DistributionCommand::CompleteReturnTracking(ReturnTrackingStep {
            event_id: *e.id(),
            group_id: TrackingGroupId::new(),
            actor: UserId::new(),
            occurred_at: Utc::now(),
        });
        assert!(e.handle(&complete).is_err());
    }

    #[test]
    fn packing_list_shape_freezes_once_packing() {
        let mut e = created();
        let key = StockKey::sized(ProductId::new(), SizeId::new());
        let cmd = add_entry(&e, key.clone(), 10);
        execute(&mut e, &cmd).unwrap();
        assert!(e.handle(&add_entry(&e, key, 3)).is_err());

        let cmd = advance(&e, DistributionEventState::Packing);
        execute(&mut e, &cmd).unwrap();

        let entry_id = e.packing_list()[0].id;
        let remove = DistributionCommand::RemovePackingListEntry(RemovePackingListEntry {
            event_id: *e.id(),
            entry_id,
            actor: UserId::new(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            e.handle(&remove),
            Err(DomainError::InvalidStateTransition(_))
        ));

        let update = DistributionCommand::UpdatePackingListEntry(UpdatePackingListEntry {
            event_id: *e.id(),
            entry_id,
            target: 12,
            actor: UserId::new(),
            occurred_at: Utc::now(),
        });
        execute(&mut e, &update).unwrap();
        assert_eq!(e.packing_list()[0].target, 12);

        let other = StockKey::sized(ProductId::new(), SizeId::new());
        let cmd = add_entry(&e, other, 2);
        execute(&mut e, &cmd).unwrap();
        assert_eq!(e.packing_list().len(), 2);
    }

    #[test]
    fn assignment_is_frozen_on_distro() {
        let mut e = created();
        for to in [DistributionEventState::Packing, DistributionEventState::OnDistro] {
            let cmd = advance(&e, to);
            execute(&mut e, &cmd).unwrap();
        }
        let assign = DistributionCommand::Assign(AssignCollection {
            event_id: *e.id(),
            collection: CollectionRef::Box(boxflow_core::BoxLabel::new("1").unwrap()),
            key: StockKey::sized(ProductId::new(), SizeId::new()),
            quantity: 3,
            split_from: None,
            actor: UserId::new(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            e.handle(&assign),
            Err(DomainError::InvalidStateTransition(_))
        ));
    }
}
