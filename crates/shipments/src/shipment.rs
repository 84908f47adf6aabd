use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use boxflow_core::{
    Aggregate, AggregateRoot, AuditTrail, BaseId, BoxLabel, DomainError, LocationId,
    ShipmentDetailId, ShipmentId, StockKey, TransferAgreementId, UserId,
};
use boxflow_events::Event;

/// Shipment lifecycle. `Completed`, `Lost` and `Canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShipmentState {
    Preparing,
    Sent,
    Receiving,
    Completed,
    Lost,
    Canceled,
}

impl ShipmentState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ShipmentState::Completed | ShipmentState::Lost | ShipmentState::Canceled
        )
    }
}

/// Product, size, location and quantity as declared by one side of a shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailSide {
    pub key: StockKey,
    pub location: LocationId,
    pub quantity: u64,
}

/// Audited steps of a shipment detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailTransition {
    Added,
    Removed,
    Received,
    Lost,
    NotDelivered,
}

/// One box inside a shipment. Never deleted, only marked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentDetail {
    id: ShipmentDetailId,
    box_label: BoxLabel,
    source: DetailSide,
    target: Option<DetailSide>,
    history: AuditTrail<DetailTransition>,
}

impl ShipmentDetail {
    pub fn id(&self) -> ShipmentDetailId {
        self.id
    }

    pub fn box_label(&self) -> &BoxLabel {
        &self.box_label
    }

    pub fn source(&self) -> &DetailSide {
        &self.source
    }

    /// What the receiving side booked, once received.
    pub fn target(&self) -> Option<&DetailSide> {
        self.target.as_ref()
    }

    pub fn history(&self) -> &AuditTrail<DetailTransition> {
        &self.history
    }

    /// Latest audited step.
    pub fn status(&self) -> DetailTransition {
        self.history
            .latest()
            .map(|t| t.kind)
            .unwrap_or(DetailTransition::Added)
    }

    pub fn is_removed(&self) -> bool {
        self.status() == DetailTransition::Removed
    }

    /// Still travelling with the shipment and not yet reconciled.
    pub fn is_active(&self) -> bool {
        self.status() == DetailTransition::Added
    }

    pub fn is_resolved(&self) -> bool {
        matches!(
            self.status(),
            DetailTransition::Received | DetailTransition::Lost
        )
    }
}

/// Aggregate root: Shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    id: ShipmentId,
    source_base: BaseId,
    target_base: BaseId,
    agreement: Option<TransferAgreementId>,
    state: ShipmentState,
    details: Vec<ShipmentDetail>,
    history: AuditTrail<ShipmentState>,
    created: bool,
    version: u64,
}

impl Shipment {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: ShipmentId) -> Self {
        Self {
            id,
            source_base: BaseId::from_uuid(Default::default()),
            target_base: BaseId::from_uuid(Default::default()),
            agreement: None,
            state: ShipmentState::Preparing,
            details: Vec::new(),
            history: AuditTrail::new(),
            created: false,
            version: 0,
        }
    }

    pub fn source_base(&self) -> BaseId {
        self.source_base
    }

    pub fn target_base(&self) -> BaseId {
        self.target_base
    }

    pub fn agreement(&self) -> Option<TransferAgreementId> {
        self.agreement
    }

    pub fn state(&self) -> ShipmentState {
        self.state
    }

    pub fn details(&self) -> &[ShipmentDetail] {
        &self.details
    }

    pub fn history(&self) -> &AuditTrail<ShipmentState> {
        &self.history
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// The detail currently carrying `label`, skipping removed ones.
    pub fn detail_for(&self, label: &BoxLabel) -> Option<&ShipmentDetail> {
        self.details
            .iter()
            .rev()
            .find(|d| &d.box_label == label && !d.is_removed())
    }

    /// Labels of details in the given status.
    pub fn labels_with(&self, status: DetailTransition) -> Vec<BoxLabel> {
        self.details
            .iter()
            .filter(|d| d.status() == status)
            .map(|d| d.box_label.clone())
            .collect()
    }

    /// Every non-removed detail is received or lost.
    pub fn all_details_resolved(&self) -> bool {
        self.details
            .iter()
            .filter(|d| !d.is_removed())
            .all(ShipmentDetail::is_resolved)
    }
}

impl AggregateRoot for Shipment {
    type Id = ShipmentId;

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

/// Command: CreateShipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateShipment {
    pub shipment_id: ShipmentId,
    pub source_base: BaseId,
    pub target_base: BaseId,
    pub agreement: Option<TransferAgreementId>,
    /// Whether the target base belongs to another organisation.
    pub cross_organisation: bool,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddBox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddBox {
    pub shipment_id: ShipmentId,
    pub detail_id: ShipmentDetailId,
    pub box_label: BoxLabel,
    pub source: DetailSide,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveBox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveBox {
    pub shipment_id: ShipmentId,
    pub box_label: BoxLabel,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Reconciliation outcome for one box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Reconciliation {
    Received(DetailSide),
    Lost,
}

/// Command: ReconcileDetail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileDetail {
    pub shipment_id: ShipmentId,
    pub box_label: BoxLabel,
    pub reconciliation: Reconciliation,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Commands that only carry the shipment and the audit stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentTransition {
    pub shipment_id: ShipmentId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShipmentCommand {
    Create(CreateShipment),
    AddBox(AddBox),
    RemoveBox(RemoveBox),
    Send(ShipmentTransition),
    Cancel(ShipmentTransition),
    StartReceiving(ShipmentTransition),
    MarkLost(ShipmentTransition),
    Reconcile(ReconcileDetail),
    MoveNotDeliveredBack(ShipmentTransition),
}

impl ShipmentCommand {
    pub fn shipment_id(&self) -> ShipmentId {
        match self {
            ShipmentCommand::Create(c) => c.shipment_id,
            ShipmentCommand::AddBox(c) => c.shipment_id,
            ShipmentCommand::RemoveBox(c) => c.shipment_id,
            ShipmentCommand::Reconcile(c) => c.shipment_id,
            ShipmentCommand::Send(c)
            | ShipmentCommand::Cancel(c)
            | ShipmentCommand::StartReceiving(c)
            | ShipmentCommand::MarkLost(c)
            | ShipmentCommand::MoveNotDeliveredBack(c) => c.shipment_id,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Event: ShipmentCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentCreated {
    pub shipment_id: ShipmentId,
    pub source_base: BaseId,
    pub target_base: BaseId,
    pub agreement: Option<TransferAgreementId>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BoxAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxAdded {
    pub shipment_id: ShipmentId,
    pub detail_id: ShipmentDetailId,
    pub box_label: BoxLabel,
    pub source: DetailSide,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BoxRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxRemoved {
    pub shipment_id: ShipmentId,
    pub box_label: BoxLabel,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// A whole-shipment step and the boxes it moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxesMoved {
    pub shipment_id: ShipmentId,
    pub boxes: Vec<BoxLabel>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DetailReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailReceived {
    pub shipment_id: ShipmentId,
    pub box_label: BoxLabel,
    pub target: DetailSide,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DetailLost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailLost {
    pub shipment_id: ShipmentId,
    pub box_label: BoxLabel,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShipmentCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentCompleted {
    pub shipment_id: ShipmentId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShipmentEvent {
    Created(ShipmentCreated),
    BoxAdded(BoxAdded),
    BoxRemoved(BoxRemoved),
    Sent(BoxesMoved),
    Canceled(BoxesMoved),
    ReceivingStarted(BoxesMoved),
    MarkedLost(BoxesMoved),
    DetailReceived(DetailReceived),
    DetailLost(DetailLost),
    Completed(ShipmentCompleted),
    NotDeliveredMovedBack(BoxesMoved),
}

impl Event for ShipmentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ShipmentEvent::Created(_) => "shipment.created",
            ShipmentEvent::BoxAdded(_) => "shipment.box_added",
            ShipmentEvent::BoxRemoved(_) => "shipment.box_removed",
            ShipmentEvent::Sent(_) => "shipment.sent",
            ShipmentEvent::Canceled(_) => "shipment.canceled",
            ShipmentEvent::ReceivingStarted(_) => "shipment.receiving_started",
            ShipmentEvent::MarkedLost(_) => "shipment.marked_lost",
            ShipmentEvent::DetailReceived(_) => "shipment.detail_received",
            ShipmentEvent::DetailLost(_) => "shipment.detail_lost",
            ShipmentEvent::Completed(_) => "shipment.completed",
            ShipmentEvent::NotDeliveredMovedBack(_) => "shipment.not_delivered_moved_back",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ShipmentEvent::Created(e) => e.occurred_at,
            ShipmentEvent::BoxAdded(e) => e.occurred_at,
            ShipmentEvent::BoxRemoved(e) => e.occurred_at,
            ShipmentEvent::DetailReceived(e) => e.occurred_at,
            ShipmentEvent::DetailLost(e) => e.occurred_at,
            ShipmentEvent::Completed(e) => e.occurred_at,
            ShipmentEvent::Sent(e)
            | ShipmentEvent::Canceled(e)
            | ShipmentEvent::ReceivingStarted(e)
            | ShipmentEvent::MarkedLost(e)
            | ShipmentEvent::NotDeliveredMovedBack(e) => e.occurred_at,
        }
    }

    fn actor(&self) -> UserId {
        match self {
            ShipmentEvent::Created(e) => e.actor,
            ShipmentEvent::BoxAdded(e) => e.actor,
            ShipmentEvent::BoxRemoved(e) => e.actor,
            ShipmentEvent::DetailReceived(e) => e.actor,
            ShipmentEvent::DetailLost(e) => e.actor,
            ShipmentEvent::Completed(e) => e.actor,
            ShipmentEvent::Sent(e)
            | ShipmentEvent::Canceled(e)
            | ShipmentEvent::ReceivingStarted(e)
            | ShipmentEvent::MarkedLost(e)
            | ShipmentEvent::NotDeliveredMovedBack(e) => e.actor,
        }
    }
}

impl Aggregate for Shipment {
    type Command = ShipmentCommand;
    type Event = ShipmentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ShipmentEvent::Created(e) => {
                self.id = e.shipment_id;
                self.source_base = e.source_base;
                self.target_base = e.target_base;
                self.agreement = e.agreement;
                self.state = ShipmentState::Preparing;
                self.created = true;
                self.history
                    .record(e.actor, e.occurred_at, ShipmentState::Preparing);
            }
            ShipmentEvent::BoxAdded(e) => {
                let mut history = AuditTrail::new();
                history.record(e.actor, e.occurred_at, DetailTransition::Added);
                self.details.push(ShipmentDetail {
                    id: e.detail_id,
                    box_label: e.box_label.clone(),
                    source: e.source.clone(),
                    target: None,
                    history,
                });
            }
            ShipmentEvent::BoxRemoved(e) => {
                self.mark(&e.box_label, e.actor, e.occurred_at, DetailTransition::Removed);
            }
            ShipmentEvent::Sent(e) => {
                self.transition(ShipmentState::Sent, e.actor, e.occurred_at);
            }
            ShipmentEvent::Canceled(e) => {
                for label in &e.boxes {
                    self.mark(label, e.actor, e.occurred_at, DetailTransition::Removed);
                }
                self.transition(ShipmentState::Canceled, e.actor, e.occurred_at);
            }
            ShipmentEvent::ReceivingStarted(e) => {
                self.transition(ShipmentState::Receiving, e.actor, e.occurred_at);
            }
            ShipmentEvent::MarkedLost(e) => {
                for label in &e.boxes {
                    self.mark(label, e.actor, e.occurred_at, DetailTransition::NotDelivered);
                }
                self.transition(ShipmentState::Lost, e.actor, e.occurred_at);
            }
            ShipmentEvent::DetailReceived(e) => {
                if let Some(d) = self.detail_mut(&e.box_label) {
                    d.target = Some(e.target.clone());
                    d.history
                        .record(e.actor, e.occurred_at, DetailTransition::Received);
                }
            }
            ShipmentEvent::DetailLost(e) => {
                self.mark(&e.box_label, e.actor, e.occurred_at, DetailTransition::Lost);
            }
            ShipmentEvent::Completed(e) => {
                self.transition(ShipmentState::Completed, e.actor, e.occurred_at);
            }
            ShipmentEvent::NotDeliveredMovedBack(e) => {
                for label in &e.boxes {
                    self.mark(label, e.actor, e.occurred_at, DetailTransition::Removed);
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if self.id != command.shipment_id() {
            return Err(DomainError::validation("shipment_id mismatch"));
        }
        match command {
            ShipmentCommand::Create(cmd) => self.handle_create(cmd),
            ShipmentCommand::AddBox(cmd) => self.handle_add_box(cmd),
            ShipmentCommand::RemoveBox(cmd) => self.handle_remove_box(cmd),
            ShipmentCommand::Send(cmd) => self.handle_send(cmd),
            ShipmentCommand::Cancel(cmd) => self.handle_cancel(cmd),
            ShipmentCommand::StartReceiving(cmd) => self.handle_start_receiving(cmd),
            ShipmentCommand::MarkLost(cmd) => self.handle_mark_lost(cmd),
            ShipmentCommand::Reconcile(cmd) => self.handle_reconcile(cmd),
            ShipmentCommand::MoveNotDeliveredBack(cmd) => self.handle_move_back(cmd),
        }
    }
}

impl Shipment {
    fn transition(&mut self, to: ShipmentState, actor: UserId, at: DateTime<Utc>) {
        self.state = to;
        self.history.record(actor, at, to);
    }

    fn detail_mut(&mut self, label: &BoxLabel) -> Option<&mut ShipmentDetail> {
        self.details
            .iter_mut()
            .rev()
            .find(|d| &d.box_label == label && !d.is_removed())
    }

    fn mark(&mut self, label: &BoxLabel, actor: UserId, at: DateTime<Utc>, kind: DetailTransition) {
        if let Some(d) = self.detail_mut(label) {
            d.history.record(actor, at, kind);
        }
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("shipment {}", self.id)));
        }
        Ok(())
    }

    fn ensure_state(&self, allowed: &[ShipmentState], action: &str) -> Result<(), DomainError> {
        self.ensure_created()?;
        if !allowed.contains(&self.state) {
            return Err(DomainError::invalid_transition(format!(
                "cannot {action} a shipment in state {:?}",
                self.state
            )));
        }
        Ok(())
    }

    fn active_detail(&self, label: &BoxLabel) -> Result<&ShipmentDetail, DomainError> {
        self.detail_for(label)
            .filter(|d| d.is_active())
            .ok_or_else(|| {
                DomainError::not_found(format!("box {label} in shipment {}", self.id))
            })
    }

    fn moved(&self, boxes: Vec<BoxLabel>, actor: UserId, occurred_at: DateTime<Utc>) -> BoxesMoved {
        BoxesMoved {
            shipment_id: self.id,
            boxes,
            actor,
            occurred_at,
        }
    }

    fn handle_create(&self, cmd: &CreateShipment) -> Result<Vec<ShipmentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::validation(format!(
                "shipment {} already exists",
                self.id
            )));
        }
        if cmd.source_base == cmd.target_base {
            return Err(DomainError::validation(
                "source and target base must differ",
            ));
        }
        if cmd.cross_organisation && cmd.agreement.is_none() {
            return Err(DomainError::validation(
                "a shipment to another organisation requires a transfer agreement",
            ));
        }
        Ok(vec![ShipmentEvent::Created(ShipmentCreated {
            shipment_id: cmd.shipment_id,
            source_base: cmd.source_base,
            target_base: cmd.target_base,
            agreement: cmd.agreement,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_box(&self, cmd: &AddBox) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.ensure_state(&[ShipmentState::Preparing], "add a box to")?;
        if self.detail_for(&cmd.box_label).is_some() {
            return Err(DomainError::validation(format!(
                "box {} is already in shipment {}",
                cmd.box_label, self.id
            )));
        }
        if self.details.iter().any(|d| d.id == cmd.detail_id) {
            return Err(DomainError::validation(format!(
                "detail {} already exists",
                cmd.detail_id
            )));
        }
        Ok(vec![ShipmentEvent::BoxAdded(BoxAdded {
            shipment_id: self.id,
            detail_id: cmd.detail_id,
            box_label: cmd.box_label.clone(),
            source: cmd.source.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_box(&self, cmd: &RemoveBox) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.ensure_state(&[ShipmentState::Preparing], "remove a box from")?;
        self.active_detail(&cmd.box_label)?;
        Ok(vec![ShipmentEvent::BoxRemoved(BoxRemoved {
            shipment_id: self.id,
            box_label: cmd.box_label.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_send(&self, cmd: &ShipmentTransition) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.ensure_state(&[ShipmentState::Preparing], "send")?;
        let boxes = self.labels_with(DetailTransition::Added);
        if boxes.is_empty() {
            return Err(DomainError::validation("cannot send an empty shipment"));
        }
        Ok(vec![ShipmentEvent::Sent(self.moved(
            boxes,
            cmd.actor,
            cmd.occurred_at,
        ))])
    }

    fn handle_cancel(&self, cmd: &ShipmentTransition) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.ensure_state(&[ShipmentState::Preparing], "cancel")?;
        let boxes = self.labels_with(DetailTransition::Added);
        Ok(vec![ShipmentEvent::Canceled(self.moved(
            boxes,
            cmd.actor,
            cmd.occurred_at,
        ))])
    }

    fn handle_start_receiving(
        &self,
        cmd: &ShipmentTransition,
    ) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.ensure_state(&[ShipmentState::Sent], "start receiving")?;
        let boxes = self.labels_with(DetailTransition::Added);
        Ok(vec![ShipmentEvent::ReceivingStarted(self.moved(
            boxes,
            cmd.actor,
            cmd.occurred_at,
        ))])
    }

    fn handle_mark_lost(&self, cmd: &ShipmentTransition) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.ensure_state(&[ShipmentState::Sent], "mark lost")?;
        let boxes = self.labels_with(DetailTransition::Added);
        Ok(vec![ShipmentEvent::MarkedLost(self.moved(
            boxes,
            cmd.actor,
            cmd.occurred_at,
        ))])
    }

    fn handle_reconcile(&self, cmd: &ReconcileDetail) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.ensure_state(&[ShipmentState::Receiving], "reconcile")?;
        let detail = self.active_detail(&cmd.box_label)?;

        let reconciled = match &cmd.reconciliation {
            Reconciliation::Received(target) => {
                if target.quantity > detail.source.quantity {
                    return Err(DomainError::insufficient(
                        target.quantity,
                        detail.source.quantity,
                    ));
                }
                ShipmentEvent::DetailReceived(DetailReceived {
                    shipment_id: self.id,
                    box_label: cmd.box_label.clone(),
                    target: target.clone(),
                    actor: cmd.actor,
                    occurred_at: cmd.occurred_at,
                })
            }
            Reconciliation::Lost => ShipmentEvent::DetailLost(DetailLost {
                shipment_id: self.id,
                box_label: cmd.box_label.clone(),
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            }),
        };

        // Decided on the same snapshot as the reconciliation itself, so only the
        // last reconciliation ever sees no remaining active detail.
        let last_remaining = self
            .details
            .iter()
            .filter(|d| d.is_active())
            .all(|d| d.box_label == cmd.box_label);

        let mut events = vec![reconciled];
        if last_remaining {
            events.push(ShipmentEvent::Completed(ShipmentCompleted {
                shipment_id: self.id,
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            }));
        }
        Ok(events)
    }

    fn handle_move_back(&self, cmd: &ShipmentTransition) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.ensure_state(
            &[ShipmentState::Sent, ShipmentState::Lost],
            "move not-delivered boxes back for",
        )?;
        let boxes = self.labels_with(DetailTransition::NotDelivered);
        if boxes.is_empty() {
            return Err(DomainError::validation(format!(
                "shipment {} has no not-delivered boxes",
                self.id
            )));
        }
        Ok(vec![ShipmentEvent::NotDeliveredMovedBack(self.moved(
            boxes,
            cmd.actor,
            cmd.occurred_at,
        ))])
    }
}
