//! Shipment commands and queries.

use serde_json::{Value as JsonValue, json};

use boxflow_auth::ActorContext;
use boxflow_core::{
    AggregateRoot, BaseId, BoxLabel, DomainResult, ExpectedVersion, ShipmentId,
    TransferAgreementId,
};
use boxflow_events::{EventBus, EventEnvelope};
use boxflow_shipments::{
    CreateShipment, ReconcileDetail, Reconciliation, RemoveBox, Shipment, ShipmentCommand,
    ShipmentEngine, ShipmentTransition, authorize,
};

use super::BoxflowService;
use crate::error::ServiceResult;
use crate::idempotency::{Claim, Fingerprint, IdempotencyKey, IdempotencyScope};
use crate::store::SHIPMENT;
use crate::views::ShipmentView;

fn transition(id: ShipmentId, ctx: &ActorContext) -> ShipmentTransition {
    ShipmentTransition {
        shipment_id: id,
        actor: ctx.actor(),
        occurred_at: ctx.occurred_at(),
    }
}

impl<B> BoxflowService<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Open a shipment from the acting base to `target_base`.
    ///
    /// Both bases must be registered; a target in another organisation needs
    /// a transfer agreement.
    pub fn create_shipment(
        &self,
        ctx: &ActorContext,
        target_base: BaseId,
        agreement: Option<TransferAgreementId>,
    ) -> ServiceResult<ShipmentView> {
        self.command("create_shipment", ctx, |tx| {
            let source_base = ctx.acting_base();
            let cross_organisation = tx.state().organisation_of(source_base)?
                != tx.state().organisation_of(target_base)?;
            let id = ShipmentId::new();
            let mut shipment = Shipment::empty(id);
            let cmd = ShipmentCommand::Create(CreateShipment {
                shipment_id: id,
                source_base,
                target_base,
                agreement,
                cross_organisation,
                actor: ctx.actor(),
                occurred_at: ctx.occurred_at(),
            });
            let events = ShipmentEngine::new(&mut tx.state_mut().ledger)
                .execute(&mut shipment, &cmd, ctx)?;
            tx.record(SHIPMENT, id, 0, &events)?;
            let view = ShipmentView::from(&shipment);
            tx.state_mut().shipments.insert(id, shipment);
            Ok(view)
        })
    }

    pub fn add_box_to_shipment(
        &self,
        ctx: &ActorContext,
        id: ShipmentId,
        label: &BoxLabel,
        expected: ExpectedVersion,
    ) -> ServiceResult<ShipmentView> {
        self.shipment_command("add_box_to_shipment", ctx, id, expected, None, |engine, _| {
            engine.add_box_command(id, label, ctx)
        })
    }

    pub fn remove_box_from_shipment(
        &self,
        ctx: &ActorContext,
        id: ShipmentId,
        label: &BoxLabel,
        expected: ExpectedVersion,
    ) -> ServiceResult<ShipmentView> {
        self.shipment_command("remove_box_from_shipment", ctx, id, expected, None, |_, _| {
            Ok(ShipmentCommand::RemoveBox(RemoveBox {
                shipment_id: id,
                box_label: label.clone(),
                actor: ctx.actor(),
                occurred_at: ctx.occurred_at(),
            }))
        })
    }

    pub fn send_shipment(
        &self,
        ctx: &ActorContext,
        id: ShipmentId,
        expected: ExpectedVersion,
    ) -> ServiceResult<ShipmentView> {
        self.shipment_command("send_shipment", ctx, id, expected, None, |_, _| {
            Ok(ShipmentCommand::Send(transition(id, ctx)))
        })
    }

    pub fn cancel_shipment(
        &self,
        ctx: &ActorContext,
        id: ShipmentId,
        expected: ExpectedVersion,
    ) -> ServiceResult<ShipmentView> {
        self.shipment_command("cancel_shipment", ctx, id, expected, None, |_, _| {
            Ok(ShipmentCommand::Cancel(transition(id, ctx)))
        })
    }

    pub fn start_receiving_shipment(
        &self,
        ctx: &ActorContext,
        id: ShipmentId,
        expected: ExpectedVersion,
    ) -> ServiceResult<ShipmentView> {
        self.shipment_command("start_receiving_shipment", ctx, id, expected, None, |_, _| {
            Ok(ShipmentCommand::StartReceiving(transition(id, ctx)))
        })
    }

    pub fn mark_shipment_lost(
        &self,
        ctx: &ActorContext,
        id: ShipmentId,
        expected: ExpectedVersion,
    ) -> ServiceResult<ShipmentView> {
        self.shipment_command("mark_shipment_lost", ctx, id, expected, None, |_, _| {
            Ok(ShipmentCommand::MarkLost(transition(id, ctx)))
        })
    }

    pub fn move_not_delivered_back(
        &self,
        ctx: &ActorContext,
        id: ShipmentId,
        expected: ExpectedVersion,
    ) -> ServiceResult<ShipmentView> {
        self.shipment_command("move_not_delivered_back", ctx, id, expected, None, |_, _| {
            Ok(ShipmentCommand::MoveNotDeliveredBack(transition(id, ctx)))
        })
    }

    /// Reconcile one box of a receiving shipment as received or lost.
    ///
    /// The last reconciliation completes the shipment in the same transaction.
    pub fn reconcile_shipment_detail(
        &self,
        ctx: &ActorContext,
        id: ShipmentId,
        label: &BoxLabel,
        reconciliation: Reconciliation,
        idempotency_key: Option<IdempotencyKey>,
        expected: ExpectedVersion,
    ) -> ServiceResult<ShipmentView> {
        let claim = match idempotency_key {
            Some(key) => Some((
                key,
                Fingerprint::of(&json!({
                    "op": "reconcile_shipment_detail",
                    "shipment": id,
                    "box": label,
                    "reconciliation": reconciliation,
                }))?,
            )),
            None => None,
        };
        self.shipment_command("reconcile_shipment_detail", ctx, id, expected, claim, |_, _| {
            Ok(ShipmentCommand::Reconcile(ReconcileDetail {
                shipment_id: id,
                box_label: label.clone(),
                reconciliation,
                actor: ctx.actor(),
                occurred_at: ctx.occurred_at(),
            }))
        })
    }

    /// A shipment with its details; visible to members of either base.
    pub fn shipment(&self, ctx: &ActorContext, id: ShipmentId) -> ServiceResult<ShipmentView> {
        self.store.read(|state| {
            let shipment = state.shipment(id)?;
            ctx.require_member_of_any(&[shipment.source_base(), shipment.target_base()])?;
            Ok(ShipmentView::from(shipment))
        })
    }

    fn shipment_command(
        &self,
        op: &'static str,
        ctx: &ActorContext,
        id: ShipmentId,
        expected: ExpectedVersion,
        idempotency: Option<(IdempotencyKey, Fingerprint)>,
        build: impl FnOnce(&ShipmentEngine<'_>, &Shipment) -> DomainResult<ShipmentCommand>,
    ) -> ServiceResult<ShipmentView> {
        self.command(op, ctx, |tx| {
            let mut shipment = tx.state().shipment(id)?.clone();
            let cmd = build(&ShipmentEngine::new(&mut tx.state_mut().ledger), &shipment)?;
            authorize(&shipment, &cmd, ctx)?;
            if let Some((key, fingerprint)) = idempotency {
                let scope = IdempotencyScope::new(ctx.acting_base(), key);
                if tx.claim(scope, fingerprint, ctx.occurred_at())? == Claim::Replay {
                    tracing::debug!(op, shipment_id = %id, "idempotent replay");
                    return Ok(ShipmentView::from(&shipment));
                }
            }
            expected.check(shipment.version())?;
            let before = shipment.version();

            let events =
                ShipmentEngine::new(&mut tx.state_mut().ledger).execute(&mut shipment, &cmd, ctx)?;

            tx.record(SHIPMENT, id, before, &events)?;
            let view = ShipmentView::from(&shipment);
            tx.state_mut().shipments.insert(id, shipment);
            Ok(view)
        })
    }
}
