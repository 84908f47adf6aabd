use boxflow_auth::{ActorContext, Permission};
use boxflow_core::{
    Aggregate, AggregateRoot, BoxLabel, DomainError, DomainResult, ShipmentDetailId, ShipmentId,
};
use boxflow_ledger::{BoxState, QuantityLedger};

use crate::shipment::{AddBox, DetailSide, Shipment, ShipmentCommand, ShipmentEvent};

/// Runs shipment commands against the quantity ledger.
///
/// Order per command: authorize, decide (`handle`), ledger effects, evolve
/// (`apply`). Each ledger call is itself all-or-nothing; the caller's store
/// transaction makes the whole command atomic.
pub struct ShipmentEngine<'a> {
    ledger: &'a mut QuantityLedger,
}

impl<'a> ShipmentEngine<'a> {
    pub fn new(ledger: &'a mut QuantityLedger) -> Self {
        Self { ledger }
    }

    pub fn execute(
        &mut self,
        shipment: &mut Shipment,
        command: &ShipmentCommand,
        ctx: &ActorContext,
    ) -> DomainResult<Vec<ShipmentEvent>> {
        authorize(shipment, command, ctx)?;
        let events = shipment.handle(command)?;
        for event in &events {
            self.apply_effects(shipment, event, ctx)?;
        }
        for event in &events {
            shipment.apply(event);
        }
        tracing::debug!(
            shipment_id = %shipment.id(),
            state = ?shipment.state(),
            events = events.len(),
            "shipment command executed"
        );
        Ok(events)
    }

    /// Build an `AddBox` command from what the ledger currently records for the box.
    pub fn add_box_command(
        &self,
        shipment_id: ShipmentId,
        label: &BoxLabel,
        ctx: &ActorContext,
    ) -> DomainResult<ShipmentCommand> {
        let b = self.ledger.stock_box(label)?;
        if b.is_deleted() {
            return Err(DomainError::not_found(format!("box {label}")));
        }
        let location = b.current_location().ok_or_else(|| {
            DomainError::concurrent(format!("box {label} is not at a location"))
        })?;
        Ok(ShipmentCommand::AddBox(AddBox {
            shipment_id,
            detail_id: ShipmentDetailId::new(),
            box_label: label.clone(),
            source: DetailSide {
                key: b.key().clone(),
                location,
                quantity: b.quantity(),
            },
            actor: ctx.actor(),
            occurred_at: ctx.occurred_at(),
        }))
    }

    fn apply_effects(
        &mut self,
        shipment: &Shipment,
        event: &ShipmentEvent,
        ctx: &ActorContext,
    ) -> DomainResult<()> {
        let id = *shipment.id();
        match event {
            ShipmentEvent::Created(_) | ShipmentEvent::Completed(_) => Ok(()),
            ShipmentEvent::BoxAdded(e) => {
                self.ledger
                    .mark_for_shipment(&e.box_label, id, shipment.target_base(), ctx)
            }
            ShipmentEvent::BoxRemoved(e) => {
                self.ledger
                    .release_from_shipment(std::slice::from_ref(&e.box_label), id, ctx)
            }
            ShipmentEvent::Canceled(e) => self.ledger.release_from_shipment(&e.boxes, id, ctx),
            ShipmentEvent::Sent(e) => self.ledger.advance_shipment_boxes(
                &e.boxes,
                id,
                BoxState::MarkedForShipment,
                BoxState::InTransit,
                ctx,
            ),
            ShipmentEvent::ReceivingStarted(e) => self.ledger.advance_shipment_boxes(
                &e.boxes,
                id,
                BoxState::InTransit,
                BoxState::Receiving,
                ctx,
            ),
            ShipmentEvent::MarkedLost(e) => self.ledger.advance_shipment_boxes(
                &e.boxes,
                id,
                BoxState::InTransit,
                BoxState::NotDelivered,
                ctx,
            ),
            ShipmentEvent::DetailReceived(e) => self.ledger.receive_box(
                &e.box_label,
                id,
                e.target.location,
                e.target.key.clone(),
                e.target.quantity,
                ctx,
            ),
            ShipmentEvent::DetailLost(e) => self.ledger.advance_shipment_boxes(
                std::slice::from_ref(&e.box_label),
                id,
                BoxState::Receiving,
                BoxState::Lost,
                ctx,
            ),
            ShipmentEvent::NotDeliveredMovedBack(e) => {
                self.ledger.restock_not_delivered(&e.boxes, id, ctx)
            }
        }
    }
}

/// Source-side commands need `shipment.write` at the source base, receiving
/// needs `shipment.receive` at the target base, and either side may mark lost.
/// Whether `ctx` may run `command` against `shipment`. Runs first in
/// [`ShipmentEngine::execute`].
pub fn authorize(shipment: &Shipment, command: &ShipmentCommand, ctx: &ActorContext) -> DomainResult<()> {
    match command {
        ShipmentCommand::Create(cmd) => ctx.require(cmd.source_base, &Permission::SHIPMENT_WRITE),
        ShipmentCommand::AddBox(_)
        | ShipmentCommand::RemoveBox(_)
        | ShipmentCommand::Send(_)
        | ShipmentCommand::Cancel(_)
        | ShipmentCommand::MoveNotDeliveredBack(_) => {
            ctx.require(shipment.source_base(), &Permission::SHIPMENT_WRITE)
        }
        ShipmentCommand::StartReceiving(_) | ShipmentCommand::Reconcile(_) => {
            ctx.require(shipment.target_base(), &Permission::SHIPMENT_RECEIVE)
        }
        ShipmentCommand::MarkLost(_) => {
            if ctx.acting_base() == shipment.target_base() {
                ctx.require(shipment.target_base(), &Permission::SHIPMENT_RECEIVE)
            } else {
                ctx.require(shipment.source_base(), &Permission::SHIPMENT_WRITE)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shipment::{
        CreateShipment, DetailTransition, Reconciliation, ReconcileDetail, ShipmentState,
        ShipmentTransition,
    };
    use boxflow_auth::{BaseMembership, Principal, Role};
    use boxflow_core::{
        BaseId, DistributionEventId, LocationId, OrganisationId, ProductId, SizeId, StockKey,
        UserId,
    };
    use boxflow_ledger::{CollectionRef, Location};
    use proptest::prelude::*;

    struct World {
        ledger: QuantityLedger,
        source: ActorContext,
        target: ActorContext,
        source_shelf: LocationId,
        target_shelf: LocationId,
    }

    fn ctx(base: BaseId, role: Role) -> ActorContext {
        let principal = Principal::new(UserId::new(), OrganisationId::new())
            .with_membership(BaseMembership::with_roles(base, vec![role]));
        ActorContext::now(principal, base)
    }

    fn world() -> World {
        let source = ctx(BaseId::new(), Role::WAREHOUSE);
        let target = ctx(BaseId::new(), Role::WAREHOUSE);
        let source_shelf = LocationId::new();
        let target_shelf = LocationId::new();
        let mut ledger = QuantityLedger::new();
        ledger
            .register_location(
                Location::warehouse(source_shelf, source.acting_base(), "Outbound"),
                &source,
            )
            .unwrap();
        ledger
            .register_location(
                Location::warehouse(target_shelf, target.acting_base(), "L2"),
                &target,
            )
            .unwrap();
        World {
            ledger,
            source,
            target,
            source_shelf,
            target_shelf,
        }
    }

    fn label(s: &str) -> BoxLabel {
        BoxLabel::new(s).unwrap()
    }

    fn key() -> StockKey {
        StockKey::sized(ProductId::new(), SizeId::new())
    }

    fn transition(id: ShipmentId, ctx: &ActorContext) -> ShipmentTransition {
        ShipmentTransition {
            shipment_id: id,
            actor: ctx.actor(),
            occurred_at: ctx.occurred_at(),
        }
    }

    impl World {
        fn intake(&mut self, l: &str, qty: u64) -> StockKey {
            let k = key();
            self.ledger
                .intake_box(label(l), self.source_shelf, k.clone(), qty, &self.source)
                .unwrap();
            k
        }

        fn run(
            &mut self,
            shipment: &mut Shipment,
            command: ShipmentCommand,
            ctx: &ActorContext,
        ) -> DomainResult<Vec<ShipmentEvent>> {
            ShipmentEngine::new(&mut self.ledger).execute(shipment, &command, ctx)
        }

        fn create(&mut self) -> Shipment {
            let id = ShipmentId::new();
            let mut s = Shipment::empty(id);
            let source = self.source.clone();
            self.run(
                &mut s,
                ShipmentCommand::Create(CreateShipment {
                    shipment_id: id,
                    source_base: source.acting_base(),
                    target_base: self.target.acting_base(),
                    agreement: None,
                    cross_organisation: false,
                    actor: source.actor(),
                    occurred_at: source.occurred_at(),
                }),
                &source,
            )
            .unwrap();
            s
        }

        fn add(&mut self, shipment: &mut Shipment, l: &str) -> DomainResult<Vec<ShipmentEvent>> {
            let source = self.source.clone();
            let cmd = ShipmentEngine::new(&mut self.ledger).add_box_command(
                *shipment.id(),
                &label(l),
                &source,
            )?;
            self.run(shipment, cmd, &source)
        }

        fn state_of(&self, l: &str) -> BoxState {
            self.ledger.stock_box(&label(l)).unwrap().state()
        }

        fn reconcile(
            &mut self,
            shipment: &mut Shipment,
            l: &str,
            reconciliation: Reconciliation,
        ) -> DomainResult<Vec<ShipmentEvent>> {
            let target = self.target.clone();
            let cmd = ShipmentCommand::Reconcile(ReconcileDetail {
                shipment_id: *shipment.id(),
                box_label: label(l),
                reconciliation,
                actor: target.actor(),
                occurred_at: target.occurred_at(),
            });
            self.run(shipment, cmd, &target)
        }
    }

    #[test]
    fn send_receive_scenario_completes_automatically() {
        let mut w = world();
        let key_a = w.intake("A", 5);
        w.intake("B", 3);
        let mut s = w.create();
        w.add(&mut s, "A").unwrap();
        w.add(&mut s, "B").unwrap();
        assert_eq!(w.state_of("A"), BoxState::MarkedForShipment);

        let source = w.source.clone();
        let target = w.target.clone();
        let id = *s.id();
        w.run(&mut s, ShipmentCommand::Send(transition(id, &source)), &source)
            .unwrap();
        assert_eq!(w.state_of("A"), BoxState::InTransit);
        assert_eq!(w.state_of("B"), BoxState::InTransit);

        w.run(
            &mut s,
            ShipmentCommand::StartReceiving(transition(id, &target)),
            &target,
        )
        .unwrap();

        let shelf = w.target_shelf;
        w.reconcile(
            &mut s,
            "A",
            Reconciliation::Received(DetailSide {
                key: key_a,
                location: shelf,
                quantity: 5,
            }),
        )
        .unwrap();
        assert_eq!(s.state(), ShipmentState::Receiving);
        w.reconcile(&mut s, "B", Reconciliation::Lost).unwrap();

        assert_eq!(s.state(), ShipmentState::Completed);
        let a = w.ledger.stock_box(&label("A")).unwrap();
        assert_eq!(a.state(), BoxState::InStock);
        assert_eq!(a.base_id(), target.acting_base());
        assert_eq!(a.current_location(), Some(shelf));
        assert_eq!(w.state_of("B"), BoxState::Lost);
    }

    #[test]
    fn cancel_returns_every_box_to_stock() {
        let mut w = world();
        w.intake("A", 5);
        w.intake("B", 3);
        let mut s = w.create();
        w.add(&mut s, "A").unwrap();
        w.add(&mut s, "B").unwrap();

        let source = w.source.clone();
        let id = *s.id();
        w.run(&mut s, ShipmentCommand::Cancel(transition(id, &source)), &source)
            .unwrap();

        assert_eq!(s.state(), ShipmentState::Canceled);
        for l in ["A", "B"] {
            let b = w.ledger.stock_box(&label(l)).unwrap();
            assert_eq!(b.state(), BoxState::InStock);
            assert_eq!(b.current_location(), Some(w.source_shelf));
        }
    }

    #[test]
    fn target_side_cannot_send_and_source_side_cannot_receive() {
        let mut w = world();
        w.intake("A", 5);
        let mut s = w.create();
        w.add(&mut s, "A").unwrap();
        let source = w.source.clone();
        let target = w.target.clone();
        let id = *s.id();

        let err = w
            .run(&mut s, ShipmentCommand::Send(transition(id, &target)), &target)
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
        assert_eq!(s.state(), ShipmentState::Preparing);

        w.run(&mut s, ShipmentCommand::Send(transition(id, &source)), &source)
            .unwrap();
        let err = w
            .run(
                &mut s,
                ShipmentCommand::StartReceiving(transition(id, &source)),
                &source,
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));

        w.run(&mut s, ShipmentCommand::MarkLost(transition(id, &target)), &target)
            .unwrap();
        assert_eq!(s.state(), ShipmentState::Lost);
        assert_eq!(w.state_of("A"), BoxState::NotDelivered);
    }

    #[test]
    fn distributors_cannot_create_shipments() {
        let mut w = world();
        let distributor = ctx(w.source.acting_base(), Role::DISTRIBUTOR);
        let id = ShipmentId::new();
        let mut s = Shipment::empty(id);
        let err = w
            .run(
                &mut s,
                ShipmentCommand::Create(CreateShipment {
                    shipment_id: id,
                    source_base: distributor.acting_base(),
                    target_base: w.target.acting_base(),
                    agreement: None,
                    cross_organisation: false,
                    actor: distributor.actor(),
                    occurred_at: distributor.occurred_at(),
                }),
                &distributor,
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
        assert!(!s.is_created());
    }

    #[test]
    fn lost_shipment_boxes_can_be_moved_back() {
        let mut w = world();
        w.intake("A", 5);
        let mut s = w.create();
        w.add(&mut s, "A").unwrap();
        let source = w.source.clone();
        let id = *s.id();
        w.run(&mut s, ShipmentCommand::Send(transition(id, &source)), &source)
            .unwrap();
        w.run(&mut s, ShipmentCommand::MarkLost(transition(id, &source)), &source)
            .unwrap();

        w.run(
            &mut s,
            ShipmentCommand::MoveNotDeliveredBack(transition(id, &source)),
            &source,
        )
        .unwrap();
        let a = w.ledger.stock_box(&label("A")).unwrap();
        assert_eq!(a.state(), BoxState::InStock);
        assert_eq!(a.current_location(), Some(w.source_shelf));
        assert_eq!(s.state(), ShipmentState::Lost);
        assert!(s.labels_with(DetailTransition::NotDelivered).is_empty());
    }

    #[test]
    fn box_in_one_shipment_cannot_join_another() {
        let mut w = world();
        w.intake("A", 5);
        let mut first = w.create();
        let mut second = w.create();
        w.add(&mut first, "A").unwrap();

        let err = w.add(&mut second, "A").unwrap_err();
        assert!(matches!(err, DomainError::ConcurrentModification(_)));
        assert!(second.details().is_empty());
    }

    #[test]
    fn box_assigned_to_an_event_cannot_be_shipped() {
        let mut w = world();
        w.intake("A", 5);
        let source = w.source.clone();
        w.ledger
            .assign_to_event(
                &CollectionRef::Box(label("A")),
                DistributionEventId::new(),
                &source,
            )
            .unwrap();
        let mut s = w.create();

        let err = w.add(&mut s, "A").unwrap_err();
        assert!(matches!(err, DomainError::ConcurrentModification(_)));
    }

    proptest! {
        /// Property: a shipment reaches Completed exactly when every
        /// non-removed detail is received or lost, in any reconciliation order.
        #[test]
        fn completion_requires_every_detail_resolved(
            outcomes in prop::collection::vec(any::<bool>(), 1..6),
            removed in prop::collection::vec(any::<bool>(), 1..6),
        ) {
            let mut w = world();
            let mut s = w.create();
            let labels: Vec<String> = (0..outcomes.len()).map(|i| format!("box-{i}")).collect();
            for l in &labels {
                w.intake(l, 4);
                w.add(&mut s, l).unwrap();
            }
            let source = w.source.clone();
            let target = w.target.clone();
            let id = *s.id();
            let mut shipped = Vec::new();
            for (i, l) in labels.iter().enumerate() {
                if removed.get(i).copied().unwrap_or(false) && i > 0 {
                    let cmd = ShipmentCommand::RemoveBox(crate::shipment::RemoveBox {
                        shipment_id: id,
                        box_label: label(l),
                        actor: source.actor(),
                        occurred_at: source.occurred_at(),
                    });
                    w.run(&mut s, cmd, &source).unwrap();
                } else {
                    shipped.push((l.clone(), outcomes[i]));
                }
            }
            w.run(&mut s, ShipmentCommand::Send(transition(id, &source)), &source).unwrap();
            w.run(&mut s, ShipmentCommand::StartReceiving(transition(id, &target)), &target).unwrap();

            let shelf = w.target_shelf;
            for (n, (l, received)) in shipped.iter().enumerate() {
                prop_assert_eq!(s.state(), ShipmentState::Receiving);
                let reconciliation = if *received {
                    let key = w.ledger.stock_box(&label(l)).unwrap().key().clone();
                    Reconciliation::Received(DetailSide { key, location: shelf, quantity: 4 })
                } else {
                    Reconciliation::Lost
                };
                w.reconcile(&mut s, l, reconciliation).unwrap();
                prop_assert_eq!(s.state() == ShipmentState::Completed, n + 1 == shipped.len());
            }
            prop_assert!(s.all_details_resolved());
        }
    }
}
