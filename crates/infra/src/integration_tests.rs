//! End-to-end tests through the service: command → ledger + aggregate →
//! event store → bus → projection.

use std::sync::Arc;

use chrono::{Duration, Utc};

use boxflow_auth::{ActorContext, BaseMembership, Principal, Role};
use boxflow_core::{
    BaseId, BoxLabel, DomainError, ErrorKind, ExpectedVersion, LocationId, OrganisationId,
    ProductId, SizeId, StockKey, TransferAgreementId, UserId,
};
use boxflow_distribution::{DistributionEventState, OverPackingPolicy, PackingState, TrackingGroupState};
use boxflow_events::EventBus;
use boxflow_ledger::{BoxState, CollectionRef, Custody, Location};
use boxflow_shipments::{DetailSide, DetailTransition, Reconciliation, ShipmentState};

use crate::config::Settings;
use crate::event_store::{EventStore, StreamKey};
use crate::idempotency::IdempotencyKey;
use crate::projections::DistributedTotalsProjection;
use crate::service::BoxflowService;
use crate::store::{SHIPMENT, TRACKING_GROUP};

struct World {
    svc: BoxflowService,
    /// Acting for the source base.
    a: ActorContext,
    /// Same person acting for the target base.
    b: ActorContext,
    l1: LocationId,
    l2: LocationId,
    spot: LocationId,
}

fn label(s: &str) -> BoxLabel {
    BoxLabel::new(s).unwrap()
}

fn key() -> StockKey {
    StockKey::sized(ProductId::new(), SizeId::new())
}

fn world_with(settings: Settings) -> World {
    let org = OrganisationId::new();
    let base_a = BaseId::new();
    let base_b = BaseId::new();
    let principal = Principal::new(UserId::new(), org)
        .with_membership(BaseMembership::with_roles(base_a, vec![Role::COORDINATOR]))
        .with_membership(BaseMembership::with_roles(base_b, vec![Role::COORDINATOR]));
    let a = ActorContext::now(principal.clone(), base_a);
    let b = ActorContext::now(principal, base_b);

    let svc = BoxflowService::in_memory(settings);
    svc.register_base(&a, base_a, org).unwrap();
    svc.register_base(&b, base_b, org).unwrap();

    let (l1, l2, spot) = (LocationId::new(), LocationId::new(), LocationId::new());
    svc.register_location(&a, Location::warehouse(l1, base_a, "Main shelf"))
        .unwrap();
    svc.register_location(&b, Location::warehouse(l2, base_b, "Receiving shelf"))
        .unwrap();
    svc.register_location(&a, Location::distribution_spot(spot, base_a, "Harbour square"))
        .unwrap();

    World {
        svc,
        a,
        b,
        l1,
        l2,
        spot,
    }
}

fn world() -> World {
    world_with(Settings::default())
}

/// A coordinator of some unrelated base.
fn stranger() -> ActorContext {
    let base = BaseId::new();
    let principal = Principal::new(UserId::new(), OrganisationId::new())
        .with_membership(BaseMembership::with_roles(base, vec![Role::COORDINATOR]));
    ActorContext::now(principal, base)
}

impl World {
    fn intake(&self, l: &str, key: &StockKey, qty: u64) {
        self.svc
            .intake_box(&self.a, label(l), self.l1, key.clone(), qty)
            .unwrap();
    }

    fn box_state(&self, l: &str) -> BoxState {
        self.svc.box_by_label(&self.a, &label(l)).unwrap().state
    }
}

#[test]
fn shipment_scenario_received_and_lost_completes() {
    let w = world();
    let (p, q) = (key(), key());
    w.intake("A", &p, 5);
    w.intake("B", &q, 3);

    let s = w
        .svc
        .create_shipment(&w.a, w.b.acting_base(), None)
        .unwrap();
    assert_eq!(s.state, ShipmentState::Preparing);
    for l in ["A", "B"] {
        w.svc
            .add_box_to_shipment(&w.a, s.id, &label(l), ExpectedVersion::Any)
            .unwrap();
    }
    assert_eq!(w.box_state("A"), BoxState::MarkedForShipment);

    w.svc.send_shipment(&w.a, s.id, ExpectedVersion::Any).unwrap();
    assert_eq!(w.box_state("A"), BoxState::InTransit);
    assert_eq!(w.box_state("B"), BoxState::InTransit);

    w.svc
        .start_receiving_shipment(&w.b, s.id, ExpectedVersion::Any)
        .unwrap();
    let received = Reconciliation::Received(DetailSide {
        key: p.clone(),
        location: w.l2,
        quantity: 5,
    });
    let view = w
        .svc
        .reconcile_shipment_detail(&w.b, s.id, &label("A"), received, None, ExpectedVersion::Any)
        .unwrap();
    assert_eq!(view.state, ShipmentState::Receiving);
    let view = w
        .svc
        .reconcile_shipment_detail(
            &w.b,
            s.id,
            &label("B"),
            Reconciliation::Lost,
            None,
            ExpectedVersion::Any,
        )
        .unwrap();
    assert_eq!(view.state, ShipmentState::Completed);

    let a = w.svc.box_by_label(&w.b, &label("A")).unwrap();
    assert_eq!(a.state, BoxState::InStock);
    assert_eq!(a.location, Some(w.l2));
    assert_eq!(a.base_id, w.b.acting_base());
    assert_eq!(w.box_state("B"), BoxState::Lost);

    // The audit stream has one event per transition, in order.
    let stream = w
        .svc
        .store()
        .event_store()
        .load_stream(&StreamKey::new(SHIPMENT, s.id.into()))
        .unwrap();
    let types: Vec<_> = stream.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(
        types,
        vec![
            "shipment.created",
            "shipment.box_added",
            "shipment.box_added",
            "shipment.sent",
            "shipment.receiving_started",
            "shipment.detail_received",
            "shipment.detail_lost",
            "shipment.completed",
        ]
    );
    assert_eq!(stream.last().unwrap().sequence_number, view.version);
    assert!(!w.svc.box_audit(&w.b, &label("A")).unwrap().is_empty());
}

#[test]
fn cancel_in_preparing_restocks_every_box() {
    let w = world();
    let k = key();
    w.intake("A", &k, 5);
    w.intake("B", &k, 2);
    let s = w.svc.create_shipment(&w.a, w.b.acting_base(), None).unwrap();
    for l in ["A", "B"] {
        w.svc
            .add_box_to_shipment(&w.a, s.id, &label(l), ExpectedVersion::Any)
            .unwrap();
    }

    let view = w.svc.cancel_shipment(&w.a, s.id, ExpectedVersion::Any).unwrap();
    assert_eq!(view.state, ShipmentState::Canceled);
    assert!(view.details.iter().all(|d| d.status() == DetailTransition::Removed));
    for l in ["A", "B"] {
        let b = w.svc.box_by_label(&w.a, &label(l)).unwrap();
        assert_eq!(b.state, BoxState::InStock);
        assert_eq!(b.custody, Custody::Location(w.l1));
    }
}

#[test]
fn cross_organisation_shipments_need_an_agreement() {
    let w = world();
    let other_org = OrganisationId::new();
    let partner_base = BaseId::new();
    let partner = ActorContext::now(
        Principal::new(UserId::new(), other_org)
            .with_membership(BaseMembership::with_roles(partner_base, vec![Role::COORDINATOR])),
        partner_base,
    );
    w.svc.register_base(&partner, partner_base, other_org).unwrap();

    let err = w.svc.create_shipment(&w.a, partner_base, None).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Validation));

    let view = w
        .svc
        .create_shipment(&w.a, partner_base, Some(TransferAgreementId::new()))
        .unwrap();
    assert_eq!(view.target_base, partner_base);

    let err = w.svc.create_shipment(&w.a, BaseId::new(), None).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::NotFound));
}

#[test]
fn rejected_reconciliation_changes_nothing() {
    let w = world();
    let k = key();
    w.intake("A", &k, 5);
    let s = w.svc.create_shipment(&w.a, w.b.acting_base(), None).unwrap();
    w.svc
        .add_box_to_shipment(&w.a, s.id, &label("A"), ExpectedVersion::Any)
        .unwrap();
    w.svc.send_shipment(&w.a, s.id, ExpectedVersion::Any).unwrap();
    let before = w
        .svc
        .start_receiving_shipment(&w.b, s.id, ExpectedVersion::Any)
        .unwrap();

    let too_much = Reconciliation::Received(DetailSide {
        key: k.clone(),
        location: w.l2,
        quantity: 6,
    });
    let err = w
        .svc
        .reconcile_shipment_detail(&w.b, s.id, &label("A"), too_much, None, ExpectedVersion::Any)
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::InsufficientQuantity));

    assert_eq!(w.svc.shipment(&w.b, s.id).unwrap(), before);
    assert_eq!(w.box_state("A"), BoxState::Receiving);
}

#[test]
fn source_side_cannot_receive_and_viewers_cannot_write() {
    let w = world();
    let k = key();
    w.intake("A", &k, 5);
    let s = w.svc.create_shipment(&w.a, w.b.acting_base(), None).unwrap();
    w.svc
        .add_box_to_shipment(&w.a, s.id, &label("A"), ExpectedVersion::Any)
        .unwrap();
    w.svc.send_shipment(&w.a, s.id, ExpectedVersion::Any).unwrap();

    let err = w
        .svc
        .start_receiving_shipment(&w.a, s.id, ExpectedVersion::Any)
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Unauthorized));

    let base = w.a.acting_base();
    let viewer = ActorContext::now(
        Principal::new(UserId::new(), w.a.organisation_id())
            .with_membership(BaseMembership::with_roles(base, vec![Role::VIEWER])),
        base,
    );
    let err = w
        .svc
        .intake_box(&viewer, label("V"), w.l1, k, 1)
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Unauthorized));
    assert_eq!(w.svc.box_by_label(&viewer, &label("A")).unwrap().quantity, 5);
}

#[test]
fn stale_expected_version_is_a_concurrent_modification() {
    let w = world();
    let s = w.svc.create_shipment(&w.a, w.b.acting_base(), None).unwrap();
    let err = w
        .svc
        .cancel_shipment(&w.a, s.id, ExpectedVersion::Exact(s.version + 1))
        .unwrap_err();
    assert!(err.is_retryable());
    w.svc
        .cancel_shipment(&w.a, s.id, ExpectedVersion::Exact(s.version))
        .unwrap();
}

#[test]
fn reconciliation_replays_do_not_double_count() {
    let w = world();
    let k = key();
    w.intake("A", &k, 5);
    w.intake("B", &k, 5);
    let s = w.svc.create_shipment(&w.a, w.b.acting_base(), None).unwrap();
    for l in ["A", "B"] {
        w.svc
            .add_box_to_shipment(&w.a, s.id, &label(l), ExpectedVersion::Any)
            .unwrap();
    }
    w.svc.send_shipment(&w.a, s.id, ExpectedVersion::Any).unwrap();
    w.svc
        .start_receiving_shipment(&w.b, s.id, ExpectedVersion::Any)
        .unwrap();

    let received = Reconciliation::Received(DetailSide {
        key: k.clone(),
        location: w.l2,
        quantity: 4,
    });
    let idem = IdempotencyKey::new("recv-A-1").unwrap();
    let first = w
        .svc
        .reconcile_shipment_detail(
            &w.b,
            s.id,
            &label("A"),
            received.clone(),
            Some(idem.clone()),
            ExpectedVersion::Any,
        )
        .unwrap();
    let replay = w
        .svc
        .reconcile_shipment_detail(
            &w.b,
            s.id,
            &label("A"),
            received,
            Some(idem.clone()),
            ExpectedVersion::Any,
        )
        .unwrap();
    assert_eq!(first, replay);
    assert_eq!(w.svc.box_by_label(&w.b, &label("A")).unwrap().quantity, 4);

    let err = w
        .svc
        .reconcile_shipment_detail(
            &w.b,
            s.id,
            &label("B"),
            Reconciliation::Lost,
            Some(idem),
            ExpectedVersion::Any,
        )
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Validation));
    assert_eq!(w.box_state("B"), BoxState::Receiving);
}

#[test]
fn replays_are_authorized_like_the_command() {
    let w = world();
    let k = key();
    w.intake("A", &k, 5);
    let s = w.svc.create_shipment(&w.a, w.b.acting_base(), None).unwrap();
    w.svc
        .add_box_to_shipment(&w.a, s.id, &label("A"), ExpectedVersion::Any)
        .unwrap();
    w.svc.send_shipment(&w.a, s.id, ExpectedVersion::Any).unwrap();
    w.svc
        .start_receiving_shipment(&w.b, s.id, ExpectedVersion::Any)
        .unwrap();
    let received = Reconciliation::Received(DetailSide {
        key: k.clone(),
        location: w.l2,
        quantity: 5,
    });
    let idem = IdempotencyKey::new("recv-A-1").unwrap();
    w.svc
        .reconcile_shipment_detail(
            &w.b,
            s.id,
            &label("A"),
            received.clone(),
            Some(idem.clone()),
            ExpectedVersion::Any,
        )
        .unwrap();

    let stranger = stranger();
    let err = w.svc.shipment(&stranger, s.id).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Unauthorized));
    let err = w
        .svc
        .reconcile_shipment_detail(
            &stranger,
            s.id,
            &label("A"),
            received.clone(),
            Some(idem.clone()),
            ExpectedVersion::Any,
        )
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Unauthorized));

    // Members of the source base may read the shipment but not receive it.
    let err = w
        .svc
        .reconcile_shipment_detail(&w.a, s.id, &label("A"), received, Some(idem), ExpectedVersion::Any)
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Unauthorized));
    assert_eq!(w.svc.store().idempotency_records().unwrap(), 1);
}

#[test]
fn concurrent_reconciliations_complete_exactly_once() {
    let w = world();
    let k = key();
    let labels: Vec<String> = (0..8).map(|i| format!("box-{i}")).collect();
    for l in &labels {
        w.intake(l, &k, 1);
    }
    let s = w.svc.create_shipment(&w.a, w.b.acting_base(), None).unwrap();
    for l in &labels {
        w.svc
            .add_box_to_shipment(&w.a, s.id, &label(l), ExpectedVersion::Any)
            .unwrap();
    }
    w.svc.send_shipment(&w.a, s.id, ExpectedVersion::Any).unwrap();
    w.svc
        .start_receiving_shipment(&w.b, s.id, ExpectedVersion::Any)
        .unwrap();

    let svc = Arc::new(w.svc);
    let handles: Vec<_> = labels
        .iter()
        .map(|l| {
            let svc = Arc::clone(&svc);
            let ctx = w.b.clone();
            let box_label = label(l);
            let id = s.id;
            let (k, l2) = (k.clone(), w.l2);
            std::thread::spawn(move || {
                let settings = crate::config::RetrySettings { max_attempts: 50 };
                crate::retry::with_retry(&settings, || {
                    // Read-then-act with an exact version: losers retry.
                    let version = svc.shipment(&ctx, id)?.version;
                    svc.reconcile_shipment_detail(
                        &ctx,
                        id,
                        &box_label,
                        Reconciliation::Received(DetailSide {
                            key: k.clone(),
                            location: l2,
                            quantity: 1,
                        }),
                        None,
                        ExpectedVersion::Exact(version),
                    )
                })
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let view = svc.shipment(&w.b, s.id).unwrap();
    assert_eq!(view.state, ShipmentState::Completed);
    let completions = svc
        .store()
        .event_store()
        .load_stream(&StreamKey::new(SHIPMENT, s.id.into()))
        .unwrap()
        .iter()
        .filter(|e| e.event_type == "shipment.completed")
        .count();
    assert_eq!(completions, 1);
}

#[test]
fn packing_scenario_and_unassign_round_trip() {
    let w = world();
    let k = key();
    w.intake("six", &k, 6);
    w.intake("bulk", &k, 10);
    let now = Utc::now();
    let event = w
        .svc
        .create_distribution_event(&w.a, "Market day", w.spot, now, now + Duration::hours(4))
        .unwrap();
    let event = w
        .svc
        .add_packing_list_entry(&w.a, event.id, k.clone(), 10, ExpectedVersion::Exact(event.version))
        .unwrap();
    assert_eq!(event.packing.entries[0].state, PackingState::NotStarted);

    let event = w
        .svc
        .assign_box_to_event(&w.a, event.id, &label("six"), ExpectedVersion::Any)
        .unwrap();
    assert_eq!(event.packing.entries[0].actual, 6);
    assert_eq!(event.packing.entries[0].state, PackingState::PackingInProgress);

    let event = w
        .svc
        .assign_items_to_event(
            &w.a,
            event.id,
            &CollectionRef::Box(label("bulk")),
            4,
            ExpectedVersion::Any,
        )
        .unwrap();
    assert_eq!(event.packing.entries[0].actual, 10);
    assert!(event.is_fully_packed);
    let before = event.packing.clone();

    // A further box round-trips without touching the packed sums.
    w.intake("extra", &k, 2);
    w.svc
        .assign_box_to_event(&w.a, event.id, &label("extra"), ExpectedVersion::Any)
        .unwrap();
    let flagged = w.svc.distribution_event(&w.a, event.id).unwrap();
    assert!(flagged.packing.entries[0].over_packed);
    let event = w
        .svc
        .unassign_from_event(
            &w.a,
            event.id,
            &CollectionRef::Box(label("extra")),
            ExpectedVersion::Any,
        )
        .unwrap();
    assert_eq!(event.packing, before);
    let extra = w.svc.box_by_label(&w.a, &label("extra")).unwrap();
    assert_eq!(extra.custody, Custody::Location(w.l1));
    assert_eq!(extra.state, BoxState::InStock);
}

#[test]
fn configured_policies_govern_packing() {
    let mut settings = Settings::default();
    settings.packing.require_full_packing = true;
    settings.packing.over_packing = OverPackingPolicy::Reject;
    let w = world_with(settings);
    let k = key();
    w.intake("twelve", &k, 12);
    let now = Utc::now();
    let event = w
        .svc
        .create_distribution_event(&w.a, "Strict", w.spot, now, now)
        .unwrap();
    w.svc
        .add_packing_list_entry(&w.a, event.id, k, 10, ExpectedVersion::Any)
        .unwrap();

    let err = w
        .svc
        .assign_box_to_event(&w.a, event.id, &label("twelve"), ExpectedVersion::Any)
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Validation));

    w.svc
        .advance_event_state(&w.a, event.id, DistributionEventState::Packing, ExpectedVersion::Any)
        .unwrap();
    let err = w
        .svc
        .advance_event_state(&w.a, event.id, DistributionEventState::OnDistro, ExpectedVersion::Any)
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::InvalidStateTransition));
}

#[test]
fn tracking_group_scenario_feeds_the_projection() {
    let w = world();
    let subscription = w.svc.store().bus().subscribe();
    let projection = DistributedTotalsProjection::new();
    let k = key();
    w.intake("a", &k, 12);
    w.intake("b", &k, 8);
    w.intake("back", &k, 1);

    let now = Utc::now();
    let mut event_ids = Vec::new();
    for (l, target) in [("a", 12), ("b", 8)] {
        let event = w
            .svc
            .create_distribution_event(&w.a, format!("Event {l}"), w.spot, now, now)
            .unwrap();
        w.svc
            .add_packing_list_entry(&w.a, event.id, k.clone(), target, ExpectedVersion::Any)
            .unwrap();
        w.svc
            .assign_box_to_event(&w.a, event.id, &label(l), ExpectedVersion::Any)
            .unwrap();
        for to in [
            DistributionEventState::Packing,
            DistributionEventState::OnDistro,
            DistributionEventState::ReturnedFromDistribution,
        ] {
            w.svc
                .advance_event_state(&w.a, event.id, to, ExpectedVersion::Any)
                .unwrap();
        }
        event_ids.push(event.id);
    }

    let group = w.svc.start_tracking_group(&w.a, &event_ids).unwrap();
    assert_eq!(group.totals[0].out, 20);

    let returned = IdempotencyKey::new("return-1").unwrap();
    for _ in 0..2 {
        w.svc
            .record_return(&w.a, group.id, k.clone(), 5, Some(returned.clone()), ExpectedVersion::Any)
            .unwrap();
    }
    let err = w
        .svc
        .record_return(&stranger(), group.id, k.clone(), 5, Some(returned), ExpectedVersion::Any)
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Unauthorized));
    w.svc
        .move_return_to_box(&w.a, group.id, k.clone(), 3, label("back"), None, ExpectedVersion::Any)
        .unwrap();
    assert_eq!(w.svc.box_by_label(&w.a, &label("back")).unwrap().quantity, 4);
    let units = || w.svc.store().read(|s| Ok(s.ledger.total_units())).unwrap();
    assert_eq!(units(), 21);

    let view = w
        .svc
        .complete_tracking_group(&w.a, group.id, ExpectedVersion::Any)
        .unwrap();
    assert_eq!(units(), 21);
    assert_eq!(
        w.svc.store().read(|s| Ok(s.ledger.collections_held_by(&Custody::Location(w.spot)))).unwrap()[0].quantity(),
        5
    );
    assert_eq!(view.state, TrackingGroupState::Completed);
    assert_eq!(view.totals[0].returned, 5);
    assert_eq!(view.totals[0].distributed, Some(12));
    assert_eq!(view.distributed[0].quantity, 12);

    for id in &event_ids {
        let event = w.svc.distribution_event(&w.a, *id).unwrap();
        assert_eq!(event.state, DistributionEventState::Completed);
    }
    assert_eq!(w.box_state("a"), BoxState::Donated);

    projection.drain(&subscription).unwrap();
    assert_eq!(projection.get(w.a.acting_base(), &k), 12);

    let rebuilt = DistributedTotalsProjection::new();
    let stored = w.svc.store().event_store().all_events().unwrap();
    rebuilt
        .rebuild_from_scratch(
            stored
                .iter()
                .filter(|e| e.aggregate_type == TRACKING_GROUP)
                .map(|e| e.to_envelope()),
        )
        .unwrap();
    assert_eq!(rebuilt.get(w.a.acting_base(), &k), 12);
}

#[test]
fn over_return_blocks_group_completion() {
    let w = world();
    let k = key();
    w.intake("a", &k, 2);
    let now = Utc::now();
    let event = w
        .svc
        .create_distribution_event(&w.a, "Small", w.spot, now, now)
        .unwrap();
    w.svc
        .assign_box_to_event(&w.a, event.id, &label("a"), ExpectedVersion::Any)
        .unwrap();
    for to in [
        DistributionEventState::Packing,
        DistributionEventState::OnDistro,
        DistributionEventState::ReturnedFromDistribution,
    ] {
        w.svc
            .advance_event_state(&w.a, event.id, to, ExpectedVersion::Any)
            .unwrap();
    }
    let group = w.svc.start_tracking_group(&w.a, &[event.id]).unwrap();
    w.svc
        .record_return(&w.a, group.id, k, 3, None, ExpectedVersion::Any)
        .unwrap();

    let err = w
        .svc
        .complete_tracking_group(&w.a, group.id, ExpectedVersion::Any)
        .unwrap_err();
    assert!(matches!(err.as_domain(), Some(DomainError::OverReturn(_))));
    assert_eq!(
        w.svc.tracking_group(&w.a, group.id).unwrap().state,
        TrackingGroupState::InProgress
    );
    assert_eq!(w.box_state("a"), BoxState::InStock);
}

#[test]
fn ledger_primitives_through_the_service() {
    let w = world();
    let k = key();
    w.intake("A", &k, 10);
    let shelf2 = LocationId::new();
    w.svc
        .register_location(&w.a, Location::warehouse(shelf2, w.a.acting_base(), "Overflow"))
        .unwrap();

    let moved = w
        .svc
        .move_box(&w.a, &label("A"), w.l1, shelf2, ExpectedVersion::Any)
        .unwrap();
    assert_eq!(moved.location, Some(shelf2));

    let loose = w
        .svc
        .split_quantity(&w.a, &CollectionRef::Box(label("A")), 4, w.l1)
        .unwrap();
    assert_eq!(loose.quantity(), 4);
    assert_eq!(w.svc.box_by_label(&w.a, &label("A")).unwrap().quantity, 6);

    let merged = w
        .svc
        .merge_quantity(&w.a, &loose.reference(), &CollectionRef::Box(label("A")), 4)
        .unwrap();
    assert_eq!(merged.quantity(), 10);

    let scrapped = w
        .svc
        .set_box_state(&w.a, &label("A"), BoxState::Scrap)
        .unwrap();
    assert_eq!(scrapped.state, BoxState::Scrap);
    w.svc.set_box_state(&w.a, &label("A"), BoxState::InStock).unwrap();

    let deleted = w.svc.delete_box(&w.a, &label("A")).unwrap();
    assert!(deleted.deleted);
    let err = w
        .svc
        .move_box(&w.a, &label("A"), shelf2, w.l1, ExpectedVersion::Any)
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::NotFound));
    assert!(w.svc.box_audit(&w.a, &label("A")).unwrap().len() >= 5);
}

#[test]
fn bootstrap_starts_with_default_settings() {
    let svc = BoxflowService::bootstrap().unwrap();
    assert_eq!(svc.settings().retry.max_attempts, 3);
    assert_eq!(svc.settings().packing.over_packing, OverPackingPolicy::Flag);
}
