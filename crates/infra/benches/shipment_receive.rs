use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};

use boxflow_auth::{ActorContext, BaseMembership, Principal, Role};
use boxflow_core::{
    AggregateId, BaseId, BoxLabel, ExpectedVersion, LocationId, OrganisationId, ProductId,
    ShipmentId, SizeId, StockKey, UserId,
};
use boxflow_infra::event_store::{EventStore, InMemoryEventStore, StreamKey, UncommittedEvent};
use boxflow_infra::{BoxflowService, Settings};
use boxflow_ledger::Location;
use boxflow_shipments::{DetailSide, Reconciliation};

struct Receiving {
    svc: BoxflowService,
    ctx: ActorContext,
    shipment: ShipmentId,
    labels: Vec<BoxLabel>,
    key: StockKey,
    shelf: LocationId,
}

/// A shipment of `boxes` single-unit boxes, sent and ready to reconcile.
fn receiving_shipment(boxes: usize) -> Receiving {
    let org = OrganisationId::new();
    let (source, target) = (BaseId::new(), BaseId::new());
    let principal = Principal::new(UserId::new(), org)
        .with_membership(BaseMembership::with_roles(source, vec![Role::COORDINATOR]))
        .with_membership(BaseMembership::with_roles(target, vec![Role::COORDINATOR]));
    let at_source = ActorContext::now(principal.clone(), source);
    let at_target = ActorContext::now(principal, target);

    let svc = BoxflowService::in_memory(Settings::default());
    svc.register_base(&at_source, source, org).unwrap();
    svc.register_base(&at_target, target, org).unwrap();
    let (from, shelf) = (LocationId::new(), LocationId::new());
    svc.register_location(&at_source, Location::warehouse(from, source, "out"))
        .unwrap();
    svc.register_location(&at_target, Location::warehouse(shelf, target, "in"))
        .unwrap();

    let key = StockKey::sized(ProductId::new(), SizeId::new());
    let shipment = svc.create_shipment(&at_source, target, None).unwrap().id;
    let labels: Vec<_> = (0..boxes)
        .map(|i| BoxLabel::new(format!("bench-{i}")).unwrap())
        .collect();
    for label in &labels {
        svc.intake_box(&at_source, label.clone(), from, key.clone(), 1)
            .unwrap();
        svc.add_box_to_shipment(&at_source, shipment, label, ExpectedVersion::Any)
            .unwrap();
    }
    svc.send_shipment(&at_source, shipment, ExpectedVersion::Any)
        .unwrap();
    svc.start_receiving_shipment(&at_target, shipment, ExpectedVersion::Any)
        .unwrap();

    Receiving {
        svc,
        ctx: at_target,
        shipment,
        labels,
        key,
        shelf,
    }
}

fn bench_receive_shipment(c: &mut Criterion) {
    let mut group = c.benchmark_group("shipment_receive");

    for boxes in [1usize, 10, 100].iter() {
        group.throughput(Throughput::Elements(*boxes as u64));
        group.bench_with_input(BenchmarkId::new("reconcile_all", boxes), boxes, |b, &n| {
            b.iter_batched(
                || receiving_shipment(n),
                |r| {
                    for label in &r.labels {
                        let received = Reconciliation::Received(DetailSide {
                            key: r.key.clone(),
                            location: r.shelf,
                            quantity: black_box(1),
                        });
                        r.svc
                            .reconcile_shipment_detail(
                                &r.ctx,
                                r.shipment,
                                label,
                                received,
                                None,
                                ExpectedVersion::Any,
                            )
                            .unwrap();
                    }
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn bench_audit_append_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("audit_append_throughput");

    for batch_size in [1usize, 10, 100].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::new("batch_append", batch_size),
            batch_size,
            |b, &size| {
                let r = receiving_shipment(1);
                let stream = r
                    .svc
                    .store()
                    .event_store()
                    .load_stream(&StreamKey::new("shipment", AggregateId::from(r.shipment)))
                    .unwrap();
                let template = stream[0].clone();
                b.iter_batched(
                    || {
                        let store = InMemoryEventStore::new();
                        let id = AggregateId::new();
                        let events: Vec<_> = (0..size)
                            .map(|_| UncommittedEvent {
                                event_id: uuid::Uuid::now_v7(),
                                aggregate_id: id,
                                aggregate_type: template.aggregate_type.clone(),
                                event_type: template.event_type.clone(),
                                event_version: template.event_version,
                                actor: template.actor,
                                occurred_at: template.occurred_at,
                                payload: template.payload.clone(),
                            })
                            .collect();
                        (store, events)
                    },
                    |(store, events)| {
                        store
                            .append(black_box(events), ExpectedVersion::Exact(0))
                            .unwrap();
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_receive_shipment, bench_audit_append_throughput);
criterion_main!(benches);
