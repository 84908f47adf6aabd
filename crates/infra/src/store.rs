//! Transactional in-memory store.
//!
//! Every command runs inside [`InMemoryStore::transact`]: the closure works on
//! a fork of the state, and only a successful closure whose audit events were
//! appended is folded back into the live state. Any error discards the fork,
//! so a failed command leaves nothing behind. The ledger journal and the
//! idempotency records stay out of the fork; the journal is appended to and
//! claims are recorded on commit. Writers are serialised by one lock, which
//! plays the role of the row locks a relational store would take.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use boxflow_core::{
    AggregateId, BaseId, DistributionEventId, DomainError, DomainResult, ExpectedVersion,
    OrganisationId, ShipmentId, TrackingGroupId,
};
use boxflow_distribution::{DistributionEvent, TrackingGroup};
use boxflow_events::{Event, EventBus, EventEnvelope, InMemoryEventBus};
use boxflow_ledger::QuantityLedger;
use boxflow_shipments::Shipment;

use crate::error::{ServiceError, ServiceResult};
use crate::event_store::{InMemoryEventStore, StreamAppend, UncommittedEvent};
use crate::idempotency::{Claim, Fingerprint, IdempotencyRecords, IdempotencyScope};

pub const SHIPMENT: &str = "shipment";
pub const DISTRIBUTION_EVENT: &str = "distribution_event";
pub const TRACKING_GROUP: &str = "tracking_group";

/// Everything a command may read or change.
#[derive(Debug, Clone, Default)]
pub struct State {
    pub ledger: QuantityLedger,
    pub organisations: BTreeMap<BaseId, OrganisationId>,
    pub shipments: BTreeMap<ShipmentId, Shipment>,
    pub events: BTreeMap<DistributionEventId, DistributionEvent>,
    pub groups: BTreeMap<TrackingGroupId, TrackingGroup>,
}

impl State {
    /// Working copy for one transaction; see [`QuantityLedger::fork`].
    pub fn fork(&self) -> Self {
        Self {
            ledger: self.ledger.fork(),
            organisations: self.organisations.clone(),
            shipments: self.shipments.clone(),
            events: self.events.clone(),
            groups: self.groups.clone(),
        }
    }

    pub fn absorb(&mut self, fork: State) {
        self.ledger.absorb(fork.ledger);
        self.organisations = fork.organisations;
        self.shipments = fork.shipments;
        self.events = fork.events;
        self.groups = fork.groups;
    }

    pub fn organisation_of(&self, base: BaseId) -> DomainResult<OrganisationId> {
        self.organisations
            .get(&base)
            .copied()
            .ok_or_else(|| DomainError::not_found(format!("base {base}")))
    }

    pub fn shipment(&self, id: ShipmentId) -> DomainResult<&Shipment> {
        self.shipments
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("shipment {id}")))
    }

    pub fn event(&self, id: DistributionEventId) -> DomainResult<&DistributionEvent> {
        self.events
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("distribution event {id}")))
    }

    pub fn group(&self, id: TrackingGroupId) -> DomainResult<&TrackingGroup> {
        self.groups
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("tracking group {id}")))
    }
}

/// Working copy of the state plus the audit events and idempotency claims
/// queued for commit.
#[derive(Debug)]
pub struct Transaction<'a> {
    state: State,
    appends: Vec<StreamAppend>,
    idempotency: &'a IdempotencyRecords,
    claims: Vec<(IdempotencyScope, Fingerprint, DateTime<Utc>)>,
}

impl Transaction<'_> {
    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    /// Claim an idempotency key; a fresh claim is recorded only if this
    /// transaction commits.
    pub fn claim(
        &mut self,
        scope: IdempotencyScope,
        fingerprint: Fingerprint,
        at: DateTime<Utc>,
    ) -> DomainResult<Claim> {
        if let Some((_, staged, _)) = self.claims.iter().find(|(s, ..)| *s == scope) {
            return scope.compare(staged, &fingerprint);
        }
        let claim = self.idempotency.check(&scope, &fingerprint, at)?;
        if claim == Claim::Fresh {
            self.claims.push((scope, fingerprint, at));
        }
        Ok(claim)
    }

    /// Queue `events` for the aggregate stream, which stood at `version_before`.
    pub fn record<E>(
        &mut self,
        aggregate_type: &str,
        aggregate_id: impl Into<AggregateId>,
        version_before: u64,
        events: &[E],
    ) -> ServiceResult<()>
    where
        E: Event + Serialize,
    {
        if events.is_empty() {
            return Ok(());
        }
        let aggregate_id = aggregate_id.into();
        let uncommitted = events
            .iter()
            .map(|e| UncommittedEvent::from_typed(aggregate_id, aggregate_type, e))
            .collect::<Result<Vec<_>, _>>()?;

        let existing = self.appends.iter_mut().find(|a| {
            a.events.first().is_some_and(|e| {
                e.aggregate_id == aggregate_id && e.aggregate_type == aggregate_type
            })
        });
        match existing {
            Some(append) => append.events.extend(uncommitted),
            None => self.appends.push(StreamAppend {
                events: uncommitted,
                expected_version: ExpectedVersion::Exact(version_before),
            }),
        }
        Ok(())
    }
}

pub type DefaultBus = InMemoryEventBus<EventEnvelope<JsonValue>>;

#[derive(Debug, Default)]
struct Live {
    state: State,
    idempotency: IdempotencyRecords,
}

#[derive(Debug)]
pub struct InMemoryStore<B = DefaultBus> {
    live: RwLock<Live>,
    events: InMemoryEventStore,
    bus: B,
}

impl Default for InMemoryStore<DefaultBus> {
    fn default() -> Self {
        Self::new(DefaultBus::new())
    }
}

impl<B> InMemoryStore<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(bus: B) -> Self {
        Self::with_idempotency(bus, IdempotencyRecords::default())
    }

    pub fn with_idempotency(bus: B, idempotency: IdempotencyRecords) -> Self {
        Self {
            live: RwLock::new(Live {
                state: State::default(),
                idempotency,
            }),
            events: InMemoryEventStore::new(),
            bus,
        }
    }

    pub fn event_store(&self) -> &InMemoryEventStore {
        &self.events
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn read<T>(&self, f: impl FnOnce(&State) -> ServiceResult<T>) -> ServiceResult<T> {
        let live = self.live.read().map_err(|_| ServiceError::Poisoned)?;
        f(&live.state)
    }

    /// Number of idempotency records currently kept.
    pub fn idempotency_records(&self) -> ServiceResult<usize> {
        let live = self.live.read().map_err(|_| ServiceError::Poisoned)?;
        Ok(live.idempotency.len())
    }

    /// Run `f` atomically. Committed events are published after the lock is released.
    pub fn transact<T>(
        &self,
        f: impl FnOnce(&mut Transaction<'_>) -> ServiceResult<T>,
    ) -> ServiceResult<T> {
        let (out, committed) = {
            let mut guard = self.live.write().map_err(|_| ServiceError::Poisoned)?;
            let live = &mut *guard;
            let mut tx = Transaction {
                state: live.state.fork(),
                appends: Vec::new(),
                idempotency: &live.idempotency,
                claims: Vec::new(),
            };
            let out = f(&mut tx)?;
            let Transaction {
                state,
                appends,
                claims,
                ..
            } = tx;
            let committed = self.events.append_all(appends)?;
            live.state.absorb(state);
            for (scope, fingerprint, at) in claims {
                live.idempotency.record(scope, fingerprint, at);
            }
            (out, committed)
        };

        for event in &committed {
            if let Err(err) = self.bus.publish(event.to_envelope()) {
                // Already committed; consumers catch up from the event store.
                tracing::warn!(
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    error = ?err,
                    "failed to publish committed event"
                );
            }
        }
        Ok(out)
    }
}
