use std::collections::{BTreeMap, BTreeSet};

use boxflow_auth::{ActorContext, Permission};
use boxflow_core::{
    Aggregate, AggregateRoot, BoxLabel, CollectionId, DistributionEventId, DomainError,
    DomainResult, StockKey,
};
use boxflow_ledger::{CollectionRef, Custody, QuantityLedger};

use crate::event::{
    AssignCollection, DistributionCommand, DistributionEvent, DistributionEventEvent,
    DistributionEventState, ReturnTrackingStep,
};
use crate::packing::{self, PackingPolicy, PackingReport};
use crate::tracking::{
    CompleteGroup, FlowDirection, KeyedQuantity, StartGroup, TrackingCommand, TrackingEvent,
    TrackingGroup,
};

/// Runs distribution event and tracking group commands against the ledger.
///
/// Same shape as the shipment engine: authorize, decide, ledger effects,
/// evolve. Multi-aggregate operations (starting and completing a tracking
/// group) decide on every aggregate before touching the ledger.
pub struct DistributionEngine<'a> {
    ledger: &'a mut QuantityLedger,
    policy: PackingPolicy,
}

impl<'a> DistributionEngine<'a> {
    pub fn new(ledger: &'a mut QuantityLedger, policy: PackingPolicy) -> Self {
        Self { ledger, policy }
    }

    /// Fulfillment of an event's packing list against what the ledger says it holds.
    pub fn packing_report(&self, event: &DistributionEvent) -> PackingReport {
        let held = self
            .ledger
            .collections_held_by(&Custody::DistributionEvent(*event.id()));
        packing::reconcile(event.packing_list(), &held, self.policy.over_packing)
    }

    pub fn execute(
        &mut self,
        event: &mut DistributionEvent,
        command: &DistributionCommand,
        ctx: &ActorContext,
    ) -> DomainResult<Vec<DistributionEventEvent>> {
        match command {
            DistributionCommand::Create(cmd) => {
                ctx.require(cmd.base_id, &Permission::DISTRIBUTION_WRITE)?;
                let spot = self.ledger.location(cmd.spot)?;
                if !spot.is_distribution_spot() || spot.base_id != cmd.base_id {
                    return Err(DomainError::validation(format!(
                        "location {} is not a distribution spot of base {}",
                        cmd.spot, cmd.base_id
                    )));
                }
            }
            DistributionCommand::StartReturnTracking(_)
            | DistributionCommand::CompleteReturnTracking(_) => {
                return Err(DomainError::invalid_transition(
                    "return tracking is driven by a tracking group",
                ));
            }
            _ => ctx.require(event.base_id(), &Permission::DISTRIBUTION_WRITE)?,
        }

        match command {
            DistributionCommand::Assign(cmd) => {
                let report = self.packing_report(event);
                self.policy
                    .check_assignment(&report, &cmd.key, cmd.quantity)?;
            }
            DistributionCommand::Advance(cmd)
                if event.state() == DistributionEventState::Packing
                    && cmd.to == DistributionEventState::OnDistro =>
            {
                let report = self.packing_report(event);
                if !report.is_fully_packed() {
                    if self.policy.require_full_packing {
                        return Err(DomainError::invalid_transition(format!(
                            "packing list of event {} is not fully packed",
                            event.id()
                        )));
                    }
                    tracing::warn!(
                        event_id = %event.id(),
                        "event leaves packing without a fully packed list"
                    );
                }
            }
            _ => {}
        }

        let events = event.handle(command)?;
        for e in &events {
            self.apply_event_effects(event, e, ctx)?;
        }
        for e in &events {
            event.apply(e);
        }
        Ok(events)
    }

    /// Build an assignment of a whole box from the ledger's record of it.
    pub fn assign_box_command(
        &self,
        event_id: DistributionEventId,
        label: &BoxLabel,
        ctx: &ActorContext,
    ) -> DomainResult<DistributionCommand> {
        let collection = self.ledger.collection(&CollectionRef::Box(label.clone()))?;
        Ok(DistributionCommand::Assign(AssignCollection {
            event_id,
            collection: collection.reference(),
            key: collection.key().clone(),
            quantity: collection.quantity(),
            split_from: None,
            actor: ctx.actor(),
            occurred_at: ctx.occurred_at(),
        }))
    }

    /// Build an assignment that splits `amount` units off `source` into the event.
    pub fn assign_items_command(
        &self,
        event_id: DistributionEventId,
        source: &CollectionRef,
        amount: u64,
        ctx: &ActorContext,
    ) -> DomainResult<DistributionCommand> {
        let collection = self.ledger.collection(source)?;
        Ok(DistributionCommand::Assign(AssignCollection {
            event_id,
            collection: CollectionRef::Unboxed(CollectionId::new()),
            key: collection.key().clone(),
            quantity: amount,
            split_from: Some(source.clone()),
            actor: ctx.actor(),
            occurred_at: ctx.occurred_at(),
        }))
    }

    fn apply_event_effects(
        &mut self,
        event: &DistributionEvent,
        e: &DistributionEventEvent,
        ctx: &ActorContext,
    ) -> DomainResult<()> {
        let id = *event.id();
        match e {
            DistributionEventEvent::CollectionAssigned(a) => match (&a.split_from, &a.collection) {
                (Some(source), CollectionRef::Unboxed(new_id)) => self.ledger.split_quantity_as(
                    *new_id,
                    source,
                    a.quantity,
                    Custody::DistributionEvent(id),
                    ctx,
                ),
                (Some(_), CollectionRef::Box(_)) => Err(DomainError::validation(
                    "a split assignment must create an unboxed collection",
                )),
                (None, collection) => self.ledger.assign_to_event(collection, id, ctx),
            },
            DistributionEventEvent::CollectionUnassigned(u) => self
                .ledger
                .unassign_from_event(&u.collection, id, event.spot(), ctx)
                .map(|outcome| {
                    tracing::debug!(event_id = %id, collection = %u.collection, ?outcome, "collection unassigned");
                }),
            _ => Ok(()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Return tracking
    // ─────────────────────────────────────────────────────────────────────

    /// Start return tracking over `events`, snapshotting what went out.
    pub fn start_group(
        &mut self,
        group: &mut TrackingGroup,
        events: &mut [DistributionEvent],
        ctx: &ActorContext,
    ) -> DomainResult<(Vec<TrackingEvent>, Vec<DistributionEventEvent>)> {
        for event in events.iter() {
            if !event.is_created() {
                return Err(DomainError::not_found(format!(
                    "distribution event {}",
                    event.id()
                )));
            }
            ctx.require(event.base_id(), &Permission::TRACKING_WRITE)?;
        }

        let held: Vec<_> = events
            .iter()
            .flat_map(|e| {
                self.ledger
                    .collections_held_by(&Custody::DistributionEvent(*e.id()))
            })
            .collect();
        let out = packing::actual_by_key(&held)
            .into_iter()
            .map(|(key, quantity)| KeyedQuantity { key, quantity })
            .collect();

        let group_events = group.handle(&TrackingCommand::Start(StartGroup {
            group_id: *group.id(),
            base_id: ctx.acting_base(),
            events: events.iter().map(|e| *e.id()).collect(),
            out,
            actor: ctx.actor(),
            occurred_at: ctx.occurred_at(),
        }))?;
        let per_event = decide_each(events, |e| {
            DistributionCommand::StartReturnTracking(ReturnTrackingStep {
                event_id: *e.id(),
                group_id: *group.id(),
                actor: ctx.actor(),
                occurred_at: ctx.occurred_at(),
            })
        })?;

        Ok(commit(group, group_events, events, per_event))
    }

    /// Record a return (`In`) or a move back into a box (`BackToBox`).
    pub fn track(
        &mut self,
        group: &mut TrackingGroup,
        command: &TrackingCommand,
        ctx: &ActorContext,
    ) -> DomainResult<Vec<TrackingEvent>> {
        match command {
            TrackingCommand::RecordReturn(_) => {}
            TrackingCommand::MoveToBox(cmd) => {
                if let Some(label) = &cmd.target_box {
                    let target = self.ledger.collection(&CollectionRef::Box(label.clone()))?;
                    if target.key() != &cmd.key {
                        return Err(DomainError::validation(format!(
                            "box {label} holds {}, not {}",
                            target.key(),
                            cmd.key
                        )));
                    }
                }
            }
            TrackingCommand::Start(_) | TrackingCommand::Complete(_) => {
                return Err(DomainError::validation(
                    "start and complete involve the group's events",
                ));
            }
        }
        if group.is_created() {
            ctx.require(group.base_id(), &Permission::TRACKING_WRITE)?;
        }

        let tracked = group.handle(command)?;
        for e in &tracked {
            if let TrackingEvent::FlowRecorded(f) = e {
                if let (FlowDirection::BackToBox, Some(label)) =
                    (f.entry.direction, &f.entry.target_box)
                {
                    let reserved = group
                        .totals()
                        .get(&f.entry.key)
                        .map_or(0, |t| t.returned);
                    let target = CollectionRef::Box(label.clone());
                    for (event_id, source, amount) in
                        self.held_units(group.events(), &f.entry.key, f.entry.quantity, reserved)?
                    {
                        self.ledger
                            .return_from_event(&source, event_id, &target, amount, ctx)?;
                    }
                }
            }
        }
        for e in &tracked {
            group.apply(e);
        }
        Ok(tracked)
    }

    /// Complete the group: persist distributed counts, take returned leftovers
    /// out of the events' collections onto their spots, hand the rest out and
    /// move every event to Completed.
    pub fn complete_group(
        &mut self,
        group: &mut TrackingGroup,
        events: &mut [DistributionEvent],
        ctx: &ActorContext,
    ) -> DomainResult<(Vec<TrackingEvent>, Vec<DistributionEventEvent>)> {
        if group.is_created() {
            ctx.require(group.base_id(), &Permission::TRACKING_WRITE)?;
        }
        let expected: BTreeSet<_> = group.events().iter().copied().collect();
        let given: BTreeSet<_> = events.iter().map(|e| *e.id()).collect();
        if expected != given {
            return Err(DomainError::validation(format!(
                "tracking group {} covers a different set of events",
                group.id()
            )));
        }

        let group_events = group.handle(&TrackingCommand::Complete(CompleteGroup {
            group_id: *group.id(),
            actor: ctx.actor(),
            occurred_at: ctx.occurred_at(),
        }))?;
        let per_event = decide_each(events, |e| {
            DistributionCommand::CompleteReturnTracking(ReturnTrackingStep {
                event_id: *e.id(),
                group_id: *group.id(),
                actor: ctx.actor(),
                occurred_at: ctx.occurred_at(),
            })
        })?;

        if let Some(TrackingEvent::Completed(done)) = group_events.first() {
            for returned in &done.returned {
                self.book_returns(events, &returned.key, returned.quantity, ctx)?;
            }
        }
        for event in events.iter() {
            let id = *event.id();
            for collection in self
                .ledger
                .collections_held_by(&Custody::DistributionEvent(id))
            {
                self.ledger.distribute(&collection.reference(), id, ctx)?;
            }
        }

        Ok(commit(group, group_events, events, per_event))
    }

    /// Move `quantity` returned units of `key` out of the events' collections
    /// into one loose collection per event at that event's spot.
    fn book_returns(
        &mut self,
        events: &[DistributionEvent],
        key: &StockKey,
        quantity: u64,
        ctx: &ActorContext,
    ) -> DomainResult<()> {
        let ids: Vec<_> = events.iter().map(|e| *e.id()).collect();
        let mut booked: BTreeMap<DistributionEventId, CollectionId> = BTreeMap::new();
        for (event_id, source, amount) in self.held_units(&ids, key, quantity, 0)? {
            match booked.get(&event_id).copied() {
                Some(id) => self.ledger.return_from_event(
                    &source,
                    event_id,
                    &CollectionRef::Unboxed(id),
                    amount,
                    ctx,
                )?,
                None => {
                    let spot = events
                        .iter()
                        .find(|e| *e.id() == event_id)
                        .map(|e| e.spot())
                        .ok_or_else(|| DomainError::not_found(format!("distribution event {event_id}")))?;
                    let id = self
                        .ledger
                        .return_to_location(&source, event_id, spot, amount, ctx)?;
                    booked.insert(event_id, id);
                }
            }
        }
        Ok(())
    }

    /// Pick `quantity` units of `key` from what `events` still hold, in event
    /// order, leaving at least `reserved` more units behind.
    ///
    /// Fails with `OverReturn` when the events hold less than that.
    fn held_units(
        &self,
        events: &[DistributionEventId],
        key: &StockKey,
        quantity: u64,
        reserved: u64,
    ) -> DomainResult<Vec<(DistributionEventId, CollectionRef, u64)>> {
        let held: Vec<_> = events
            .iter()
            .flat_map(|&event_id| {
                self.ledger
                    .collections_held_by(&Custody::DistributionEvent(event_id))
                    .into_iter()
                    .filter(|c| c.key() == key && c.quantity() > 0)
                    .map(move |c| (event_id, c.reference(), c.quantity()))
            })
            .collect();
        let available: u64 = held.iter().map(|(_, _, n)| n).sum();
        if quantity + reserved > available {
            return Err(DomainError::over_return(format!(
                "{key}: {quantity} back plus {reserved} returned, but the events hold {available}"
            )));
        }

        let mut remaining = quantity;
        let mut picked = Vec::new();
        for (event_id, reference, n) in held {
            if remaining == 0 {
                break;
            }
            let take = n.min(remaining);
            picked.push((event_id, reference, take));
            remaining -= take;
        }
        Ok(picked)
    }
}

fn decide_each(
    events: &[DistributionEvent],
    command: impl Fn(&DistributionEvent) -> DistributionCommand,
) -> DomainResult<Vec<Vec<DistributionEventEvent>>> {
    events.iter().map(|e| e.handle(&command(e))).collect()
}

fn commit(
    group: &mut TrackingGroup,
    group_events: Vec<TrackingEvent>,
    events: &mut [DistributionEvent],
    per_event: Vec<Vec<DistributionEventEvent>>,
) -> (Vec<TrackingEvent>, Vec<DistributionEventEvent>) {
    for e in &group_events {
        group.apply(e);
    }
    let mut emitted = Vec::new();
    for (event, decided) in events.iter_mut().zip(per_event) {
        for e in &decided {
            event.apply(e);
        }
        emitted.extend(decided);
    }
    (group_events, emitted)
}
