//! Distribution event commands and queries.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use boxflow_auth::ActorContext;
use boxflow_core::{
    AggregateRoot, BoxLabel, DistributionEventId, DomainResult, ExpectedVersion, LocationId,
    PackingListEntryId, StockKey,
};
use boxflow_distribution::{
    AddPackingListEntry, AdvanceState, CreateDistributionEvent, DistributionCommand,
    DistributionEngine, DistributionEvent, DistributionEventState, RemovePackingListEntry,
    UnassignCollection, UpdatePackingListEntry,
};
use boxflow_events::{EventBus, EventEnvelope};
use boxflow_ledger::CollectionRef;

use super::BoxflowService;
use crate::error::ServiceResult;
use crate::store::DISTRIBUTION_EVENT;
use crate::views::DistributionEventView;

impl<B> BoxflowService<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Plan a distribution event of the acting base at `spot`.
    pub fn create_distribution_event(
        &self,
        ctx: &ActorContext,
        name: impl Into<String>,
        spot: LocationId,
        planned_start: DateTime<Utc>,
        planned_end: DateTime<Utc>,
    ) -> ServiceResult<DistributionEventView> {
        let name = name.into();
        self.command("create_distribution_event", ctx, |tx| {
            let id = DistributionEventId::new();
            let mut event = DistributionEvent::empty(id);
            let cmd = DistributionCommand::Create(CreateDistributionEvent {
                event_id: id,
                base_id: ctx.acting_base(),
                name,
                spot,
                planned_start,
                planned_end,
                actor: ctx.actor(),
                occurred_at: ctx.occurred_at(),
            });
            let events = DistributionEngine::new(&mut tx.state_mut().ledger, self.settings.packing)
                .execute(&mut event, &cmd, ctx)?;
            tx.record(DISTRIBUTION_EVENT, id, 0, &events)?;
            let view = DistributionEventView::new(&event, &tx.state().ledger, &self.settings.packing);
            tx.state_mut().events.insert(id, event);
            Ok(view)
        })
    }

    pub fn add_packing_list_entry(
        &self,
        ctx: &ActorContext,
        id: DistributionEventId,
        key: StockKey,
        target: u64,
        expected: ExpectedVersion,
    ) -> ServiceResult<DistributionEventView> {
        self.event_command("add_packing_list_entry", ctx, id, expected, |_, _| {
            Ok(DistributionCommand::AddPackingListEntry(AddPackingListEntry {
                event_id: id,
                entry_id: PackingListEntryId::new(),
                key,
                target,
                actor: ctx.actor(),
                occurred_at: ctx.occurred_at(),
            }))
        })
    }

    pub fn update_packing_list_entry(
        &self,
        ctx: &ActorContext,
        id: DistributionEventId,
        entry_id: PackingListEntryId,
        target: u64,
        expected: ExpectedVersion,
    ) -> ServiceResult<DistributionEventView> {
        self.event_command("update_packing_list_entry", ctx, id, expected, |_, _| {
            Ok(DistributionCommand::UpdatePackingListEntry(UpdatePackingListEntry {
                event_id: id,
                entry_id,
                target,
                actor: ctx.actor(),
                occurred_at: ctx.occurred_at(),
            }))
        })
    }

    pub fn remove_packing_list_entry(
        &self,
        ctx: &ActorContext,
        id: DistributionEventId,
        entry_id: PackingListEntryId,
        expected: ExpectedVersion,
    ) -> ServiceResult<DistributionEventView> {
        self.event_command("remove_packing_list_entry", ctx, id, expected, |_, _| {
            Ok(DistributionCommand::RemovePackingListEntry(RemovePackingListEntry {
                event_id: id,
                entry_id,
                actor: ctx.actor(),
                occurred_at: ctx.occurred_at(),
            }))
        })
    }

    /// Assign a whole box to the event.
    pub fn assign_box_to_event(
        &self,
        ctx: &ActorContext,
        id: DistributionEventId,
        label: &BoxLabel,
        expected: ExpectedVersion,
    ) -> ServiceResult<DistributionEventView> {
        self.event_command("assign_box_to_event", ctx, id, expected, |engine, _| {
            engine.assign_box_command(id, label, ctx)
        })
    }

    /// Split `amount` loose units off `source` and assign them to the event.
    pub fn assign_items_to_event(
        &self,
        ctx: &ActorContext,
        id: DistributionEventId,
        source: &CollectionRef,
        amount: u64,
        expected: ExpectedVersion,
    ) -> ServiceResult<DistributionEventView> {
        self.event_command("assign_items_to_event", ctx, id, expected, |engine, _| {
            engine.assign_items_command(id, source, amount, ctx)
        })
    }

    /// Release an assigned collection: a box returns to its location, loose
    /// items merge back into their origin box when it can take them.
    pub fn unassign_from_event(
        &self,
        ctx: &ActorContext,
        id: DistributionEventId,
        collection: &CollectionRef,
        expected: ExpectedVersion,
    ) -> ServiceResult<DistributionEventView> {
        self.event_command("unassign_from_event", ctx, id, expected, |_, _| {
            Ok(DistributionCommand::Unassign(UnassignCollection {
                event_id: id,
                collection: collection.clone(),
                actor: ctx.actor(),
                occurred_at: ctx.occurred_at(),
            }))
        })
    }

    pub fn advance_event_state(
        &self,
        ctx: &ActorContext,
        id: DistributionEventId,
        to: DistributionEventState,
        expected: ExpectedVersion,
    ) -> ServiceResult<DistributionEventView> {
        self.event_command("advance_event_state", ctx, id, expected, |_, _| {
            Ok(DistributionCommand::Advance(AdvanceState {
                event_id: id,
                to,
                actor: ctx.actor(),
                occurred_at: ctx.occurred_at(),
            }))
        })
    }

    /// An event with its packing list and derived fulfillment.
    pub fn distribution_event(
        &self,
        ctx: &ActorContext,
        id: DistributionEventId,
    ) -> ServiceResult<DistributionEventView> {
        self.store.read(|state| {
            let event = state.event(id)?;
            ctx.require_member_of_any(&[event.base_id()])?;
            Ok(DistributionEventView::new(
                event,
                &state.ledger,
                &self.settings.packing,
            ))
        })
    }

    fn event_command(
        &self,
        op: &'static str,
        ctx: &ActorContext,
        id: DistributionEventId,
        expected: ExpectedVersion,
        build: impl FnOnce(&DistributionEngine<'_>, &DistributionEvent) -> DomainResult<DistributionCommand>,
    ) -> ServiceResult<DistributionEventView> {
        self.command(op, ctx, |tx| {
            let mut event = tx.state().event(id)?.clone();
            expected.check(event.version())?;
            let before = event.version();

            let mut engine = DistributionEngine::new(&mut tx.state_mut().ledger, self.settings.packing);
            let cmd = build(&engine, &event)?;
            let events = engine.execute(&mut event, &cmd, ctx)?;

            tx.record(DISTRIBUTION_EVENT, id, before, &events)?;
            let view = DistributionEventView::new(&event, &tx.state().ledger, &self.settings.packing);
            tx.state_mut().events.insert(id, event);
            Ok(view)
        })
    }
}
