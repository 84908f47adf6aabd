//! Return tracking: grouping returned events, recording flows, completing.

use serde_json::{Value as JsonValue, json};

use boxflow_auth::{ActorContext, Permission};
use boxflow_core::{
    AggregateRoot, BoxLabel, DistributionEventId, DomainResult, ExpectedVersion, StockKey,
    TrackingEntryId, TrackingGroupId,
};
use boxflow_distribution::{
    DistributionEngine, DistributionEvent, DistributionEventEvent, RecordFlow, TrackingCommand,
    TrackingGroup,
};
use boxflow_events::{EventBus, EventEnvelope};

use super::BoxflowService;
use crate::error::ServiceResult;
use crate::idempotency::{Claim, Fingerprint, IdempotencyKey, IdempotencyScope};
use crate::store::{DISTRIBUTION_EVENT, TRACKING_GROUP, Transaction};
use crate::views::TrackingGroupView;

/// Load `ids` from the working state, remembering each event's version.
fn load_events(
    tx: &Transaction<'_>,
    ids: &[DistributionEventId],
) -> DomainResult<Vec<(DistributionEvent, u64)>> {
    ids.iter()
        .map(|id| {
            let event = tx.state().event(*id)?.clone();
            let version = event.version();
            Ok((event, version))
        })
        .collect()
}

/// Route each event's share of `emitted` to its own stream and store the events.
fn store_events(
    tx: &mut Transaction<'_>,
    events: Vec<DistributionEvent>,
    versions: &[u64],
    emitted: &[DistributionEventEvent],
) -> ServiceResult<()> {
    for (event, before) in events.into_iter().zip(versions) {
        let id = *event.id();
        let batch: Vec<_> = emitted
            .iter()
            .filter(|e| e.event_id() == id)
            .cloned()
            .collect();
        tx.record(DISTRIBUTION_EVENT, id, *before, &batch)?;
        tx.state_mut().events.insert(id, event);
    }
    Ok(())
}

impl<B> BoxflowService<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Group returned events of the acting base and snapshot what went out.
    pub fn start_tracking_group(
        &self,
        ctx: &ActorContext,
        event_ids: &[DistributionEventId],
    ) -> ServiceResult<TrackingGroupView> {
        self.command("start_tracking_group", ctx, |tx| {
            let (mut events, versions): (Vec<_>, Vec<_>) =
                load_events(tx, event_ids)?.into_iter().unzip();
            let id = TrackingGroupId::new();
            let mut group = TrackingGroup::empty(id);

            let (group_events, emitted) =
                DistributionEngine::new(&mut tx.state_mut().ledger, self.settings.packing)
                    .start_group(&mut group, &mut events, ctx)?;

            tx.record(TRACKING_GROUP, id, 0, &group_events)?;
            store_events(tx, events, &versions, &emitted)?;
            let view = TrackingGroupView::from(&group);
            tx.state_mut().groups.insert(id, group);
            Ok(view)
        })
    }

    /// Record items that came back from distribution (`In`).
    pub fn record_return(
        &self,
        ctx: &ActorContext,
        group_id: TrackingGroupId,
        key: StockKey,
        quantity: u64,
        idempotency_key: Option<IdempotencyKey>,
        expected: ExpectedVersion,
    ) -> ServiceResult<TrackingGroupView> {
        let flow = RecordFlow {
            group_id,
            entry_id: TrackingEntryId::new(),
            key,
            quantity,
            target_box: None,
            actor: ctx.actor(),
            occurred_at: ctx.occurred_at(),
        };
        self.flow_command("record_return", ctx, TrackingCommand::RecordReturn(flow), idempotency_key, expected)
    }

    /// Put returned items straight back into `target_box` (`BackToBox`).
    #[allow(clippy::too_many_arguments)]
    pub fn move_return_to_box(
        &self,
        ctx: &ActorContext,
        group_id: TrackingGroupId,
        key: StockKey,
        quantity: u64,
        target_box: BoxLabel,
        idempotency_key: Option<IdempotencyKey>,
        expected: ExpectedVersion,
    ) -> ServiceResult<TrackingGroupView> {
        let flow = RecordFlow {
            group_id,
            entry_id: TrackingEntryId::new(),
            key,
            quantity,
            target_box: Some(target_box),
            actor: ctx.actor(),
            occurred_at: ctx.occurred_at(),
        };
        self.flow_command("move_return_to_box", ctx, TrackingCommand::MoveToBox(flow), idempotency_key, expected)
    }

    /// Persist distributed totals and complete the group and all its events.
    pub fn complete_tracking_group(
        &self,
        ctx: &ActorContext,
        group_id: TrackingGroupId,
        expected: ExpectedVersion,
    ) -> ServiceResult<TrackingGroupView> {
        self.command("complete_tracking_group", ctx, |tx| {
            let mut group = tx.state().group(group_id)?.clone();
            expected.check(group.version())?;
            let before = group.version();
            let (mut events, versions): (Vec<_>, Vec<_>) =
                load_events(tx, group.events())?.into_iter().unzip();

            let (group_events, emitted) =
                DistributionEngine::new(&mut tx.state_mut().ledger, self.settings.packing)
                    .complete_group(&mut group, &mut events, ctx)?;

            tx.record(TRACKING_GROUP, group_id, before, &group_events)?;
            store_events(tx, events, &versions, &emitted)?;
            let view = TrackingGroupView::from(&group);
            tx.state_mut().groups.insert(group_id, group);
            Ok(view)
        })
    }

    /// A group with per product/size Out, In, BackToBox and distributed totals.
    pub fn tracking_group(
        &self,
        ctx: &ActorContext,
        group_id: TrackingGroupId,
    ) -> ServiceResult<TrackingGroupView> {
        self.store.read(|state| {
            let group = state.group(group_id)?;
            ctx.require_member_of_any(&[group.base_id()])?;
            Ok(TrackingGroupView::from(group))
        })
    }

    fn flow_command(
        &self,
        op: &'static str,
        ctx: &ActorContext,
        command: TrackingCommand,
        idempotency_key: Option<IdempotencyKey>,
        expected: ExpectedVersion,
    ) -> ServiceResult<TrackingGroupView> {
        let group_id = command.group_id();
        let claim = match (idempotency_key, &command) {
            (Some(key), TrackingCommand::RecordReturn(flow) | TrackingCommand::MoveToBox(flow)) => {
                let fingerprint = Fingerprint::of(&json!({
                    "op": op,
                    "group": group_id,
                    "key": flow.key,
                    "quantity": flow.quantity,
                    "target_box": flow.target_box,
                }))?;
                Some((key, fingerprint))
            }
            _ => None,
        };

        self.command(op, ctx, |tx| {
            let mut group = tx.state().group(group_id)?.clone();
            ctx.require(group.base_id(), &Permission::TRACKING_WRITE)?;
            if let Some((key, fingerprint)) = claim {
                let scope = IdempotencyScope::new(ctx.acting_base(), key);
                if tx.claim(scope, fingerprint, ctx.occurred_at())? == Claim::Replay {
                    tracing::debug!(op, group_id = %group_id, "idempotent replay");
                    return Ok(TrackingGroupView::from(&group));
                }
            }
            expected.check(group.version())?;
            let before = group.version();

            let tracked = DistributionEngine::new(&mut tx.state_mut().ledger, self.settings.packing)
                .track(&mut group, &command, ctx)?;

            tx.record(TRACKING_GROUP, group_id, before, &tracked)?;
            let view = TrackingGroupView::from(&group);
            tx.state_mut().groups.insert(group_id, group);
            Ok(view)
        })
    }
}
