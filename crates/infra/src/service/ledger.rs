//! Bases, locations, box intake and the ledger primitives.

use serde_json::Value as JsonValue;

use boxflow_auth::{ActorContext, Permission};
use boxflow_core::{
    BaseId, BoxLabel, DomainError, ExpectedVersion, LocationId, OrganisationId, StockKey,
};
use boxflow_events::{EventBus, EventEnvelope};
use boxflow_ledger::{BoxState, CollectionRef, Custody, ItemsCollection, LedgerEntry, Location};

use super::BoxflowService;
use crate::error::ServiceResult;
use crate::store::State;
use crate::views::BoxView;

fn live_box_base(state: &State, label: &BoxLabel) -> ServiceResult<BaseId> {
    let b = state.ledger.stock_box(label)?;
    if b.is_deleted() {
        return Err(DomainError::not_found(format!("box {label}")).into());
    }
    Ok(b.base_id())
}

fn box_view(state: &State, label: &BoxLabel) -> ServiceResult<BoxView> {
    Ok(BoxView::from(state.ledger.stock_box(label)?))
}

impl<B> BoxflowService<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Record which organisation owns `base_id`. Needed before the base can
    /// take part in a shipment.
    pub fn register_base(
        &self,
        ctx: &ActorContext,
        base_id: BaseId,
        organisation_id: OrganisationId,
    ) -> ServiceResult<()> {
        self.command("register_base", ctx, |tx| {
            ctx.require_member_of_any(&[base_id])?;
            if ctx.organisation_id() != organisation_id {
                return Err(DomainError::unauthorized(format!(
                    "actor does not belong to organisation {organisation_id}"
                ))
                .into());
            }
            match tx.state().organisations.get(&base_id) {
                Some(existing) if *existing != organisation_id => {
                    Err(DomainError::validation(format!(
                        "base {base_id} already belongs to organisation {existing}"
                    ))
                    .into())
                }
                Some(_) => Ok(()),
                None => {
                    tx.state_mut().organisations.insert(base_id, organisation_id);
                    Ok(())
                }
            }
        })
    }

    pub fn register_location(&self, ctx: &ActorContext, location: Location) -> ServiceResult<Location> {
        self.command("register_location", ctx, |tx| {
            ctx.require(location.base_id, &Permission::STOCK_WRITE)?;
            tx.state_mut().ledger.register_location(location.clone(), ctx)?;
            Ok(location)
        })
    }

    pub fn intake_box(
        &self,
        ctx: &ActorContext,
        label: BoxLabel,
        location: LocationId,
        key: StockKey,
        quantity: u64,
    ) -> ServiceResult<BoxView> {
        self.command("intake_box", ctx, |tx| {
            let base = tx.state().ledger.location(location)?.base_id;
            ctx.require(base, &Permission::STOCK_WRITE)?;
            let b = tx
                .state_mut()
                .ledger
                .intake_box(label, location, key, quantity, ctx)?;
            Ok(BoxView::from(b))
        })
    }

    pub fn move_box(
        &self,
        ctx: &ActorContext,
        label: &BoxLabel,
        from: LocationId,
        to: LocationId,
        expected: ExpectedVersion,
    ) -> ServiceResult<BoxView> {
        self.command("move_box", ctx, |tx| {
            let base = live_box_base(tx.state(), label)?;
            ctx.require(base, &Permission::STOCK_WRITE)?;
            expected.check(tx.state().ledger.stock_box(label)?.version())?;
            tx.state_mut().ledger.move_box(label, from, to, ctx)?;
            box_view(tx.state(), label)
        })
    }

    /// Soft delete; the box and its audit history stay queryable.
    pub fn delete_box(&self, ctx: &ActorContext, label: &BoxLabel) -> ServiceResult<BoxView> {
        self.command("delete_box", ctx, |tx| {
            let base = live_box_base(tx.state(), label)?;
            ctx.require(base, &Permission::STOCK_WRITE)?;
            tx.state_mut().ledger.delete_box(label, ctx)?;
            box_view(tx.state(), label)
        })
    }

    /// Split `amount` units off `source` into a new loose collection at `into`.
    pub fn split_quantity(
        &self,
        ctx: &ActorContext,
        source: &CollectionRef,
        amount: u64,
        into: LocationId,
    ) -> ServiceResult<ItemsCollection> {
        self.command("split_quantity", ctx, |tx| {
            let base = tx.state().ledger.collection(source)?.base_id();
            ctx.require(base, &Permission::STOCK_WRITE)?;
            if tx.state().ledger.location(into)?.base_id != base {
                return Err(DomainError::validation(format!(
                    "location {into} belongs to another base"
                ))
                .into());
            }
            let id = tx
                .state_mut()
                .ledger
                .split_quantity(source, amount, Custody::Location(into), ctx)?;
            Ok(tx.state().ledger.collection(&CollectionRef::Unboxed(id))?)
        })
    }

    /// Move `amount` units of `source` into `target` (same product/size).
    pub fn merge_quantity(
        &self,
        ctx: &ActorContext,
        source: &CollectionRef,
        target: &CollectionRef,
        amount: u64,
    ) -> ServiceResult<ItemsCollection> {
        self.command("merge_quantity", ctx, |tx| {
            let base = tx.state().ledger.collection(target)?.base_id();
            ctx.require(base, &Permission::STOCK_WRITE)?;
            tx.state_mut()
                .ledger
                .transfer_quantity(source, target, amount, ctx)?;
            Ok(tx.state().ledger.collection(target)?)
        })
    }

    pub fn set_box_state(
        &self,
        ctx: &ActorContext,
        label: &BoxLabel,
        state: BoxState,
    ) -> ServiceResult<BoxView> {
        self.command("set_box_state", ctx, |tx| {
            let base = live_box_base(tx.state(), label)?;
            ctx.require(base, &Permission::STOCK_WRITE)?;
            tx.state_mut().ledger.set_box_state(label, state, ctx)?;
            box_view(tx.state(), label)
        })
    }

    pub fn box_by_label(&self, ctx: &ActorContext, label: &BoxLabel) -> ServiceResult<BoxView> {
        self.store.read(|state| {
            let b = state.ledger.stock_box(label)?;
            ctx.require_any(&b.involved_bases(), &Permission::STOCK_READ)?;
            Ok(BoxView::from(b))
        })
    }

    /// Every ledger change that touched the box, oldest first.
    pub fn box_audit(&self, ctx: &ActorContext, label: &BoxLabel) -> ServiceResult<Vec<LedgerEntry>> {
        self.store.read(|state| {
            let b = state.ledger.stock_box(label)?;
            ctx.require_any(&b.involved_bases(), &Permission::STOCK_READ)?;
            let subject = CollectionRef::Box(label.clone());
            Ok(state.ledger.journal_for(&subject).cloned().collect())
        })
    }
}
