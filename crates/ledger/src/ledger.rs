use std::collections::BTreeMap;

use boxflow_auth::ActorContext;
use boxflow_core::{
    BaseId, BoxLabel, CollectionId, DistributionEventId, DomainError, DomainResult, LocationId,
    ShipmentId, StockKey,
};

use crate::audit::{LedgerChange, LedgerEntry};
use crate::collection::{CollectionRef, Custody, ItemsCollection, UnboxedItemsCollection};
use crate::location::Location;
use crate::stock_box::{BoxState, StockBox};

/// Where an unassigned collection ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnassignOutcome {
    /// Put back at a location as-is.
    Restocked(LocationId),
    /// Quantity merged back into the box it was split from.
    MergedInto(BoxLabel),
}

/// In-memory quantity ledger.
///
/// Every mutating operation validates everything it needs before changing
/// anything, so a returned error means nothing changed. Each change appends
/// [`LedgerEntry`] records to the journal; boxes are soft-deleted only.
#[derive(Debug, Clone, Default)]
pub struct QuantityLedger {
    locations: BTreeMap<LocationId, Location>,
    boxes: BTreeMap<BoxLabel, StockBox>,
    collections: BTreeMap<CollectionId, UnboxedItemsCollection>,
    journal: Vec<LedgerEntry>,
    /// Entries that precede `journal`; non-zero only in a fork.
    journal_base: u64,
}

impl QuantityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Working copy for one unit of work. The fork starts with an empty
    /// journal whose sequence numbers continue this ledger's.
    pub fn fork(&self) -> Self {
        Self {
            locations: self.locations.clone(),
            boxes: self.boxes.clone(),
            collections: self.collections.clone(),
            journal: Vec::new(),
            journal_base: self.next_sequence() - 1,
        }
    }

    /// Take over the state of a fork of this ledger and append its journal.
    pub fn absorb(&mut self, fork: QuantityLedger) {
        debug_assert_eq!(fork.journal_base + 1, self.next_sequence());
        self.locations = fork.locations;
        self.boxes = fork.boxes;
        self.collections = fork.collections;
        self.journal.extend(fork.journal);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    pub fn location(&self, id: LocationId) -> DomainResult<&Location> {
        self.locations
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("location {id}")))
    }

    /// Box by label, including soft-deleted boxes.
    pub fn stock_box(&self, label: &BoxLabel) -> DomainResult<&StockBox> {
        self.boxes
            .get(label)
            .ok_or_else(|| DomainError::not_found(format!("box {label}")))
    }

    pub fn unboxed(&self, id: CollectionId) -> DomainResult<&UnboxedItemsCollection> {
        self.collections
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("collection {id}")))
    }

    pub fn collection(&self, reference: &CollectionRef) -> DomainResult<ItemsCollection> {
        match reference {
            CollectionRef::Box(label) => self.live_box(label).cloned().map(ItemsCollection::Boxed),
            CollectionRef::Unboxed(id) => self.unboxed(*id).cloned().map(ItemsCollection::Unboxed),
        }
    }

    /// Every live box and non-empty unboxed collection held by `custody`.
    pub fn collections_held_by(&self, custody: &Custody) -> Vec<ItemsCollection> {
        let boxes = self
            .boxes
            .values()
            .filter(|b| !b.deleted && &b.custody == custody)
            .cloned()
            .map(ItemsCollection::Boxed);
        let loose = self
            .collections
            .values()
            .filter(|c| c.quantity > 0 && &c.custody == custody)
            .cloned()
            .map(ItemsCollection::Unboxed);
        boxes.chain(loose).collect()
    }

    /// Units held by live boxes and loose collections across every custody,
    /// `Distributed` and `Lost` included.
    pub fn total_units(&self) -> u64 {
        let boxed: u64 = self
            .boxes
            .values()
            .filter(|b| !b.deleted)
            .map(|b| b.quantity)
            .sum();
        let loose: u64 = self.collections.values().map(|c| c.quantity).sum();
        boxed + loose
    }

    /// Entries recorded by this ledger. A fork holds only its own entries.
    pub fn journal(&self) -> &[LedgerEntry] {
        &self.journal
    }

    pub fn journal_for<'a>(
        &'a self,
        subject: &'a CollectionRef,
    ) -> impl Iterator<Item = &'a LedgerEntry> + 'a {
        self.journal.iter().filter(move |e| &e.subject == subject)
    }

    /// Units currently held by a box plus every loose collection split from it.
    pub fn lineage_total(&self, label: &BoxLabel) -> DomainResult<u64> {
        let own = self.stock_box(label)?.quantity;
        let split: u64 = self
            .collections
            .values()
            .filter(|c| c.origin.as_ref() == Some(label))
            .map(|c| c.quantity)
            .sum();
        Ok(own + split)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Intake & locations
    // ─────────────────────────────────────────────────────────────────────

    pub fn register_location(&mut self, location: Location, ctx: &ActorContext) -> DomainResult<()> {
        ctx.require_member_of_any(&[location.base_id])?;
        if location.name.trim().is_empty() {
            return Err(DomainError::validation("location name cannot be empty"));
        }
        if self.locations.contains_key(&location.id) {
            return Err(DomainError::validation(format!(
                "location {} already exists",
                location.id
            )));
        }
        self.locations.insert(location.id, location);
        Ok(())
    }

    pub fn intake_box(
        &mut self,
        label: BoxLabel,
        location_id: LocationId,
        key: StockKey,
        quantity: u64,
        ctx: &ActorContext,
    ) -> DomainResult<&StockBox> {
        let base_id = self.location(location_id)?.base_id;
        ctx.require_member_of_any(&[base_id])?;
        if self.boxes.contains_key(&label) {
            return Err(DomainError::validation(format!("label {label} already in use")));
        }

        self.boxes.insert(
            label.clone(),
            StockBox {
                label: label.clone(),
                base_id,
                location: Some(location_id),
                key: key.clone(),
                quantity,
                intake_quantity: quantity,
                state: BoxState::InStock,
                custody: Custody::Location(location_id),
                deleted: false,
                version: 1,
            },
        );
        self.record(
            ctx,
            CollectionRef::Box(label.clone()),
            LedgerChange::Intake {
                location: location_id,
                key,
            },
            0,
            quantity,
        );
        self.stock_box(&label)
    }

    /// Soft-delete a box sitting at a location. The record stays for audit.
    pub fn delete_box(&mut self, label: &BoxLabel, ctx: &ActorContext) -> DomainResult<()> {
        let b = self.live_box(label)?;
        ctx.require_member_of_any(&b.involved_bases())?;
        if !b.custody.is_location() {
            return Err(DomainError::invalid_transition(format!(
                "box {label} cannot be deleted while held by {:?}",
                b.custody
            )));
        }
        let qty = b.quantity;

        let b = self.live_box_mut(label)?;
        b.deleted = true;
        b.version += 1;
        self.record(ctx, CollectionRef::Box(label.clone()), LedgerChange::Deleted, qty, qty);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Primitive moves
    // ─────────────────────────────────────────────────────────────────────

    pub fn move_box(
        &mut self,
        label: &BoxLabel,
        from: LocationId,
        to: LocationId,
        ctx: &ActorContext,
    ) -> DomainResult<()> {
        let b = self.live_box(label)?;
        ctx.require_member_of_any(&b.involved_bases())?;
        if b.custody != Custody::Location(from) {
            return Err(DomainError::concurrent(format!(
                "box {label} is not at location {from}"
            )));
        }
        if from == to {
            return Err(DomainError::validation(format!("box {label} is already at {to}")));
        }
        let target = self.location(to)?;
        if target.base_id != b.base_id {
            return Err(DomainError::validation(format!(
                "location {to} belongs to another base"
            )));
        }
        let qty = b.quantity;

        let b = self.live_box_mut(label)?;
        b.location = Some(to);
        b.custody = Custody::Location(to);
        b.version += 1;
        self.record(
            ctx,
            CollectionRef::Box(label.clone()),
            LedgerChange::Moved { from, to },
            qty,
            qty,
        );
        Ok(())
    }

    /// Split `amount` units off an in-stock box or collection into a new loose
    /// collection held by `into`.
    pub fn split_quantity(
        &mut self,
        source: &CollectionRef,
        amount: u64,
        into: Custody,
        ctx: &ActorContext,
    ) -> DomainResult<CollectionId> {
        let id = CollectionId::new();
        self.split_quantity_as(id, source, amount, into, ctx)?;
        Ok(id)
    }

    /// [`QuantityLedger::split_quantity`] with a caller-chosen collection id.
    pub fn split_quantity_as(
        &mut self,
        id: CollectionId,
        source: &CollectionRef,
        amount: u64,
        into: Custody,
        ctx: &ActorContext,
    ) -> DomainResult<()> {
        if amount == 0 {
            return Err(DomainError::validation("amount must be positive"));
        }
        let src = self.collection(source)?;
        ctx.require_member_of_any(&[src.base_id()])?;
        Self::ensure_in_stock(&src)?;
        self.split_off(id, source, &src, amount, into, ctx)
    }

    /// Move `amount` units from one in-stock collection into another of the same product/size.
    pub fn transfer_quantity(
        &mut self,
        source: &CollectionRef,
        target: &CollectionRef,
        amount: u64,
        ctx: &ActorContext,
    ) -> DomainResult<()> {
        let src = self.collection(source)?;
        ctx.require_member_of_any(&[src.base_id()])?;
        Self::ensure_in_stock(&src)?;
        self.move_units(source, &src, target, amount, ctx)
    }

    /// Operator-driven state change for a box that is not held by a shipment or event.
    pub fn set_box_state(
        &mut self,
        label: &BoxLabel,
        new_state: BoxState,
        ctx: &ActorContext,
    ) -> DomainResult<()> {
        let b = self.live_box(label)?;
        ctx.require_member_of_any(&b.involved_bases())?;
        if !matches!(b.custody, Custody::Location(_) | Custody::Lost) {
            return Err(DomainError::invalid_transition(format!(
                "box {label} is held by {:?}",
                b.custody
            )));
        }
        if !new_state.is_manually_settable() {
            return Err(DomainError::invalid_transition(format!(
                "{new_state:?} can only be reached through a shipment"
            )));
        }
        if b.state == new_state {
            return Err(DomainError::validation(format!("box {label} is already {new_state:?}")));
        }
        let new_custody = match (new_state, b.location) {
            (BoxState::Lost, _) => Custody::Lost,
            (_, Some(loc)) => Custody::Location(loc),
            (_, None) => {
                return Err(DomainError::validation(format!(
                    "box {label} has no location to return to"
                )));
            }
        };

        let from = b.state;
        let old_custody = b.custody.clone();
        let qty = b.quantity;
        let b = self.live_box_mut(label)?;
        b.state = new_state;
        b.custody = new_custody.clone();
        b.version += 1;

        let subject = CollectionRef::Box(label.clone());
        self.record(
            ctx,
            subject.clone(),
            LedgerChange::StateChanged { from, to: new_state },
            qty,
            qty,
        );
        if old_custody != new_custody {
            self.record(
                ctx,
                subject,
                LedgerChange::CustodyChanged {
                    from: old_custody,
                    to: new_custody,
                },
                qty,
                qty,
            );
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Shipment custody
    // ─────────────────────────────────────────────────────────────────────

    pub fn mark_for_shipment(
        &mut self,
        label: &BoxLabel,
        shipment_id: ShipmentId,
        target_base: BaseId,
        ctx: &ActorContext,
    ) -> DomainResult<()> {
        let b = self.live_box(label)?;
        ctx.require_member_of_any(&[b.base_id])?;
        if !b.custody.is_location() {
            return Err(DomainError::concurrent(format!(
                "box {label} is already held by {:?}",
                b.custody
            )));
        }
        if b.state != BoxState::InStock {
            return Err(DomainError::invalid_transition(format!(
                "box {label} is {:?}, not InStock",
                b.state
            )));
        }
        self.set_custody_and_state(
            label,
            Custody::Shipment {
                shipment_id,
                target_base,
            },
            BoxState::MarkedForShipment,
            ctx,
        )
    }

    /// Put boxes marked for a shipment back in stock where they were.
    pub fn release_from_shipment(
        &mut self,
        labels: &[BoxLabel],
        shipment_id: ShipmentId,
        ctx: &ActorContext,
    ) -> DomainResult<()> {
        let mut plan = Vec::with_capacity(labels.len());
        for label in labels {
            let b = self.shipment_box(label, shipment_id, BoxState::MarkedForShipment, ctx)?;
            let loc = b.location.ok_or_else(|| {
                DomainError::validation(format!("box {label} has no location to return to"))
            })?;
            plan.push((label, loc));
        }
        for (label, loc) in plan {
            self.set_custody_and_state(label, Custody::Location(loc), BoxState::InStock, ctx)?;
        }
        Ok(())
    }

    /// Move every listed box of a shipment from one state to the next.
    ///
    /// All boxes are checked before any is changed. Boxes reaching `Lost` leave
    /// shipment custody.
    pub fn advance_shipment_boxes(
        &mut self,
        labels: &[BoxLabel],
        shipment_id: ShipmentId,
        from: BoxState,
        to: BoxState,
        ctx: &ActorContext,
    ) -> DomainResult<()> {
        for label in labels {
            self.shipment_box(label, shipment_id, from, ctx)?;
        }
        for label in labels {
            let custody = if to == BoxState::Lost {
                Custody::Lost
            } else {
                self.live_box(label)?.custody.clone()
            };
            self.set_custody_and_state(label, custody, to, ctx)?;
        }
        Ok(())
    }

    /// Book a received box into the target base, as re-specified by the receiver.
    #[allow(clippy::too_many_arguments)]
    pub fn receive_box(
        &mut self,
        label: &BoxLabel,
        shipment_id: ShipmentId,
        location_id: LocationId,
        key: StockKey,
        quantity: u64,
        ctx: &ActorContext,
    ) -> DomainResult<()> {
        let b = self.shipment_box(label, shipment_id, BoxState::Receiving, ctx)?;
        let target_base = match b.custody {
            Custody::Shipment { target_base, .. } => target_base,
            _ => return Err(DomainError::concurrent(format!("box {label} left the shipment"))),
        };
        ctx.require_member_of_any(&[target_base])?;
        if self.location(location_id)?.base_id != target_base {
            return Err(DomainError::validation(format!(
                "location {location_id} does not belong to the receiving base"
            )));
        }
        if quantity > b.quantity {
            return Err(DomainError::insufficient(quantity, b.quantity));
        }

        let before_qty = b.quantity;
        let before_key = b.key.clone();
        let before_base = b.base_id;

        let b = self.live_box_mut(label)?;
        b.base_id = target_base;
        b.key = key.clone();
        b.quantity = quantity;
        b.location = Some(location_id);
        b.version += 1;

        let subject = CollectionRef::Box(label.clone());
        if before_base != target_base {
            self.record(
                ctx,
                subject.clone(),
                LedgerChange::Rebased {
                    from: before_base,
                    to: target_base,
                },
                before_qty,
                before_qty,
            );
        }
        if before_key != key {
            self.record(
                ctx,
                subject,
                LedgerChange::Reclassified {
                    from: before_key,
                    to: key,
                },
                before_qty,
                quantity,
            );
        }
        self.set_custody_and_state(label, Custody::Location(location_id), BoxState::InStock, ctx)
    }

    /// Corrective action: not-delivered boxes go back in stock at their source location.
    pub fn restock_not_delivered(
        &mut self,
        labels: &[BoxLabel],
        shipment_id: ShipmentId,
        ctx: &ActorContext,
    ) -> DomainResult<()> {
        let mut plan = Vec::with_capacity(labels.len());
        for label in labels {
            let b = self.shipment_box(label, shipment_id, BoxState::NotDelivered, ctx)?;
            let loc = b.location.ok_or_else(|| {
                DomainError::validation(format!("box {label} has no source location"))
            })?;
            plan.push((label, loc));
        }
        for (label, loc) in plan {
            self.set_custody_and_state(label, Custody::Location(loc), BoxState::InStock, ctx)?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Distribution event custody
    // ─────────────────────────────────────────────────────────────────────

    /// Check-and-set a collection from a location into an event.
    pub fn assign_to_event(
        &mut self,
        reference: &CollectionRef,
        event_id: DistributionEventId,
        ctx: &ActorContext,
    ) -> DomainResult<()> {
        let c = self.collection(reference)?;
        ctx.require_member_of_any(&[c.base_id()])?;
        if !c.custody().is_location() {
            return Err(DomainError::concurrent(format!(
                "{reference} is already held by {:?}",
                c.custody()
            )));
        }
        if let ItemsCollection::Boxed(b) = &c {
            if b.state != BoxState::InStock {
                return Err(DomainError::invalid_transition(format!(
                    "box {} is {:?}, not InStock",
                    b.label, b.state
                )));
            }
        }
        self.set_custody(reference, Custody::DistributionEvent(event_id), ctx)
    }

    /// Take a collection back out of an event.
    ///
    /// Boxes return to their prior location. Loose collections merge back into
    /// their origin box when it is in stock, otherwise they are put at `fallback`.
    pub fn unassign_from_event(
        &mut self,
        reference: &CollectionRef,
        event_id: DistributionEventId,
        fallback: LocationId,
        ctx: &ActorContext,
    ) -> DomainResult<UnassignOutcome> {
        let c = self.held_by_event(reference, event_id, ctx)?;

        match c {
            ItemsCollection::Boxed(b) => {
                let loc = b.location.unwrap_or(fallback);
                self.set_custody(reference, Custody::Location(loc), ctx)?;
                Ok(UnassignOutcome::Restocked(loc))
            }
            ItemsCollection::Unboxed(loose) => {
                let origin = loose.origin.as_ref().and_then(|label| {
                    self.live_box(label).ok().filter(|b| {
                        b.custody.is_location()
                            && b.state == BoxState::InStock
                            && b.key == loose.key
                    })
                });
                match origin {
                    Some(origin) => {
                        let label = origin.label.clone();
                        let loc = origin.location.unwrap_or(fallback);
                        self.set_custody(reference, Custody::Location(loc), ctx)?;
                        if loose.quantity > 0 {
                            self.transfer_quantity(
                                reference,
                                &CollectionRef::Box(label.clone()),
                                loose.quantity,
                                ctx,
                            )?;
                        }
                        Ok(UnassignOutcome::MergedInto(label))
                    }
                    None => {
                        self.location(fallback)?;
                        self.set_custody(reference, Custody::Location(fallback), ctx)?;
                        Ok(UnassignOutcome::Restocked(fallback))
                    }
                }
            }
        }
    }

    /// Hand an event's collection out to beneficiaries. Boxes become `Donated`.
    pub fn distribute(
        &mut self,
        reference: &CollectionRef,
        event_id: DistributionEventId,
        ctx: &ActorContext,
    ) -> DomainResult<()> {
        self.held_by_event(reference, event_id, ctx)?;
        match reference {
            CollectionRef::Box(label) => {
                self.set_custody_and_state(label, Custody::Distributed, BoxState::Donated, ctx)
            }
            CollectionRef::Unboxed(_) => self.set_custody(reference, Custody::Distributed, ctx),
        }
    }

    /// Put `amount` units an event still holds back into an in-stock collection.
    pub fn return_from_event(
        &mut self,
        source: &CollectionRef,
        event_id: DistributionEventId,
        target: &CollectionRef,
        amount: u64,
        ctx: &ActorContext,
    ) -> DomainResult<()> {
        let src = self.held_by_event(source, event_id, ctx)?;
        self.move_units(source, &src, target, amount, ctx)
    }

    /// Book `amount` units an event still holds as a new loose collection at
    /// `location_id`, which must belong to the collection's base.
    pub fn return_to_location(
        &mut self,
        source: &CollectionRef,
        event_id: DistributionEventId,
        location_id: LocationId,
        amount: u64,
        ctx: &ActorContext,
    ) -> DomainResult<CollectionId> {
        if amount == 0 {
            return Err(DomainError::validation("amount must be positive"));
        }
        let src = self.held_by_event(source, event_id, ctx)?;
        let location = self.location(location_id)?;
        if location.base_id != src.base_id() {
            return Err(DomainError::validation(format!(
                "location {location_id} does not belong to base {}",
                src.base_id()
            )));
        }
        let id = CollectionId::new();
        self.split_off(id, source, &src, amount, Custody::Location(location_id), ctx)?;
        Ok(id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn next_sequence(&self) -> u64 {
        self.journal_base + self.journal.len() as u64 + 1
    }

    fn live_box(&self, label: &BoxLabel) -> DomainResult<&StockBox> {
        match self.boxes.get(label) {
            Some(b) if !b.deleted => Ok(b),
            _ => Err(DomainError::not_found(format!("box {label}"))),
        }
    }

    fn live_box_mut(&mut self, label: &BoxLabel) -> DomainResult<&mut StockBox> {
        match self.boxes.get_mut(label) {
            Some(b) if !b.deleted => Ok(b),
            _ => Err(DomainError::not_found(format!("box {label}"))),
        }
    }

    /// A live box held by `shipment_id` in the `expected` state, readable by `ctx`.
    fn shipment_box(
        &self,
        label: &BoxLabel,
        shipment_id: ShipmentId,
        expected: BoxState,
        ctx: &ActorContext,
    ) -> DomainResult<&StockBox> {
        let b = self.live_box(label)?;
        ctx.require_member_of_any(&b.involved_bases())?;
        match b.custody {
            Custody::Shipment { shipment_id: s, .. } if s == shipment_id => {}
            _ => {
                return Err(DomainError::concurrent(format!(
                    "box {label} is not held by shipment {shipment_id}"
                )));
            }
        }
        if b.state != expected {
            return Err(DomainError::invalid_transition(format!(
                "box {label} is {:?}, expected {expected:?}",
                b.state
            )));
        }
        Ok(b)
    }

    fn ensure_in_stock(c: &ItemsCollection) -> DomainResult<()> {
        if !c.custody().is_location() {
            return Err(DomainError::invalid_transition(format!(
                "{} is not in stock at a location",
                c.reference()
            )));
        }
        if let ItemsCollection::Boxed(b) = c {
            if b.state != BoxState::InStock {
                return Err(DomainError::invalid_transition(format!(
                    "box {} is {:?}, not InStock",
                    b.label, b.state
                )));
            }
        }
        Ok(())
    }

    fn held_by_event(
        &self,
        reference: &CollectionRef,
        event_id: DistributionEventId,
        ctx: &ActorContext,
    ) -> DomainResult<ItemsCollection> {
        let c = self.collection(reference)?;
        ctx.require_member_of_any(&[c.base_id()])?;
        if c.custody() != &Custody::DistributionEvent(event_id) {
            return Err(DomainError::concurrent(format!(
                "{reference} is not held by event {event_id}"
            )));
        }
        Ok(c)
    }

    /// Carve `amount` out of the already validated `src` into collection `id`.
    fn split_off(
        &mut self,
        id: CollectionId,
        source: &CollectionRef,
        src: &ItemsCollection,
        amount: u64,
        into: Custody,
        ctx: &ActorContext,
    ) -> DomainResult<()> {
        if self.collections.contains_key(&id) {
            return Err(DomainError::validation(format!("collection {id} already exists")));
        }
        let available = src.quantity();
        if amount > available {
            return Err(DomainError::insufficient(amount, available));
        }

        let origin = match src {
            ItemsCollection::Boxed(b) => Some(b.label.clone()),
            ItemsCollection::Unboxed(c) => c.origin.clone(),
        };
        self.adjust(source, available - amount)?;
        self.collections.insert(
            id,
            UnboxedItemsCollection {
                id,
                base_id: src.base_id(),
                key: src.key().clone(),
                quantity: amount,
                custody: into,
                origin,
                version: 1,
            },
        );
        self.record(
            ctx,
            source.clone(),
            LedgerChange::SplitOff { into: id },
            available,
            available - amount,
        );
        self.record(
            ctx,
            CollectionRef::Unboxed(id),
            LedgerChange::SplitFrom {
                source: source.clone(),
            },
            0,
            amount,
        );
        Ok(())
    }

    /// Move `amount` units out of the already validated `src` into an in-stock target.
    fn move_units(
        &mut self,
        source: &CollectionRef,
        src: &ItemsCollection,
        target: &CollectionRef,
        amount: u64,
        ctx: &ActorContext,
    ) -> DomainResult<()> {
        if amount == 0 {
            return Err(DomainError::validation("amount must be positive"));
        }
        if source == target {
            return Err(DomainError::validation("source and target are the same"));
        }
        let tgt = self.collection(target)?;
        ctx.require_member_of_any(&[tgt.base_id()])?;
        if src.key() != tgt.key() {
            return Err(DomainError::validation(format!(
                "cannot merge {} into {}",
                src.key(),
                tgt.key()
            )));
        }
        Self::ensure_in_stock(&tgt)?;
        let available = src.quantity();
        if amount > available {
            return Err(DomainError::insufficient(amount, available));
        }

        let target_before = tgt.quantity();
        self.adjust(source, available - amount)?;
        self.adjust(target, target_before + amount)?;
        self.record(
            ctx,
            source.clone(),
            LedgerChange::MergedInto {
                target: target.clone(),
            },
            available,
            available - amount,
        );
        self.record(
            ctx,
            target.clone(),
            LedgerChange::Merged {
                from: source.clone(),
            },
            target_before,
            target_before + amount,
        );
        Ok(())
    }

    fn adjust(&mut self, reference: &CollectionRef, quantity: u64) -> DomainResult<()> {
        match reference {
            CollectionRef::Box(label) => {
                let b = self.live_box_mut(label)?;
                b.quantity = quantity;
                b.version += 1;
            }
            CollectionRef::Unboxed(id) => {
                let c = self
                    .collections
                    .get_mut(id)
                    .ok_or_else(|| DomainError::not_found(format!("collection {id}")))?;
                c.quantity = quantity;
                c.version += 1;
            }
        }
        Ok(())
    }

    fn set_custody(
        &mut self,
        reference: &CollectionRef,
        custody: Custody,
        ctx: &ActorContext,
    ) -> DomainResult<()> {
        let (from, qty) = match reference {
            CollectionRef::Box(label) => {
                let b = self.live_box_mut(label)?;
                let from = std::mem::replace(&mut b.custody, custody.clone());
                if let Custody::Location(loc) = custody {
                    b.location = Some(loc);
                }
                b.version += 1;
                (from, b.quantity)
            }
            CollectionRef::Unboxed(id) => {
                let c = self
                    .collections
                    .get_mut(id)
                    .ok_or_else(|| DomainError::not_found(format!("collection {id}")))?;
                let from = std::mem::replace(&mut c.custody, custody.clone());
                c.version += 1;
                (from, c.quantity)
            }
        };
        if from != custody {
            self.record(
                ctx,
                reference.clone(),
                LedgerChange::CustodyChanged { from, to: custody },
                qty,
                qty,
            );
        }
        Ok(())
    }

    fn set_custody_and_state(
        &mut self,
        label: &BoxLabel,
        custody: Custody,
        state: BoxState,
        ctx: &ActorContext,
    ) -> DomainResult<()> {
        let reference = CollectionRef::Box(label.clone());
        let b = self.live_box_mut(label)?;
        let from = std::mem::replace(&mut b.state, state);
        let qty = b.quantity;
        if from != state {
            self.record(
                ctx,
                reference.clone(),
                LedgerChange::StateChanged { from, to: state },
                qty,
                qty,
            );
        }
        self.set_custody(&reference, custody, ctx)
    }

    fn record(
        &mut self,
        ctx: &ActorContext,
        subject: CollectionRef,
        change: LedgerChange,
        quantity_before: u64,
        quantity_after: u64,
    ) {
        let sequence = self.next_sequence();
        tracing::trace!(sequence, %subject, ?change, quantity_before, quantity_after, "ledger entry");
        self.journal.push(LedgerEntry {
            sequence,
            actor: ctx.actor(),
            at: ctx.occurred_at(),
            subject,
            change,
            quantity_before,
            quantity_after,
        });
    }
}
