//! Packing list reconciliation.
//!
//! For every packing list entry, `actual` is the sum of the quantities of the
//! collections currently assigned to the event under the same product/size.
//! Fulfillment is always derived, never stored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use boxflow_core::{DomainError, DomainResult, PackingListEntryId, StockKey};
use boxflow_ledger::ItemsCollection;

use crate::event::PackingListEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackingState {
    NotStarted,
    PackingInProgress,
    Packed,
}

impl PackingState {
    pub fn derive(actual: u64, target: u64) -> Self {
        if actual == 0 {
            PackingState::NotStarted
        } else if actual < target {
            PackingState::PackingInProgress
        } else {
            PackingState::Packed
        }
    }
}

/// What to do when assigned quantities exceed an entry's target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverPackingPolicy {
    /// Accept silently.
    Allow,
    /// Accept and flag the entry for review.
    #[default]
    Flag,
    /// Refuse assignments that would exceed the target.
    Reject,
}

/// Packing rules applied by the distribution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackingPolicy {
    /// Refuse Packing -> OnDistro unless every entry is packed.
    #[serde(default)]
    pub require_full_packing: bool,
    #[serde(default)]
    pub over_packing: OverPackingPolicy,
}

impl PackingPolicy {
    /// Check that assigning `quantity` more of `key` is acceptable.
    pub fn check_assignment(
        &self,
        report: &PackingReport,
        key: &StockKey,
        quantity: u64,
    ) -> DomainResult<()> {
        if self.over_packing != OverPackingPolicy::Reject {
            return Ok(());
        }
        match report.entry_for(key) {
            Some(entry) if entry.actual + quantity > entry.target => {
                Err(DomainError::validation(format!(
                    "assigning {quantity} of {key} would exceed the packing target of {} ({} already packed)",
                    entry.target, entry.actual
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Fulfillment of one packing list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFulfillment {
    pub entry_id: PackingListEntryId,
    pub key: StockKey,
    pub target: u64,
    pub actual: u64,
    pub state: PackingState,
    /// Set when `actual > target` and the policy flags over-packing.
    pub over_packed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackingReport {
    pub entries: Vec<EntryFulfillment>,
}

impl PackingReport {
    /// All entries packed. An empty packing list is trivially packed.
    pub fn is_fully_packed(&self) -> bool {
        self.entries.iter().all(|e| e.state == PackingState::Packed)
    }

    pub fn entry_for(&self, key: &StockKey) -> Option<&EntryFulfillment> {
        self.entries.iter().find(|e| &e.key == key)
    }

    pub fn over_packed(&self) -> impl Iterator<Item = &EntryFulfillment> {
        self.entries.iter().filter(|e| e.over_packed)
    }
}

/// Sum assigned quantities per product/size.
pub fn actual_by_key<'a>(
    assigned: impl IntoIterator<Item = &'a ItemsCollection>,
) -> BTreeMap<StockKey, u64> {
    let mut totals = BTreeMap::new();
    for collection in assigned {
        // Both kinds contribute through the same projection.
        let quantity = match collection {
            ItemsCollection::Boxed(b) => b.quantity(),
            ItemsCollection::Unboxed(c) => c.quantity(),
        };
        *totals.entry(collection.key().clone()).or_insert(0) += quantity;
    }
    totals
}

pub fn reconcile(
    packing_list: &[PackingListEntry],
    assigned: &[ItemsCollection],
    policy: OverPackingPolicy,
) -> PackingReport {
    reconcile_totals(packing_list, &actual_by_key(assigned), policy)
}

pub fn reconcile_totals(
    packing_list: &[PackingListEntry],
    actual: &BTreeMap<StockKey, u64>,
    policy: OverPackingPolicy,
) -> PackingReport {
    let entries = packing_list
        .iter()
        .map(|entry| {
            let actual = actual.get(&entry.key).copied().unwrap_or(0);
            EntryFulfillment {
                entry_id: entry.id,
                key: entry.key.clone(),
                target: entry.target,
                actual,
                state: PackingState::derive(actual, entry.target),
                over_packed: policy == OverPackingPolicy::Flag && actual > entry.target,
            }
        })
        .collect();
    PackingReport { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxflow_auth::{ActorContext, BaseMembership, Principal, Role};
    use boxflow_core::{
        BaseId, BoxLabel, DistributionEventId, LocationId, OrganisationId, ProductId, SizeId,
        UserId,
    };
    use boxflow_ledger::{CollectionRef, Custody, Location, QuantityLedger};
    use proptest::prelude::*;

    fn entry(key: &StockKey, target: u64) -> PackingListEntry {
        PackingListEntry {
            id: PackingListEntryId::new(),
            key: key.clone(),
            target,
        }
    }

    #[test]
    fn box_then_loose_items_fill_the_entry() {
        let base = BaseId::new();
        let principal = Principal::new(UserId::new(), OrganisationId::new())
            .with_membership(BaseMembership::with_roles(base, vec![Role::COORDINATOR]));
        let ctx = ActorContext::now(principal, base);
        let shelf = LocationId::new();
        let event = DistributionEventId::new();
        let key = StockKey::sized(ProductId::new(), SizeId::new());
        let mut ledger = QuantityLedger::new();
        ledger
            .register_location(Location::warehouse(shelf, base, "Shelf"), &ctx)
            .unwrap();
        let six = BoxLabel::new("six").unwrap();
        let bulk = BoxLabel::new("bulk").unwrap();
        ledger.intake_box(six.clone(), shelf, key.clone(), 6, &ctx).unwrap();
        ledger.intake_box(bulk.clone(), shelf, key.clone(), 20, &ctx).unwrap();
        let list = vec![entry(&key, 10)];
        let held = |ledger: &QuantityLedger| ledger.collections_held_by(&Custody::DistributionEvent(event));

        let report = reconcile(&list, &held(&ledger), OverPackingPolicy::Flag);
        assert_eq!(report.entries[0].state, PackingState::NotStarted);

        ledger
            .assign_to_event(&CollectionRef::Box(six), event, &ctx)
            .unwrap();
        let report = reconcile(&list, &held(&ledger), OverPackingPolicy::Flag);
        assert_eq!(report.entries[0].actual, 6);
        assert_eq!(report.entries[0].state, PackingState::PackingInProgress);

        ledger
            .split_quantity(
                &CollectionRef::Box(bulk),
                4,
                Custody::DistributionEvent(event),
                &ctx,
            )
            .unwrap();
        let report = reconcile(&list, &held(&ledger), OverPackingPolicy::Flag);
        assert_eq!(report.entries[0].actual, 10);
        assert_eq!(report.entries[0].state, PackingState::Packed);
        assert!(report.is_fully_packed());
        assert!(!report.entries[0].over_packed);
    }

    #[test]
    fn over_packing_follows_policy() {
        let key = StockKey::sized(ProductId::new(), SizeId::new());
        let list = vec![entry(&key, 5)];
        let actual = BTreeMap::from([(key.clone(), 7)]);

        let flagged = reconcile_totals(&list, &actual, OverPackingPolicy::Flag);
        assert_eq!(flagged.entries[0].state, PackingState::Packed);
        assert_eq!(flagged.over_packed().count(), 1);

        let allowed = reconcile_totals(&list, &actual, OverPackingPolicy::Allow);
        assert_eq!(allowed.over_packed().count(), 0);

        let policy = PackingPolicy {
            require_full_packing: false,
            over_packing: OverPackingPolicy::Reject,
        };
        let report = reconcile_totals(&list, &BTreeMap::from([(key.clone(), 3)]), policy.over_packing);
        assert!(policy.check_assignment(&report, &key, 2).is_ok());
        assert!(matches!(
            policy.check_assignment(&report, &key, 3),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn unplanned_items_do_not_affect_the_report() {
        let planned = StockKey::sized(ProductId::new(), SizeId::new());
        let other = StockKey::sized(ProductId::new(), SizeId::new());
        let list = vec![entry(&planned, 5)];
        let report = reconcile_totals(&list, &BTreeMap::from([(other, 50)]), OverPackingPolicy::Flag);
        assert_eq!(report.entries[0].state, PackingState::NotStarted);
        assert!(!report.is_fully_packed());
    }

    proptest! {
        /// Property: while assignment is open, adding a collection never
        /// decreases any entry's actual quantity.
        #[test]
        fn fulfillment_is_monotonic(
            targets in prop::collection::vec(1u64..30, 1..4),
            additions in prop::collection::vec((0usize..4, 0u64..15), 0..20),
        ) {
            let keys: Vec<StockKey> = (0..4).map(|_| StockKey::sized(ProductId::new(), SizeId::new())).collect();
            let list: Vec<PackingListEntry> = targets.iter().enumerate().map(|(i, t)| entry(&keys[i], *t)).collect();
            let mut actual = BTreeMap::new();
            let mut previous = reconcile_totals(&list, &actual, OverPackingPolicy::Flag);

            for (k, qty) in additions {
                *actual.entry(keys[k].clone()).or_insert(0) += qty;
                let next = reconcile_totals(&list, &actual, OverPackingPolicy::Flag);
                for (before, after) in previous.entries.iter().zip(&next.entries) {
                    prop_assert!(after.actual >= before.actual);
                    prop_assert!(after.state as u8 >= before.state as u8);
                }
                previous = next;
            }
        }
    }
}
