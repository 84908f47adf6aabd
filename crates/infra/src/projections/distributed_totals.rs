use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use boxflow_core::{AggregateId, BaseId, StockKey};
use boxflow_distribution::{KeyedQuantity, TrackingEvent};
use boxflow_events::{EventEnvelope, Subscription};

use crate::store::TRACKING_GROUP;

const COMPLETED: &str = "tracking_group.completed";

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize tracking group event: {0}")]
    Deserialize(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("projection lock poisoned")]
    Poisoned,
}

/// Distributed quantity per (base, product/size), accumulated from completed
/// tracking groups.
#[derive(Debug, Default)]
pub struct DistributedTotalsProjection {
    totals: RwLock<BTreeMap<BaseId, BTreeMap<StockKey, u64>>>,
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

impl DistributedTotalsProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, base: BaseId, key: &StockKey) -> u64 {
        self.totals
            .read()
            .ok()
            .and_then(|t| t.get(&base).and_then(|m| m.get(key)).copied())
            .unwrap_or(0)
    }

    pub fn for_base(&self, base: BaseId) -> Vec<KeyedQuantity> {
        let Ok(totals) = self.totals.read() else {
            return Vec::new();
        };
        totals
            .get(&base)
            .map(|m| {
                m.iter()
                    .map(|(key, quantity)| KeyedQuantity {
                        key: key.clone(),
                        quantity: *quantity,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Apply one published envelope. Other aggregate types are ignored;
    /// replays at or below the stream cursor are skipped.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != TRACKING_GROUP {
            return Ok(());
        }
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let mut cursors = self.cursors.write().map_err(|_| ProjectionError::Poisoned)?;
        let last = cursors.get(&aggregate_id).copied().unwrap_or(0);
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }

        if envelope.event_type() == COMPLETED {
            let event: TrackingEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;
            if let TrackingEvent::Completed(done) = event {
                let mut totals = self.totals.write().map_err(|_| ProjectionError::Poisoned)?;
                let per_key = totals.entry(done.base_id).or_default();
                for item in done.distributed {
                    *per_key.entry(item.key).or_insert(0) += item.quantity;
                }
            }
        }

        cursors.insert(aggregate_id, seq);
        Ok(())
    }

    /// Apply everything currently queued on `subscription`.
    pub fn drain(
        &self,
        subscription: &Subscription<EventEnvelope<JsonValue>>,
    ) -> Result<usize, ProjectionError> {
        let envelopes = subscription.drain();
        for envelope in &envelopes {
            self.apply_envelope(envelope)?;
        }
        Ok(envelopes.len())
    }

    /// Rebuild from scratch, e.g. from the event store.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.cursors.write().map_err(|_| ProjectionError::Poisoned)?.clear();
        self.totals.write().map_err(|_| ProjectionError::Poisoned)?.clear();

        let mut envelopes: Vec<_> = envelopes.into_iter().collect();
        envelopes.sort_by_key(|e| (e.aggregate_id(), e.sequence_number()));
        for envelope in &envelopes {
            self.apply_envelope(envelope)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxflow_core::{ProductId, SizeId, TrackingGroupId, UserId};
    use boxflow_distribution::TrackingGroupCompleted;
    use chrono::Utc;
    use uuid::Uuid;

    fn completed(group: TrackingGroupId, base: BaseId, key: &StockKey, qty: u64, seq: u64) -> EventEnvelope<JsonValue> {
        let event = TrackingEvent::Completed(TrackingGroupCompleted {
            group_id: group,
            base_id: base,
            events: Vec::new(),
            distributed: vec![KeyedQuantity {
                key: key.clone(),
                quantity: qty,
            }],
            returned: Vec::new(),
            actor: UserId::new(),
            occurred_at: Utc::now(),
        });
        EventEnvelope::new(
            Uuid::now_v7(),
            group.into(),
            TRACKING_GROUP,
            seq,
            COMPLETED,
            UserId::new(),
            Utc::now(),
            serde_json::to_value(&event).unwrap(),
        )
    }

    #[test]
    fn accumulates_per_base_and_ignores_replays() {
        let projection = DistributedTotalsProjection::new();
        let base = BaseId::new();
        let key = StockKey::sized(ProductId::new(), SizeId::new());

        let first = completed(TrackingGroupId::new(), base, &key, 12, 1);
        projection.apply_envelope(&first).unwrap();
        projection.apply_envelope(&first).unwrap();
        projection
            .apply_envelope(&completed(TrackingGroupId::new(), base, &key, 3, 1))
            .unwrap();

        assert_eq!(projection.get(base, &key), 15);
        assert_eq!(projection.for_base(base).len(), 1);
        assert_eq!(projection.get(BaseId::new(), &key), 0);
    }

    #[test]
    fn gaps_are_reported() {
        let projection = DistributedTotalsProjection::new();
        let key = StockKey::sized(ProductId::new(), SizeId::new());
        let err = projection
            .apply_envelope(&completed(TrackingGroupId::new(), BaseId::new(), &key, 1, 4))
            .unwrap_err();
        assert!(matches!(err, ProjectionError::NonMonotonicSequence { last: 0, found: 4 }));
    }
}
