use std::collections::HashMap;
use std::sync::RwLock;

use boxflow_core::ExpectedVersion;

use super::r#trait::{EventStore, EventStoreError, StoredEvent, StreamKey, UncommittedEvent};

/// One stream's share of a multi-stream append.
#[derive(Debug, Clone)]
pub struct StreamAppend {
    pub events: Vec<UncommittedEvent>,
    pub expected_version: ExpectedVersion,
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<StreamKey, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }

    fn validate_batch(events: &[UncommittedEvent]) -> Result<Option<StreamKey>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(None);
        };
        for (idx, e) in events.iter().enumerate() {
            if e.aggregate_id != first.aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != first.aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }
        Ok(Some(first.stream_key()))
    }

    /// Append to several streams at once.
    ///
    /// Every stream's expected version is checked before anything is written,
    /// so either every batch is committed or none is.
    pub fn append_all(
        &self,
        appends: Vec<StreamAppend>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let mut keyed = Vec::with_capacity(appends.len());
        for append in appends {
            if let Some(key) = Self::validate_batch(&append.events)? {
                keyed.push((key, append));
            }
        }

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::Poisoned)?;

        for (key, append) in &keyed {
            let current = streams
                .get(key)
                .map(|s| Self::current_version(s))
                .unwrap_or(0);
            if !append.expected_version.matches(current) {
                return Err(EventStoreError::Concurrency(format!(
                    "stream {}/{}: expected {:?}, found {current}",
                    key.aggregate_type, key.aggregate_id, append.expected_version
                )));
            }
        }

        let mut committed = Vec::new();
        for (key, append) in keyed {
            let stream = streams.entry(key).or_default();
            let mut next = Self::current_version(stream) + 1;
            for e in append.events {
                let stored = StoredEvent {
                    event_id: e.event_id,
                    aggregate_id: e.aggregate_id,
                    aggregate_type: e.aggregate_type,
                    sequence_number: next,
                    event_type: e.event_type,
                    event_version: e.event_version,
                    actor: e.actor,
                    occurred_at: e.occurred_at,
                    payload: e.payload,
                };
                next += 1;
                stream.push(stored.clone());
                committed.push(stored);
            }
        }

        Ok(committed)
    }

    /// Every stored event across all streams, ordered by stream then sequence.
    pub fn all_events(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self.streams.read().map_err(|_| EventStoreError::Poisoned)?;
        let mut keys: Vec<_> = streams.keys().collect();
        keys.sort();
        Ok(keys
            .into_iter()
            .flat_map(|k| streams[k].iter().cloned())
            .collect())
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.append_all(vec![StreamAppend {
            events,
            expected_version,
        }])
    }

    fn load_stream(&self, key: &StreamKey) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self.streams.read().map_err(|_| EventStoreError::Poisoned)?;
        Ok(streams.get(key).cloned().unwrap_or_default())
    }
}
