//! Append-only event store boundary.
//!
//! Every domain event a committed command emits lands here, keyed by
//! (aggregate type, aggregate id). The store is the audit trail: each stored
//! event carries its actor, timestamp and the full event payload.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::{InMemoryEventStore, StreamAppend};
pub use r#trait::{EventStore, EventStoreError, StoredEvent, StreamKey, UncommittedEvent};
