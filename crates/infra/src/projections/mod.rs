//! Projections (read model builders) fed from the event bus.
//!
//! Projections are rebuildable from the event store and idempotent under
//! at-least-once delivery.

pub mod distributed_totals;

pub use distributed_totals::{DistributedTotalsProjection, ProjectionError};
