//! Infrastructure layer: transactional store, audit event store, the
//! command/query service, idempotency, configuration and projections.

pub mod config;
pub mod error;
pub mod event_store;
pub mod idempotency;
pub mod projections;
pub mod retry;
pub mod service;
pub mod store;
pub mod views;

pub use config::{IdempotencySettings, RetrySettings, Settings};
pub use error::{ServiceError, ServiceResult};
pub use idempotency::IdempotencyKey;
pub use service::BoxflowService;
pub use store::{InMemoryStore, State, Transaction};
pub use views::{BoxView, DistributionEventView, FlowTotalsRow, ShipmentView, TrackingGroupView};

#[cfg(test)]
mod integration_tests;
