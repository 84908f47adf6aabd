//! `boxflow-core`: identifiers, errors and aggregate contracts.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the error model, aggregate contracts and the audit value types
//! shared by the ledger, shipment and distribution modules.

pub mod aggregate;
pub mod audit;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use audit::{AuditTrail, AuditedTransition};
pub use error::{DomainError, DomainResult, ErrorKind};
pub use id::{
    AggregateId, BaseId, BoxLabel, CollectionId, DistributionEventId, LocationId, OrganisationId,
    PackingListEntryId, ProductId, ShipmentDetailId, ShipmentId, SizeId, TrackingEntryId,
    TrackingGroupId, TransferAgreementId, UserId,
};
pub use value_object::{SizeSpec, StockKey, ValueObject};
