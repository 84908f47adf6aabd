//! Shipments: moving boxes from a source base to a target base.
//!
//! [`Shipment`] is a pure aggregate (decide/evolve); [`ShipmentEngine`]
//! authorizes each command and applies its quantity effects through the
//! [`boxflow_ledger::QuantityLedger`] before evolving the aggregate.

pub mod engine;
pub mod shipment;

pub use engine::{ShipmentEngine, authorize};
pub use shipment::*;
