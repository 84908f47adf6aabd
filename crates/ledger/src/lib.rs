//! Quantity ledger: the authoritative record of where every box and loose
//! items collection is and how many units it holds.
//!
//! All higher-level flows (shipments, distribution events, return tracking)
//! move quantities exclusively through [`QuantityLedger`] so the audit log
//! captures every change.

pub mod audit;
pub mod collection;
pub mod ledger;
pub mod location;
pub mod stock_box;

pub use audit::{LedgerChange, LedgerEntry};
pub use collection::{CollectionRef, Custody, ItemsCollection, UnboxedItemsCollection};
pub use ledger::{QuantityLedger, UnassignOutcome};
pub use location::{Location, LocationKind};
pub use stock_box::{BoxState, StockBox};
