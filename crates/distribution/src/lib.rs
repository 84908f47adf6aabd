//! Distribution events, packing-list reconciliation and return tracking.
//!
//! - [`event`]: the distribution event lifecycle aggregate.
//! - [`packing`]: packing list vs. assigned collections.
//! - [`tracking`]: tracking groups and the net-distributed computation.
//! - [`engine`]: authorization and ledger effects around both aggregates.

pub mod engine;
pub mod event;
pub mod packing;
pub mod tracking;

pub use engine::DistributionEngine;
pub use event::*;
pub use packing::{
    EntryFulfillment, OverPackingPolicy, PackingPolicy, PackingReport, PackingState, reconcile,
};
pub use tracking::*;
