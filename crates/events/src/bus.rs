//! Fan-out of committed audit events to read-side consumers.
//!
//! Nothing is published until the store has committed the transaction that
//! produced it, so a consumer never sees a shipment, distribution event or
//! tracking group change that was later rolled back. Delivery is
//! at-least-once: consumers track the last sequence number per stream.

use std::sync::mpsc::{Receiver, TryRecvError};

/// One consumer's queue of published messages.
///
/// Every subscription receives its own copy of each message published after
/// it was opened.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Everything queued so far, without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Publish/subscribe seam between the store and its projections.
///
/// A failed `publish` never undoes the commit; the event stays in the event
/// store and a projection can be rebuilt from there.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}
