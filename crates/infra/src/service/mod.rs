//! Command/query surface of boxflow.
//!
//! Every command takes an explicit [`ActorContext`] (who acts, for which
//! base, when), runs in one store transaction and returns the updated view or
//! a typed error. Commands acting on an existing aggregate take an
//! [`ExpectedVersion`](boxflow_core::ExpectedVersion); pass `Any` to skip the check.

mod distribution;
mod ledger;
mod shipments;
mod tracking;

use serde_json::Value as JsonValue;

use boxflow_auth::ActorContext;
use boxflow_events::{EventBus, EventEnvelope};

use crate::config::Settings;
use crate::error::ServiceResult;
use crate::retry;
use crate::store::{DefaultBus, InMemoryStore, Transaction};
use crate::views::Summary;

pub struct BoxflowService<B = DefaultBus> {
    store: InMemoryStore<B>,
    settings: Settings,
}

impl BoxflowService<DefaultBus> {
    /// Service over a fresh in-memory store and bus.
    pub fn in_memory(settings: Settings) -> Self {
        let idempotency = settings.idempotency.records();
        Self::new(
            InMemoryStore::with_idempotency(DefaultBus::new(), idempotency),
            settings,
        )
    }

    /// Load settings from file and environment, install logging, and start an
    /// in-memory service.
    pub fn bootstrap() -> anyhow::Result<Self> {
        let settings = Settings::load()?;
        boxflow_observability::init_with(&settings.logging);
        tracing::info!(
            packing = ?settings.packing,
            retry_attempts = settings.retry.max_attempts,
            "boxflow service starting"
        );
        Ok(Self::in_memory(settings))
    }
}

impl<B> BoxflowService<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: InMemoryStore<B>, settings: Settings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &InMemoryStore<B> {
        &self.store
    }

    /// Retry `op` on `ConcurrentModification`, bounded by `retry.max_attempts`.
    pub fn with_retry<T>(&self, op: impl FnMut() -> ServiceResult<T>) -> ServiceResult<T> {
        retry::with_retry(&self.settings.retry, op)
    }

    fn command<T: Summary>(
        &self,
        op: &'static str,
        ctx: &ActorContext,
        f: impl FnOnce(&mut Transaction<'_>) -> ServiceResult<T>,
    ) -> ServiceResult<T> {
        match self.store.transact(f) {
            Ok(view) => {
                tracing::info!(
                    op,
                    actor = %ctx.actor(),
                    base = %ctx.acting_base(),
                    subject = %view.subject(),
                    state = %view.status(),
                    "command committed"
                );
                Ok(view)
            }
            Err(err) => {
                tracing::warn!(
                    op,
                    actor = %ctx.actor(),
                    base = %ctx.acting_base(),
                    kind = ?err.kind(),
                    error = %err,
                    "command rejected"
                );
                Err(err)
            }
        }
    }
}
