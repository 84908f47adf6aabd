//! Service-level error: domain failures plus infrastructure failures.

use thiserror::Error;

use boxflow_core::{DomainError, ErrorKind};

use crate::event_store::EventStoreError;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Deterministic business failure; nothing was changed.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Persisting the audit stream failed for a reason other than concurrency.
    #[error("event store failure: {0}")]
    Store(EventStoreError),

    /// A lock guarding shared state was poisoned by a panicking writer.
    #[error("state lock poisoned")]
    Poisoned,
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<EventStoreError> for ServiceError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => {
                ServiceError::Domain(DomainError::ConcurrentModification(msg))
            }
            EventStoreError::Poisoned => ServiceError::Poisoned,
            other => ServiceError::Store(other),
        }
    }
}

impl ServiceError {
    /// Classification for domain failures; `None` for infrastructure failures.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ServiceError::Domain(e) => Some(e.kind()),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Domain(e) if e.is_retryable())
    }

    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(e) => Some(e),
            _ => None,
        }
    }
}
