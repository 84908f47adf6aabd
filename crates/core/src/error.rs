//! Domain error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is a deterministic business failure. An operation returning one
/// of these has made no observable change.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. zero quantity, empty label).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced box, collection, shipment, event or group is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// The command is not legal from the aggregate's current state.
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// The requested amount exceeds what the source currently holds.
    #[error("insufficient quantity: requested {requested}, available {available}")]
    InsufficientQuantity { requested: u64, available: u64 },

    /// Returned quantities exceed what went out for a product/size.
    #[error("over-return: {0}")]
    OverReturn(String),

    /// The actor lacks membership/permission for the base involved.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Optimistic-lock or check-and-set failure; safe to retry.
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),
}

/// Stable, serialisable classification of a [`DomainError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    InvalidId,
    NotFound,
    InvalidStateTransition,
    InsufficientQuantity,
    OverReturn,
    Unauthorized,
    ConcurrentModification,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidStateTransition(msg.into())
    }

    pub fn insufficient(requested: u64, available: u64) -> Self {
        Self::InsufficientQuantity {
            requested,
            available,
        }
    }

    pub fn over_return(msg: impl Into<String>) -> Self {
        Self::OverReturn(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn concurrent(msg: impl Into<String>) -> Self {
        Self::ConcurrentModification(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation(_) => ErrorKind::Validation,
            DomainError::InvalidId(_) => ErrorKind::InvalidId,
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::InvalidStateTransition(_) => ErrorKind::InvalidStateTransition,
            DomainError::InsufficientQuantity { .. } => ErrorKind::InsufficientQuantity,
            DomainError::OverReturn(_) => ErrorKind::OverReturn,
            DomainError::Unauthorized(_) => ErrorKind::Unauthorized,
            DomainError::ConcurrentModification(_) => ErrorKind::ConcurrentModification,
        }
    }

    /// Only `ConcurrentModification` should be retried automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::ConcurrentModification(_))
    }
}
