//! Audited transitions: who did what, and when.
//!
//! Records that used to carry one nullable `*_by`/`*_on` pair per lifecycle
//! step instead keep a single append-only [`AuditTrail`] of
//! [`AuditedTransition`]s, parameterised by the record's own transition kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// One audited step in a record's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditedTransition<K> {
    pub actor: UserId,
    pub at: DateTime<Utc>,
    pub kind: K,
}

impl<K> AuditedTransition<K> {
    pub fn new(actor: UserId, at: DateTime<Utc>, kind: K) -> Self {
        Self { actor, at, kind }
    }
}

/// Append-only history of audited transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditTrail<K>(Vec<AuditedTransition<K>>);

impl<K> Default for AuditTrail<K> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<K: PartialEq> AuditTrail<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, actor: UserId, at: DateTime<Utc>, kind: K) {
        self.0.push(AuditedTransition::new(actor, at, kind));
    }

    pub fn entries(&self) -> &[AuditedTransition<K>] {
        &self.0
    }

    pub fn latest(&self) -> Option<&AuditedTransition<K>> {
        self.0.last()
    }

    /// Most recent transition of the given kind.
    pub fn last_of(&self, kind: &K) -> Option<&AuditedTransition<K>> {
        self.0.iter().rev().find(|t| &t.kind == kind)
    }

    pub fn contains(&self, kind: &K) -> bool {
        self.last_of(kind).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Step {
        Created,
        Removed,
    }

    #[test]
    fn trail_keeps_every_transition_in_order() {
        let alice = UserId::new();
        let bob = UserId::new();
        let mut trail = AuditTrail::new();
        trail.record(alice, Utc::now(), Step::Created);
        trail.record(bob, Utc::now(), Step::Removed);

        assert_eq!(trail.len(), 2);
        assert_eq!(trail.latest().map(|t| t.actor), Some(bob));
        assert_eq!(trail.last_of(&Step::Created).map(|t| t.actor), Some(alice));
        assert!(trail.contains(&Step::Removed));
    }
}
