//! Caller-supplied idempotency keys for quantity-bearing commands.
//!
//! A key is scoped to the base the caller acts for, so two bases never share
//! a key space. The scoped key and a fingerprint of the request are recorded
//! when the command's transaction commits. A retry with the same key and
//! fingerprint is a replay; the same key with a different request is refused.
//! Records expire after a time-to-live and the oldest are evicted beyond a
//! fixed capacity.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use boxflow_core::{BaseId, DomainError, DomainResult};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn new(key: impl Into<String>) -> DomainResult<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(DomainError::validation("idempotency key cannot be empty"));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical JSON of the request, excluding timestamps and generated ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(request: &impl Serialize) -> DomainResult<Self> {
        serde_json::to_string(request)
            .map(Self)
            .map_err(|e| DomainError::validation(format!("request cannot be fingerprinted: {e}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// First time this key is seen; the effect must be applied.
    Fresh,
    /// Same key, same request: return the current view without re-applying.
    Replay,
}

/// An idempotency key as seen from one base.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdempotencyScope {
    pub base: BaseId,
    pub key: IdempotencyKey,
}

impl IdempotencyScope {
    pub fn new(base: BaseId, key: IdempotencyKey) -> Self {
        Self { base, key }
    }

    /// Compare a request against the fingerprint already stored for this scope.
    pub fn compare(&self, stored: &Fingerprint, fingerprint: &Fingerprint) -> DomainResult<Claim> {
        if stored == fingerprint {
            Ok(Claim::Replay)
        } else {
            Err(DomainError::validation(format!(
                "idempotency key {} was already used for a different request",
                self.key
            )))
        }
    }
}

#[derive(Debug, Clone)]
struct Record {
    fingerprint: Fingerprint,
    claimed_at: DateTime<Utc>,
}

pub const DEFAULT_TTL_SECS: i64 = 24 * 60 * 60;
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Committed claims, oldest first. Lives beside the transactional state and
/// only changes when a transaction commits.
#[derive(Debug, Clone)]
pub struct IdempotencyRecords {
    ttl: Duration,
    capacity: usize,
    seen: BTreeMap<IdempotencyScope, Record>,
    order: VecDeque<(IdempotencyScope, DateTime<Utc>)>,
}

impl Default for IdempotencyRecords {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_TTL_SECS), DEFAULT_CAPACITY)
    }
}

impl IdempotencyRecords {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            seen: BTreeMap::new(),
            order: VecDeque::new(),
        }
    }

    /// What claiming `scope` at `at` would yield, without recording anything.
    /// Expired records count as unseen.
    pub fn check(
        &self,
        scope: &IdempotencyScope,
        fingerprint: &Fingerprint,
        at: DateTime<Utc>,
    ) -> DomainResult<Claim> {
        match self.seen.get(scope) {
            Some(record) if at - record.claimed_at < self.ttl => {
                scope.compare(&record.fingerprint, fingerprint)
            }
            _ => Ok(Claim::Fresh),
        }
    }

    /// Record a fresh claim, then drop expired and surplus records.
    pub fn record(&mut self, scope: IdempotencyScope, fingerprint: Fingerprint, at: DateTime<Utc>) {
        self.order.push_back((scope.clone(), at));
        self.seen.insert(
            scope,
            Record {
                fingerprint,
                claimed_at: at,
            },
        );
        self.evict(at);
    }

    /// [`check`](Self::check) and, when fresh, [`record`](Self::record).
    pub fn claim(
        &mut self,
        scope: &IdempotencyScope,
        fingerprint: Fingerprint,
        at: DateTime<Utc>,
    ) -> DomainResult<Claim> {
        let claim = self.check(scope, &fingerprint, at)?;
        if claim == Claim::Fresh {
            self.record(scope.clone(), fingerprint, at);
        }
        Ok(claim)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        while let Some((_, oldest)) = self.order.front() {
            let expired = now - *oldest >= self.ttl;
            if !expired && self.seen.len() <= self.capacity {
                break;
            }
            if let Some((scope, claimed_at)) = self.order.pop_front() {
                // A scope re-claimed after expiry has a newer entry further back.
                if self.seen.get(&scope).is_some_and(|r| r.claimed_at == claimed_at) {
                    self.seen.remove(&scope);
                }
            }
        }
    }
}
