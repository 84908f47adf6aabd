//! Explicit per-command actor context.

use chrono::{DateTime, Utc};

use boxflow_core::{BaseId, DomainError, DomainResult, OrganisationId, UserId};

use crate::{AuthzError, Permission, Principal, authorize};

/// Who is acting, on behalf of which base, and when.
///
/// Passed into every core operation; nothing reads an ambient "current user".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    principal: Principal,
    acting_base: BaseId,
    occurred_at: DateTime<Utc>,
}

impl ActorContext {
    pub fn new(principal: Principal, acting_base: BaseId, occurred_at: DateTime<Utc>) -> Self {
        Self {
            principal,
            acting_base,
            occurred_at,
        }
    }

    /// Same actor and base, stamped now.
    pub fn now(principal: Principal, acting_base: BaseId) -> Self {
        Self::new(principal, acting_base, Utc::now())
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn actor(&self) -> UserId {
        self.principal.user_id
    }

    pub fn organisation_id(&self) -> OrganisationId {
        self.principal.organisation_id
    }

    pub fn acting_base(&self) -> BaseId {
        self.acting_base
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn at(&self, occurred_at: DateTime<Utc>) -> Self {
        Self {
            occurred_at,
            ..self.clone()
        }
    }

    /// Require that the actor acts for `base` and holds `permission` there.
    pub fn require(&self, base: BaseId, permission: &Permission) -> DomainResult<()> {
        if self.acting_base != base {
            return Err(AuthzError::ActingBaseMismatch {
                acting: self.acting_base,
                required: base,
            }
            .into());
        }
        authorize(&self.principal, base, permission).map_err(DomainError::from)
    }

    /// Require that the actor acts for, and is a member of, one of `bases`.
    ///
    /// Used by the quantity ledger, which checks base membership only; command
    /// permissions are enforced at the service boundary.
    pub fn require_member_of_any(&self, bases: &[BaseId]) -> DomainResult<()> {
        if !bases.contains(&self.acting_base) {
            return Err(DomainError::unauthorized(format!(
                "acting base {} is not one of the bases involved",
                self.acting_base
            )));
        }
        if !self.principal.is_member_of(self.acting_base) {
            return Err(AuthzError::NotAMember(self.acting_base).into());
        }
        Ok(())
    }

    /// Require that the actor acts for one of `bases` and holds `permission` there.
    pub fn require_any(&self, bases: &[BaseId], permission: &Permission) -> DomainResult<()> {
        match bases.iter().find(|b| **b == self.acting_base) {
            Some(base) => self.require(*base, permission),
            None => Err(DomainError::unauthorized(format!(
                "acting base {} is not one of the bases involved",
                self.acting_base
            ))),
        }
    }
}
