use serde::{Deserialize, Serialize};

use boxflow_core::{BaseId, OrganisationId, UserId};

use crate::{Permission, Role};

/// A principal's membership in one base.
///
/// This is an authorization boundary object: it states *which base* the
/// principal may act for and which roles/permissions are granted there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseMembership {
    pub base_id: BaseId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl BaseMembership {
    pub fn with_roles(base_id: BaseId, roles: Vec<Role>) -> Self {
        Self {
            base_id,
            roles,
            permissions: Vec::new(),
        }
    }
}

/// A fully resolved principal for authorization decisions.
///
/// Construction is decoupled from storage and transport: the caller derives
/// memberships from whatever identity provider it uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub organisation_id: OrganisationId,
    pub memberships: Vec<BaseMembership>,
}

impl Principal {
    pub fn new(user_id: UserId, organisation_id: OrganisationId) -> Self {
        Self {
            user_id,
            organisation_id,
            memberships: Vec::new(),
        }
    }

    pub fn with_membership(mut self, membership: BaseMembership) -> Self {
        self.memberships.push(membership);
        self
    }

    pub fn membership(&self, base_id: BaseId) -> Option<&BaseMembership> {
        self.memberships.iter().find(|m| m.base_id == base_id)
    }

    pub fn is_member_of(&self, base_id: BaseId) -> bool {
        self.membership(base_id).is_some()
    }
}
