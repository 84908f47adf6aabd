use std::collections::HashSet;

use thiserror::Error;

use boxflow_core::{BaseId, DomainError};

use crate::{Permission, Principal, default_role_permissions};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("principal is not a member of base {0}")]
    NotAMember(BaseId),

    #[error("principal is acting for base {acting}, not {required}")]
    ActingBaseMismatch { acting: BaseId, required: BaseId },

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        DomainError::unauthorized(value.to_string())
    }
}

/// Authorize a principal for a permission within one base.
///
/// Effective permissions are the union of the explicit grants on the base
/// membership and those implied by its roles.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(
    principal: &Principal,
    base_id: BaseId,
    required: &Permission,
) -> Result<(), AuthzError> {
    let membership = principal
        .membership(base_id)
        .ok_or(AuthzError::NotAMember(base_id))?;

    let mut perms: HashSet<&str> = membership.permissions.iter().map(|p| p.as_str()).collect();
    for role in &membership.roles {
        perms.extend(default_role_permissions(role.as_str()));
    }

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}
