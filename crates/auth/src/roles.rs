use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::permissions;

/// Role identifier used for RBAC.
///
/// Roles are opaque strings; [`default_role_permissions`] holds the built-in
/// mapping, and callers may grant explicit permissions on top of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const COORDINATOR: Role = Role(Cow::Borrowed("coordinator"));
    pub const WAREHOUSE: Role = Role(Cow::Borrowed("warehouse"));
    pub const DISTRIBUTOR: Role = Role(Cow::Borrowed("distributor"));
    pub const VIEWER: Role = Role(Cow::Borrowed("viewer"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Permissions granted by a built-in role. Unknown roles grant nothing.
pub fn default_role_permissions(role: &str) -> Vec<&'static str> {
    match role {
        "coordinator" => vec![permissions::WILDCARD],
        "warehouse" => vec![
            permissions::STOCK_READ,
            permissions::STOCK_WRITE,
            permissions::SHIPMENT_WRITE,
            permissions::SHIPMENT_RECEIVE,
        ],
        "distributor" => vec![
            permissions::STOCK_READ,
            permissions::DISTRIBUTION_WRITE,
            permissions::TRACKING_WRITE,
        ],
        "viewer" => vec![permissions::STOCK_READ],
        _ => vec![],
    }
}
