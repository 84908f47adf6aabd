use std::borrow::Cow;

use serde::{Deserialize, Serialize};

pub const WILDCARD: &str = "*";
pub const STOCK_READ: &str = "stock.read";
pub const STOCK_WRITE: &str = "stock.write";
pub const SHIPMENT_WRITE: &str = "shipment.write";
pub const SHIPMENT_RECEIVE: &str = "shipment.receive";
pub const DISTRIBUTION_WRITE: &str = "distribution.write";
pub const TRACKING_WRITE: &str = "tracking.write";

/// Permission identifier.
///
/// Permissions are opaque strings (e.g. "shipment.write"). The wildcard `"*"`
/// grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const STOCK_READ: Permission = Permission(Cow::Borrowed(STOCK_READ));
    pub const STOCK_WRITE: Permission = Permission(Cow::Borrowed(STOCK_WRITE));
    pub const SHIPMENT_WRITE: Permission = Permission(Cow::Borrowed(SHIPMENT_WRITE));
    pub const SHIPMENT_RECEIVE: Permission = Permission(Cow::Borrowed(SHIPMENT_RECEIVE));
    pub const DISTRIBUTION_WRITE: Permission = Permission(Cow::Borrowed(DISTRIBUTION_WRITE));
    pub const TRACKING_WRITE: Permission = Permission(Cow::Borrowed(TRACKING_WRITE));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == WILDCARD
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
