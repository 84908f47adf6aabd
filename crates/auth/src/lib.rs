//! `boxflow-auth`: the authorization boundary.
//!
//! Authentication happens elsewhere; this crate receives an already resolved
//! [`Principal`] and decides whether it may act on behalf of a base.

pub mod authorize;
pub mod context;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, authorize};
pub use context::ActorContext;
pub use permissions::Permission;
pub use principal::{BaseMembership, Principal};
pub use roles::{Role, default_role_permissions};
