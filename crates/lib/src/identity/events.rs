//! Role-change observation.
//!
//! Role transitions are the observable events downstream consumers react
//! to (operator notifications, automatic status updates). Listeners are
//! injected into [`super::Identities`] and invoked synchronously from
//! `set_role`, keeping side effects ordered and testable.

use super::types::{Identity, Role};

/// A role transition that has been committed to storage.
#[derive(Debug, Clone)]
pub struct RoleChange {
    /// The identity after the transition
    pub identity: Identity,
    /// The newly active role
    pub new_role: Role,
    /// Roles held before the transition
    pub old_roles: Vec<Role>,
}

/// Observer for committed role transitions.
pub trait RoleChangeListener: Send + Sync {
    /// Called synchronously after a role transition is persisted.
    fn role_changed(&self, change: &RoleChange);
}
