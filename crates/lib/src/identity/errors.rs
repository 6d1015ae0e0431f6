//! Error types for the identity model.

use thiserror::Error;

use super::types::{IdentityRef, Role};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IdentityError {
    /// An identity with this login already exists as either variant.
    #[error("Identity already exists: {login}")]
    DuplicateIdentity { login: String },

    /// Identity lookup by reference missed.
    #[error("Identity not found: {0}")]
    IdentityNotFound(IdentityRef),

    /// Identity lookup by login missed.
    #[error("No identity with login: {login}")]
    LoginNotFound { login: String },

    /// Role transition not present in the transition table.
    #[error("Invalid role transition: {from} -> {to}")]
    InvalidRoleTransition { from: Role, to: Role },

    /// A term-backed identity was given a role reserved for real users.
    #[error("Role '{role}' requires a real user account")]
    RoleRequiresUser { role: Role },

    /// A stored identity reference could not be parsed.
    #[error("Invalid identity reference: {value}")]
    InvalidIdentityRef { value: String },

    /// An identity URL could not be parsed or has no usable host.
    #[error("Invalid identity URL: {url}")]
    InvalidUrl { url: String },

    /// Variant conversion failed and prior state was restored.
    #[error("Conversion failed: {reason}")]
    ConversionFailed { reason: String },
}

impl IdentityError {
    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            IdentityError::IdentityNotFound(_) | IdentityError::LoginNotFound { .. }
        )
    }

    /// Check if this error indicates a conflict (already exists).
    pub fn is_already_exists(&self) -> bool {
        matches!(self, IdentityError::DuplicateIdentity { .. })
    }

    /// Check if this error is a role/transition validation failure.
    pub fn is_role_error(&self) -> bool {
        matches!(
            self,
            IdentityError::InvalidRoleTransition { .. } | IdentityError::RoleRequiresUser { .. }
        )
    }
}
