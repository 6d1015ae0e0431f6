//! Error types for the storage backend.

use thiserror::Error;

use crate::identity::IdentityRef;

/// Errors that can occur in the storage backend.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    /// User record not found.
    #[error("User not found: {0}")]
    UserNotFound(u64),

    /// Term record not found.
    #[error("Term not found: {0}")]
    TermNotFound(u64),

    /// Post record not found.
    #[error("Post not found: {0}")]
    PostNotFound(u64),

    /// A user with this login already exists.
    #[error("Login already exists: {login}")]
    LoginAlreadyExists { login: String },

    /// A term with this slug already exists.
    #[error("Slug already exists: {slug}")]
    SlugAlreadyExists { slug: String },

    /// An option scope referenced an identity that does not exist.
    #[error("Identity not found: {0}")]
    IdentityNotFound(IdentityRef),

    /// Serialization error during persistence.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// File I/O error during persistence.
    #[error("I/O error: {0}")]
    Io(String),

    /// Interior lock was poisoned by a panicking writer.
    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl BackendError {
    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BackendError::UserNotFound(_)
                | BackendError::TermNotFound(_)
                | BackendError::PostNotFound(_)
                | BackendError::IdentityNotFound(_)
        )
    }

    /// Check if this error indicates a conflict (already exists).
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            BackendError::LoginAlreadyExists { .. } | BackendError::SlugAlreadyExists { .. }
        )
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        matches!(self, BackendError::Io(_))
    }
}
