//! Error types for access control.

use thiserror::Error;

use crate::identity::IdentityRef;

/// Errors that can occur during token management.
///
/// Verification failures are not errors: verification returns `None` so
/// callers in the request pipeline can continue unauthenticated.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// A token pair's halves must differ.
    #[error("in_token and out_token must not be equal")]
    TokensEqual,

    /// Empty tokens are never valid.
    #[error("Token must not be empty")]
    EmptyToken,

    /// The identity has no committed token pair.
    #[error("No token pair for identity: {0}")]
    NoTokenPair(IdentityRef),
}

impl AuthError {
    /// Check if this error indicates a missing token pair.
    pub fn is_no_token_pair(&self) -> bool {
        matches!(self, AuthError::NoTokenPair(_))
    }
}
