//! Request-scoped authentication state.
//!
//! One [`RequestContext`] is created per inbound request and dropped when
//! the response is sent. It holds the memoized authentication decision
//! and computed proofs so repeated checks and multiple links on one page
//! do not recompute hashes. Nothing here survives a request boundary.

use std::collections::HashMap;

use super::proof::FriendAuth;
use crate::identity::IdentityRef;

/// Per-request memoization for access control.
#[derive(Debug, Default)]
pub struct RequestContext {
    authenticated: Option<IdentityRef>,
    friend_auths: HashMap<IdentityRef, FriendAuth>,
}

impl RequestContext {
    /// Create a fresh context for a new request.
    pub fn new() -> Self {
        Self::default()
    }

    /// The identity authenticated earlier in this request, if any.
    pub fn authenticated(&self) -> Option<IdentityRef> {
        self.authenticated
    }

    pub(super) fn set_authenticated(&mut self, id: IdentityRef) {
        self.authenticated = Some(id);
    }

    pub(super) fn cached_friend_auth(&self, id: IdentityRef) -> Option<&FriendAuth> {
        self.friend_auths.get(&id)
    }

    pub(super) fn cache_friend_auth(&mut self, id: IdentityRef, auth: FriendAuth) {
        self.friend_auths.insert(id, auth);
    }
}
