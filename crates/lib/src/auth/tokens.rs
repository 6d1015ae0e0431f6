//! Token pair lifecycle.
//!
//! Each friend identity carries two long-lived secrets: `in_token` (what
//! the remote party proves to us) and `out_token` (what we prove to
//! them). A site-scoped secondary index maps `in_token` values back to
//! identities for O(1) verification. Ephemeral handshake secrets live
//! next to them under the same identity scope and are consumed when a
//! pair is committed.

use tracing::debug;

use super::AccessControl;
use crate::{
    Result,
    auth::errors::AuthError,
    backend::OptionScope,
    identity::IdentityRef,
};

pub(crate) const OPT_IN_TOKEN: &str = "in_token";
pub(crate) const OPT_OUT_TOKEN: &str = "out_token";
pub(crate) const OPT_FUTURE_IN_TOKEN: &str = "future_in_token";
pub(crate) const OPT_FUTURE_OUT_TOKEN: &str = "future_out_token";
pub(crate) const OPT_REQUEST_ID: &str = "request_id";

/// Site-scoped secondary index key for an `in_token`.
pub(crate) fn in_token_index_key(token: &str) -> String {
    format!("in_token_{token}")
}

/// Site-scoped key for the initiator's handshake record.
pub(crate) fn future_in_token_key(request_hash: &str) -> String {
    format!("future_in_token_{request_hash}")
}

impl AccessControl {
    /// The token we expect this identity to prove possession of.
    pub fn in_token(&self, id: IdentityRef) -> Result<Option<String>> {
        self.backend.get_option(OptionScope::Identity(id), OPT_IN_TOKEN)
    }

    /// The token we prove possession of toward this identity's site.
    pub fn out_token(&self, id: IdentityRef) -> Result<Option<String>> {
        self.backend.get_option(OptionScope::Identity(id), OPT_OUT_TOKEN)
    }

    /// Commit a token pair for an identity, completing a handshake.
    ///
    /// Replaces any previous pair (including its index entry), writes the
    /// new secondary index entry, and consumes the ephemeral handshake
    /// options.
    pub fn make_friend(
        &self,
        id: IdentityRef,
        in_token: &str,
        out_token: &str,
    ) -> Result<()> {
        if in_token.is_empty() || out_token.is_empty() {
            return Err(AuthError::EmptyToken.into());
        }
        if in_token == out_token {
            return Err(AuthError::TokensEqual.into());
        }

        // A re-friended identity may still have an old pair; its index
        // entry must not keep resolving.
        if let Some(previous) = self.in_token(id)? {
            self.backend
                .delete_option(OptionScope::Site, &in_token_index_key(&previous))?;
        }

        let scope = OptionScope::Identity(id);
        self.backend.set_option(scope, OPT_IN_TOKEN, in_token)?;
        self.backend.set_option(scope, OPT_OUT_TOKEN, out_token)?;
        self.backend.set_option(
            OptionScope::Site,
            &in_token_index_key(in_token),
            &id.to_string(),
        )?;

        self.backend.delete_option(scope, OPT_FUTURE_IN_TOKEN)?;
        self.backend.delete_option(scope, OPT_FUTURE_OUT_TOKEN)?;
        self.backend.delete_option(scope, OPT_REQUEST_ID)?;

        debug!(id = %id, "Committed token pair");
        Ok(())
    }

    /// Remove an identity's tokens and handshake state.
    ///
    /// The secondary index entry is captured and invalidated before the
    /// per-identity options are removed, so the index never dangles.
    /// Must run before the identity record itself is destroyed.
    pub fn delete_tokens(&self, id: IdentityRef) -> Result<()> {
        if let Some(in_token) = self.in_token(id)? {
            self.backend
                .delete_option(OptionScope::Site, &in_token_index_key(&in_token))?;
        }
        let scope = OptionScope::Identity(id);
        for key in [
            OPT_IN_TOKEN,
            OPT_OUT_TOKEN,
            OPT_FUTURE_IN_TOKEN,
            OPT_FUTURE_OUT_TOKEN,
            OPT_REQUEST_ID,
        ] {
            self.backend.delete_option(scope, key)?;
        }
        debug!(id = %id, "Deleted tokens");
        Ok(())
    }

    // === Ephemeral handshake state ===

    /// Candidate out-token a requester proposed for this identity.
    pub fn future_out_token(&self, id: IdentityRef) -> Result<Option<String>> {
        self.backend
            .get_option(OptionScope::Identity(id), OPT_FUTURE_OUT_TOKEN)
    }

    /// Store the candidate out-token a requester proposed.
    pub fn set_future_out_token(&self, id: IdentityRef, token: &str) -> Result<()> {
        self.backend
            .set_option(OptionScope::Identity(id), OPT_FUTURE_OUT_TOKEN, token)
    }

    /// Candidate in-token we proposed while accepting.
    pub fn future_in_token(&self, id: IdentityRef) -> Result<Option<String>> {
        self.backend
            .get_option(OptionScope::Identity(id), OPT_FUTURE_IN_TOKEN)
    }

    /// Store the candidate in-token we proposed while accepting.
    pub fn set_future_in_token(&self, id: IdentityRef, token: &str) -> Result<()> {
        self.backend
            .set_option(OptionScope::Identity(id), OPT_FUTURE_IN_TOKEN, token)
    }

    /// Delete the candidate in-token after a failed accept notification.
    pub fn delete_future_in_token(&self, id: IdentityRef) -> Result<()> {
        self.backend
            .delete_option(OptionScope::Identity(id), OPT_FUTURE_IN_TOKEN)
    }

    /// The handshake request ID associated with this identity.
    pub fn request_id(&self, id: IdentityRef) -> Result<Option<String>> {
        self.backend
            .get_option(OptionScope::Identity(id), OPT_REQUEST_ID)
    }

    /// Associate a handshake request ID with this identity.
    pub fn set_request_id(&self, id: IdentityRef, request_id: &str) -> Result<()> {
        self.backend
            .set_option(OptionScope::Identity(id), OPT_REQUEST_ID, request_id)
    }

    /// Initiator-side handshake record: our proposed in-token, keyed by
    /// the hashed request ID.
    pub fn stored_future_in_token(&self, request_hash: &str) -> Result<Option<String>> {
        self.backend
            .get_option(OptionScope::Site, &future_in_token_key(request_hash))
    }

    /// Store the initiator-side handshake record.
    pub fn store_future_in_token(&self, request_hash: &str, token: &str) -> Result<()> {
        self.backend
            .set_option(OptionScope::Site, &future_in_token_key(request_hash), token)
    }

    /// Consume the initiator-side handshake record. Consumption is what
    /// makes a completed accept non-replayable.
    pub fn consume_future_in_token(&self, request_hash: &str) -> Result<()> {
        self.backend
            .delete_option(OptionScope::Site, &future_in_token_key(request_hash))
    }
}
