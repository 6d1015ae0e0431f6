//! Access control: turning inbound requests into authenticated identities.
//!
//! [`AccessControl`] computes and verifies the bearer proofs embedded in
//! feed URLs and request bodies, manages token pairs, and mediates
//! capability checks. Verification never trusts a client-supplied
//! identity claim alone and never raises an error for a failed proof:
//! callers receive `None`/the unchanged outcome and the request continues
//! unauthenticated.

mod context;
mod errors;
mod proof;
mod tokens;

pub use context::RequestContext;
pub use errors::AuthError;
pub use proof::{
    FeedQuery, FriendAuth, format_combined, generate_token, hash_pair, hash_proof, hash_value,
    parse_combined,
};

use std::sync::Arc;

use tracing::debug;

use crate::{
    Result,
    backend::{Backend, OptionScope},
    constants::DEFAULT_AUTH_VALIDITY_SECS,
    identity::{Capability, Identities, Identity, IdentityRef},
};

/// Outcome of request authentication.
///
/// `Denied` is the explicit "no auth" sentinel: once set it
/// short-circuits every later check in the request pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Authentication explicitly denied earlier in the pipeline
    Denied,
    /// No credentials presented or credentials did not verify
    Unauthenticated,
    /// Request verified as this identity
    Authenticated(IdentityRef),
}

/// Access control over a backend and identity manager.
pub struct AccessControl {
    backend: Arc<dyn Backend>,
    identities: Arc<Identities>,
    /// Normalized URL of this site; `me` values in outgoing proofs derive
    /// from it.
    site_url: String,
    /// Whether this deployment is part of a multisite network.
    multisite: bool,
    /// Accept proofs lacking `until`/`auth` on token match alone.
    /// Compatibility with older peers; isolated so deployments can turn
    /// it off.
    legacy_token_auth: bool,
}

impl AccessControl {
    /// Create an access controller.
    pub fn new(
        backend: Arc<dyn Backend>,
        identities: Arc<Identities>,
        site_url: impl Into<String>,
        multisite: bool,
        legacy_token_auth: bool,
    ) -> Self {
        Self {
            backend,
            identities,
            site_url: site_url.into(),
            multisite,
            legacy_token_auth,
        }
    }

    /// Verify a presented token, resolving it to an identity.
    ///
    /// `token` is either a stored `in_token` secret (resolved through the
    /// secondary index) or, failing that, a canonical URL/login resolved
    /// through the identity model. With `until` and `auth` both present
    /// the proof must hash correctly and be inside its validity window;
    /// with both absent, legacy grace mode applies. All failures are
    /// `Ok(None)`.
    pub fn verify_token(
        &self,
        token: &str,
        until: Option<i64>,
        auth: Option<&str>,
    ) -> Result<Option<IdentityRef>> {
        if token.is_empty() {
            return Ok(None);
        }

        // Direct secret match via the secondary index.
        if let Some(id_str) = self
            .backend
            .get_option(OptionScope::Site, &tokens::in_token_index_key(token))?
            && let Ok(id) = id_str.parse::<IdentityRef>()
            && self.identities.find(id)?.is_some()
        {
            if self.proof_ok(token, until, auth) {
                return Ok(Some(id));
            }
            return Ok(None);
        }

        // Fall back to URL/login resolution: the caller says who they
        // are, the stored in_token decides whether to believe them.
        let Ok(login) = Identities::login_for_url(token) else {
            return Ok(None);
        };
        let Some(identity) = self.identities.find_by_login(&login)? else {
            return Ok(None);
        };
        let Some(in_token) = self.in_token(identity.id)? else {
            return Ok(None);
        };
        if self.proof_ok(&in_token, until, auth) {
            Ok(Some(identity.id))
        } else {
            Ok(None)
        }
    }

    fn proof_ok(&self, in_token: &str, until: Option<i64>, auth: Option<&str>) -> bool {
        match (until, auth) {
            (Some(until), Some(auth)) => {
                chrono::Utc::now().timestamp() <= until && auth == proof::hash_proof(until, in_token)
            }
            (None, None) => self.legacy_token_auth,
            _ => false,
        }
    }

    /// Authenticate a request from its feed query parameters.
    ///
    /// Acts only when `incoming` is not the explicit `Denied` sentinel.
    /// A verified token for an identity lacking the `Friend` capability
    /// leaves the incoming outcome unchanged. A positive decision is
    /// memoized in the request context.
    pub fn authenticate(
        &self,
        ctx: &mut RequestContext,
        incoming: AuthOutcome,
        query: &FeedQuery,
    ) -> Result<AuthOutcome> {
        if incoming == AuthOutcome::Denied {
            return Ok(AuthOutcome::Denied);
        }
        if let Some(id) = ctx.authenticated() {
            return Ok(AuthOutcome::Authenticated(id));
        }

        let resolved = if let Some(friend) = &query.friend {
            self.verify_token(friend, query.until, query.auth.as_deref())?
        } else if let Some(me) = &query.me {
            self.verify_token(me, query.until, query.auth.as_deref())?
        } else {
            None
        };
        let Some(id) = resolved else {
            return Ok(incoming);
        };

        let Some(identity) = self.identities.find(id)? else {
            return Ok(incoming);
        };
        if !self.identity_can(&identity, Capability::Friend)? {
            debug!(id = %id, role = %identity.role, "Verified token for non-friend role rejected");
            return Ok(incoming);
        }

        ctx.set_authenticated(id);
        debug!(id = %id, "Request authenticated");
        Ok(AuthOutcome::Authenticated(id))
    }

    /// Check whether an identity holds a capability.
    ///
    /// In a multisite deployment a super-admin account is denied the
    /// friend-family capabilities unless its role explicitly grants the
    /// one being checked; single-site deployments keep the platform-wide
    /// bypass.
    pub fn identity_can(&self, identity: &Identity, capability: Capability) -> Result<bool> {
        let granted = identity.role.grants(capability);
        if !granted
            && let IdentityRef::User(user_id) = identity.id
            && let Some(record) = self.backend.get_user(user_id)?
            && record.super_admin
        {
            return Ok(!self.multisite);
        }
        Ok(granted)
    }

    /// Compute the bearer proof for authenticating toward an identity's
    /// site.
    ///
    /// Pure in the identity's token pair and the wall clock; memoized per
    /// identity in the request context. `None` when the identity has no
    /// committed token pair — a proof is never fabricated.
    pub fn friend_auth(
        &self,
        ctx: &mut RequestContext,
        id: IdentityRef,
        validity: i64,
    ) -> Result<Option<FriendAuth>> {
        if let Some(cached) = ctx.cached_friend_auth(id) {
            return Ok(Some(cached.clone()));
        }
        let (Some(out_token), Some(_in_token)) = (self.out_token(id)?, self.in_token(id)?) else {
            return Ok(None);
        };
        let until = chrono::Utc::now().timestamp() + validity;
        let auth = FriendAuth {
            me: Identities::login_for_url(&self.site_url)?,
            until,
            auth: proof::hash_proof(until, &out_token),
        };
        ctx.cache_friend_auth(id, auth.clone());
        Ok(Some(auth))
    }

    /// Append bearer-proof query parameters to a URL.
    ///
    /// No-op for negative validity or when the identity has no token
    /// pair. The separator is chosen from the existing query string.
    pub fn append_auth(
        &self,
        url: &str,
        ctx: &mut RequestContext,
        id: IdentityRef,
        validity: i64,
    ) -> Result<String> {
        if validity < 0 {
            return Ok(url.to_string());
        }
        let Some(auth) = self.friend_auth(ctx, id, validity)? else {
            return Ok(url.to_string());
        };
        let params: String = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("me", &auth.me)
            .append_pair("until", &auth.until.to_string())
            .append_pair("auth", &auth.auth)
            .finish();
        let separator = if url.contains('?') { '&' } else { '?' };
        Ok(format!("{url}{separator}{params}"))
    }

    /// Compute a self-contained combined proof (`<token>-<until>-<auth>`)
    /// for POST payloads sent to an identity's site.
    pub fn combined_auth(&self, id: IdentityRef) -> Result<Option<String>> {
        let Some(out_token) = self.out_token(id)? else {
            return Ok(None);
        };
        let until = chrono::Utc::now().timestamp() + DEFAULT_AUTH_VALIDITY_SECS;
        let auth = proof::hash_proof(until, &out_token);
        Ok(Some(proof::format_combined(&out_token, until, &auth)))
    }

    /// Authenticate a combined proof from a POST payload.
    ///
    /// The resolved identity must hold the `Friend` capability.
    pub fn verify_combined(&self, combined: &str) -> Result<Option<IdentityRef>> {
        let Some((token, until, auth)) = proof::parse_combined(combined) else {
            return Ok(None);
        };
        let Some(id) = self.verify_token(&token, Some(until), Some(&auth))? else {
            return Ok(None);
        };
        let Some(identity) = self.identities.find(id)? else {
            return Ok(None);
        };
        if !self.identity_can(&identity, Capability::Friend)? {
            return Ok(None);
        }
        Ok(Some(id))
    }
}
