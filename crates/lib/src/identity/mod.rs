//! Identity model: remote parties as users or virtual subscriptions.
//!
//! The [`Identities`] manager provides uniform lookup, creation,
//! role-transition, and conversion operations over the two backing
//! variants, plus the merged query surface. Role transitions are the
//! single observable mutation point; registered listeners are invoked
//! synchronously on every committed transition.

mod errors;
mod events;
mod query;
mod types;

pub use errors::IdentityError;
pub use events::{RoleChange, RoleChangeListener};
pub use query::{QueryOrder, UserQuery};
pub use types::{Backing, Capability, Identity, IdentityRef, NewIdentity, Role};

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use tracing::{debug, info};
use url::Url;

use crate::{
    Result,
    backend::{Backend, NewTermRecord, NewUserRecord, TermRecord, UserRecord},
};

/// Cache key for the memoized named queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    site_id: u32,
    tag: &'static str,
    limit: Option<usize>,
}

/// Manager for the identity model.
pub struct Identities {
    backend: Arc<dyn Backend>,
    site_id: u32,
    listeners: RwLock<Vec<Arc<dyn RoleChangeListener>>>,
    cache: Mutex<HashMap<CacheKey, Vec<Identity>>>,
}

impl Identities {
    /// Create a new identity manager over the given backend.
    pub fn new(backend: Arc<dyn Backend>, site_id: u32) -> Self {
        Self {
            backend,
            site_id,
            listeners: RwLock::new(Vec::new()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Register a role-change listener.
    pub fn add_listener(&self, listener: Arc<dyn RoleChangeListener>) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push(listener);
        }
    }

    /// Derive the stable login slug for a remote site URL.
    ///
    /// The slug is the lowercased host, extended with the non-default
    /// port and a sanitized path suffix when present, so two identities
    /// sharing a host cannot collide. The same URL always maps to the
    /// same login.
    pub fn login_for_url(url: &str) -> Result<String> {
        let parsed = parse_site_url(url)?;
        let mut host = parsed
            .host_str()
            .ok_or_else(|| IdentityError::InvalidUrl {
                url: url.to_string(),
            })?
            .to_lowercase();
        if let Some(port) = parsed.port() {
            host = format!("{host}-{port}");
        }

        let path = parsed.path().trim_matches('/');
        if path.is_empty() {
            Ok(host)
        } else {
            let suffix: String = path
                .to_lowercase()
                .chars()
                .map(|c| if c.is_alphanumeric() || c == '.' { c } else { '-' })
                .collect();
            Ok(format!("{host}-{suffix}"))
        }
    }

    /// Fetch an identity by reference, `None` on a miss.
    pub fn find(&self, id: IdentityRef) -> Result<Option<Identity>> {
        match id {
            IdentityRef::User(user_id) => Ok(self
                .backend
                .get_user(user_id)?
                .map(|record| user_to_identity(&record))),
            IdentityRef::Term(term_id) => Ok(self
                .backend
                .get_term(term_id)?
                .map(|record| term_to_identity(&record))),
        }
    }

    /// Fetch an identity by reference, erroring on a miss.
    pub fn get(&self, id: IdentityRef) -> Result<Identity> {
        self.find(id)?
            .ok_or_else(|| IdentityError::IdentityNotFound(id).into())
    }

    /// Find an identity by login slug, across both variants.
    pub fn find_by_login(&self, login: &str) -> Result<Option<Identity>> {
        if let Some(user) = self.backend.find_user_by_login(login)? {
            return Ok(Some(user_to_identity(&user)));
        }
        if let Some(term) = self.backend.find_term_by_slug(login)? {
            return Ok(Some(term_to_identity(&term)));
        }
        Ok(None)
    }

    /// Find an identity by its remote site URL.
    pub fn find_by_url(&self, url: &str) -> Result<Option<Identity>> {
        let login = Self::login_for_url(url)?;
        self.find_by_login(&login)
    }

    /// Create a new identity.
    ///
    /// Fails with `DuplicateIdentity` when the login already exists as
    /// either variant. Term backing is only allowed for feed-only roles.
    pub fn create(&self, new: NewIdentity) -> Result<Identity> {
        if self.find_by_login(&new.login)?.is_some() {
            return Err(IdentityError::DuplicateIdentity { login: new.login }.into());
        }
        if new.backing == Backing::Term && !new.role.allowed_for_term() {
            return Err(IdentityError::RoleRequiresUser { role: new.role }.into());
        }

        let registered = chrono::Utc::now().timestamp();
        let identity = match new.backing {
            Backing::User => {
                let record = self.backend.create_user(NewUserRecord {
                    login: new.login,
                    display_name: new.display_name,
                    url: new.url,
                    icon_url: new.icon_url,
                    description: new.description,
                    role: new.role,
                    registered,
                })?;
                user_to_identity(&record)
            }
            Backing::Term => {
                let record = self.backend.create_term(NewTermRecord {
                    slug: new.login,
                    display_name: new.display_name,
                    url: new.url,
                    icon_url: new.icon_url,
                    description: new.description,
                    role: new.role,
                    registered,
                })?;
                term_to_identity(&record)
            }
        };

        info!(id = %identity.id, login = %identity.login, role = %identity.role, "Created identity");
        self.invalidate_query_cache();
        self.notify(&identity, identity.role, Vec::new());
        Ok(identity)
    }

    /// Transition an identity to a new role.
    ///
    /// This is the single mutation point for roles: the transition is
    /// validated against the transition table, persisted, and announced
    /// to listeners. Setting the already-active role is a no-op.
    pub fn set_role(&self, id: IdentityRef, new_role: Role) -> Result<Identity> {
        let identity = self.get(id)?;
        if identity.role == new_role {
            return Ok(identity);
        }
        if !identity.role.can_transition_to(new_role) {
            return Err(IdentityError::InvalidRoleTransition {
                from: identity.role,
                to: new_role,
            }
            .into());
        }
        if id.is_term() && !new_role.allowed_for_term() {
            return Err(IdentityError::RoleRequiresUser { role: new_role }.into());
        }

        let old_role = identity.role;
        match id {
            IdentityRef::User(user_id) => {
                let mut record = self
                    .backend
                    .get_user(user_id)?
                    .ok_or(IdentityError::IdentityNotFound(id))?;
                record.role = new_role;
                self.backend.update_user(&record)?;
            }
            IdentityRef::Term(term_id) => {
                let mut record = self
                    .backend
                    .get_term(term_id)?
                    .ok_or(IdentityError::IdentityNotFound(id))?;
                record.role = new_role;
                self.backend.update_term(&record)?;
            }
        }

        let updated = Identity {
            role: new_role,
            ..identity
        };
        info!(id = %id, from = %old_role, to = %new_role, "Role transition");
        self.invalidate_query_cache();
        self.notify(&updated, new_role, vec![old_role]);
        Ok(updated)
    }

    /// Update an identity's profile fields. `None` leaves a field as-is.
    pub fn update_profile(
        &self,
        id: IdentityRef,
        display_name: Option<&str>,
        icon_url: Option<&str>,
    ) -> Result<Identity> {
        match id {
            IdentityRef::User(user_id) => {
                let mut record = self
                    .backend
                    .get_user(user_id)?
                    .ok_or(IdentityError::IdentityNotFound(id))?;
                if let Some(name) = display_name {
                    record.display_name = name.to_string();
                }
                if let Some(icon) = icon_url {
                    record.icon_url = Some(icon.to_string());
                }
                self.backend.update_user(&record)?;
                self.invalidate_query_cache();
                Ok(user_to_identity(&record))
            }
            IdentityRef::Term(term_id) => {
                let mut record = self
                    .backend
                    .get_term(term_id)?
                    .ok_or(IdentityError::IdentityNotFound(id))?;
                if let Some(name) = display_name {
                    record.display_name = name.to_string();
                }
                if let Some(icon) = icon_url {
                    record.icon_url = Some(icon.to_string());
                }
                self.backend.update_term(&record)?;
                self.invalidate_query_cache();
                Ok(term_to_identity(&record))
            }
        }
    }

    /// Destroy an identity record and its scoped options.
    ///
    /// Token cleanup (including the secondary index) must happen before
    /// this call; see `AccessControl::delete_tokens`.
    pub fn delete(&self, id: IdentityRef) -> Result<()> {
        match id {
            IdentityRef::User(user_id) => self.backend.delete_user(user_id)?,
            IdentityRef::Term(term_id) => self.backend.delete_term(term_id)?,
        }
        self.backend.delete_identity_options(id)?;
        info!(id = %id, "Deleted identity");
        self.invalidate_query_cache();
        Ok(())
    }

    /// Promote a virtual subscription to a real user account.
    ///
    /// All authored posts and scoped options move to the new account and
    /// the term is destroyed. On failure the prior state is restored.
    pub fn convert_to_user(&self, id: IdentityRef) -> Result<Identity> {
        let IdentityRef::Term(term_id) = id else {
            return Err(IdentityError::ConversionFailed {
                reason: format!("{id} is already a user"),
            }
            .into());
        };
        let term = self
            .backend
            .get_term(term_id)?
            .ok_or(IdentityError::IdentityNotFound(id))?;

        if self.backend.find_user_by_login(&term.slug)?.is_some() {
            return Err(IdentityError::DuplicateIdentity {
                login: term.slug.clone(),
            }
            .into());
        }

        let user = self.backend.create_user(NewUserRecord {
            login: term.slug.clone(),
            display_name: term.display_name.clone(),
            url: term.url.clone(),
            icon_url: term.icon_url.clone(),
            description: term.description.clone(),
            role: term.role,
            registered: term.registered,
        })?;
        let new_ref = IdentityRef::User(user.id);

        if let Err(e) = self.migrate_identity_data(id, new_ref) {
            // Restore: move anything already migrated back, drop the new
            // account, and report failure with prior state intact.
            let _ = self.migrate_identity_data(new_ref, id);
            let _ = self.backend.delete_user(user.id);
            return Err(IdentityError::ConversionFailed {
                reason: e.to_string(),
            }
            .into());
        }

        self.backend.delete_term(term_id)?;
        self.backend.delete_identity_options(id)?;
        debug!(from = %id, to = %new_ref, "Promoted subscription to user");
        self.invalidate_query_cache();
        Ok(user_to_identity(&user))
    }

    /// Demote a real user account to a virtual subscription.
    ///
    /// Only feed-only roles can be demoted; trust-bearing roles require a
    /// real account. All authored posts and scoped options move to the
    /// new term and the user is destroyed. On failure the prior state is
    /// restored.
    pub fn convert_from_user(&self, id: IdentityRef) -> Result<Identity> {
        let IdentityRef::User(user_id) = id else {
            return Err(IdentityError::ConversionFailed {
                reason: format!("{id} is already a subscription"),
            }
            .into());
        };
        let user = self
            .backend
            .get_user(user_id)?
            .ok_or(IdentityError::IdentityNotFound(id))?;

        if !user.role.allowed_for_term() {
            return Err(IdentityError::RoleRequiresUser { role: user.role }.into());
        }
        if self.backend.find_term_by_slug(&user.login)?.is_some() {
            return Err(IdentityError::DuplicateIdentity {
                login: user.login.clone(),
            }
            .into());
        }

        let term = self.backend.create_term(NewTermRecord {
            slug: user.login.clone(),
            display_name: user.display_name.clone(),
            url: user.url.clone(),
            icon_url: user.icon_url.clone(),
            description: user.description.clone(),
            role: user.role,
            registered: user.registered,
        })?;
        let new_ref = IdentityRef::Term(term.id);

        if let Err(e) = self.migrate_identity_data(id, new_ref) {
            let _ = self.migrate_identity_data(new_ref, id);
            let _ = self.backend.delete_term(term.id);
            return Err(IdentityError::ConversionFailed {
                reason: e.to_string(),
            }
            .into());
        }

        self.backend.delete_user(user_id)?;
        self.backend.delete_identity_options(id)?;
        debug!(from = %id, to = %new_ref, "Demoted user to subscription");
        self.invalidate_query_cache();
        Ok(term_to_identity(&term))
    }

    /// Move authored posts and scoped options from one identity to another.
    fn migrate_identity_data(&self, from: IdentityRef, to: IdentityRef) -> Result<()> {
        for post in self.backend.posts_by_author(from)? {
            self.backend.set_post_author(post.id, to)?;
        }
        for (key, value) in self.backend.list_identity_options(from)? {
            self.backend
                .set_option(crate::backend::OptionScope::Identity(to), &key, &value)?;
        }
        Ok(())
    }

    /// Run a parameterized query over the merged identity set.
    pub fn query(&self, query: &UserQuery) -> Result<Vec<Identity>> {
        let results: Vec<Identity> = self
            .backend
            .list_users()?
            .iter()
            .map(user_to_identity)
            .chain(self.backend.list_terms()?.iter().map(term_to_identity))
            .filter(|identity| query.matches(identity))
            .collect();
        Ok(query.finalize(results))
    }

    /// All identities holding reciprocal trust (friends and acquaintances).
    ///
    /// Memoized per site; pass-through queries via [`Self::query`] are not
    /// cached.
    pub fn all_friends(&self) -> Result<Vec<Identity>> {
        self.cached_query(
            "all_friends",
            None,
            &UserQuery::new().roles(&[Role::Friend, Role::Acquaintance]),
        )
    }

    /// The `n` most recently registered friends and subscriptions.
    pub fn recent_friends_subscriptions(&self, n: usize) -> Result<Vec<Identity>> {
        self.cached_query(
            "recent_friends_subscriptions",
            Some(n),
            &UserQuery::new()
                .roles(&[Role::Friend, Role::Acquaintance, Role::Subscription])
                .order(QueryOrder::RegisteredDesc)
                .limit(n),
        )
    }

    fn cached_query(
        &self,
        tag: &'static str,
        limit: Option<usize>,
        query: &UserQuery,
    ) -> Result<Vec<Identity>> {
        let key = CacheKey {
            site_id: self.site_id,
            tag,
            limit,
        };
        if !query.cache_bypassed()
            && let Ok(cache) = self.cache.lock()
            && let Some(results) = cache.get(&key)
        {
            return Ok(results.clone());
        }

        let results = self.query(query)?;
        if !query.cache_bypassed()
            && let Ok(mut cache) = self.cache.lock()
        {
            cache.insert(key, results.clone());
        }
        Ok(results)
    }

    /// Drop all memoized query results.
    ///
    /// Runs automatically on every mutation through this manager; exposed
    /// for callers (and tests) that mutate the backend directly.
    pub fn invalidate_query_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    /// Number of memoized query results currently held.
    #[cfg(feature = "testing")]
    pub fn cached_query_count(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn notify(&self, identity: &Identity, new_role: Role, old_roles: Vec<Role>) {
        let change = RoleChange {
            identity: identity.clone(),
            new_role,
            old_roles,
        };
        if let Ok(listeners) = self.listeners.read() {
            for listener in listeners.iter() {
                listener.role_changed(&change);
            }
        }
    }

    /// The backend this manager operates on.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }
}

/// Parse a site URL, accepting bare hosts by assuming `https`.
pub(crate) fn parse_site_url(url: &str) -> Result<Url> {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(_) => Url::parse(&format!("https://{url}")).map_err(|_| {
            IdentityError::InvalidUrl {
                url: url.to_string(),
            }
        })?,
    };
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(IdentityError::InvalidUrl {
            url: url.to_string(),
        }
        .into());
    }
    Ok(parsed)
}

/// Normalize a site URL for comparison: lowercased scheme/host, no
/// trailing slash.
pub(crate) fn normalize_site_url(url: &str) -> Result<String> {
    let parsed = parse_site_url(url)?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

fn user_to_identity(record: &UserRecord) -> Identity {
    Identity {
        id: IdentityRef::User(record.id),
        login: record.login.clone(),
        display_name: record.display_name.clone(),
        url: record.url.clone(),
        icon_url: record.icon_url.clone(),
        description: record.description.clone(),
        role: record.role,
        registered: record.registered,
    }
}

fn term_to_identity(record: &TermRecord) -> Identity {
    Identity {
        id: IdentityRef::Term(record.id),
        login: record.slug.clone(),
        display_name: record.display_name.clone(),
        url: record.url.clone(),
        icon_url: record.icon_url.clone(),
        description: record.description.clone(),
        role: record.role,
        registered: record.registered,
    }
}
