//! Parameterized identity retrieval.
//!
//! Queries merge user-backed and term-backed identities into one result
//! set. Ordering is applied to the full merged set and `limit` truncates
//! only after the sort, so results are correct across the two backing
//! stores.

use super::types::{Identity, Role};

/// Result ordering for identity queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryOrder {
    /// Ascending display name, ties broken by login
    DisplayName,
    /// Most recently registered first
    RegisteredDesc,
}

/// A parameterized identity query.
///
/// ```
/// use amity::identity::{Role, UserQuery};
///
/// let query = UserQuery::new()
///     .roles(&[Role::Friend, Role::Acquaintance])
///     .search("alice")
///     .limit(10);
/// # let _ = query;
/// ```
#[derive(Debug, Clone)]
pub struct UserQuery {
    roles: Option<Vec<Role>>,
    search: Option<String>,
    limit: Option<usize>,
    order: QueryOrder,
    bypass_cache: bool,
}

impl Default for UserQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl UserQuery {
    /// Create a query matching every role, ordered by display name.
    pub fn new() -> Self {
        Self {
            roles: None,
            search: None,
            limit: None,
            order: QueryOrder::DisplayName,
            bypass_cache: false,
        }
    }

    /// Restrict results to the given role set.
    pub fn roles(mut self, roles: &[Role]) -> Self {
        self.roles = Some(roles.to_vec());
        self
    }

    /// Keep only identities whose display name or login contains the
    /// given substring, case-insensitively.
    pub fn search(mut self, needle: impl Into<String>) -> Self {
        self.search = Some(needle.into());
        self
    }

    /// Truncate the result set after sorting.
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Set the result ordering.
    pub fn order(mut self, order: QueryOrder) -> Self {
        self.order = order;
        self
    }

    /// Skip the per-site memoization cache. Intended for test isolation.
    pub fn bypass_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }

    pub(super) fn cache_bypassed(&self) -> bool {
        self.bypass_cache
    }

    pub(super) fn matches(&self, identity: &Identity) -> bool {
        if let Some(roles) = &self.roles
            && !roles.contains(&identity.role)
        {
            return false;
        }
        if let Some(needle) = &self.search {
            let needle = needle.to_lowercase();
            if !identity.display_name.to_lowercase().contains(&needle)
                && !identity.login.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }

    /// Sort the full merged result set, then truncate.
    pub(super) fn finalize(&self, mut results: Vec<Identity>) -> Vec<Identity> {
        match self.order {
            QueryOrder::DisplayName => results.sort_by(|a, b| {
                a.display_name
                    .cmp(&b.display_name)
                    .then_with(|| a.login.cmp(&b.login))
            }),
            QueryOrder::RegisteredDesc => {
                results.sort_by(|a, b| {
                    b.registered
                        .cmp(&a.registered)
                        .then_with(|| a.login.cmp(&b.login))
                });
            }
        }
        if let Some(limit) = self.limit {
            results.truncate(limit);
        }
        results
    }
}
