//! Core types for the identity model.
//!
//! Remote parties are represented either as real local accounts (user
//! records) or lightweight virtual subscriptions (term records). The two
//! live in disjoint ID namespaces; [`IdentityRef`] is the tagged reference
//! used everywhere in the core so raw IDs are never compared across
//! variants.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::errors::IdentityError;

/// Tagged reference to an identity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityRef {
    /// A real local account, by user ID
    User(u64),
    /// A virtual subscription, by term ID
    Term(u64),
}

impl IdentityRef {
    /// Check whether this reference points at a real user account.
    pub fn is_user(&self) -> bool {
        matches!(self, IdentityRef::User(_))
    }

    /// Check whether this reference points at a virtual subscription.
    pub fn is_term(&self) -> bool {
        matches!(self, IdentityRef::Term(_))
    }
}

impl fmt::Display for IdentityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityRef::User(id) => write!(f, "user:{id}"),
            IdentityRef::Term(id) => write!(f, "term:{id}"),
        }
    }
}

impl FromStr for IdentityRef {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (variant, id) = s.split_once(':').ok_or_else(|| {
            IdentityError::InvalidIdentityRef {
                value: s.to_string(),
            }
        })?;
        let id = id.parse().map_err(|_| IdentityError::InvalidIdentityRef {
            value: s.to_string(),
        })?;
        match variant {
            "user" => Ok(IdentityRef::User(id)),
            "term" => Ok(IdentityRef::Term(id)),
            _ => Err(IdentityError::InvalidIdentityRef {
                value: s.to_string(),
            }),
        }
    }
}

/// The single active federation role of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Incoming friend request, not yet confirmed by the local operator
    FriendRequest,
    /// Outgoing friend request, awaiting the remote side's accept
    PendingFriendRequest,
    /// Full reciprocal trust
    Friend,
    /// Reduced reciprocal trust
    Acquaintance,
    /// Feed-only, no reciprocal trust or login capability
    Subscription,
}

/// Capabilities granted by roles.
///
/// Capabilities mirror the role names; [`Role::Acquaintance`] additionally
/// grants [`Capability::Friend`] since an acquaintance is a reduced-trust
/// friend that still reads the friend feed. Every variant is part of the
/// friend family the multisite super-admin demotion rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Friend,
    Acquaintance,
    PendingFriendRequest,
    FriendRequest,
    Subscription,
}

impl Role {
    /// Stable string form used on the wire and in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::FriendRequest => "friend_request",
            Role::PendingFriendRequest => "pending_friend_request",
            Role::Friend => "friend",
            Role::Acquaintance => "acquaintance",
            Role::Subscription => "subscription",
        }
    }

    /// Capabilities granted by this role.
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Role::FriendRequest => &[Capability::FriendRequest],
            Role::PendingFriendRequest => &[Capability::PendingFriendRequest],
            Role::Friend => &[Capability::Friend],
            Role::Acquaintance => &[Capability::Acquaintance, Capability::Friend],
            Role::Subscription => &[Capability::Subscription],
        }
    }

    /// Check whether this role grants a capability.
    pub fn grants(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Check whether a term-backed identity may hold this role.
    ///
    /// Virtual subscriptions may only be feed-only or awaiting a remote
    /// accept; any role that can end up holding tokens requires a real
    /// user account.
    pub fn allowed_for_term(&self) -> bool {
        matches!(self, Role::Subscription | Role::PendingFriendRequest)
    }

    /// Check whether a transition from this role to `to` is allowed.
    ///
    /// The table covers operator decisions (accept, downgrade, re-request)
    /// and the handshake's rollback path; everything else is rejected.
    pub fn can_transition_to(&self, to: Role) -> bool {
        use Role::*;
        matches!(
            (self, to),
            (FriendRequest, Friend)
                | (FriendRequest, Acquaintance)
                | (FriendRequest, Subscription)
                | (PendingFriendRequest, Friend)
                | (PendingFriendRequest, Acquaintance)
                | (PendingFriendRequest, Subscription)
                | (Friend, Acquaintance)
                | (Friend, Subscription)
                | (Friend, FriendRequest)
                | (Acquaintance, Friend)
                | (Acquaintance, Subscription)
                | (Acquaintance, FriendRequest)
                | (Subscription, PendingFriendRequest)
                | (Subscription, FriendRequest)
        )
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A resolved identity, uniform over both backing variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Tagged reference to the backing record
    pub id: IdentityRef,
    /// Stable login slug derived from the remote site's canonical URL
    pub login: String,
    /// Human-readable display name
    pub display_name: String,
    /// Canonical identity URL of the remote site
    pub url: String,
    /// Avatar URL, if known
    pub icon_url: Option<String>,
    /// Free-form description
    pub description: Option<String>,
    /// Current role
    pub role: Role,
    /// Registration timestamp (Unix seconds)
    pub registered: i64,
}

/// Which record variant backs a new identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    /// Real local account; required for trust-bearing roles
    User,
    /// Virtual subscription; only feed-only roles allowed
    Term,
}

/// Fields for creating a new identity.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub login: String,
    pub role: Role,
    pub url: String,
    pub display_name: String,
    pub icon_url: Option<String>,
    pub description: Option<String>,
    pub backing: Backing,
}
