//! Record types stored by the backend.

use serde::{Deserialize, Serialize};

use crate::identity::{IdentityRef, Role};

/// A real local account representing a remote party.
///
/// Users carry a single active role from the federation role set and can be
/// issued token pairs, unlike term-backed subscriptions.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    /// Numeric user ID, unique among users (disjoint from term IDs)
    pub id: u64,

    /// Unique login slug derived from the remote site's canonical URL
    pub login: String,

    /// Human-readable display name
    pub display_name: String,

    /// Canonical identity URL of the remote site
    pub url: String,

    /// Avatar URL, if known
    pub icon_url: Option<String>,

    /// Free-form description
    pub description: Option<String>,

    /// The single active federation role
    pub role: Role,

    /// Registration timestamp (Unix seconds)
    pub registered: i64,

    /// Whether this account holds super-admin authority on the platform
    pub super_admin: bool,
}

/// Fields for creating a new user record; the backend assigns the ID.
#[derive(Clone, Debug)]
pub struct NewUserRecord {
    pub login: String,
    pub display_name: String,
    pub url: String,
    pub icon_url: Option<String>,
    pub description: Option<String>,
    pub role: Role,
    pub registered: i64,
}

/// A lightweight virtual subscription backed by a taxonomy term.
///
/// Terms have no login capability and may only hold the feed-only roles.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TermRecord {
    /// Numeric term ID, unique among terms (disjoint from user IDs)
    pub id: u64,

    /// Unique slug derived from the feed's canonical URL
    pub slug: String,

    /// Human-readable display name
    pub display_name: String,

    /// Canonical URL of the subscribed feed/site
    pub url: String,

    /// Avatar URL, if known
    pub icon_url: Option<String>,

    /// Free-form description
    pub description: Option<String>,

    /// The single active federation role
    pub role: Role,

    /// Registration timestamp (Unix seconds)
    pub registered: i64,
}

/// Fields for creating a new term record; the backend assigns the ID.
#[derive(Clone, Debug)]
pub struct NewTermRecord {
    pub slug: String,
    pub display_name: String,
    pub url: String,
    pub icon_url: Option<String>,
    pub description: Option<String>,
    pub role: Role,
    pub registered: i64,
}

/// Publication status of a stored post.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PostStatus {
    Publish,
    Trash,
}

/// A post mirrored from (or authored on behalf of) an identity.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PostRecord {
    /// Local numeric post ID
    pub id: u64,

    /// The identity this post is attributed to
    pub author: IdentityRef,

    /// The post's ID on the author's own site, when mirrored
    pub remote_id: Option<u64>,

    /// Post title
    pub title: String,

    /// Publication status
    pub status: PostStatus,
}

/// Fields for creating a new post record; the backend assigns the ID.
#[derive(Clone, Debug)]
pub struct NewPostRecord {
    pub author: IdentityRef,
    pub remote_id: Option<u64>,
    pub title: String,
    pub status: PostStatus,
}

/// A private message received from a remote identity.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MessageRecord {
    /// The authenticated sender
    pub from: IdentityRef,

    /// Message subject line
    pub subject: String,

    /// Message body
    pub message: String,

    /// Receipt timestamp (Unix seconds)
    pub received: i64,
}

/// Scope of a stored option.
///
/// Site-scoped options hold global state (secondary indexes, feature
/// flags); identity-scoped options hold per-identity secrets and
/// handshake state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionScope {
    /// One value per site
    Site,
    /// One value per identity
    Identity(IdentityRef),
}
