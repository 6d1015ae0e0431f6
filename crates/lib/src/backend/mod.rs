//! Storage backend for identities, options, posts, and messages.
//!
//! The core treats its persistence layer as an external relational store
//! exposed through this narrow interface: user and term records, scoped
//! key-value options, and a minimal post/message surface. Implementations
//! must provide per-key atomicity; the core never relies on multi-key
//! transactions.

mod errors;
mod memory;
mod types;

pub use errors::BackendError;
pub use memory::InMemory;
pub use types::{
    MessageRecord, NewPostRecord, NewTermRecord, NewUserRecord, OptionScope, PostRecord,
    PostStatus, TermRecord, UserRecord,
};

use crate::{Result, identity::IdentityRef};

/// Pluggable storage backend.
///
/// All methods are synchronous and individually atomic. Lookup misses are
/// reported as `Ok(None)`; `*_NotFound` errors are reserved for mutations
/// against records that must exist.
pub trait Backend: Send + Sync {
    // === Users ===

    /// Create a user record, assigning the next user ID.
    fn create_user(&self, new: NewUserRecord) -> Result<UserRecord>;

    /// Fetch a user record by ID.
    fn get_user(&self, id: u64) -> Result<Option<UserRecord>>;

    /// Fetch a user record by login slug.
    fn find_user_by_login(&self, login: &str) -> Result<Option<UserRecord>>;

    /// Replace a user record. The record must already exist.
    fn update_user(&self, record: &UserRecord) -> Result<()>;

    /// Delete a user record by ID.
    fn delete_user(&self, id: u64) -> Result<()>;

    /// List all user records.
    fn list_users(&self) -> Result<Vec<UserRecord>>;

    // === Terms ===

    /// Create a term record, assigning the next term ID.
    fn create_term(&self, new: NewTermRecord) -> Result<TermRecord>;

    /// Fetch a term record by ID.
    fn get_term(&self, id: u64) -> Result<Option<TermRecord>>;

    /// Fetch a term record by slug.
    fn find_term_by_slug(&self, slug: &str) -> Result<Option<TermRecord>>;

    /// Replace a term record. The record must already exist.
    fn update_term(&self, record: &TermRecord) -> Result<()>;

    /// Delete a term record by ID.
    fn delete_term(&self, id: u64) -> Result<()>;

    /// List all term records.
    fn list_terms(&self) -> Result<Vec<TermRecord>>;

    // === Options ===

    /// Fetch an option value.
    fn get_option(&self, scope: OptionScope, key: &str) -> Result<Option<String>>;

    /// Store an option value, overwriting any previous value.
    fn set_option(&self, scope: OptionScope, key: &str, value: &str) -> Result<()>;

    /// Delete an option. Deleting an absent option is a no-op.
    fn delete_option(&self, scope: OptionScope, key: &str) -> Result<()>;

    /// List all options in an identity's scope as `(key, value)` pairs.
    fn list_identity_options(&self, identity: IdentityRef) -> Result<Vec<(String, String)>>;

    /// Delete every option in an identity's scope.
    fn delete_identity_options(&self, identity: IdentityRef) -> Result<()>;

    // === Posts ===

    /// Create a post record, assigning the next post ID.
    fn create_post(&self, new: NewPostRecord) -> Result<PostRecord>;

    /// Fetch a post record by ID.
    fn get_post(&self, id: u64) -> Result<Option<PostRecord>>;

    /// List all posts attributed to an identity.
    fn posts_by_author(&self, author: IdentityRef) -> Result<Vec<PostRecord>>;

    /// Find a mirrored post by its author and remote ID.
    fn find_post_by_remote_id(
        &self,
        author: IdentityRef,
        remote_id: u64,
    ) -> Result<Option<PostRecord>>;

    /// Reassign a post to a different author.
    fn set_post_author(&self, post_id: u64, author: IdentityRef) -> Result<()>;

    /// Update a post's publication status.
    fn set_post_status(&self, post_id: u64, status: PostStatus) -> Result<()>;

    // === Messages ===

    /// Append a received message, returning its assigned ID.
    fn append_message(&self, message: MessageRecord) -> Result<u64>;

    /// List messages, optionally filtered by sender.
    fn list_messages(&self, from: Option<IdentityRef>) -> Result<Vec<(u64, MessageRecord)>>;
}
