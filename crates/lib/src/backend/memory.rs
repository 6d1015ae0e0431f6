//! In-memory backend with optional JSON file persistence.
//!
//! The default backend for the daemon and for tests. All state lives in a
//! single `RwLock`-guarded structure; `save_to_file`/`load_from_file`
//! serialize the full state as JSON.

use std::{
    collections::HashMap,
    path::Path,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    Backend, BackendError, MessageRecord, NewPostRecord, NewTermRecord, NewUserRecord,
    OptionScope, PostRecord, PostStatus, TermRecord, UserRecord,
};
use crate::{Result, identity::IdentityRef};

/// Serializable interior state of the in-memory backend.
#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    next_user_id: u64,
    next_term_id: u64,
    next_post_id: u64,
    next_message_id: u64,
    users: HashMap<u64, UserRecord>,
    terms: HashMap<u64, TermRecord>,
    posts: HashMap<u64, PostRecord>,
    messages: HashMap<u64, MessageRecord>,
    /// Options keyed by `<scope>/<key>`, where scope is `site`, `user:<id>`
    /// or `term:<id>`. String keys keep the state JSON-serializable.
    options: HashMap<String, String>,
}

fn scope_prefix(scope: OptionScope) -> String {
    match scope {
        OptionScope::Site => "site".to_string(),
        OptionScope::Identity(id) => id.to_string(),
    }
}

fn option_key(scope: OptionScope, key: &str) -> String {
    format!("{}/{key}", scope_prefix(scope))
}

/// In-memory implementation of [`Backend`].
#[derive(Debug, Default)]
pub struct InMemory {
    state: RwLock<State>,
}

impl InMemory {
    /// Create an empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a backend from a previously saved JSON file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())
            .map_err(|e| BackendError::Io(e.to_string()))?;
        let state: State =
            serde_json::from_str(&data).map_err(|e| BackendError::Serialization(e.to_string()))?;
        debug!(
            users = state.users.len(),
            terms = state.terms.len(),
            "Loaded backend state"
        );
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Save the full backend state to a JSON file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let state = self.read()?;
        let data = serde_json::to_string_pretty(&*state)
            .map_err(|e| BackendError::Serialization(e.to_string()))?;
        std::fs::write(path.as_ref(), data).map_err(|e| BackendError::Io(e.to_string()))?;
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| BackendError::LockPoisoned.into())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| BackendError::LockPoisoned.into())
    }
}

impl Backend for InMemory {
    fn create_user(&self, new: NewUserRecord) -> Result<UserRecord> {
        let mut state = self.write()?;
        if state.users.values().any(|u| u.login == new.login) {
            return Err(BackendError::LoginAlreadyExists { login: new.login }.into());
        }
        state.next_user_id += 1;
        let record = UserRecord {
            id: state.next_user_id,
            login: new.login,
            display_name: new.display_name,
            url: new.url,
            icon_url: new.icon_url,
            description: new.description,
            role: new.role,
            registered: new.registered,
            super_admin: false,
        };
        state.users.insert(record.id, record.clone());
        Ok(record)
    }

    fn get_user(&self, id: u64) -> Result<Option<UserRecord>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    fn find_user_by_login(&self, login: &str) -> Result<Option<UserRecord>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.login == login)
            .cloned())
    }

    fn update_user(&self, record: &UserRecord) -> Result<()> {
        let mut state = self.write()?;
        if !state.users.contains_key(&record.id) {
            return Err(BackendError::UserNotFound(record.id).into());
        }
        state.users.insert(record.id, record.clone());
        Ok(())
    }

    fn delete_user(&self, id: u64) -> Result<()> {
        let mut state = self.write()?;
        if state.users.remove(&id).is_none() {
            return Err(BackendError::UserNotFound(id).into());
        }
        Ok(())
    }

    fn list_users(&self) -> Result<Vec<UserRecord>> {
        Ok(self.read()?.users.values().cloned().collect())
    }

    fn create_term(&self, new: NewTermRecord) -> Result<TermRecord> {
        let mut state = self.write()?;
        if state.terms.values().any(|t| t.slug == new.slug) {
            return Err(BackendError::SlugAlreadyExists { slug: new.slug }.into());
        }
        state.next_term_id += 1;
        let record = TermRecord {
            id: state.next_term_id,
            slug: new.slug,
            display_name: new.display_name,
            url: new.url,
            icon_url: new.icon_url,
            description: new.description,
            role: new.role,
            registered: new.registered,
        };
        state.terms.insert(record.id, record.clone());
        Ok(record)
    }

    fn get_term(&self, id: u64) -> Result<Option<TermRecord>> {
        Ok(self.read()?.terms.get(&id).cloned())
    }

    fn find_term_by_slug(&self, slug: &str) -> Result<Option<TermRecord>> {
        Ok(self
            .read()?
            .terms
            .values()
            .find(|t| t.slug == slug)
            .cloned())
    }

    fn update_term(&self, record: &TermRecord) -> Result<()> {
        let mut state = self.write()?;
        if !state.terms.contains_key(&record.id) {
            return Err(BackendError::TermNotFound(record.id).into());
        }
        state.terms.insert(record.id, record.clone());
        Ok(())
    }

    fn delete_term(&self, id: u64) -> Result<()> {
        let mut state = self.write()?;
        if state.terms.remove(&id).is_none() {
            return Err(BackendError::TermNotFound(id).into());
        }
        Ok(())
    }

    fn list_terms(&self) -> Result<Vec<TermRecord>> {
        Ok(self.read()?.terms.values().cloned().collect())
    }

    fn get_option(&self, scope: OptionScope, key: &str) -> Result<Option<String>> {
        Ok(self.read()?.options.get(&option_key(scope, key)).cloned())
    }

    fn set_option(&self, scope: OptionScope, key: &str, value: &str) -> Result<()> {
        let mut state = self.write()?;
        state
            .options
            .insert(option_key(scope, key), value.to_string());
        Ok(())
    }

    fn delete_option(&self, scope: OptionScope, key: &str) -> Result<()> {
        let mut state = self.write()?;
        state.options.remove(&option_key(scope, key));
        Ok(())
    }

    fn list_identity_options(&self, identity: IdentityRef) -> Result<Vec<(String, String)>> {
        let prefix = format!("{}/", scope_prefix(OptionScope::Identity(identity)));
        Ok(self
            .read()?
            .options
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(&prefix)
                    .map(|key| (key.to_string(), v.clone()))
            })
            .collect())
    }

    fn delete_identity_options(&self, identity: IdentityRef) -> Result<()> {
        let prefix = format!("{}/", scope_prefix(OptionScope::Identity(identity)));
        let mut state = self.write()?;
        state.options.retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }

    fn create_post(&self, new: NewPostRecord) -> Result<PostRecord> {
        let mut state = self.write()?;
        state.next_post_id += 1;
        let record = PostRecord {
            id: state.next_post_id,
            author: new.author,
            remote_id: new.remote_id,
            title: new.title,
            status: new.status,
        };
        state.posts.insert(record.id, record.clone());
        Ok(record)
    }

    fn get_post(&self, id: u64) -> Result<Option<PostRecord>> {
        Ok(self.read()?.posts.get(&id).cloned())
    }

    fn posts_by_author(&self, author: IdentityRef) -> Result<Vec<PostRecord>> {
        let mut posts: Vec<PostRecord> = self
            .read()?
            .posts
            .values()
            .filter(|p| p.author == author)
            .cloned()
            .collect();
        posts.sort_by_key(|p| p.id);
        Ok(posts)
    }

    fn find_post_by_remote_id(
        &self,
        author: IdentityRef,
        remote_id: u64,
    ) -> Result<Option<PostRecord>> {
        Ok(self
            .read()?
            .posts
            .values()
            .find(|p| p.author == author && p.remote_id == Some(remote_id))
            .cloned())
    }

    fn set_post_author(&self, post_id: u64, author: IdentityRef) -> Result<()> {
        let mut state = self.write()?;
        match state.posts.get_mut(&post_id) {
            Some(post) => {
                post.author = author;
                Ok(())
            }
            None => Err(BackendError::PostNotFound(post_id).into()),
        }
    }

    fn set_post_status(&self, post_id: u64, status: PostStatus) -> Result<()> {
        let mut state = self.write()?;
        match state.posts.get_mut(&post_id) {
            Some(post) => {
                post.status = status;
                Ok(())
            }
            None => Err(BackendError::PostNotFound(post_id).into()),
        }
    }

    fn append_message(&self, message: MessageRecord) -> Result<u64> {
        let mut state = self.write()?;
        state.next_message_id += 1;
        let id = state.next_message_id;
        state.messages.insert(id, message);
        Ok(id)
    }

    fn list_messages(&self, from: Option<IdentityRef>) -> Result<Vec<(u64, MessageRecord)>> {
        let mut messages: Vec<(u64, MessageRecord)> = self
            .read()?
            .messages
            .iter()
            .filter(|(_, m)| from.is_none_or(|f| m.from == f))
            .map(|(id, m)| (*id, m.clone()))
            .collect();
        messages.sort_by_key(|(id, _)| *id);
        Ok(messages)
    }
}
