use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use spin_sdk::key_value::Store;

use crate::config::*;
use crate::models::models::{Comment, Post, User};

/// Outcome of an [`KvBackend::update`] callback.
pub enum Mutation {
    Keep,
    Set(Vec<u8>),
    Delete,
}

pub type UpdateFn<'a> = dyn FnMut(Option<Vec<u8>>) -> anyhow::Result<Mutation> + 'a;

/// Raw key/value storage. Every call is atomic for its single key; nothing
/// spans keys.
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;
    fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// Read-modify-write of one key. No other `update` of the same key may
    /// interleave between the read handed to `apply` and the write it returns.
    fn update(&self, key: &str, apply: &mut UpdateFn<'_>) -> anyhow::Result<()>;
}

impl KvBackend for Store {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(Store::get(self, key)?)
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        Ok(Store::set(self, key, value)?)
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        Ok(Store::delete(self, key)?)
    }

    // The Spin key/value interface has no compare-and-swap, so this is only
    // as atomic as the host's per-key writes.
    fn update(&self, key: &str, apply: &mut UpdateFn<'_>) -> anyhow::Result<()> {
        match apply(Store::get(self, key)?)? {
            Mutation::Keep => Ok(()),
            Mutation::Set(value) => Ok(Store::set(self, key, &value)?),
            Mutation::Delete => Ok(Store::delete(self, key)?),
        }
    }
}

/// Process-local backend for the native server and tests.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    fn entries(&self) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.entries()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }

    fn update(&self, key: &str, apply: &mut UpdateFn<'_>) -> anyhow::Result<()> {
        let mut entries = self.entries()?;
        match apply(entries.get(key).cloned())? {
            Mutation::Keep => {}
            Mutation::Set(value) => {
                entries.insert(key.to_string(), value);
            }
            Mutation::Delete => {
                entries.remove(key);
            }
        }
        Ok(())
    }
}

/// Typed document access on top of a [`KvBackend`].
#[derive(Clone)]
pub struct Db {
    backend: Arc<dyn KvBackend>,
}

impl Db {
    pub fn new(backend: impl KvBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::default())
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.backend.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        self.backend.set(key, &serde_json::to_vec(value)?)
    }

    pub fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.backend.delete(key)
    }

    pub fn get_list(&self, key: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.get_json(key)?.unwrap_or_default())
    }

    /// Atomically edits the document at `key`. `change` returns whether it
    /// modified the document; unchanged documents are not rewritten. Returns
    /// the document as stored afterwards, or `None` when it does not exist.
    pub fn update_json<T, F>(&self, key: &str, mut change: F) -> anyhow::Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(&mut T) -> bool,
    {
        let mut stored = None;
        self.backend.update(key, &mut |current: Option<Vec<u8>>| -> anyhow::Result<Mutation> {
            stored = None;
            let Some(bytes) = current else {
                return Ok(Mutation::Keep);
            };
            let mut doc: T = serde_json::from_slice(&bytes)?;
            let mutation = if change(&mut doc) {
                Mutation::Set(serde_json::to_vec(&doc)?)
            } else {
                Mutation::Keep
            };
            stored = Some(doc);
            Ok(mutation)
        })?;
        Ok(stored)
    }

    /// Atomically edits the id list at `key`, treating a missing list as empty.
    pub fn update_list<F>(&self, key: &str, mut change: F) -> anyhow::Result<()>
    where
        F: FnMut(&mut Vec<String>),
    {
        self.backend.update(key, &mut |current: Option<Vec<u8>>| -> anyhow::Result<Mutation> {
            let mut list: Vec<String> = match current {
                Some(bytes) => serde_json::from_slice(&bytes)?,
                None => Vec::new(),
            };
            change(&mut list);
            Ok(Mutation::Set(serde_json::to_vec(&list)?))
        })
    }

    /// Points the unique index `key` at `id` unless another id already holds it.
    /// Returns whether `id` owns the index afterwards.
    fn claim_index(&self, key: &str, id: &str) -> anyhow::Result<bool> {
        let mut claimed = false;
        self.backend.update(key, &mut |current: Option<Vec<u8>>| -> anyhow::Result<Mutation> {
            match current {
                Some(bytes) => {
                    let holder: String = serde_json::from_slice(&bytes)?;
                    claimed = holder == id;
                    Ok(Mutation::Keep)
                }
                None => {
                    claimed = true;
                    Ok(Mutation::Set(serde_json::to_vec(id)?))
                }
            }
        })?;
        Ok(claimed)
    }

    fn release_index(&self, key: &str, id: &str) -> anyhow::Result<()> {
        self.backend.update(key, &mut |current: Option<Vec<u8>>| -> anyhow::Result<Mutation> {
            match current {
                Some(bytes) if serde_json::from_slice::<String>(&bytes)? == id => {
                    Ok(Mutation::Delete)
                }
                _ => Ok(Mutation::Keep),
            }
        })
    }

    // === Users ===

    pub fn get_user(&self, id: &str) -> anyhow::Result<Option<User>> {
        self.get_json(&user_key(id))
    }

    pub fn save_user(&self, user: &User) -> anyhow::Result<()> {
        self.set_json(&user_key(&user.id), user)
    }

    pub fn update_user<F>(&self, id: &str, change: F) -> anyhow::Result<Option<User>>
    where
        F: FnMut(&mut User) -> bool,
    {
        self.update_json(&user_key(id), change)
    }

    pub fn find_user_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        match self.get_json::<String>(&username_key(username))? {
            Some(id) => self.get_user(&id),
            None => Ok(None),
        }
    }

    pub fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        match self.get_json::<String>(&email_key(email))? {
            Some(id) => self.get_user(&id),
            None => Ok(None),
        }
    }

    /// Stores a new user after claiming its username and email indexes.
    /// Returns `false`, writing nothing, when either is already taken.
    pub fn insert_user(&self, user: &User) -> anyhow::Result<bool> {
        let username = username_key(&user.username);
        if !self.claim_index(&username, &user.id)? {
            return Ok(false);
        }
        let email = email_key(&user.email);
        if !self.claim_index(&email, &user.id)? {
            self.release_index(&username, &user.id)?;
            return Ok(false);
        }

        self.save_user(user)?;
        Ok(true)
    }

    // === Posts ===

    pub fn get_post(&self, id: &str) -> anyhow::Result<Option<Post>> {
        self.get_json(&post_key(id))
    }

    pub fn save_post(&self, post: &Post) -> anyhow::Result<()> {
        self.set_json(&post_key(&post.id), post)
    }

    pub fn update_post<F>(&self, id: &str, change: F) -> anyhow::Result<Option<Post>>
    where
        F: FnMut(&mut Post) -> bool,
    {
        self.update_json(&post_key(id), change)
    }

    /// Stores a new post and prepends it to the global feed.
    pub fn insert_post(&self, post: &Post) -> anyhow::Result<()> {
        self.save_post(post)?;
        self.update_list(FEED_KEY, |feed| feed.insert(0, post.id.clone()))
    }

    pub fn remove_post(&self, id: &str) -> anyhow::Result<()> {
        self.delete(&post_key(id))?;
        self.update_list(FEED_KEY, |feed| feed.retain(|post_id| post_id != id))
    }

    /// Every stored post, in feed order (newest first).
    pub fn all_posts(&self) -> anyhow::Result<Vec<Post>> {
        let mut posts = Vec::new();
        for id in self.get_list(FEED_KEY)? {
            if let Some(post) = self.get_post(&id)? {
                posts.push(post);
            }
        }
        Ok(posts)
    }

    // === Comments ===

    pub fn get_comment(&self, id: &str) -> anyhow::Result<Option<Comment>> {
        self.get_json(&comment_key(id))
    }

    pub fn save_comment(&self, comment: &Comment) -> anyhow::Result<()> {
        self.set_json(&comment_key(&comment.id), comment)
    }

    pub fn delete_comment(&self, id: &str) -> anyhow::Result<()> {
        self.delete(&comment_key(id))
    }
}
