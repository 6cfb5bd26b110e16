//! Sharded session registry.
//!
//! Two logically separate indexes (`session_id → Session`,
//! `user_id → Session`), each split over a fixed number of shards with one
//! lock per shard. The hot paths are the per-broadcast lookups; a global
//! lock would serialize fan-out across all recipients.
//!
//! Shard selection must be stable across processes so log-based debugging
//! lines up: FNV-1a over the session id, plain modulo over the user id.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::session::Session;

/// Fixed shard count for both indexes.
pub const SHARD_COUNT: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("session {0} not found")]
    SessionGone(String),
}

pub struct SessionRegistry {
    session_shards: [RwLock<HashMap<String, Arc<Session>>>; SHARD_COUNT],
    user_shards: [RwLock<HashMap<i32, Arc<Session>>>; SHARD_COUNT],
}

fn fnv1a_32(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    let mut hash = OFFSET_BASIS;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

pub(crate) fn session_shard_index(session_id: &str) -> usize {
    fnv1a_32(session_id.as_bytes()) as usize % SHARD_COUNT
}

pub(crate) fn user_shard_index(user_id: i32) -> usize {
    user_id as u32 as usize % SHARD_COUNT
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_shards: std::array::from_fn(|_| RwLock::new(HashMap::new())),
            user_shards: std::array::from_fn(|_| RwLock::new(HashMap::new())),
        }
    }

    /// Insert a freshly connected (unbound) session.
    pub fn add(&self, session: Arc<Session>) {
        let shard = &self.session_shards[session_shard_index(session.id())];
        shard
            .write()
            .expect("session shard poisoned")
            .insert(session.id().to_string(), session.clone());

        tracing::debug!(session_id = %session.id(), "Session added");
    }

    /// Associate a user with a session (single-shot per session).
    ///
    /// A user already bound to another live session is rebound here: the new
    /// entry replaces the old one in the user index, while the old session
    /// stays in the session index and keeps draining until its own removal.
    pub fn bind(&self, user_id: i32, session_id: &str) -> Result<(), RegistryError> {
        let session = self
            .get(session_id)
            .ok_or_else(|| RegistryError::SessionGone(session_id.to_string()))?;

        session.set_user_id(user_id);
        session.mark_bound();

        let shard = &self.user_shards[user_shard_index(user_id)];
        shard
            .write()
            .expect("user shard poisoned")
            .insert(user_id, session);

        tracing::debug!(user_id = user_id, session_id = %session_id, "Session bound");
        Ok(())
    }

    /// Remove a session from both indexes.
    ///
    /// The user-index entry is only cleared while it still points at this
    /// session, so tearing down a stale connection never evicts a user who
    /// has already rebound elsewhere.
    pub fn remove(&self, session_id: &str) {
        let shard = &self.session_shards[session_shard_index(session_id)];
        let mut sessions = shard.write().expect("session shard poisoned");

        let Some(session) = sessions.remove(session_id) else {
            return;
        };

        let user_id = session.user_id();
        if user_id != 0 {
            let user_shard = &self.user_shards[user_shard_index(user_id)];
            let mut users = user_shard.write().expect("user shard poisoned");
            if users.get(&user_id).is_some_and(|s| s.id() == session_id) {
                users.remove(&user_id);
            }
            tracing::debug!(session_id = %session_id, user_id = user_id, "Session removed");
        } else {
            tracing::debug!(session_id = %session_id, "Session removed (unbound)");
        }
    }

    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        let shard = &self.session_shards[session_shard_index(session_id)];
        shard
            .read()
            .expect("session shard poisoned")
            .get(session_id)
            .cloned()
    }

    #[must_use]
    pub fn get_by_user(&self, user_id: i32) -> Option<Arc<Session>> {
        let shard = &self.user_shards[user_shard_index(user_id)];
        shard
            .read()
            .expect("user shard poisoned")
            .get(&user_id)
            .cloned()
    }

    /// Live session count across all shards.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.session_shards
            .iter()
            .map(|s| s.read().expect("session shard poisoned").len())
            .sum()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
