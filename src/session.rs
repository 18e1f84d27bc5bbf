// src/session.rs

//! Server-side session storage, addressed by an opaque session id.

use moka::ops::compute::Op;
use moka::sync::Cache;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::DEFAULT_TOKEN_LIFETIME_SECS;

/// Slot holding the current token string.
pub const TOKEN_SLOT: &str = "current_token";

/// Sessions kept before the least valuable ones are evicted.
pub const DEFAULT_MAX_SESSIONS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// `None` for anything that is not a well-formed id.
    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value).ok().map(Self)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key/value slots per session. Last write wins.
pub trait SessionStore: Send + Sync {
    fn get(&self, id: &SessionId, key: &str) -> Option<String>;

    fn set(&self, id: &SessionId, key: &str, value: String);

    /// Removes one slot; a session left without slots is dropped.
    fn remove(&self, id: &SessionId, key: &str);

    /// Drops the session and all of its slots.
    fn destroy(&self, id: &SessionId);

    fn exists(&self, id: &SessionId) -> bool;
}

type Slots = HashMap<String, String>;

/// In-process session store. Sessions idle for longer than the configured
/// timeout expire, and the cache never holds more than `max_sessions`.
#[derive(Clone)]
pub struct MemorySessionStore {
    sessions: Cache<SessionId, Slots>,
}

impl MemorySessionStore {
    pub fn new(max_sessions: u64, idle_timeout: Duration) -> Self {
        let sessions = Cache::builder()
            .max_capacity(max_sessions)
            .time_to_idle(idle_timeout)
            .build();
        Self { sessions }
    }

    /// Number of live sessions, after pending evictions are applied.
    pub fn len(&self) -> u64 {
        self.sessions.run_pending_tasks();
        self.sessions.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_SESSIONS,
            Duration::from_secs(DEFAULT_TOKEN_LIFETIME_SECS.unsigned_abs()),
        )
    }
}

impl fmt::Debug for MemorySessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySessionStore")
            .field("entries", &self.sessions.entry_count())
            .finish()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, id: &SessionId, key: &str) -> Option<String> {
        self.sessions.get(id).and_then(|slots| slots.get(key).cloned())
    }

    fn set(&self, id: &SessionId, key: &str, value: String) {
        self.sessions.entry(*id).and_upsert_with(|entry| {
            let mut slots = entry.map(|e| e.into_value()).unwrap_or_default();
            slots.insert(key.to_string(), value);
            slots
        });
    }

    fn remove(&self, id: &SessionId, key: &str) {
        self.sessions.entry(*id).and_compute_with(|entry| {
            let Some(entry) = entry else {
                return Op::Nop;
            };
            let mut slots = entry.into_value();
            if slots.remove(key).is_none() {
                return Op::Nop;
            }
            if slots.is_empty() { Op::Remove } else { Op::Put(slots) }
        });
    }

    fn destroy(&self, id: &SessionId) {
        self.sessions.invalidate(id);
    }

    fn exists(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }
}

/// One request's view of its session.
#[derive(Clone)]
pub struct Session {
    id: SessionId,
    store: Arc<dyn SessionStore>,
}

impl Session {
    pub fn new(id: SessionId, store: Arc<dyn SessionStore>) -> Self {
        Self { id, store }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The stored token, if non-empty.
    pub fn token(&self) -> Option<String> {
        self.store
            .get(&self.id, TOKEN_SLOT)
            .filter(|token| !token.is_empty())
    }

    pub fn set_token(&self, token: String) {
        self.store.set(&self.id, TOKEN_SLOT, token);
    }

    pub fn clear_token(&self) {
        self.store.remove(&self.id, TOKEN_SLOT);
    }

    pub fn destroy(&self) {
        self.store.destroy(&self.id);
    }

    /// Whether anything was ever written for this id and not destroyed since.
    pub fn exists(&self) -> bool {
        self.store.exists(&self.id)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish_non_exhaustive()
    }
}
