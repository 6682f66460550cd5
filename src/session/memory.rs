//! Process-local session store.
//!
//! Used for development and as the store behind the HTTP tests. State resets
//! on restart.

use super::{Session, SessionId, SessionStore};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

struct Entry {
    session: Session,
    expires_at: DateTime<Utc>,
}

/// In-memory session store backed by a concurrent map.
pub struct MemorySessionStore {
    sessions: DashMap<SessionId, Entry>,
    ttl: Duration,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Number of stored sessions, expired ones included.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, id: &SessionId) -> Result<Option<Session>> {
        let now = Utc::now();

        // Guard must be dropped before remove_if touches the same shard
        let found = match self.sessions.get(id) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.session.clone())),
            Some(_) => true,
            None => false,
        };

        if found {
            self.sessions.remove_if(id, |_, entry| entry.expires_at <= now);
        }

        Ok(None)
    }

    fn put(&self, id: &SessionId, session: &Session) -> Result<()> {
        let mut session = session.clone();
        let now = Utc::now();
        session.updated_at = now;

        self.sessions.insert(
            id.clone(),
            Entry {
                session,
                expires_at: now + self.ttl,
            },
        );

        Ok(())
    }

    fn delete(&self, id: &SessionId) -> Result<()> {
        self.sessions.remove(id);
        Ok(())
    }

    fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| entry.expires_at > now);
        Ok(before.saturating_sub(self.sessions.len()))
    }
}
