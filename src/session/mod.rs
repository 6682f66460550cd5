//! Server-side sessions holding sealed provider tokens.
//!
//! The store is an injected capability keyed by [`SessionId`]. The login
//! callback creates sessions, the session gate rewrites their token records,
//! and logout or a failed gate destroys them.

use crate::credentials::EncryptedRecord;
use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub mod cookie;
mod memory;
mod sqlite;

pub use memory::MemorySessionStore;
pub use sqlite::SqliteSessionStore;

/// Length of a session id in random bytes (hex-encoded on the wire)
const SESSION_ID_BYTES: usize = 32;

/// Opaque session identifier carried in the session cookie.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a new id from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Parses a cookie value; anything other than 64 lowercase hex chars is rejected.
    pub fn parse(value: &str) -> Option<Self> {
        let well_formed = value.len() == SESSION_ID_BYTES * 2
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));

        well_formed.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix safe to put in logs.
    pub fn log_prefix(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({}…)", self.log_prefix())
    }
}

/// Session document persisted in the store.
///
/// `access_token_record` is present whenever the session counts as
/// authenticated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub access_token_record: Option<EncryptedRecord>,

    #[serde(default)]
    pub refresh_token_record: Option<EncryptedRecord>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(access_token_record: EncryptedRecord, refresh_token_record: Option<EncryptedRecord>) -> Self {
        let now = Utc::now();
        Self {
            access_token_record: Some(access_token_record),
            refresh_token_record,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token_record.is_some()
    }
}

/// Session persistence backend.
///
/// Each call is a single logical operation; a `put` replaces the whole
/// document atomically. Expired sessions read as absent.
pub trait SessionStore: Send + Sync {
    fn get(&self, id: &SessionId) -> Result<Option<Session>>;

    fn put(&self, id: &SessionId, session: &Session) -> Result<()>;

    /// Deleting an absent session is not an error.
    fn delete(&self, id: &SessionId) -> Result<()>;

    /// Drops expired sessions. Returns how many were removed.
    fn purge_expired(&self) -> Result<usize>;
}

pub type SharedSessionStore = Arc<dyn SessionStore>;

/// Opens the store named by a connection string.
///
/// Supported: `memory://` and `sqlite://<path>` (`sqlite://:memory:` allowed).
pub fn open_store(url: &str, ttl: Duration) -> Result<SharedSessionStore> {
    if url == "memory://" {
        return Ok(Arc::new(MemorySessionStore::new(ttl)));
    }

    if let Some(path) = url.strip_prefix("sqlite://") {
        if path.is_empty() {
            bail!("Session store URL is missing a SQLite path");
        }
        return Ok(Arc::new(SqliteSessionStore::new(path, ttl)?));
    }

    bail!("Unsupported session store URL scheme (expected memory:// or sqlite://)")
}

/// Background task to periodically drop expired sessions
pub async fn run_session_cleanup(store: SharedSessionStore, interval_seconds: u64) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_seconds));

    loop {
        interval.tick().await;
        match store.purge_expired() {
            Ok(removed) => tracing::debug!(removed, "Expired session cleanup complete"),
            Err(e) => tracing::warn!(error = %e, "Expired session cleanup failed"),
        }
    }
}
