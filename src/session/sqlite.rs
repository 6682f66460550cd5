//! Session storage using SQLite.
//!
//! Session documents are stored as JSON. Token fields inside them are already
//! sealed, so the database never sees plaintext tokens.

use super::{Session, SessionId, SessionStore};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Fixed-width UTC timestamps so `expires_at` compares correctly as text.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Session store backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE sessions (
///     id TEXT PRIMARY KEY,         -- Hex session id
///     data TEXT NOT NULL,          -- Session JSON (sealed token records)
///     expires_at TEXT NOT NULL,    -- ISO 8601 timestamp
///     updated_at TEXT NOT NULL     -- ISO 8601 timestamp
/// );
/// ```
///
/// # Thread Safety
/// - Connection is wrapped in Mutex for safe concurrent access
/// - Each put is a single upsert, so readers never see a partial session
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
    ttl: Duration,
}

impl SqliteSessionStore {
    /// Creates or opens a session store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`:memory:` for a private in-memory db)
    /// * `ttl` - How long a session lives after its last write
    pub fn new<P: AsRef<Path>>(db_path: P, ttl: Duration) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open session database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create sessions table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at)",
            [],
        )
        .context("Failed to create index")?;

        Ok(Self {
            conn: Mutex::new(conn),
            ttl,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Session database lock poisoned"))
    }
}

impl SessionStore for SqliteSessionStore {
    fn get(&self, id: &SessionId) -> Result<Option<Session>> {
        let conn = self.conn()?;

        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT data, expires_at FROM sessions WHERE id = ?1",
                params![id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to read session")?;

        let Some((data, expires_at)) = row else {
            return Ok(None);
        };

        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .map(|dt| dt.with_timezone(&Utc))
            .context("Failed to parse expires_at timestamp")?;

        if expires_at <= Utc::now() {
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![id.as_str()])
                .context("Failed to delete expired session")?;
            return Ok(None);
        }

        let session = serde_json::from_str(&data).context("Failed to decode session")?;
        Ok(Some(session))
    }

    fn put(&self, id: &SessionId, session: &Session) -> Result<()> {
        let now = Utc::now();
        let mut session = session.clone();
        session.updated_at = now;

        let data = serde_json::to_string(&session).context("Failed to encode session")?;
        let expires_at = timestamp(now + self.ttl);

        self.conn()?
            .execute(
                r#"
                INSERT INTO sessions (id, data, expires_at, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    data = excluded.data,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at
                "#,
                params![id.as_str(), data, expires_at, timestamp(now)],
            )
            .context("Failed to store session")?;

        Ok(())
    }

    fn delete(&self, id: &SessionId) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM sessions WHERE id = ?1", params![id.as_str()])
            .context("Failed to delete session")?;

        Ok(())
    }

    fn purge_expired(&self) -> Result<usize> {
        let now = timestamp(Utc::now());
        let removed = self
            .conn()?
            .execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])
            .context("Failed to purge expired sessions")?;

        Ok(removed)
    }
}
