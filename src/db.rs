//! SQLite persistence shared by the token store and the challenge store.
//!
//! Both entity shapes are keyed by `tenant_id` and only ever touched through
//! unique-key upsert, find and delete. The connection sits behind a mutex and
//! every statement runs on the blocking pool, so a slow write for one tenant
//! never stalls the async workers serving other tenants.

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{OAuthError, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tenant_credentials (
    tenant_id               TEXT PRIMARY KEY,
    access_token            TEXT NOT NULL,
    encrypted_refresh_token TEXT NOT NULL,
    expires_at              TEXT NOT NULL,
    created_at              TEXT NOT NULL,
    updated_at              TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pending_challenges (
    tenant_id     TEXT PRIMARY KEY,
    code_verifier TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pending_challenges_created_at
    ON pending_challenges(created_at);
"#;

/// Handle to the SQLite database. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database at `path` and ensures the schema exists.
    ///
    /// `":memory:"` gives a private in-memory database, used by tests.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        conn.execute_batch(SCHEMA)
            .context("Failed to create tenant OAuth tables")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` against the connection on the blocking thread pool.
    pub async fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| OAuthError::Storage("database mutex poisoned".into()))?;
            f(&mut guard)
        })
        .await?
    }
}

/// Formats a timestamp for storage.
///
/// Fixed-width RFC 3339 in UTC, so lexical order in SQL matches time order.
pub fn to_db_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parses a timestamp written by [`to_db_timestamp`].
pub fn parse_db_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| OAuthError::Storage(format!("invalid timestamp '{value}': {e}")))
}
