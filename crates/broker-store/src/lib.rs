//! Durable key-value state and audit log (§6, §10.5), grounded on
//! `original_source/src/db.c`: a single serializing lock around a SQLite connection,
//! synchronous writes acknowledged only once SQLite confirms them durable.

use std::future::Future;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store database '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("store query failed: {0}")]
    Query(#[from] rusqlite::Error),
}

/// One resolved `(identity, key) -> value` record, returned by `get_state`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRecord {
    pub value: String,
    pub updated_at: String,
}

/// The persistent store boundary: `set_state`/`get_state` per §6, plus `log` for the
/// PUBLISH/SUBSCRIBE audit trail (§9's second Open Question resolves audit scope to
/// PUBLISH only; `log` is kept general so a caller may also record SUBSCRIBE if desired)
/// and `audit_len`, the `snapshot_status`-adjacent read the (out-of-scope) admin surface
/// would use. Callers depend on this trait, not on `rusqlite` directly — `Store` is the
/// one implementation this tree ships, but the event engine only ever calls through
/// `StateStore`'s methods.
pub trait StateStore {
    /// Upserts `(identity, key) -> value`, per §6 (`SET <key> <value>`).
    fn set_state(&self, identity: &str, key: &str, value: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Exact-match lookup, per §6 (`GET <key>`). Returns `None` on a missing key.
    fn get_state(&self, identity: &str, key: &str) -> impl Future<Output = Result<Option<StateRecord>, StoreError>> + Send;

    /// Appends one audit entry, mirroring `db_log_message` in `db.c`.
    fn log(&self, sender: &str, topic: &str, message: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Number of audit rows recorded; exposed for tests and the admin `STATUS` surface.
    fn audit_len(&self) -> impl Future<Output = Result<i64, StoreError>> + Send;
}

/// `rusqlite`-backed `StateStore`, grounded on `db.c`: a single serializing lock around a
/// SQLite connection, synchronous writes acknowledged only once SQLite confirms them
/// durable. The `tokio::sync::Mutex` here plays the same role as `db.c`'s one
/// `pthread_mutex_t db_lock`, sized to the store boundary rather than the whole engine.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.display().to_string(),
            source,
        })?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS state (
                identity TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (identity, key)
            );
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                sender TEXT,
                topic TEXT,
                message TEXT
            );",
        )?;
        tracing::info!(path = %path.display(), "state/audit store initialized");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests and the enrollment-only lobby path, where no durable
    /// state is required.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: ":memory:".to_owned(),
            source,
        })?;
        conn.execute_batch(
            "CREATE TABLE state (
                identity TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (identity, key)
            );
            CREATE TABLE audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                sender TEXT,
                topic TEXT,
                message TEXT
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl StateStore for Store {
    async fn set_state(&self, identity: &str, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO state (identity, key, value, updated_at)
             VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP)
             ON CONFLICT(identity, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            params![identity, key, value],
        )?;
        Ok(())
    }

    async fn get_state(&self, identity: &str, key: &str) -> Result<Option<StateRecord>, StoreError> {
        let conn = self.conn.lock().await;
        let record = conn
            .query_row(
                "SELECT value, updated_at FROM state WHERE identity = ?1 AND key = ?2",
                params![identity, key],
                |row| {
                    Ok(StateRecord {
                        value: row.get(0)?,
                        updated_at: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    async fn log(&self, sender: &str, topic: &str, message: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO audit_log (sender, topic, message) VALUES (?1, ?2, ?3)",
            params![sender, topic, message],
        )?;
        Ok(())
    }

    async fn audit_len(&self) -> Result<i64, StoreError> {
        let conn = self.conn.lock().await;
        let count = conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))?;
        Ok(count)
    }
}
