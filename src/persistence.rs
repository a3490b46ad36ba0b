//! # SQLite Route Store
//!
//! Durable key-value storage for the cached last route, backed by a single
//! SQLite table:
//!
//! ```text
//! kv_store(key TEXT PRIMARY KEY, value BLOB, updated_at INTEGER)
//! ```
//!
//! Values are opaque bytes; encoding and validation of the route blob happen
//! in [`crate::route`].

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};

use crate::collaborators::RouteStore;
use crate::{NavError, Result};

fn read_error(e: rusqlite::Error) -> NavError {
    NavError::StorageRead {
        message: e.to_string(),
    }
}

fn write_error(e: rusqlite::Error) -> NavError {
    NavError::Storage {
        message: e.to_string(),
    }
}

/// [`RouteStore`] over a SQLite database file.
pub struct SqliteRouteStore {
    db: Mutex<Connection>,
}

impl SqliteRouteStore {
    /// Open (or create) the database at `db_path`.
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path).map_err(write_error)?;
        Self::init_schema(&db)?;
        info!("[SqliteRouteStore] Opened {}", db_path);

        Ok(Self { db: Mutex::new(db) })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            );
        "#,
        )
        .map_err(write_error)
    }

    /// Unix seconds of the last write to `key`.
    pub fn updated_at(&self, key: &str) -> Result<Option<i64>> {
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        db.query_row(
            "SELECT updated_at FROM kv_store WHERE key = ?",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(read_error)
    }

    /// Remove `key`. Returns whether it existed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let removed = db
            .execute("DELETE FROM kv_store WHERE key = ?", params![key])
            .map_err(write_error)?;
        Ok(removed > 0)
    }
}

impl RouteStore for SqliteRouteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        db.query_row(
            "SELECT value FROM kv_store WHERE key = ?",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(read_error)
    }

    fn set(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let updated_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        db.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, bytes, updated_at],
        )
        .map_err(write_error)?;

        debug!("[SqliteRouteStore] Wrote {} bytes to '{}'", bytes.len(), key);
        Ok(())
    }
}
