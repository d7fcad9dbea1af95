//! Persistence primitive
//!
//! The catalog persists as a single named slot holding a JSON string. The
//! `Storage` trait is that get/set primitive; `SqliteStorage` keeps slots in a
//! small SQLite database in the user's data directory and `MemoryStorage`
//! keeps them in memory (with an optional quota, mirroring a browser's
//! storage limit).

use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::PersistenceError;

/// A key/value store of string blobs
pub trait Storage {
    /// Read a slot; `Ok(None)` if it was never written
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Overwrite a slot
    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError>;
}

/// Slots stored in a SQLite database
pub struct SqliteStorage {
    conn: Connection,
    db_path: PathBuf,
}

impl SqliteStorage {
    /// File name of the database inside the data directory
    pub const DB_FILE: &'static str = "prompt_gallery.db";

    /// Open (or create) the database in `data_dir`
    ///
    /// The directory is created if needed. The default data directory is:
    /// - Linux: ~/.local/share/prompt-gallery
    /// - macOS: ~/Library/Application Support/prompt-gallery
    /// - Windows: %APPDATA%\prompt-gallery
    pub fn open(data_dir: &Path) -> Result<Self, PersistenceError> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(Self::DB_FILE);

        let conn = Connection::open(&db_path)?;
        let storage = Self { conn, db_path };
        storage.init_schema()?;

        info!(path = %storage.db_path.display(), "Storage initialized");
        Ok(storage)
    }

    /// An in-memory database (used by tests)
    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn,
            db_path: PathBuf::from(":memory:"),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn init_schema(&self) -> Result<(), PersistenceError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS slots (
                key             TEXT PRIMARY KEY,
                value           TEXT NOT NULL,
                updated_at      INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Get the path to the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

impl Storage for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM slots WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.conn.execute(
            "INSERT INTO slots (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![key, value, chrono::Utc::now().timestamp()],
        )?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("db_path", &self.db_path)
            .finish()
    }
}

/// Slots kept in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    slots: HashMap<String, String>,
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes whose value is longer than `quota` bytes
    pub fn with_quota(quota: usize) -> Self {
        Self {
            slots: HashMap::new(),
            quota: Some(quota),
        }
    }

    /// Write a slot directly, bypassing the quota
    pub fn insert_raw(&mut self, key: &str, value: &str) {
        self.slots.insert(key.to_string(), value.to_string());
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.slots.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        if let Some(quota) = self.quota {
            if value.len() > quota {
                return Err(PersistenceError::QuotaExceeded {
                    needed: value.len(),
                    quota,
                });
            }
        }
        self.slots.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_roundtrip() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        assert_eq!(storage.get("entries").unwrap(), None);

        storage.set("entries", "[]").unwrap();
        storage.set("entries", "[1]").unwrap();
        assert_eq!(storage.get("entries").unwrap().as_deref(), Some("[1]"));
    }

    #[test]
    fn test_sqlite_on_disk_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut storage = SqliteStorage::open(dir.path()).unwrap();
            storage.set("slot", "hello").unwrap();
        }
        let storage = SqliteStorage::open(dir.path()).unwrap();
        assert_eq!(storage.get("slot").unwrap().as_deref(), Some("hello"));
        assert!(storage.path().ends_with(SqliteStorage::DB_FILE));
    }

    #[test]
    fn test_memory_quota() {
        let mut storage = MemoryStorage::with_quota(4);
        storage.set("k", "1234").unwrap();
        let err = storage.set("k", "12345").unwrap_err();
        assert!(matches!(err, PersistenceError::QuotaExceeded { needed: 5, quota: 4 }));
        // The previous value survives a rejected write
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("1234"));
    }
}
