//! Embedded SQLite backend.
//!
//! # Responsibility
//! - Persist encoded documents in the `state(key, value)` table.
//!
//! # Invariants
//! - Each write is its own autocommitted statement, so a crash right after
//!   `set` returns never loses that write.
//! - Cross-process exclusion is the caller's job; SQLite lock waits are bounded
//!   by the connection busy timeout.

use super::{Storage, StorageError, StorageResult};
use crate::codec::{decode, encode};
use crate::db::{open_db, open_db_in_memory};
use crate::model::value::Value;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

pub struct SqliteStorage {
    conn: Option<Connection>,
}

impl SqliteStorage {
    /// Opens (creating if needed) the state database at `path`.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    pub fn in_memory() -> StorageResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Wraps a connection already bootstrapped by [`crate::db`].
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn: Some(conn) }
    }

    fn conn(&self) -> StorageResult<&Connection> {
        self.conn.as_ref().ok_or(StorageError::Closed)
    }
}

impl Storage for SqliteStorage {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        let document: Option<String> = self
            .conn()?
            .query_row("SELECT value FROM state WHERE key = ?1;", [key], |row| {
                row.get(0)
            })
            .optional()?;

        match document {
            Some(document) => Ok(Some(decode(&document)?)),
            None => Ok(None),
        }
    }

    fn set(&mut self, key: &str, value: &Value) -> StorageResult<()> {
        let document = encode(value)?;
        self.conn()?.execute(
            "INSERT INTO state (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
            params![key, document],
        )?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> StorageResult<()> {
        self.conn()?
            .execute("DELETE FROM state WHERE key = ?1;", [key])?;
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.conn.is_some()
    }

    fn close(&mut self) -> StorageResult<()> {
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, err)| err.into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteStorage;
    use crate::model::value::{Key, Value};
    use crate::storage::{Storage, StorageError};

    #[test]
    fn overwrites_existing_key() {
        let mut storage = SqliteStorage::in_memory().expect("open");
        storage.set("k", &Value::from(1i64)).expect("first set");
        storage.set("k", &Value::from(2i64)).expect("second set");
        assert_eq!(storage.get("k").expect("get"), Some(Value::Int(2)));
    }

    #[test]
    fn stores_sets_and_bytes_faithfully() {
        let mut storage = SqliteStorage::in_memory().expect("open");
        let value = Value::map([
            ("members", Value::set([Key::from("a"), Key::from("b")])),
            ("blob", Value::bytes(b"\x00\x01".to_vec())),
        ]);
        storage.set("Charm/_stored", &value).expect("set");
        assert_eq!(storage.get("Charm/_stored").expect("get"), Some(value));
    }

    #[test]
    fn close_rejects_later_access() {
        let mut storage = SqliteStorage::in_memory().expect("open");
        storage.close().expect("close");
        assert!(!storage.is_available());
        assert!(matches!(storage.get("k"), Err(StorageError::Closed)));
    }
}
