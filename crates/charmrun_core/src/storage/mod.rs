//! Durable key/value storage backends.
//!
//! # Responsibility
//! - Define the `Storage` capability set shared by every backend.
//! - Provide the in-memory, embedded SQLite and hook-tool backends.
//!
//! # Invariants
//! - Values cross the backend boundary only as encoded documents.
//! - Every write is synchronous; nothing is buffered behind the caller.
//! - A closed backend rejects every operation with `StorageError::Closed`.

use crate::codec::SerializationError;
use crate::db::DbError;
use crate::model::value::Value;
use std::cell::RefCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;
use std::time::Duration;

pub mod hook;
pub mod memory;
pub mod sqlite;

pub use hook::{HookRunner, HookToolStorage, ProcessRunner};
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug)]
pub enum StorageError {
    /// Backend missing, unreachable, or a hook tool exited non-zero.
    Unavailable(String),
    Timeout { command: String, after: Duration },
    Closed,
    Io(std::io::Error),
    Db(DbError),
    Serialization(SerializationError),
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "storage unavailable: {message}"),
            Self::Timeout { command, after } => write!(
                f,
                "storage command `{command}` did not finish within {}ms",
                after.as_millis()
            ),
            Self::Closed => write!(f, "storage backend is closed"),
            Self::Io(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::Unavailable(_) | Self::Timeout { .. } | Self::Closed => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<DbError> for StorageError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<SerializationError> for StorageError {
    fn from(value: SerializationError) -> Self {
        Self::Serialization(value)
    }
}

/// Capability set every storage backend provides.
pub trait Storage {
    /// Short backend name for diagnostics (`memory`, `sqlite`, `hook-tools`).
    fn name(&self) -> &'static str;
    fn get(&self, key: &str) -> StorageResult<Option<Value>>;
    fn set(&mut self, key: &str, value: &Value) -> StorageResult<()>;
    /// Deleting an absent key is not an error.
    fn delete(&mut self, key: &str) -> StorageResult<()>;
    fn is_available(&self) -> bool;
    /// Releases backend resources. Called once, from [`SharedStorage::close`].
    fn close(&mut self) -> StorageResult<()> {
        Ok(())
    }
}

/// Single-threaded shared access to the run's storage backend.
///
/// The framework and every `StoredState` hold clones; closing through any
/// clone closes the backend for all of them.
#[derive(Clone)]
pub struct SharedStorage {
    inner: Rc<RefCell<Option<Box<dyn Storage>>>>,
}

impl SharedStorage {
    pub fn new(storage: Box<dyn Storage>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Some(storage))),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner
            .borrow()
            .as_ref()
            .map_or("closed", |storage| storage.name())
    }

    pub fn is_available(&self) -> bool {
        self.inner
            .borrow()
            .as_ref()
            .is_some_and(|storage| storage.is_available())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.borrow().is_none()
    }

    pub fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        match self.inner.borrow().as_ref() {
            Some(storage) => storage.get(key),
            None => Err(StorageError::Closed),
        }
    }

    pub fn set(&self, key: &str, value: &Value) -> StorageResult<()> {
        match self.inner.borrow_mut().as_mut() {
            Some(storage) => storage.set(key, value),
            None => Err(StorageError::Closed),
        }
    }

    pub fn delete(&self, key: &str) -> StorageResult<()> {
        match self.inner.borrow_mut().as_mut() {
            Some(storage) => storage.delete(key),
            None => Err(StorageError::Closed),
        }
    }

    /// Closes the backend. Idempotent.
    pub fn close(&self) -> StorageResult<()> {
        let taken = self.inner.borrow_mut().take();
        match taken {
            Some(mut storage) => storage.close(),
            None => Ok(()),
        }
    }
}
