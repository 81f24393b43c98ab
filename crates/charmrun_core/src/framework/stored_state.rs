//! Persisted attribute container scoped to an owning object.
//!
//! # Responsibility
//! - Load an owner's persisted fields when the owner is constructed.
//! - Write every mutation through to storage before it becomes visible.
//!
//! # Invariants
//! - The slot lives at `<owner path>/<name>`; `name` defaults to `_stored`.
//! - A failed write leaves the in-memory fields unchanged.
//! - `set_default` never overwrites a field that already exists.

use super::error::{FrameworkError, FrameworkResult};
use super::Framework;
use crate::codec::{from_value, to_value, SerializationError};
use crate::model::handle::Handle;
use crate::model::value::{Snapshot, Value};
use crate::storage::SharedStorage;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const DEFAULT_STATE_NAME: &str = "_stored";

pub struct StoredState {
    storage: SharedStorage,
    key: String,
    data: Snapshot,
}

impl StoredState {
    /// Opens the default slot of `owner`.
    pub fn new(framework: &Framework, owner: &Handle) -> FrameworkResult<Self> {
        Self::named(framework, owner, DEFAULT_STATE_NAME)
    }

    /// Opens a named slot of `owner`; one object may own several.
    pub fn named(framework: &Framework, owner: &Handle, name: &str) -> FrameworkResult<Self> {
        let key = owner.nest(name, None)?.path().to_string();
        Self::open(framework.storage().clone(), key)
    }

    pub(crate) fn open(storage: SharedStorage, key: impl Into<String>) -> FrameworkResult<Self> {
        let key = key.into();
        let data = match storage.get(&key)? {
            None => Snapshot::new(),
            Some(value) => value.into_snapshot().ok_or_else(|| {
                FrameworkError::Serialization(SerializationError::Corrupt(format!(
                    "stored state `{key}` is not a string-keyed mapping"
                )))
            })?,
        };
        Ok(Self { storage, key, data })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn data(&self) -> &Snapshot {
        &self.data
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Reads a field through serde; `Ok(None)` when the field is absent.
    pub fn get_as<T: DeserializeOwned>(&self, field: &str) -> FrameworkResult<Option<T>> {
        self.data
            .get(field)
            .map(|value| from_value(value).map_err(FrameworkError::from))
            .transpose()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.data.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> FrameworkResult<()> {
        let value = value.into();
        self.update(|data| {
            data.insert(field.to_string(), value);
        })
    }

    pub fn set_as<T: Serialize + ?Sized>(&mut self, field: &str, value: &T) -> FrameworkResult<()> {
        let value = to_value(value)?;
        self.set(field, value)
    }

    /// Writes each field that does not exist yet. Persists at most once.
    pub fn set_default<I, K, V>(&mut self, fields: I) -> FrameworkResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let missing: Vec<(String, Value)> = fields
            .into_iter()
            .map(|(field, value)| (field.into(), value))
            .filter(|(field, _)| !self.data.contains_key(field.as_str()))
            .map(|(field, value)| (field, value.into()))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        self.update(|data| data.extend(missing))
    }

    pub fn remove(&mut self, field: &str) -> FrameworkResult<Option<Value>> {
        if !self.data.contains_key(field) {
            return Ok(None);
        }
        let mut removed = None;
        self.update(|data| removed = data.shift_remove(field))?;
        Ok(removed)
    }

    /// Applies several changes and persists them as one write.
    pub fn update<F>(&mut self, change: F) -> FrameworkResult<()>
    where
        F: FnOnce(&mut Snapshot),
    {
        let mut next = self.data.clone();
        change(&mut next);
        self.storage.set(&self.key, &Value::from_snapshot(&next))?;
        self.data = next;
        Ok(())
    }
}
