//! Durable record of one pending (event occurrence, observer) delivery.
//!
//! # Invariants
//! - A record lives at `#notice#/<sequence>` from just before its observer
//!   runs until that observer handles it.
//! - The record never stores the sequence itself; the storage key carries it.

use crate::codec::SerializationError;
use crate::model::value::{Snapshot, Value};

const NOTICE_KEY_PREFIX: &str = "#notice#";

const EVENT_PATH_FIELD: &str = "event_path";
const EVENT_KIND_FIELD: &str = "event_kind";
const SNAPSHOT_FIELD: &str = "snapshot";
const OBSERVER_PATH_FIELD: &str = "observer_path";
const METHOD_FIELD: &str = "method";

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub sequence: u64,
    /// Path of the event occurrence, including its `[sequence]` key.
    pub event_path: String,
    pub event_kind: String,
    pub snapshot: Snapshot,
    pub observer_path: String,
    pub method: String,
}

impl Notice {
    pub fn storage_key(sequence: u64) -> String {
        format!("{NOTICE_KEY_PREFIX}/{sequence}")
    }

    pub(crate) fn to_value(&self) -> Value {
        Value::map([
            (EVENT_PATH_FIELD, Value::from(self.event_path.as_str())),
            (EVENT_KIND_FIELD, Value::from(self.event_kind.as_str())),
            (SNAPSHOT_FIELD, Value::from_snapshot(&self.snapshot)),
            (OBSERVER_PATH_FIELD, Value::from(self.observer_path.as_str())),
            (METHOD_FIELD, Value::from(self.method.as_str())),
        ])
    }

    pub(crate) fn from_value(sequence: u64, value: Value) -> Result<Self, SerializationError> {
        let key = Self::storage_key(sequence);
        let mut fields = value.into_snapshot().ok_or_else(|| {
            SerializationError::Corrupt(format!("notice `{key}` is not a string-keyed mapping"))
        })?;

        let mut text = |field: &str| -> Result<String, SerializationError> {
            match fields.shift_remove(field) {
                Some(Value::Str(value)) => Ok(value),
                Some(other) => Err(SerializationError::Corrupt(format!(
                    "notice `{key}` field `{field}` is {}, expected str",
                    other.type_name()
                ))),
                None => Err(SerializationError::Corrupt(format!(
                    "notice `{key}` is missing field `{field}`"
                ))),
            }
        };
        let event_path = text(EVENT_PATH_FIELD)?;
        let event_kind = text(EVENT_KIND_FIELD)?;
        let observer_path = text(OBSERVER_PATH_FIELD)?;
        let method = text(METHOD_FIELD)?;

        let snapshot = match fields.shift_remove(SNAPSHOT_FIELD) {
            Some(value) => value.into_snapshot().ok_or_else(|| {
                SerializationError::Corrupt(format!(
                    "notice `{key}` snapshot is not a string-keyed mapping"
                ))
            })?,
            None => Snapshot::new(),
        };

        Ok(Self {
            sequence,
            event_path,
            event_kind,
            snapshot,
            observer_path,
            method,
        })
    }
}
