//! Primitive value model shared by snapshots, stored state and notices.
//!
//! # Responsibility
//! - Represent exactly the shapes a `snapshot()` may produce.
//! - Keep byte strings distinct from text and sets distinct from lists.
//!
//! # Invariants
//! - Set members and mapping keys are hashable scalars (`Key`).
//! - Mapping insertion order is preserved.

use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/// Persistable attribute mapping produced by `snapshot()`.
pub type Snapshot = IndexMap<String, Value>;

/// Scalar usable as a set member or mapping key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Bool(bool),
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Key {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "{value}"),
            Self::Bytes(value) => write!(f, "<{} bytes>", value.len()),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Key {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// One persistable value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Set(BTreeSet<Key>),
    Map(IndexMap<Key, Value>),
}

impl Value {
    /// Builds a byte-string value; `Vec<u8>` alone would be ambiguous with a list.
    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(value.into())
    }

    /// Builds a set value from any iterator of keys.
    pub fn set<I, K>(items: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        Self::Set(items.into_iter().map(Into::into).collect())
    }

    /// Builds a mapping value preserving iteration order.
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<Value>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(value) => Some(value.as_slice()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(value) => Some(value.as_slice()),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<Key>> {
        match self {
            Self::Set(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<Key, Value>> {
        match self {
            Self::Map(value) => Some(value),
            _ => None,
        }
    }

    /// Looks up a string-keyed entry of a mapping value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.as_map()
            .and_then(|map| map.get(&Key::Str(field.to_string())))
    }

    /// Converts a snapshot into a mapping value with string keys.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self::Map(
            snapshot
                .iter()
                .map(|(field, value)| (Key::Str(field.clone()), value.clone()))
                .collect(),
        )
    }

    /// Converts a string-keyed mapping value back into a snapshot.
    ///
    /// Returns `None` when the value is not a mapping or carries a non-string key.
    pub fn into_snapshot(self) -> Option<Snapshot> {
        let Self::Map(map) = self else {
            return None;
        };
        let mut snapshot = Snapshot::with_capacity(map.len());
        for (key, value) in map {
            match key {
                Key::Str(field) => {
                    snapshot.insert(field, value);
                }
                _ => return None,
            }
        }
        Some(snapshot)
    }
}

impl From<Key> for Value {
    fn from(value: Key) -> Self {
        match value {
            Key::Bool(value) => Self::Bool(value),
            Key::Int(value) => Self::Int(value),
            Key::Str(value) => Self::Str(value),
            Key::Bytes(value) => Self::Bytes(value),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value)
    }
}

impl From<BTreeSet<Key>> for Value {
    fn from(value: BTreeSet<Key>) -> Self {
        Self::Set(value)
    }
}

impl From<IndexMap<Key, Value>> for Value {
    fn from(value: IndexMap<Key, Value>) -> Self {
        Self::Map(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
