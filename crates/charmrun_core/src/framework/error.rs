//! Framework error kinds.

use crate::codec::SerializationError;
use crate::model::handle::ValidationError;
use crate::storage::StorageError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Error returned by an observer; carried unchanged inside `NoticeDispatch`.
pub type ObserverError = Box<dyn Error + Send + Sync + 'static>;

pub type FrameworkResult<T> = Result<T, FrameworkError>;

#[derive(Debug)]
pub enum FrameworkError {
    Validation(ValidationError),
    Serialization(SerializationError),
    /// Two objects with the same parent, kind and key in one run.
    Collision { path: String },
    /// An observer failed; `source` is its error, untouched.
    NoticeDispatch {
        event_path: String,
        observer_path: String,
        method: String,
        source: ObserverError,
    },
    Storage(StorageError),
    /// A persisted record names a kind nothing registered in this run.
    TypeNotRegistered {
        parent_kind: Option<String>,
        kind: String,
    },
    /// A persisted notice names an observer method nothing bound in this run.
    ObserverNotBound { observer_path: String, method: String },
    DuplicateObserver {
        event_path: String,
        observer_path: String,
        existing: String,
        requested: String,
    },
    /// A bound object or event has a different concrete type than its observer expects.
    TypeMismatch { path: String, expected: &'static str },
    /// The operation cannot run while an observer is executing.
    Reentrant { operation: &'static str },
    CommitDeferred { event_path: String },
}

impl Display for FrameworkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "{err}"),
            Self::Collision { path } => {
                write!(f, "object `{path}` already exists in this run's object tree")
            }
            Self::NoticeDispatch {
                event_path,
                observer_path,
                method,
                source,
            } => write!(
                f,
                "observer `{observer_path}.{method}` failed handling `{event_path}`: {source}"
            ),
            Self::Storage(err) => write!(f, "{err}"),
            Self::TypeNotRegistered { parent_kind, kind } => match parent_kind {
                Some(parent_kind) => write!(
                    f,
                    "type `{kind}` under parent kind `{parent_kind}` is not registered"
                ),
                None => write!(f, "root type `{kind}` is not registered"),
            },
            Self::ObserverNotBound {
                observer_path,
                method,
            } => write!(
                f,
                "no observer method `{method}` is bound for `{observer_path}`"
            ),
            Self::DuplicateObserver {
                event_path,
                observer_path,
                existing,
                requested,
            } => write!(
                f,
                "`{observer_path}` already observes `{event_path}` with `{existing}`; refusing to bind `{requested}`"
            ),
            Self::TypeMismatch { path, expected } => {
                write!(f, "`{path}` is not a `{expected}`")
            }
            Self::Reentrant { operation } => {
                write!(f, "`{operation}` cannot be called while an observer is running")
            }
            Self::CommitDeferred { event_path } => {
                write!(f, "commit event `{event_path}` cannot be deferred")
            }
        }
    }
}

impl Error for FrameworkError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::NoticeDispatch { source, .. } => Some(source.as_ref()),
            Self::Storage(err) => Some(err),
            Self::Collision { .. }
            | Self::TypeNotRegistered { .. }
            | Self::ObserverNotBound { .. }
            | Self::DuplicateObserver { .. }
            | Self::TypeMismatch { .. }
            | Self::Reentrant { .. }
            | Self::CommitDeferred { .. } => None,
        }
    }
}

impl From<ValidationError> for FrameworkError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<SerializationError> for FrameworkError {
    fn from(value: SerializationError) -> Self {
        Self::Serialization(value)
    }
}

impl From<StorageError> for FrameworkError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::Serialization(err) => Self::Serialization(err),
            other => Self::Storage(other),
        }
    }
}
