//! Hierarchical object identity.
//!
//! # Responsibility
//! - Build deterministic path strings for stateful objects and events.
//! - Parse persisted path strings back into handles.
//!
//! # Invariants
//! - Two handles are equal iff their paths are equal.
//! - Components are non-empty and never contain `/`, `[` or `]`.
//! - Kinds starting with `#` are reserved for framework bookkeeping.
//!
//! Path grammar: `component ("/" component)*` where
//! `component = kind ("[" key "]")?`.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

const PATH_SEPARATOR: char = '/';
const RESERVED_PREFIX: char = '#';

/// Malformed handle construction or object-tree placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyKind,
    EmptyKey { kind: String },
    ForbiddenCharacter { component: String, character: char },
    ReservedKind(String),
    MalformedPath(String),
    UnknownParent { path: String, parent: String },
    EmptyMethod { observer: String },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyKind => write!(f, "handle kind must not be empty"),
            Self::EmptyKey { kind } => {
                write!(f, "handle key for kind `{kind}` must not be empty when set")
            }
            Self::ForbiddenCharacter {
                component,
                character,
            } => write!(
                f,
                "handle component `{component}` contains forbidden character `{character}`"
            ),
            Self::ReservedKind(kind) => write!(f, "handle kind `{kind}` is reserved"),
            Self::MalformedPath(path) => write!(f, "malformed handle path `{path}`"),
            Self::UnknownParent { path, parent } => write!(
                f,
                "object `{path}` names parent `{parent}` which is not part of this run's object tree"
            ),
            Self::EmptyMethod { observer } => {
                write!(f, "observer method name for `{observer}` must not be empty")
            }
        }
    }
}

impl Error for ValidationError {}

/// Path identity of one object or event occurrence.
///
/// Handles are cheap to clone; the parent chain is shared.
#[derive(Debug, Clone)]
pub struct Handle {
    parent: Option<Rc<Handle>>,
    kind: String,
    key: Option<String>,
    path: String,
}

impl Handle {
    /// Creates a handle below `parent` (or at the root when `None`).
    ///
    /// # Errors
    /// - `EmptyKind` / `EmptyKey` for empty components.
    /// - `ForbiddenCharacter` when a component contains a separator.
    /// - `ReservedKind` when `kind` starts with `#`.
    pub fn new(
        parent: Option<&Handle>,
        kind: &str,
        key: Option<&str>,
    ) -> Result<Self, ValidationError> {
        validate_kind(kind)?;
        if kind.starts_with(RESERVED_PREFIX) {
            return Err(ValidationError::ReservedKind(kind.to_string()));
        }
        if let Some(key) = key {
            validate_key(kind, key)?;
        }
        Ok(Self::build(parent, kind, key))
    }

    /// Creates a root handle with no key.
    pub fn root(kind: &str) -> Result<Self, ValidationError> {
        Self::new(None, kind, None)
    }

    /// Parses a path string previously produced by [`Handle::path`].
    ///
    /// Reserved kinds are accepted here because persisted records may name them.
    pub fn from_path(path: &str) -> Result<Self, ValidationError> {
        if path.is_empty() {
            return Err(ValidationError::MalformedPath(path.to_string()));
        }

        let mut current: Option<Handle> = None;
        for component in path.split(PATH_SEPARATOR) {
            let (kind, key) = split_component(component)
                .ok_or_else(|| ValidationError::MalformedPath(path.to_string()))?;
            validate_kind(kind).map_err(|_| ValidationError::MalformedPath(path.to_string()))?;
            if let Some(key) = key {
                validate_key(kind, key)
                    .map_err(|_| ValidationError::MalformedPath(path.to_string()))?;
            }
            current = Some(Self::build(current.as_ref(), kind, key));
        }

        current.ok_or_else(|| ValidationError::MalformedPath(path.to_string()))
    }

    /// Derives a child handle.
    pub fn nest(&self, kind: &str, key: Option<&str>) -> Result<Self, ValidationError> {
        Self::new(Some(self), kind, key)
    }

    pub fn parent(&self) -> Option<&Handle> {
        self.parent.as_deref()
    }

    /// Kind of the parent handle, used as the type-registry namespace.
    pub fn parent_kind(&self) -> Option<&str> {
        self.parent.as_deref().map(Handle::kind)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn build(parent: Option<&Handle>, kind: &str, key: Option<&str>) -> Self {
        let component = match key {
            Some(key) => format!("{kind}[{key}]"),
            None => kind.to_string(),
        };
        let path = match parent {
            Some(parent) => format!("{}{PATH_SEPARATOR}{component}", parent.path),
            None => component,
        };
        Self {
            parent: parent.map(|parent| Rc::new(parent.clone())),
            kind: kind.to_string(),
            key: key.map(ToString::to_string),
            path,
        }
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Handle {}

impl Hash for Handle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl Display for Handle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path)
    }
}

fn validate_kind(kind: &str) -> Result<(), ValidationError> {
    if kind.is_empty() {
        return Err(ValidationError::EmptyKind);
    }
    reject_separators(kind)
}

fn validate_key(kind: &str, key: &str) -> Result<(), ValidationError> {
    if key.is_empty() {
        return Err(ValidationError::EmptyKey {
            kind: kind.to_string(),
        });
    }
    reject_separators(key)
}

fn reject_separators(component: &str) -> Result<(), ValidationError> {
    match component
        .chars()
        .find(|c| *c == PATH_SEPARATOR || *c == '[' || *c == ']')
    {
        Some(character) => Err(ValidationError::ForbiddenCharacter {
            component: component.to_string(),
            character,
        }),
        None => Ok(()),
    }
}

fn split_component(component: &str) -> Option<(&str, Option<&str>)> {
    match component.find('[') {
        None => Some((component, None)),
        Some(open) => {
            let rest = component[open + 1..].strip_suffix(']')?;
            Some((&component[..open], Some(rest)))
        }
    }
}
