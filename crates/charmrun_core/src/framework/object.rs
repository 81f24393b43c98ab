//! Stateful objects living in the framework's object tree.

use super::error::FrameworkResult;
use crate::model::handle::Handle;
use crate::model::value::Snapshot;
use std::any::Any;

/// Downcasting support for trait objects stored by the framework.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// An addressable participant in a run.
///
/// Objects are rebuilt from scratch every run by the same construction code.
/// `snapshot`/`restore` only matter for objects that may be rebuilt
/// transiently to receive a replayed notice.
pub trait Object: AsAny {
    fn handle(&self) -> &Handle;

    fn snapshot(&self) -> Snapshot {
        Snapshot::new()
    }

    fn restore(&mut self, _snapshot: &Snapshot) -> FrameworkResult<()> {
        Ok(())
    }
}

/// An object type that can be registered for transient reconstruction.
pub trait ObjectType: Object + Sized {
    /// Handle kind used by instances of this type.
    const KIND: &'static str;
}
