//! Kind-to-type registry used when replaying persisted notices.
//!
//! # Invariants
//! - Objects are keyed by `(parent kind, kind)`; events by
//!   `(emitter kind, event kind)`, so two emitters may reuse an event kind.
//! - Registering the same key again replaces the previous entry.
//! - A lookup miss is `FrameworkError::TypeNotRegistered`.

use super::error::{FrameworkError, FrameworkResult};
use super::event::{Event, EventType};
use super::object::{Object, ObjectType};
use super::Framework;
use crate::model::handle::Handle;
use crate::model::value::Snapshot;
use std::collections::HashMap;
use std::rc::Rc;

pub(crate) type ObjectFactory =
    Rc<dyn Fn(&mut Framework, Handle) -> FrameworkResult<Box<dyn Object>>>;
pub(crate) type EventRestorer = fn(&Snapshot) -> FrameworkResult<Box<dyn Event>>;

type ObjectKey = (Option<String>, String);
type EventKey = (String, String);

#[derive(Default)]
pub(crate) struct TypeRegistry {
    objects: HashMap<ObjectKey, ObjectFactory>,
    events: HashMap<EventKey, EventRestorer>,
}

impl TypeRegistry {
    pub(crate) fn register_object<O, F>(&mut self, parent_kind: Option<&str>, factory: F)
    where
        O: ObjectType + 'static,
        F: Fn(&mut Framework, Handle) -> FrameworkResult<O> + 'static,
    {
        let erased: ObjectFactory = Rc::new(move |framework: &mut Framework, handle: Handle| {
            let object: Box<dyn Object> = Box::new(factory(framework, handle)?);
            Ok(object)
        });
        self.objects.insert(
            (parent_kind.map(ToString::to_string), O::KIND.to_string()),
            erased,
        );
    }

    pub(crate) fn register_event<E: EventType + 'static>(&mut self, emitter_kind: &str) {
        self.events.insert(
            (emitter_kind.to_string(), E::KIND.to_string()),
            restore_event::<E>,
        );
    }

    pub(crate) fn object_factory(
        &self,
        parent_kind: Option<&str>,
        kind: &str,
    ) -> FrameworkResult<ObjectFactory> {
        self.objects
            .get(&(parent_kind.map(ToString::to_string), kind.to_string()))
            .cloned()
            .ok_or_else(|| FrameworkError::TypeNotRegistered {
                parent_kind: parent_kind.map(ToString::to_string),
                kind: kind.to_string(),
            })
    }

    pub(crate) fn event_restorer(
        &self,
        emitter_kind: &str,
        kind: &str,
    ) -> FrameworkResult<EventRestorer> {
        self.events
            .get(&(emitter_kind.to_string(), kind.to_string()))
            .copied()
            .ok_or_else(|| FrameworkError::TypeNotRegistered {
                parent_kind: Some(emitter_kind.to_string()),
                kind: kind.to_string(),
            })
    }
}

fn restore_event<E: EventType + 'static>(snapshot: &Snapshot) -> FrameworkResult<Box<dyn Event>> {
    Ok(Box::new(E::restore(snapshot)?))
}
