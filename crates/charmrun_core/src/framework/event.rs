//! Typed events, their sources and observer outcomes.
//!
//! # Invariants
//! - An event source path is `<emitter path>/on/<event kind>`.
//! - One occurrence of an event is addressed as `<source path>[<sequence>]`.

use super::error::{FrameworkResult, ObserverError};
use super::object::AsAny;
use crate::model::handle::{Handle, ValidationError};
use crate::model::value::Snapshot;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;

/// Handle kind grouping every event source of one emitter.
pub const EVENTS_KIND: &str = "on";

/// Payload of one event occurrence.
pub trait Event: AsAny {
    fn snapshot(&self) -> Snapshot {
        Snapshot::new()
    }
}

/// An event type that can be rebuilt from a persisted snapshot.
pub trait EventType: Event + Sized {
    const KIND: &'static str;

    fn restore(snapshot: &Snapshot) -> FrameworkResult<Self>;
}

/// What an observer did with one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Work is complete; the notice is deleted.
    Handled,
    /// Retry on a later run; the notice stays pending.
    Deferred,
}

/// `Err` is the third outcome: the observer failed and the run aborts.
pub type ObserverResult = Result<Outcome, ObserverError>;

/// Typed emission point for events of kind `E::KIND` on one emitter.
pub struct EventSource<E> {
    emitter: Handle,
    path: Handle,
    _event: PhantomData<fn() -> E>,
}

impl<E: EventType> EventSource<E> {
    pub fn new(emitter: &Handle) -> Result<Self, ValidationError> {
        let path = emitter.nest(EVENTS_KIND, None)?.nest(E::KIND, None)?;
        Ok(Self {
            emitter: emitter.clone(),
            path,
            _event: PhantomData,
        })
    }
}

impl<E> EventSource<E> {
    pub fn emitter(&self) -> &Handle {
        &self.emitter
    }

    pub fn path(&self) -> &Handle {
        &self.path
    }

    pub fn kind(&self) -> &str {
        self.path.kind()
    }

    /// Handle of the occurrence with the given notice sequence number.
    pub fn occurrence(&self, sequence: u64) -> Result<Handle, ValidationError> {
        Handle::new(
            self.path.parent(),
            self.path.kind(),
            Some(&sequence.to_string()),
        )
    }
}

impl<E> Clone for EventSource<E> {
    fn clone(&self) -> Self {
        Self {
            emitter: self.emitter.clone(),
            path: self.path.clone(),
            _event: PhantomData,
        }
    }
}

impl<E> Debug for EventSource<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSource")
            .field("path", &self.path.path())
            .finish()
    }
}

/// Emitted by `Framework::commit` before `Commit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PreCommit;

impl Event for PreCommit {}

impl EventType for PreCommit {
    const KIND: &'static str = "pre_commit";

    fn restore(_snapshot: &Snapshot) -> FrameworkResult<Self> {
        Ok(Self)
    }
}

/// Emitted by `Framework::commit` as the last event of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Commit;

impl Event for Commit {}

impl EventType for Commit {
    const KIND: &'static str = "commit";

    fn restore(_snapshot: &Snapshot) -> FrameworkResult<Self> {
        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::{Commit, EventSource};
    use crate::model::handle::Handle;

    #[test]
    fn source_and_occurrence_paths() {
        let emitter = Handle::root("Database").expect("emitter");
        let source = EventSource::<Commit>::new(&emitter).expect("source");

        assert_eq!(source.path().path(), "Database/on/commit");
        assert_eq!(source.kind(), "commit");
        assert_eq!(
            source.occurrence(7).expect("occurrence").path(),
            "Database/on/commit[7]"
        );
    }
}
