//! Event dispatcher, object tree and durable notice queue.
//!
//! # Responsibility
//! - Own the run's storage backend and object arena.
//! - Bind observers to event sources and dispatch events to them.
//! - Persist a notice before every delivery and replay pending notices on
//!   the next run.
//!
//! # Invariants
//! - The pending index is updated before a notice record is written and
//!   after it is deleted, so the index is always a superset of the records.
//! - Pending notices are replayed in ascending sequence order.
//! - An observer failure stops the current emission; later observers get no
//!   notice.
//! - Events emitted from inside an observer are delivered after that
//!   observer returns and before the outer emission continues.
//! - Every binding keeps the callback captured by its own `observe` call;
//!   a notice is delivered through the binding named by its event path,
//!   observer path and method.
//! - `close` runs at most once and is also performed on drop.

use crate::logging::single_line;
use crate::model::handle::{Handle, ValidationError};
use crate::model::value::{Key, Snapshot, Value};
use crate::storage::{MemoryStorage, SharedStorage, Storage, StorageError};
use indexmap::IndexMap;
use log::{debug, error, info, warn};
use std::any::type_name;
use std::collections::{BTreeSet, VecDeque};
use std::rc::Rc;

pub mod error;
pub mod event;
pub mod notice;
pub mod object;
mod registry;
pub mod stored_state;

pub use error::{FrameworkError, FrameworkResult, ObserverError};
pub use event::{
    Commit, Event, EventSource, EventType, ObserverResult, Outcome, PreCommit, EVENTS_KIND,
};
pub use notice::Notice;
pub use object::{AsAny, Object, ObjectType};
pub use stored_state::{StoredState, DEFAULT_STATE_NAME};

use registry::TypeRegistry;

/// Root emitter kind of the framework's own events.
pub const FRAMEWORK_KIND: &str = "framework";
/// Storage key of the framework's bookkeeping slot.
pub const FRAMEWORK_STATE_KEY: &str = "#framework#/_stored";

const EVENT_COUNT_FIELD: &str = "event_count";
const PENDING_FIELD: &str = "pending";
const MAX_LOGGED_ERROR_CHARS: usize = 200;

type ErasedObserver =
    dyn Fn(&mut dyn Object, &dyn Event, &mut Framework) -> FrameworkResult<ObserverResult>;

#[derive(Clone)]
struct ObserverBinding {
    observer_path: String,
    method: String,
    callback: Rc<ErasedObserver>,
}

struct ObjectSlot {
    handle: Handle,
    /// `None` while the object is checked out for an observer call.
    object: Option<Box<dyn Object>>,
    children: Vec<String>,
}

struct QueuedNotice {
    notice: Notice,
    event: Rc<dyn Event>,
}

/// Where a checked-out observer object came from.
enum Lease {
    Arena,
    Transient,
}

/// One run's dispatcher.
pub struct Framework {
    storage: SharedStorage,
    registry: TypeRegistry,
    objects: IndexMap<String, ObjectSlot>,
    observers: IndexMap<String, Vec<ObserverBinding>>,
    state: StoredState,
    dispatch_depth: usize,
    queued: VecDeque<QueuedNotice>,
    on_pre_commit: EventSource<PreCommit>,
    on_commit: EventSource<Commit>,
    closed: bool,
}

impl Framework {
    /// Binds a framework to `storage` and loads its bookkeeping slot.
    ///
    /// # Errors
    /// - `Storage(Unavailable)` when the backend reports itself unavailable.
    /// - `Storage`/`Serialization` when the bookkeeping slot cannot be read.
    pub fn new(storage: Box<dyn Storage>) -> FrameworkResult<Self> {
        let storage = SharedStorage::new(storage);
        if !storage.is_available() {
            return Err(StorageError::Unavailable(format!(
                "backend `{}` is not available",
                storage.backend_name()
            ))
            .into());
        }

        let state = StoredState::open(storage.clone(), FRAMEWORK_STATE_KEY)?;
        let root = Handle::root(FRAMEWORK_KIND)?;
        let mut framework = Self {
            storage,
            registry: TypeRegistry::default(),
            objects: IndexMap::new(),
            observers: IndexMap::new(),
            state,
            dispatch_depth: 0,
            queued: VecDeque::new(),
            on_pre_commit: EventSource::new(&root)?,
            on_commit: EventSource::new(&root)?,
            closed: false,
        };
        framework.registry.register_event::<PreCommit>(FRAMEWORK_KIND);
        framework.registry.register_event::<Commit>(FRAMEWORK_KIND);

        info!(
            "event=run_start module=framework status=ok version={} backend={} pending={}",
            crate::core_version(),
            framework.storage.backend_name(),
            framework.pending_sequences()?.len()
        );
        Ok(framework)
    }

    /// Framework over a fresh in-memory backend.
    pub fn in_memory() -> FrameworkResult<Self> {
        Self::new(Box::new(MemoryStorage::new()))
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    pub fn on_pre_commit(&self) -> &EventSource<PreCommit> {
        &self.on_pre_commit
    }

    pub fn on_commit(&self) -> &EventSource<Commit> {
        &self.on_commit
    }

    /// Registers how to rebuild objects of type `O` below `parent_kind`.
    ///
    /// Needed only for objects that may receive a replayed notice in a run
    /// that did not construct them.
    pub fn register_type<O, F>(&mut self, parent_kind: Option<&str>, factory: F)
    where
        O: ObjectType + 'static,
        F: Fn(&mut Framework, Handle) -> FrameworkResult<O> + 'static,
    {
        self.registry.register_object::<O, F>(parent_kind, factory);
    }

    /// Registers how to rebuild events of type `E` emitted by `source`'s
    /// emitter kind from a notice snapshot.
    pub fn register_event<E: EventType + 'static>(&mut self, source: &EventSource<E>) {
        self.registry.register_event::<E>(source.emitter().kind());
    }

    /// Builds a handle and checks that it can be placed in the object tree.
    ///
    /// # Errors
    /// - `Validation` for malformed components or an absent parent.
    /// - `Collision` when the path is taken.
    pub fn new_handle(
        &self,
        parent: Option<&Handle>,
        kind: &str,
        key: Option<&str>,
    ) -> FrameworkResult<Handle> {
        let handle = Handle::new(parent, kind, key)?;
        self.check_placement(&handle)?;
        Ok(handle)
    }

    /// Places `object` in the tree under its handle's parent.
    pub fn add_object<O: Object + 'static>(&mut self, object: O) -> FrameworkResult<()> {
        let handle = object.handle().clone();
        self.check_placement(&handle)?;

        let path = handle.path().to_string();
        if let Some(parent) = handle.parent() {
            if let Some(slot) = self.objects.get_mut(parent.path()) {
                slot.children.push(path.clone());
            }
        }
        debug!("event=object_add module=framework status=ok path={path}");
        self.objects.insert(
            path,
            ObjectSlot {
                handle,
                object: Some(Box::new(object)),
                children: Vec::new(),
            },
        );
        Ok(())
    }

    /// Typed access to a placed object.
    ///
    /// Returns `None` for unknown paths, a different concrete type, or an
    /// object whose observer is currently running.
    pub fn object<O: Object + 'static>(&self, handle: &Handle) -> Option<&O> {
        self.objects
            .get(handle.path())?
            .object
            .as_deref()?
            .as_any()
            .downcast_ref::<O>()
    }

    pub fn object_mut<O: Object + 'static>(&mut self, handle: &Handle) -> Option<&mut O> {
        self.objects
            .get_mut(handle.path())?
            .object
            .as_deref_mut()?
            .as_any_mut()
            .downcast_mut::<O>()
    }

    pub fn contains_object(&self, handle: &Handle) -> bool {
        self.objects.contains_key(handle.path())
    }

    /// Children of `handle` in placement order.
    pub fn children(&self, handle: &Handle) -> Vec<&Handle> {
        self.objects
            .get(handle.path())
            .map(|slot| {
                slot.children
                    .iter()
                    .filter_map(|child| self.objects.get(child).map(|slot| &slot.handle))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Binds `callback` as `observer`'s `method` for events from `source`.
    ///
    /// Binding the same method again is a no-op. The event type is
    /// registered so pending notices for it can be replayed.
    ///
    /// # Errors
    /// - `Validation(EmptyMethod)` for an empty method name.
    /// - `DuplicateObserver` when `observer` already observes `source` with a
    ///   different method.
    pub fn observe<O, E, F>(
        &mut self,
        source: &EventSource<E>,
        observer: &O,
        method: &str,
        callback: F,
    ) -> FrameworkResult<()>
    where
        O: Object + 'static,
        E: EventType + 'static,
        F: Fn(&mut O, &E, &mut Framework) -> ObserverResult + 'static,
    {
        let observer_path = observer.handle().path().to_string();
        if method.is_empty() {
            return Err(ValidationError::EmptyMethod {
                observer: observer_path,
            }
            .into());
        }

        let event_path = source.path().path().to_string();
        let bindings = self.observers.entry(event_path.clone()).or_default();
        if let Some(existing) = bindings
            .iter()
            .find(|binding| binding.observer_path == observer_path)
        {
            if existing.method == method {
                return Ok(());
            }
            return Err(FrameworkError::DuplicateObserver {
                event_path,
                observer_path,
                existing: existing.method.clone(),
                requested: method.to_string(),
            });
        }
        let callback: Rc<ErasedObserver> = Rc::new(erase_observer::<O, E, F>(callback));
        bindings.push(ObserverBinding {
            observer_path: observer_path.clone(),
            method: method.to_string(),
            callback,
        });
        self.registry.register_event::<E>(source.emitter().kind());

        debug!(
            "event=observe module=framework status=ok event_path={event_path} observer={observer_path} method={method}"
        );
        Ok(())
    }

    /// Emits `event` to every observer bound to `source`, in binding order.
    ///
    /// Each observer gets its own notice, written before it runs. Called from
    /// inside an observer, all notices are written now and delivered once
    /// that observer returns.
    ///
    /// # Errors
    /// - `NoticeDispatch` when an observer fails; later observers are skipped.
    /// - `Storage`/`Serialization` when a notice cannot be persisted.
    pub fn emit<E: EventType + 'static>(
        &mut self,
        source: &EventSource<E>,
        event: E,
    ) -> FrameworkResult<()> {
        self.ensure_open()?;
        let bindings = match self.observers.get(source.path().path()) {
            Some(bindings) if !bindings.is_empty() => bindings.clone(),
            _ => {
                debug!(
                    "event=emit module=framework status=skipped reason=no_observers event_path={}",
                    source.path()
                );
                return Ok(());
            }
        };

        let snapshot = event.snapshot();
        let event: Rc<dyn Event> = Rc::new(event);

        if self.dispatch_depth > 0 {
            for binding in &bindings {
                let notice = self.write_notice(source, &snapshot, binding)?;
                self.queued.push_back(QueuedNotice {
                    notice,
                    event: Rc::clone(&event),
                });
            }
            return Ok(());
        }

        for binding in &bindings {
            let notice = self.write_notice(source, &snapshot, binding)?;
            self.deliver(&notice, event.as_ref())?;
            self.drain_queue()?;
        }
        Ok(())
    }

    /// Redelivers every notice left pending by earlier runs.
    ///
    /// Must run before any new emission. Index entries whose record is gone
    /// are dropped with a warning. Returns the number of notices delivered.
    ///
    /// # Errors
    /// - `Reentrant` when called from inside an observer.
    /// - `TypeNotRegistered` / `ObserverNotBound` when the current run cannot
    ///   rebuild what a notice references.
    /// - `NoticeDispatch` when an observer fails; that notice and all later
    ///   ones stay pending.
    pub fn reemit(&mut self) -> FrameworkResult<usize> {
        self.ensure_open()?;
        if self.dispatch_depth > 0 {
            return Err(FrameworkError::Reentrant { operation: "reemit" });
        }

        let pending = self.pending_sequences()?;
        info!(
            "event=reemit module=framework status=start pending={}",
            pending.len()
        );

        let mut delivered = 0;
        for sequence in pending {
            let Some(notice) = self.load_notice(sequence)? else {
                warn!(
                    "event=notice_drop module=framework status=warn reason=record_missing seq={sequence}"
                );
                self.unindex(sequence)?;
                continue;
            };
            let source = occurrence_source(&notice.event_path)?;
            let emitter_kind = source
                .parent()
                .and_then(Handle::parent_kind)
                .ok_or_else(|| ValidationError::MalformedPath(notice.event_path.clone()))?;
            let restore = self.registry.event_restorer(emitter_kind, &notice.event_kind)?;
            let event = restore(&notice.snapshot)?;
            self.deliver(&notice, event.as_ref())?;
            self.drain_queue()?;
            delivered += 1;
        }

        info!("event=reemit module=framework status=ok delivered={delivered}");
        Ok(delivered)
    }

    /// Emits `pre_commit` then `commit`.
    ///
    /// # Errors
    /// - `CommitDeferred` when an observer defers either event.
    /// - `Reentrant` when called from inside an observer.
    pub fn commit(&mut self) -> FrameworkResult<()> {
        if self.dispatch_depth > 0 {
            return Err(FrameworkError::Reentrant { operation: "commit" });
        }
        let pre_commit = self.on_pre_commit.clone();
        self.emit(&pre_commit, PreCommit)?;
        let commit = self.on_commit.clone();
        self.emit(&commit, Commit)
    }

    /// Every pending notice in sequence order.
    pub fn pending_notices(&self) -> FrameworkResult<Vec<Notice>> {
        let mut notices = Vec::new();
        for sequence in self.pending_sequences()? {
            if let Some(notice) = self.load_notice(sequence)? {
                notices.push(notice);
            }
        }
        Ok(notices)
    }

    /// Persists `object.snapshot()` under its handle path.
    pub fn save_snapshot(&self, object: &dyn Object) -> FrameworkResult<()> {
        let snapshot = object.snapshot();
        self.storage
            .set(object.handle().path(), &Value::from_snapshot(&snapshot))?;
        Ok(())
    }

    pub fn load_snapshot(&self, handle: &Handle) -> FrameworkResult<Option<Snapshot>> {
        match self.storage.get(handle.path())? {
            None => Ok(None),
            Some(value) => value.into_snapshot().map(Some).ok_or_else(|| {
                FrameworkError::TypeMismatch {
                    path: handle.path().to_string(),
                    expected: "string-keyed snapshot mapping",
                }
            }),
        }
    }

    pub fn drop_snapshot(&self, handle: &Handle) -> FrameworkResult<()> {
        self.storage.delete(handle.path())?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Releases the storage backend. Idempotent.
    pub fn close(&mut self) -> FrameworkResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.queued.clear();
        let backend = self.storage.backend_name();
        match self.storage.close() {
            Ok(()) => {
                info!("event=framework_close module=framework status=ok backend={backend}");
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=framework_close module=framework status=error backend={backend} error={err}"
                );
                Err(err.into())
            }
        }
    }

    fn ensure_open(&self) -> FrameworkResult<()> {
        if self.closed {
            return Err(StorageError::Closed.into());
        }
        Ok(())
    }

    fn check_placement(&self, handle: &Handle) -> FrameworkResult<()> {
        if handle.parent().is_none() && handle.kind() == FRAMEWORK_KIND {
            return Err(FrameworkError::Collision {
                path: handle.path().to_string(),
            });
        }
        if self.objects.contains_key(handle.path()) {
            return Err(FrameworkError::Collision {
                path: handle.path().to_string(),
            });
        }
        if let Some(parent) = handle.parent() {
            if !self.objects.contains_key(parent.path()) {
                return Err(ValidationError::UnknownParent {
                    path: handle.path().to_string(),
                    parent: parent.path().to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn pending_sequences(&self) -> FrameworkResult<Vec<u64>> {
        let Some(pending) = self.state.get(PENDING_FIELD) else {
            return Ok(Vec::new());
        };
        let set = pending.as_set().ok_or_else(|| corrupt_index(PENDING_FIELD))?;
        set.iter()
            .map(|key| {
                key.as_int()
                    .and_then(|sequence| u64::try_from(sequence).ok())
                    .ok_or_else(|| corrupt_index(PENDING_FIELD))
            })
            .collect()
    }

    fn load_notice(&self, sequence: u64) -> FrameworkResult<Option<Notice>> {
        self.storage
            .get(&Notice::storage_key(sequence))?
            .map(|value| Notice::from_value(sequence, value).map_err(FrameworkError::from))
            .transpose()
    }

    /// Allocates the next sequence, indexes it, then writes the record.
    fn write_notice<E>(
        &mut self,
        source: &EventSource<E>,
        snapshot: &Snapshot,
        binding: &ObserverBinding,
    ) -> FrameworkResult<Notice> {
        let last = match self.state.get(EVENT_COUNT_FIELD) {
            None => 0,
            Some(value) => value
                .as_int()
                .ok_or_else(|| corrupt_index(EVENT_COUNT_FIELD))?,
        };
        let next = last
            .checked_add(1)
            .ok_or_else(|| corrupt_index(EVENT_COUNT_FIELD))?;
        let sequence = u64::try_from(next).map_err(|_| corrupt_index(EVENT_COUNT_FIELD))?;

        self.state.update(|data| {
            data.insert(EVENT_COUNT_FIELD.to_string(), Value::Int(next));
            match data
                .entry(PENDING_FIELD.to_string())
                .or_insert_with(|| Value::Set(BTreeSet::new()))
            {
                Value::Set(pending) => {
                    pending.insert(Key::Int(next));
                }
                other => *other = Value::set([Key::Int(next)]),
            }
        })?;

        let notice = Notice {
            sequence,
            event_path: source.occurrence(sequence)?.path().to_string(),
            event_kind: source.kind().to_string(),
            snapshot: snapshot.clone(),
            observer_path: binding.observer_path.clone(),
            method: binding.method.clone(),
        };
        self.storage
            .set(&Notice::storage_key(sequence), &notice.to_value())?;

        debug!(
            "event=notice_write module=framework status=ok seq={sequence} event_path={} observer={} method={}",
            notice.event_path, notice.observer_path, notice.method
        );
        Ok(notice)
    }

    /// Deletes the record, then removes it from the index.
    fn forget_notice(&mut self, sequence: u64) -> FrameworkResult<()> {
        self.storage.delete(&Notice::storage_key(sequence))?;
        self.unindex(sequence)
    }

    fn unindex(&mut self, sequence: u64) -> FrameworkResult<()> {
        let key = Key::Int(i64::try_from(sequence).map_err(|_| corrupt_index(PENDING_FIELD))?);
        self.state.update(|data| {
            if let Some(Value::Set(pending)) = data.get_mut(PENDING_FIELD) {
                pending.remove(&key);
            }
        })
    }

    fn drain_queue(&mut self) -> FrameworkResult<()> {
        while let Some(queued) = self.queued.pop_front() {
            self.deliver(&queued.notice, queued.event.as_ref())?;
        }
        Ok(())
    }

    fn deliver(&mut self, notice: &Notice, event: &dyn Event) -> FrameworkResult<Outcome> {
        let checked_out = occurrence_source(&notice.event_path)
            .and_then(|source| Ok((source, self.check_out(&notice.observer_path)?)));
        let (source, (lease, mut object)) = match checked_out {
            Ok(checked_out) => checked_out,
            Err(err) => {
                self.queued.clear();
                return Err(err);
            }
        };

        let Some(callback) = self.bound_callback(source.path(), notice) else {
            self.check_in(&notice.observer_path, lease, object);
            self.queued.clear();
            return Err(FrameworkError::ObserverNotBound {
                observer_path: notice.observer_path.clone(),
                method: notice.method.clone(),
            });
        };

        self.dispatch_depth += 1;
        let result = callback(object.as_mut(), event, self);
        self.dispatch_depth -= 1;
        self.check_in(&notice.observer_path, lease, object);

        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(source)) => {
                self.queued.clear();
                error!(
                    "event=observer_failed module=framework status=error seq={} event_path={} observer={} method={} error={}",
                    notice.sequence,
                    notice.event_path,
                    notice.observer_path,
                    notice.method,
                    single_line(&source.to_string(), MAX_LOGGED_ERROR_CHARS)
                );
                return Err(FrameworkError::NoticeDispatch {
                    event_path: notice.event_path.clone(),
                    observer_path: notice.observer_path.clone(),
                    method: notice.method.clone(),
                    source,
                });
            }
            Err(err) => {
                self.queued.clear();
                return Err(err);
            }
        };

        match outcome {
            Outcome::Handled => {
                self.forget_notice(notice.sequence)?;
                info!(
                    "event=notice_deliver module=framework status=ok seq={} event_path={} observer={}",
                    notice.sequence, notice.event_path, notice.observer_path
                );
            }
            Outcome::Deferred if is_framework_event(&notice.event_path) => {
                self.forget_notice(notice.sequence)?;
                self.queued.clear();
                return Err(FrameworkError::CommitDeferred {
                    event_path: notice.event_path.clone(),
                });
            }
            Outcome::Deferred => {
                info!(
                    "event=notice_defer module=framework status=deferred seq={} event_path={} observer={}",
                    notice.sequence, notice.event_path, notice.observer_path
                );
            }
        }
        Ok(outcome)
    }

    fn bound_callback(&self, source_path: &str, notice: &Notice) -> Option<Rc<ErasedObserver>> {
        self.observers
            .get(source_path)?
            .iter()
            .find(|binding| {
                binding.observer_path == notice.observer_path && binding.method == notice.method
            })
            .map(|binding| Rc::clone(&binding.callback))
    }

    /// Takes the observer out of the arena, or rebuilds it when this run
    /// never placed it.
    fn check_out(&mut self, observer_path: &str) -> FrameworkResult<(Lease, Box<dyn Object>)> {
        if let Some(slot) = self.objects.get_mut(observer_path) {
            return slot
                .object
                .take()
                .map(|object| (Lease::Arena, object))
                .ok_or(FrameworkError::Reentrant {
                    operation: "deliver",
                });
        }

        let handle = Handle::from_path(observer_path)?;
        let factory = self
            .registry
            .object_factory(handle.parent_kind(), handle.kind())?;
        let mut object = factory(self, handle.clone())?;
        if let Some(snapshot) = self.load_snapshot(&handle)? {
            object.restore(&snapshot)?;
        }
        debug!("event=object_rebuild module=framework status=ok path={observer_path}");
        Ok((Lease::Transient, object))
    }

    fn check_in(&mut self, observer_path: &str, lease: Lease, object: Box<dyn Object>) {
        if let Lease::Arena = lease {
            if let Some(slot) = self.objects.get_mut(observer_path) {
                slot.object = Some(object);
            }
        }
    }
}

impl Drop for Framework {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn erase_observer<O, E, F>(
    callback: F,
) -> impl Fn(&mut dyn Object, &dyn Event, &mut Framework) -> FrameworkResult<ObserverResult>
where
    O: Object + 'static,
    E: EventType + 'static,
    F: Fn(&mut O, &E, &mut Framework) -> ObserverResult + 'static,
{
    move |object: &mut dyn Object, event: &dyn Event, framework: &mut Framework| {
        let path = object.handle().path().to_string();
        let observer = object
            .as_any_mut()
            .downcast_mut::<O>()
            .ok_or(FrameworkError::TypeMismatch {
                path,
                expected: type_name::<O>(),
            })?;
        let event = event
            .as_any()
            .downcast_ref::<E>()
            .ok_or_else(|| FrameworkError::TypeMismatch {
                path: E::KIND.to_string(),
                expected: type_name::<E>(),
            })?;
        Ok(callback(observer, event, framework))
    }
}

/// Source handle (`<emitter>/on/<kind>`) of a persisted occurrence path.
fn occurrence_source(event_path: &str) -> FrameworkResult<Handle> {
    let occurrence = Handle::from_path(event_path)?;
    Ok(Handle::new(occurrence.parent(), occurrence.kind(), None)?)
}

fn is_framework_event(event_path: &str) -> bool {
    event_path
        .strip_prefix(FRAMEWORK_KIND)
        .and_then(|rest| rest.strip_prefix('/'))
        .and_then(|rest| rest.strip_prefix(EVENTS_KIND))
        .is_some_and(|rest| rest.starts_with('/'))
}

fn corrupt_index(field: &str) -> FrameworkError {
    FrameworkError::Serialization(crate::codec::SerializationError::Corrupt(format!(
        "framework bookkeeping field `{field}` in `{FRAMEWORK_STATE_KEY}` is malformed"
    )))
}

#[cfg(test)]
mod tests {
    use super::{
        is_framework_event, occurrence_source, Framework, FrameworkError, FRAMEWORK_KIND,
    };
    use crate::model::handle::Handle;

    #[test]
    fn framework_root_path_is_reserved_for_objects() {
        let framework = Framework::in_memory().expect("framework");
        let err = framework
            .new_handle(None, FRAMEWORK_KIND, None)
            .expect_err("reserved root");
        assert!(matches!(err, FrameworkError::Collision { .. }));
    }

    #[test]
    fn framework_events_are_recognized_by_path() {
        assert!(is_framework_event("framework/on/commit[4]"));
        assert!(!is_framework_event("frameworks/on/commit[4]"));
        assert!(!is_framework_event("Charm/framework/on/commit[4]"));
    }

    #[test]
    fn occurrence_paths_resolve_to_their_source() {
        let source = occurrence_source("Relay[first]/on/pong[2]").expect("source");
        assert_eq!(source.path(), "Relay[first]/on/pong");
        assert_eq!(source.parent().and_then(Handle::parent_kind), Some("Relay"));
    }

    #[test]
    fn child_requires_placed_parent() {
        let framework = Framework::in_memory().expect("framework");
        let parent = Handle::root("Charm").expect("parent");
        let err = framework
            .new_handle(Some(&parent), "Relation", Some("db"))
            .expect_err("parent missing");
        assert!(matches!(err, FrameworkError::Validation(_)));
    }

    #[test]
    fn close_is_idempotent() {
        let mut framework = Framework::in_memory().expect("framework");
        framework.close().expect("first close");
        framework.close().expect("second close");
        assert!(framework.is_closed());
        assert!(framework.reemit().is_err());
    }
}
