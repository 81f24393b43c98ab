use charmrun_core::{
    Event, EventSource, EventType, Framework, FrameworkError, FrameworkResult, Handle, Notice,
    Object, ObjectType, ObserverResult, Outcome, Snapshot, SqliteStorage, StoredState, Value,
};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

type Journal = Rc<RefCell<Vec<String>>>;

struct MasterChanged {
    master: String,
}

impl Event for MasterChanged {
    fn snapshot(&self) -> Snapshot {
        Snapshot::from([("master".to_string(), Value::from(self.master.as_str()))])
    }
}

impl EventType for MasterChanged {
    const KIND: &'static str = "master_changed";

    fn restore(snapshot: &Snapshot) -> FrameworkResult<Self> {
        Ok(Self {
            master: snapshot
                .get("master")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

struct Database {
    handle: Handle,
    on_master_changed: EventSource<MasterChanged>,
}

impl Object for Database {
    fn handle(&self) -> &Handle {
        &self.handle
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Handle,
    Defer,
    Fail,
}

struct Consumer {
    handle: Handle,
    state: StoredState,
    mode: Mode,
    journal: Journal,
}

impl Consumer {
    fn on_master_changed(
        &mut self,
        event: &MasterChanged,
        _framework: &mut Framework,
    ) -> ObserverResult {
        self.journal
            .borrow_mut()
            .push(format!("{}:{}", self.handle.path(), event.master));
        match self.mode {
            Mode::Handle => {
                self.state.set("master", event.master.as_str())?;
                Ok(Outcome::Handled)
            }
            Mode::Defer => Ok(Outcome::Deferred),
            Mode::Fail => Err(format!("{} refused {}", self.handle.path(), event.master).into()),
        }
    }
}

impl Object for Consumer {
    fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl ObjectType for Consumer {
    const KIND: &'static str = "Consumer";
}

fn open_run(path: &Path) -> Framework {
    Framework::new(Box::new(SqliteStorage::open(path).unwrap())).unwrap()
}

fn add_database(framework: &mut Framework) -> EventSource<MasterChanged> {
    let handle = framework.new_handle(None, "Database", None).unwrap();
    let database = Database {
        on_master_changed: EventSource::new(&handle).unwrap(),
        handle,
    };
    let source = database.on_master_changed.clone();
    framework.add_object(database).unwrap();
    source
}

fn build_consumer(
    framework: &mut Framework,
    handle: Handle,
    source: &EventSource<MasterChanged>,
    mode: Mode,
    journal: &Journal,
) -> FrameworkResult<Consumer> {
    let consumer = Consumer {
        state: StoredState::new(framework, &handle)?,
        handle,
        mode,
        journal: Rc::clone(journal),
    };
    framework.observe(
        source,
        &consumer,
        "on_master_changed",
        Consumer::on_master_changed,
    )?;
    Ok(consumer)
}

fn add_consumer(
    framework: &mut Framework,
    key: &str,
    source: &EventSource<MasterChanged>,
    mode: Mode,
    journal: &Journal,
) -> Handle {
    let handle = framework
        .new_handle(None, Consumer::KIND, Some(key))
        .unwrap();
    let consumer = build_consumer(framework, handle.clone(), source, mode, journal).unwrap();
    framework.add_object(consumer).unwrap();
    handle
}

fn emit_master(
    framework: &mut Framework,
    source: &EventSource<MasterChanged>,
    master: &str,
) -> FrameworkResult<()> {
    framework.emit(
        source,
        MasterChanged {
            master: master.to_string(),
        },
    )
}

fn stored_master(framework: &Framework, owner: &Handle) -> Option<String> {
    framework
        .object::<Consumer>(owner)
        .and_then(|consumer| consumer.state.get("master"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

#[test]
fn handled_event_is_stored_and_leaves_no_notice() {
    let mut framework = Framework::in_memory().unwrap();
    let journal = Journal::default();
    let source = add_database(&mut framework);
    let consumer = add_consumer(&mut framework, "a", &source, Mode::Handle, &journal);

    emit_master(&mut framework, &source, "host=1.2.3.4").unwrap();

    assert_eq!(
        stored_master(&framework, &consumer).as_deref(),
        Some("host=1.2.3.4")
    );
    assert!(framework.pending_notices().unwrap().is_empty());
}

#[test]
fn deferred_event_is_redelivered_before_new_emissions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    let journal = Journal::default();

    {
        let mut framework = open_run(&path);
        let source = add_database(&mut framework);
        add_consumer(&mut framework, "a", &source, Mode::Defer, &journal);
        emit_master(&mut framework, &source, "host=1.2.3.4").unwrap();

        let pending = framework.pending_notices().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].observer_path, "Consumer[a]");
        assert_eq!(pending[0].method, "on_master_changed");
        assert_eq!(pending[0].event_kind, "master_changed");
        assert_eq!(
            pending[0].event_path,
            format!("Database/on/master_changed[{}]", pending[0].sequence)
        );
        assert_eq!(
            pending[0].snapshot.get("master"),
            Some(&Value::from("host=1.2.3.4"))
        );
        framework.close().unwrap();
    }

    journal.borrow_mut().clear();
    let mut framework = open_run(&path);
    let source = add_database(&mut framework);
    let consumer = add_consumer(&mut framework, "a", &source, Mode::Handle, &journal);

    assert_eq!(framework.reemit().unwrap(), 1);
    assert!(framework.pending_notices().unwrap().is_empty());
    emit_master(&mut framework, &source, "host=5.6.7.8").unwrap();

    assert_eq!(
        *journal.borrow(),
        vec![
            "Consumer[a]:host=1.2.3.4".to_string(),
            "Consumer[a]:host=5.6.7.8".to_string(),
        ]
    );
    assert_eq!(
        stored_master(&framework, &consumer).as_deref(),
        Some("host=5.6.7.8")
    );
}

#[test]
fn failing_observer_stops_emission_and_keeps_only_its_notice() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    let journal = Journal::default();

    {
        let mut framework = open_run(&path);
        let source = add_database(&mut framework);
        add_consumer(&mut framework, "a", &source, Mode::Handle, &journal);
        add_consumer(&mut framework, "b", &source, Mode::Fail, &journal);
        add_consumer(&mut framework, "c", &source, Mode::Handle, &journal);

        let err = emit_master(&mut framework, &source, "host=1.2.3.4").unwrap_err();
        match &err {
            FrameworkError::NoticeDispatch {
                event_path,
                observer_path,
                method,
                source,
            } => {
                assert!(event_path.starts_with("Database/on/master_changed["));
                assert_eq!(observer_path, "Consumer[b]");
                assert_eq!(method, "on_master_changed");
                assert_eq!(source.to_string(), "Consumer[b] refused host=1.2.3.4");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(
            *journal.borrow(),
            vec![
                "Consumer[a]:host=1.2.3.4".to_string(),
                "Consumer[b]:host=1.2.3.4".to_string(),
            ]
        );
        let pending = framework.pending_notices().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].observer_path, "Consumer[b]");
    }

    journal.borrow_mut().clear();
    let mut framework = open_run(&path);
    let source = add_database(&mut framework);
    add_consumer(&mut framework, "a", &source, Mode::Handle, &journal);
    add_consumer(&mut framework, "b", &source, Mode::Handle, &journal);
    add_consumer(&mut framework, "c", &source, Mode::Handle, &journal);

    assert_eq!(framework.reemit().unwrap(), 1);
    assert_eq!(
        *journal.borrow(),
        vec!["Consumer[b]:host=1.2.3.4".to_string()]
    );
}

#[test]
fn failure_during_reemit_keeps_that_notice_and_later_ones() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    let journal = Journal::default();

    {
        let mut framework = open_run(&path);
        let source = add_database(&mut framework);
        add_consumer(&mut framework, "a", &source, Mode::Defer, &journal);
        emit_master(&mut framework, &source, "first").unwrap();
        emit_master(&mut framework, &source, "second").unwrap();
    }

    let mut framework = open_run(&path);
    let source = add_database(&mut framework);
    add_consumer(&mut framework, "a", &source, Mode::Fail, &journal);
    assert!(matches!(
        framework.reemit(),
        Err(FrameworkError::NoticeDispatch { .. })
    ));

    let masters: Vec<_> = framework
        .pending_notices()
        .unwrap()
        .into_iter()
        .map(|notice| notice.snapshot["master"].clone())
        .collect();
    assert_eq!(masters, vec![Value::from("first"), Value::from("second")]);
}

#[test]
fn reemit_follows_sequence_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    let journal = Journal::default();

    {
        let mut framework = open_run(&path);
        let source = add_database(&mut framework);
        add_consumer(&mut framework, "a", &source, Mode::Defer, &journal);
        add_consumer(&mut framework, "b", &source, Mode::Defer, &journal);
        emit_master(&mut framework, &source, "first").unwrap();
        emit_master(&mut framework, &source, "second").unwrap();

        let sequences: Vec<u64> = framework
            .pending_notices()
            .unwrap()
            .iter()
            .map(|notice| notice.sequence)
            .collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
    }

    journal.borrow_mut().clear();
    let mut framework = open_run(&path);
    let source = add_database(&mut framework);
    add_consumer(&mut framework, "a", &source, Mode::Handle, &journal);
    add_consumer(&mut framework, "b", &source, Mode::Handle, &journal);

    assert_eq!(framework.reemit().unwrap(), 4);
    assert_eq!(
        *journal.borrow(),
        vec![
            "Consumer[a]:first".to_string(),
            "Consumer[b]:first".to_string(),
            "Consumer[a]:second".to_string(),
            "Consumer[b]:second".to_string(),
        ]
    );
}

#[test]
fn deferred_notice_is_redelivered_with_identical_content_every_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    let journal = Journal::default();

    {
        let mut framework = open_run(&path);
        let source = add_database(&mut framework);
        add_consumer(&mut framework, "a", &source, Mode::Defer, &journal);
        emit_master(&mut framework, &source, "host=1.2.3.4").unwrap();
    }
    for _ in 0..2 {
        let mut framework = open_run(&path);
        let source = add_database(&mut framework);
        add_consumer(&mut framework, "a", &source, Mode::Defer, &journal);
        assert_eq!(framework.reemit().unwrap(), 1);
        assert_eq!(framework.pending_notices().unwrap().len(), 1);
    }

    assert_eq!(journal.borrow().len(), 3);
    assert!(journal
        .borrow()
        .iter()
        .all(|entry| entry == "Consumer[a]:host=1.2.3.4"));
}

#[test]
fn reemit_requires_registered_event_type() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    let journal = Journal::default();

    {
        let mut framework = open_run(&path);
        let source = add_database(&mut framework);
        add_consumer(&mut framework, "a", &source, Mode::Defer, &journal);
        emit_master(&mut framework, &source, "host=1.2.3.4").unwrap();
    }

    let mut framework = open_run(&path);
    match framework.reemit().unwrap_err() {
        FrameworkError::TypeNotRegistered { parent_kind, kind } => {
            assert_eq!(parent_kind.as_deref(), Some("Database"));
            assert_eq!(kind, "master_changed");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(framework.pending_notices().unwrap().len(), 1);
}

#[test]
fn unconstructed_observer_is_rebuilt_from_registry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    let journal = Journal::default();

    {
        let mut framework = open_run(&path);
        let source = add_database(&mut framework);
        add_consumer(&mut framework, "a", &source, Mode::Defer, &journal);
        emit_master(&mut framework, &source, "host=1.2.3.4").unwrap();
    }

    let mut framework = open_run(&path);
    let database = Handle::root("Database").unwrap();
    framework.register_event(&EventSource::<MasterChanged>::new(&database).unwrap());
    let factory_journal = Rc::clone(&journal);
    framework.register_type::<Consumer, _>(None, move |framework, handle| {
        let database = Handle::root("Database")?;
        let source = EventSource::<MasterChanged>::new(&database)?;
        build_consumer(framework, handle, &source, Mode::Handle, &factory_journal)
    });

    assert_eq!(framework.reemit().unwrap(), 1);
    assert!(framework.pending_notices().unwrap().is_empty());

    let owner = Handle::new(None, "Consumer", Some("a")).unwrap();
    let state = StoredState::new(&framework, &owner).unwrap();
    assert_eq!(state.get("master"), Some(&Value::from("host=1.2.3.4")));
}

#[test]
fn reemit_without_factory_reports_unregistered_object_kind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    let journal = Journal::default();

    {
        let mut framework = open_run(&path);
        let source = add_database(&mut framework);
        add_consumer(&mut framework, "a", &source, Mode::Defer, &journal);
        emit_master(&mut framework, &source, "host=1.2.3.4").unwrap();
    }

    let mut framework = open_run(&path);
    let database = Handle::root("Database").unwrap();
    framework.register_event(&EventSource::<MasterChanged>::new(&database).unwrap());
    assert!(matches!(
        framework.reemit(),
        Err(FrameworkError::TypeNotRegistered { parent_kind: None, ref kind }) if kind == "Consumer"
    ));
}

#[test]
fn index_entry_without_record_is_dropped() {
    let mut framework = Framework::in_memory().unwrap();
    let journal = Journal::default();
    let source = add_database(&mut framework);
    add_consumer(&mut framework, "a", &source, Mode::Defer, &journal);
    emit_master(&mut framework, &source, "host=1.2.3.4").unwrap();

    framework
        .storage()
        .delete(&Notice::storage_key(1))
        .unwrap();

    assert_eq!(framework.reemit().unwrap(), 0);
    assert!(framework.pending_notices().unwrap().is_empty());
    assert_eq!(journal.borrow().len(), 1);
}

#[test]
fn observe_is_idempotent_but_rejects_a_second_method() {
    let mut framework = Framework::in_memory().unwrap();
    let journal = Journal::default();
    let source = add_database(&mut framework);
    let handle = framework.new_handle(None, "Consumer", None).unwrap();
    let consumer = build_consumer(&mut framework, handle, &source, Mode::Handle, &journal).unwrap();

    framework
        .observe(
            &source,
            &consumer,
            "on_master_changed",
            Consumer::on_master_changed,
        )
        .unwrap();
    let err = framework
        .observe(&source, &consumer, "on_other", Consumer::on_master_changed)
        .unwrap_err();
    assert!(matches!(
        err,
        FrameworkError::DuplicateObserver { ref existing, ref requested, .. }
            if existing == "on_master_changed" && requested == "on_other"
    ));

    framework.add_object(consumer).unwrap();
    emit_master(&mut framework, &source, "once").unwrap();
    assert_eq!(journal.borrow().len(), 1);
}

#[test]
fn empty_method_name_is_rejected() {
    let mut framework = Framework::in_memory().unwrap();
    let journal = Journal::default();
    let source = add_database(&mut framework);
    let handle = framework.new_handle(None, "Consumer", None).unwrap();
    let consumer = Consumer {
        state: StoredState::new(&framework, &handle).unwrap(),
        handle,
        mode: Mode::Handle,
        journal,
    };

    let err = framework
        .observe(&source, &consumer, "", Consumer::on_master_changed)
        .unwrap_err();
    assert!(matches!(err, FrameworkError::Validation(_)));
}

#[test]
fn emitting_without_observers_writes_nothing() {
    let mut framework = Framework::in_memory().unwrap();
    let source = add_database(&mut framework);
    emit_master(&mut framework, &source, "nobody listens").unwrap();
    assert!(framework.pending_notices().unwrap().is_empty());
    assert!(framework.storage().get(&Notice::storage_key(1)).unwrap().is_none());
}
