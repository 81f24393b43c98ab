//! Two-object charm used by the driver: a database that announces its
//! master address and a consumer that records it.

use charmrun_core::{
    Event, EventSource, EventType, Framework, FrameworkError, FrameworkResult, Handle, Object,
    ObjectType, ObserverResult, Outcome, Snapshot, StoredState, Value,
};

pub const MASTER_FIELD: &str = "master";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterChanged {
    pub master: String,
}

impl Event for MasterChanged {
    fn snapshot(&self) -> Snapshot {
        Snapshot::from([(MASTER_FIELD.to_string(), Value::from(self.master.as_str()))])
    }
}

impl EventType for MasterChanged {
    const KIND: &'static str = "master_changed";

    fn restore(snapshot: &Snapshot) -> FrameworkResult<Self> {
        let master = snapshot
            .get(MASTER_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| FrameworkError::TypeMismatch {
                path: format!("{}.{MASTER_FIELD}", Self::KIND),
                expected: "str",
            })?;
        Ok(Self {
            master: master.to_string(),
        })
    }
}

pub struct Database {
    handle: Handle,
    pub on_master_changed: EventSource<MasterChanged>,
}

impl Database {
    pub fn new(framework: &Framework) -> FrameworkResult<Self> {
        let handle = framework.new_handle(None, Self::KIND, None)?;
        let on_master_changed = EventSource::new(&handle)?;
        Ok(Self {
            handle,
            on_master_changed,
        })
    }
}

impl Object for Database {
    fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl ObjectType for Database {
    const KIND: &'static str = "Database";
}

pub struct Consumer {
    handle: Handle,
    state: StoredState,
    defer: bool,
}

impl Consumer {
    /// Builds the consumer and binds it to `database`'s announcements.
    pub fn new(framework: &mut Framework, database: &Database, defer: bool) -> FrameworkResult<Self> {
        let handle = framework.new_handle(None, Self::KIND, None)?;
        let state = StoredState::new(framework, &handle)?;
        let consumer = Self {
            handle,
            state,
            defer,
        };
        framework.observe(
            &database.on_master_changed,
            &consumer,
            "on_master_changed",
            Self::on_master_changed,
        )?;
        Ok(consumer)
    }

    pub fn master(&self) -> Option<&str> {
        self.state.get(MASTER_FIELD).and_then(Value::as_str)
    }

    fn on_master_changed(
        &mut self,
        event: &MasterChanged,
        _framework: &mut Framework,
    ) -> ObserverResult {
        if self.defer {
            return Ok(Outcome::Deferred);
        }
        self.state.set(MASTER_FIELD, event.master.as_str())?;
        Ok(Outcome::Handled)
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

/// Handles of the placed demo objects.
pub struct Charm {
    pub database: Handle,
    pub consumer: Handle,
}

impl Charm {
    /// Runs the same construction sequence every invocation.
    pub fn build(framework: &mut Framework, defer: bool) -> FrameworkResult<Self> {
        let database = Database::new(framework)?;
        let consumer = Consumer::new(framework, &database, defer)?;
        let charm = Self {
            database: database.handle().clone(),
            consumer: consumer.handle().clone(),
        };
        framework.add_object(database)?;
        framework.add_object(consumer)?;
        Ok(charm)
    }

    pub fn emit_master(&self, framework: &mut Framework, master: &str) -> FrameworkResult<()> {
        let source = framework
            .object::<Database>(&self.database)
            .map(|database| database.on_master_changed.clone())
            .ok_or_else(|| FrameworkError::TypeMismatch {
                path: self.database.path().to_string(),
                expected: "Database",
            })?;
        framework.emit(
            &source,
            MasterChanged {
                master: master.to_string(),
            },
        )
    }

    pub fn master<'a>(&self, framework: &'a Framework) -> Option<&'a str> {
        framework
            .object::<Consumer>(&self.consumer)
            .and_then(Consumer::master)
    }
}
