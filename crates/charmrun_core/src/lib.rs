//! Core engine for charm runs.
//! Handles, stored state, the durable notice queue and the storage backends
//! all live here; binaries only wire configuration to them.

pub mod codec;
pub mod config;
pub mod db;
pub mod framework;
pub mod logging;
pub mod model;
pub mod storage;

pub use codec::{decode, encode, from_value, to_value, SerializationError};
pub use config::{open_framework, open_storage, RunConfig, StorageChoice};
pub use framework::{
    Commit, Event, EventSource, EventType, Framework, FrameworkError, FrameworkResult, Notice,
    Object, ObjectType, ObserverError, ObserverResult, Outcome, PreCommit, StoredState,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::handle::{Handle, ValidationError};
pub use model::value::{Key, Snapshot, Value};
pub use storage::{
    HookRunner, HookToolStorage, MemoryStorage, ProcessRunner, SqliteStorage, Storage,
    StorageError, StorageResult,
};

/// Core crate version, reported in the run_start log line.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
