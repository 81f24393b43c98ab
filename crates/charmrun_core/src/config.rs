//! Run configuration and storage backend selection.
//!
//! # Responsibility
//! - Describe which backend a run should use and how long hook tools may take.
//! - Resolve that description into a concrete, available backend.
//!
//! # Invariants
//! - Hook tools are only used when `state-get` is installed; otherwise the
//!   configured database fallback is used, and without a fallback the run
//!   fails with `StorageError::Unavailable`.

use crate::framework::{Framework, FrameworkResult};
use crate::logging::{default_log_level, init_logging};
use crate::storage::hook::DEFAULT_HOOK_TIMEOUT;
use crate::storage::{
    HookRunner, HookToolStorage, MemoryStorage, ProcessRunner, SqliteStorage, Storage,
    StorageError, StorageResult,
};
use log::{info, warn};
use std::path::PathBuf;
use std::time::Duration;

/// File name of the embedded state database inside a state directory.
pub const STATE_DB_FILE_NAME: &str = ".unit-state.db";

/// Backend requested for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageChoice {
    /// In-memory map; state does not survive the process.
    Memory,
    /// Embedded SQLite database at the given file path.
    Database(PathBuf),
    /// Orchestrator hook tools, with an optional database fallback.
    HookTools { fallback: Option<PathBuf> },
}

/// Settings for one framework run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub storage: StorageChoice,
    /// Upper bound for each hook-tool invocation.
    pub hook_timeout: Duration,
    pub log_level: String,
    /// File logging is off when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            storage: StorageChoice::Memory,
            hook_timeout: DEFAULT_HOOK_TIMEOUT,
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl RunConfig {
    /// Database-backed configuration rooted at `state_dir`.
    pub fn with_state_dir(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageChoice::Database(state_dir.into().join(STATE_DB_FILE_NAME)),
            ..Self::default()
        }
    }

    /// Starts file logging when a log directory is configured.
    pub fn init_logging(&self) -> Result<(), String> {
        match &self.log_dir {
            Some(log_dir) => init_logging(&self.log_level, log_dir),
            None => Ok(()),
        }
    }
}

/// Opens the backend described by `config` using real hook-tool processes.
pub fn open_storage(config: &RunConfig) -> StorageResult<Box<dyn Storage>> {
    open_storage_with(config, ProcessRunner::new(config.hook_timeout))
}

/// Opens the backend described by `config` with an explicit hook runner.
pub fn open_storage_with<R>(config: &RunConfig, runner: R) -> StorageResult<Box<dyn Storage>>
where
    R: HookRunner + 'static,
{
    let storage: Box<dyn Storage> = match &config.storage {
        StorageChoice::Memory => Box::new(MemoryStorage::new()),
        StorageChoice::Database(path) => Box::new(SqliteStorage::open(path)?),
        StorageChoice::HookTools { fallback } => {
            if HookToolStorage::tools_installed(&runner) {
                Box::new(HookToolStorage::new(runner))
            } else if let Some(path) = fallback {
                warn!(
                    "event=storage_select module=config status=fallback reason=hook_tools_missing path={}",
                    path.display()
                );
                Box::new(SqliteStorage::open(path)?)
            } else {
                return Err(StorageError::Unavailable(
                    "hook tools are not installed and no database fallback is configured"
                        .to_string(),
                ));
            }
        }
    };

    info!(
        "event=storage_select module=config status=ok backend={}",
        storage.name()
    );
    Ok(storage)
}

/// Opens storage for `config` and binds a new framework to it.
pub fn open_framework(config: &RunConfig) -> FrameworkResult<Framework> {
    Framework::new(open_storage(config)?)
}
