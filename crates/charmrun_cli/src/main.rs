//! Run driver for the demo charm.
//!
//! # Responsibility
//! - Map command-line settings onto a `RunConfig`.
//! - Perform one run: construct, replay pending notices, emit, commit, close.
//!
//! # Invariants
//! - Storage is closed on every exit path, including errors.
//! - Any run error exits non-zero with the message printed verbatim.

mod demo;

use anyhow::{Context, Result};
use charmrun_core::config::STATE_DB_FILE_NAME;
use charmrun_core::storage::hook::DEFAULT_HOOK_TIMEOUT;
use charmrun_core::{default_log_level, open_framework, Framework, RunConfig, StorageChoice};
use clap::{Parser, Subcommand};
use demo::Charm;
use log::info;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "charmrun",
    version,
    about = "Runs one charm invocation against durable state"
)]
struct Cli {
    /// Directory holding the state database. State is in-memory when unset.
    #[arg(long, env = "CHARMRUN_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Store state through the orchestrator's hook tools, falling back to
    /// the state directory database when they are missing.
    #[arg(long, env = "CHARMRUN_HOOK_TOOLS")]
    hook_tools: bool,

    /// Seconds each hook-tool call may take.
    #[arg(long, env = "CHARMRUN_HOOK_TIMEOUT", default_value_t = DEFAULT_HOOK_TIMEOUT.as_secs())]
    hook_timeout: u64,

    /// Absolute directory for rotated log files. Logging is off when unset.
    #[arg(long, env = "CHARMRUN_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[arg(long, env = "CHARMRUN_LOG_LEVEL", default_value_t = default_log_level().to_string())]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Replay pending notices, announce a new master address, then commit.
    Emit {
        master: String,
        /// Make the consumer defer instead of recording the address.
        #[arg(long)]
        defer: bool,
    },
    /// Replay pending notices, then commit.
    Reemit {
        #[arg(long)]
        defer: bool,
    },
    /// List pending notices without delivering them.
    Pending,
}

impl Cli {
    fn run_config(&self) -> RunConfig {
        let database = self
            .state_dir
            .as_ref()
            .map(|dir| dir.join(STATE_DB_FILE_NAME));
        let storage = match (self.hook_tools, database) {
            (true, fallback) => StorageChoice::HookTools { fallback },
            (false, Some(path)) => StorageChoice::Database(path),
            (false, None) => StorageChoice::Memory,
        };
        RunConfig {
            storage,
            hook_timeout: Duration::from_secs(self.hook_timeout),
            log_level: self.log_level.clone(),
            log_dir: self.log_dir.clone(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.run_config();
    config.init_logging().map_err(anyhow::Error::msg)?;

    let mut framework = open_framework(&config).context("failed to open state storage")?;
    let outcome = execute(&mut framework, &cli.command);
    let closed = framework.close();
    outcome?;
    closed.context("failed to close state storage")?;
    Ok(())
}

fn execute(framework: &mut Framework, command: &Command) -> Result<()> {
    match command {
        Command::Pending => {
            let notices = framework.pending_notices()?;
            for notice in &notices {
                println!(
                    "{}\t{}\t{}.{}",
                    notice.sequence, notice.event_path, notice.observer_path, notice.method
                );
            }
            println!("pending={}", notices.len());
        }
        Command::Reemit { defer } => {
            let charm = Charm::build(framework, *defer)?;
            let delivered = framework.reemit()?;
            framework.commit()?;
            println!("delivered={delivered}");
            print_summary(framework, &charm)?;
        }
        Command::Emit { master, defer } => {
            let charm = Charm::build(framework, *defer)?;
            let delivered = framework.reemit()?;
            charm.emit_master(framework, master)?;
            framework.commit()?;
            info!("event=run_finish module=cli status=ok delivered={delivered}");
            println!("delivered={delivered}");
            print_summary(framework, &charm)?;
        }
    }
    Ok(())
}

fn print_summary(framework: &Framework, charm: &Charm) -> Result<()> {
    println!("master={}", charm.master(framework).unwrap_or("-"));
    println!("pending={}", framework.pending_notices()?.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use charmrun_core::StorageChoice;
    use clap::Parser;

    #[test]
    fn state_dir_selects_database_and_hook_tools_use_it_as_fallback() {
        let cli = Cli::parse_from(["charmrun", "--state-dir", "/var/lib/unit", "pending"]);
        assert!(matches!(
            cli.run_config().storage,
            StorageChoice::Database(ref path) if path.ends_with(".unit-state.db")
        ));

        let cli = Cli::parse_from([
            "charmrun",
            "--state-dir",
            "/var/lib/unit",
            "--hook-tools",
            "emit",
            "host=1.2.3.4",
        ]);
        assert!(matches!(
            cli.run_config().storage,
            StorageChoice::HookTools { fallback: Some(_) }
        ));
        assert!(matches!(cli.command, Command::Emit { ref master, defer: false } if master == "host=1.2.3.4"));
    }

    #[test]
    fn defaults_to_memory_storage() {
        let cli = Cli::parse_from(["charmrun", "reemit"]);
        assert_eq!(cli.run_config().storage, StorageChoice::Memory);
    }
}
