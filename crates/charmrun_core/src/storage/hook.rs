//! Backend that stores state through the orchestrator's hook tools.
//!
//! # Responsibility
//! - Translate `get`/`set`/`delete` into `state-get`/`state-set`/`state-delete`
//!   invocations.
//! - Bound every invocation by a timeout.
//!
//! # Invariants
//! - `state-set` receives `"<key>": |` followed by the block-indented encoded
//!   document on standard input (`--file -`).
//! - Any non-zero exit status is `StorageError::Unavailable`.
//! - Empty `state-get` output means the key is absent.

use super::{Storage, StorageError, StorageResult};
use crate::codec::{decode, encode};
use crate::model::value::Value;
use log::{debug, error};
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

pub const STATE_GET: &str = "state-get";
pub const STATE_SET: &str = "state-set";
pub const STATE_DELETE: &str = "state-delete";
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(60);

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const BLOCK_INDENT: &str = "  ";

/// Executes hook tools on behalf of [`HookToolStorage`].
pub trait HookRunner {
    /// Whether `program` can be invoked at all.
    fn command_exists(&self, program: &str) -> bool;

    /// Runs `program` to completion and returns its standard output.
    fn run(&self, program: &str, args: &[&str], stdin: Option<&str>) -> StorageResult<String>;
}

/// Production runner spawning real sub-processes found on `PATH`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_HOOK_TIMEOUT)
    }
}

impl HookRunner for ProcessRunner {
    fn command_exists(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }

    fn run(&self, program: &str, args: &[&str], stdin: Option<&str>) -> StorageResult<String> {
        let started_at = Instant::now();
        let mut child = Command::new(program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| StorageError::Unavailable(format!("failed to spawn `{program}`: {err}")))?;

        // Pipes are serviced on helper threads so a chatty or stalled child
        // cannot block the timeout check below.
        let writer = match (child.stdin.take(), stdin) {
            (Some(mut pipe), Some(input)) => {
                let input = input.to_string();
                Some(thread::spawn(move || pipe.write_all(input.as_bytes())))
            }
            _ => None,
        };
        let stdout = child.stdout.take().map(|pipe| thread::spawn(move || drain(pipe)));
        let stderr = child.stderr.take().map(|pipe| thread::spawn(move || drain(pipe)));

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started_at.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                error!(
                    "event=hook_tool module=storage status=timeout program={program} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                return Err(StorageError::Timeout {
                    command: program.to_string(),
                    after: self.timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        if let Some(writer) = writer {
            match writer.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => return Err(err.into()),
                Err(_) => {
                    return Err(StorageError::Unavailable(format!(
                        "stdin writer for `{program}` panicked"
                    )))
                }
            }
        }
        let stdout = stdout
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        let stderr = stderr
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        debug!(
            "event=hook_tool module=storage status={} program={program} duration_ms={}",
            if status.success() { "ok" } else { "error" },
            started_at.elapsed().as_millis()
        );

        if !status.success() {
            return Err(StorageError::Unavailable(format!(
                "`{program}` exited with {status}: {}",
                stderr.trim()
            )));
        }
        Ok(stdout)
    }
}

fn drain(mut pipe: impl Read) -> String {
    let mut buffer = String::new();
    let _ = pipe.read_to_string(&mut buffer);
    buffer
}

/// State store backed by the `state-get`/`state-set`/`state-delete` hook tools.
pub struct HookToolStorage<R: HookRunner = ProcessRunner> {
    runner: R,
}

impl<R: HookRunner> HookToolStorage<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Reports whether the hook tools are installed, without invoking them.
    pub fn tools_installed(runner: &R) -> bool {
        runner.command_exists(STATE_GET)
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }
}

impl<R: HookRunner> Storage for HookToolStorage<R> {
    fn name(&self) -> &'static str {
        "hook-tools"
    }

    fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        let output = self.runner.run(STATE_GET, &[key], None)?;
        if output.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(decode(&output)?))
    }

    fn set(&mut self, key: &str, value: &Value) -> StorageResult<()> {
        let document = encode(value)?;
        let payload = set_payload(key, &document);
        self.runner
            .run(STATE_SET, &["--file", "-"], Some(&payload))?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> StorageResult<()> {
        self.runner.run(STATE_DELETE, &[key], None)?;
        Ok(())
    }

    fn is_available(&self) -> bool {
        Self::tools_installed(&self.runner)
    }
}

/// Builds the `state-set` standard input: the quoted key, a colon, and the
/// encoded document as an indented block literal.
pub fn set_payload(key: &str, document: &str) -> String {
    let mut payload = format!("{}: |\n", quote_key(key));
    for line in document.lines() {
        if !line.is_empty() {
            payload.push_str(BLOCK_INDENT);
            payload.push_str(line);
        }
        payload.push('\n');
    }
    payload
}

fn quote_key(key: &str) -> String {
    let mut quoted = String::with_capacity(key.len() + 2);
    quoted.push('"');
    for c in key.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            c if c.is_control() => quoted.push_str(&format!("\\u{:04x}", u32::from(c))),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::{quote_key, set_payload};

    #[test]
    fn set_payload_indents_document_under_quoted_key() {
        let payload = set_payload("Charm[foo]/_stored", "foo: 2\nbar:\n- 1\n");
        assert_eq!(payload, "\"Charm[foo]/_stored\": |\n  foo: 2\n  bar:\n  - 1\n");
    }

    #[test]
    fn quote_key_escapes_quotes_and_controls() {
        assert_eq!(quote_key("a\"b\\c"), "\"a\\\"b\\\\c\"");
        assert_eq!(quote_key("tab\there"), "\"tab\\u0009here\"");
    }
}
