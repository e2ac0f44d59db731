//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::env;
use std::ffi::OsString;
use std::fmt::Debug;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use serde_json::{Map, Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, duplex};
use tokio::sync::{Mutex, MutexGuard};

use crate::runner::{CommandOutput, CommandRunner, RunnerError};
use crate::session::ShellSession;

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<StdMutex<VecDeque<CommandOutput>>>,
    invocations: Arc<StdMutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, output: CommandOutput) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(output);
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.push(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RunnerError> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CommandInvocation {
                program: program.to_owned(),
                args: args.to_vec(),
            });
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| RunnerError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Produces a minimal JSON payload matching `lxc list --format json`.
///
/// Each entry is an instance name with its `config` key/value pairs.
#[must_use]
pub fn json_instances(instances: &[(&str, &[(&str, &str)])]) -> String {
    let items = instances
        .iter()
        .map(|(name, config)| {
            let settings = config
                .iter()
                .map(|(key, value)| ((*key).to_owned(), Value::String((*value).to_owned())))
                .collect::<Map<String, Value>>();
            json!({ "name": name, "status": "Running", "config": settings })
        })
        .collect::<Vec<_>>();
    Value::Array(items).to_string()
}

/// Asserts that the first run of an idempotent action changed something and
/// the second did not.
///
/// # Panics
///
/// Panics when either outcome is an error or reports the wrong change flag.
pub fn require_idempotence<E: Debug>(first: &Result<bool, E>, second: &Result<bool, E>) {
    assert!(
        matches!(first, Ok(true)),
        "first run should report a change, got {first:?}"
    );
    assert!(
        matches!(second, Ok(false)),
        "second run should report no change, got {second:?}"
    );
}

/// Asserts that both runs of an action reported a change, as expected for
/// actions that always act (for example forced restarts).
///
/// # Panics
///
/// Panics when either outcome is an error or reports no change.
pub fn require_non_idempotence<E: Debug>(first: &Result<bool, E>, second: &Result<bool, E>) {
    assert!(
        matches!(first, Ok(true)),
        "first run should report a change, got {first:?}"
    );
    assert!(
        matches!(second, Ok(true)),
        "second run should report a change, got {second:?}"
    );
}

/// How a [`FakeShell`] reacts to a scripted command.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FakeBehaviour {
    /// Print the scripted output followed by a prompt.
    #[default]
    Respond,
    /// Print nothing and never prompt.
    Hang,
    /// Close stdout and stderr as if the shell died.
    CloseOutput,
}

/// Scripted reply of a [`FakeShell`] to one command line.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FakeResponse {
    /// Text written to stdout.
    pub stdout: String,
    /// Text written to stderr, in the same write as the following prompt.
    pub stderr: String,
    /// Status embedded in the prompt; may exceed `i32` to provoke parse errors.
    pub status: i64,
    /// Reaction to the command.
    pub behaviour: FakeBehaviour,
}

impl FakeResponse {
    /// Successful command printing `text` on stdout.
    #[must_use]
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stdout: text.into(),
            ..Self::default()
        }
    }

    /// Command printing nothing and exiting with `status`.
    #[must_use]
    pub fn status(status: i64) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Command that never completes.
    #[must_use]
    pub fn hang() -> Self {
        Self {
            behaviour: FakeBehaviour::Hang,
            ..Self::default()
        }
    }

    /// Command that kills the shell's output streams.
    #[must_use]
    pub fn close_output() -> Self {
        Self {
            behaviour: FakeBehaviour::CloseOutput,
            ..Self::default()
        }
    }

    /// Adds stderr text.
    #[must_use]
    pub fn with_stderr(mut self, text: impl Into<String>) -> Self {
        self.stderr = text.into();
        self
    }

    /// Sets the exit status.
    #[must_use]
    pub const fn with_status(mut self, status: i64) -> Self {
        self.status = status;
        self
    }
}

const FAKE_PIPE_CAPACITY: usize = 64 * 1024;

/// In-process stand-in for `/bin/sh -i` speaking the prompt protocol.
///
/// Unknown commands behave like a missing binary and exit with status 127.
#[derive(Clone, Debug, Default)]
pub struct FakeShell {
    banner: String,
    responses: HashMap<String, FakeResponse>,
    silent: bool,
}

/// Observes a running [`FakeShell`].
#[derive(Clone, Debug)]
pub struct FakeShellHandle {
    transcript: Arc<StdMutex<Vec<String>>>,
}

impl FakeShellHandle {
    /// Lines the shell has read from its input so far.
    #[must_use]
    pub fn transcript(&self) -> Vec<String> {
        self.transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl FakeShell {
    /// Creates a shell with no banner and no scripted commands.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Text printed on stderr before the first prompt.
    #[must_use]
    pub fn banner(mut self, text: impl Into<String>) -> Self {
        self.banner = text.into();
        self
    }

    /// Scripts the reply to `command`.
    #[must_use]
    pub fn respond(mut self, command: impl Into<String>, response: FakeResponse) -> Self {
        self.responses.insert(command.into(), response);
        self
    }

    /// Never prints a prompt, not even the first one.
    #[must_use]
    pub const fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Starts the shell on a background task and returns a session wired to it.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(self) -> (ShellSession, FakeShellHandle) {
        let (session_input, shell_input) = duplex(FAKE_PIPE_CAPACITY);
        let (shell_stdout, session_stdout) = duplex(FAKE_PIPE_CAPACITY);
        let (shell_stderr, session_stderr) = duplex(FAKE_PIPE_CAPACITY);
        let session = ShellSession::from_io(session_input, session_stdout, session_stderr);
        let handle = FakeShellHandle {
            transcript: Arc::new(StdMutex::new(Vec::new())),
        };
        tokio::spawn(self.serve(
            shell_input,
            shell_stdout,
            shell_stderr,
            Arc::clone(&handle.transcript),
        ));
        (session, handle)
    }

    async fn serve(
        self,
        input: DuplexStream,
        mut stdout: DuplexStream,
        mut stderr: DuplexStream,
        transcript: Arc<StdMutex<Vec<String>>>,
    ) {
        let mut lines = BufReader::new(input).lines();
        if self.silent {
            while let Ok(Some(_)) = lines.next_line().await {}
            return;
        }
        if !self.banner.is_empty() && write_text(&mut stderr, &self.banner).await.is_err() {
            return;
        }
        let mut status = 0_i64;
        if write_text(&mut stderr, &prompt(status)).await.is_err() {
            return;
        }
        while let Ok(Some(line)) = lines.next_line().await {
            transcript
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(line.clone());
            if line.is_empty() {
                if write_text(&mut stderr, &prompt(status)).await.is_err() {
                    return;
                }
                continue;
            }
            let response = self
                .responses
                .get(&line)
                .cloned()
                .unwrap_or_else(|| not_found(&line));
            match response.behaviour {
                FakeBehaviour::Hang => continue,
                FakeBehaviour::CloseOutput => return,
                FakeBehaviour::Respond => {}
            }
            status = response.status;
            if !response.stdout.is_empty()
                && write_text(&mut stdout, &response.stdout).await.is_err()
            {
                return;
            }
            let tail = format!("{}{}", response.stderr, prompt(status));
            if write_text(&mut stderr, &tail).await.is_err() {
                return;
            }
        }
    }
}

fn prompt(status: i64) -> String {
    format!("___{status}___> ")
}

fn not_found(command: &str) -> FakeResponse {
    let program = command.split_whitespace().next().unwrap_or(command);
    FakeResponse::status(127).with_stderr(format!("/bin/sh: 1: {program}: not found\n"))
}

async fn write_text<W: AsyncWrite + Unpin>(target: &mut W, text: &str) -> std::io::Result<()> {
    target.write_all(text.as_bytes()).await?;
    target.flush().await
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }

    /// Sets a single environment variable while holding the global mutex.
    pub async fn set_var(key: &str, value: &str) -> Self {
        Self::set_vars(&[(key, value)]).await
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
