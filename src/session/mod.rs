//! Multiplexes sequential commands over one interactive POSIX shell.
//!
//! The shell prints its prompt, with the previous exit status embedded, on
//! stderr. A command is complete once a prompt is seen *after* an extra bare
//! newline has been sent: the first prompt may be stale or echoed by the
//! command itself, while the prompt answering the newline is authoritative.
//!
//! Any failure other than a non-zero exit status leaves the shell in an
//! unknown position within the protocol, so the session refuses further
//! commands afterwards.

pub mod prompt;

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::process::Stdio;
use std::time::Duration;

use futures::stream;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::compute::{
    CloseFuture, CommandError, ExecError, ExecScope, ExecStream, ExecStreamResult,
    MinimalCommandExecutor, StreamKind,
};

pub use prompt::SHELL_ARGV;

/// Default bound on waiting for the first prompt of a fresh shell.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

const CHUNK_SIZE: usize = 8 * 1024;
const CHANNEL_DEPTH: usize = 64;

type ShellInput = Box<dyn AsyncWrite + Send + Unpin>;

/// A long-lived interactive shell driven through its standard streams.
pub struct ShellSession {
    input: Option<ShellInput>,
    stdout: mpsc::Receiver<Vec<u8>>,
    stderr: mpsc::Receiver<Vec<u8>>,
    handshake_timeout: Duration,
    handshake_done: bool,
    poisoned: bool,
}

impl fmt::Debug for ShellSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ShellSession")
            .field("input_open", &self.input.is_some())
            .field("handshake_timeout", &self.handshake_timeout)
            .field("handshake_done", &self.handshake_done)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

/// Builds a local command that starts the sentinel shell.
#[must_use]
pub fn local_shell_command() -> Command {
    let [program, args @ ..] = SHELL_ARGV;
    let mut command = Command::new(program);
    command.args(args);
    command
}

impl ShellSession {
    /// Wires a session to already connected shell streams.
    ///
    /// Must be called from within a Tokio runtime: a reader task is spawned
    /// for each output stream.
    pub fn from_io<W, O, E>(input: W, stdout: O, stderr: E) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        O: AsyncRead + Send + Unpin + 'static,
        E: AsyncRead + Send + Unpin + 'static,
    {
        let (stdout_tx, stdout_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (stderr_tx, stderr_rx) = mpsc::channel(CHANNEL_DEPTH);
        tokio::spawn(pump(stdout, stdout_tx, StreamKind::Stdout));
        tokio::spawn(pump(stderr, stderr_tx, StreamKind::Stderr));
        Self {
            input: Some(Box::new(input)),
            stdout: stdout_rx,
            stderr: stderr_rx,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            handshake_done: false,
            poisoned: false,
        }
    }

    /// Spawns `command` with piped standard streams and attaches a session.
    ///
    /// The caller owns the returned [`Child`] and decides how it is reaped.
    ///
    /// # Errors
    ///
    /// Returns the spawn error, or an error when a pipe was not captured.
    pub fn spawn(mut command: Command) -> io::Result<(Self, Child)> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = command.spawn()?;
        let input = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("shell stdin was not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("shell stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("shell stderr was not captured"))?;
        Ok((Self::from_io(input, stdout, stderr), child))
    }

    /// Overrides how long the first command waits for the initial prompt.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Returns `true` once a failure has made the session unusable.
    #[must_use]
    pub const fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    async fn write_input(&mut self, bytes: &[u8]) -> io::Result<()> {
        let input = self
            .input
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "shell input is closed"))?;
        input.write_all(bytes).await?;
        input.flush().await
    }

    async fn shutdown_input(&mut self) -> io::Result<()> {
        match self.input.take() {
            Some(mut input) => input.shutdown().await,
            None => Ok(()),
        }
    }

    /// Waits until the shell has printed its first prompt.
    async fn handshake(&mut self, scope: &ExecScope) -> Result<(), ExecError> {
        let bounded = scope.with_timeout(self.handshake_timeout);
        loop {
            tokio::select! {
                biased;
                reason = bounded.done() => return Err(ExecError::Cancelled(reason)),
                received = self.stderr.recv() => {
                    let chunk = received.ok_or(ExecError::EndOfStream)?;
                    if prompt::ends_with_prompt(&chunk) {
                        debug!("shell is ready");
                        return Ok(());
                    }
                    trace!(bytes = chunk.len(), "discarding shell banner");
                }
                received = self.stdout.recv() => {
                    let chunk = received.ok_or(ExecError::EndOfStream)?;
                    trace!(bytes = chunk.len(), "discarding shell banner");
                }
            }
        }
    }
}

impl MinimalCommandExecutor for ShellSession {
    fn exec_stream<'a>(&'a mut self, scope: &'a ExecScope, command: &'a str) -> ExecStream<'a> {
        let run = CommandRun {
            session: self,
            scope,
            command,
            started: false,
            confirmation_sent: false,
            pending: VecDeque::new(),
            finished: false,
        };
        Box::pin(stream::unfold(run, |mut run| async move {
            let item = run.next_result().await?;
            Some((item, run))
        }))
    }

    fn close(&mut self) -> CloseFuture<'_> {
        Box::pin(self.shutdown_input())
    }
}

/// State of one command travelling through the session.
struct CommandRun<'a> {
    session: &'a mut ShellSession,
    scope: &'a ExecScope,
    command: &'a str,
    started: bool,
    confirmation_sent: bool,
    pending: VecDeque<ExecStreamResult>,
    finished: bool,
}

impl CommandRun<'_> {
    async fn next_result(&mut self) -> Option<ExecStreamResult> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            if self.finished {
                return None;
            }
            if self.started {
                self.demultiplex().await;
            } else {
                self.start().await;
            }
        }
    }

    async fn start(&mut self) {
        self.started = true;
        if self.session.poisoned {
            self.fail(ExecError::Protocol(String::from(
                "session is no longer usable after an earlier failure",
            )));
            return;
        }
        if !self.session.handshake_done {
            if let Err(error) = self.session.handshake(self.scope).await {
                self.fail(error);
                return;
            }
            self.session.handshake_done = true;
        }
        debug!(command = self.command, "running command");
        let line = format!("{}\n", self.command);
        if let Err(error) = self.session.write_input(line.as_bytes()).await {
            self.fail(ExecError::Io(error));
        }
    }

    async fn demultiplex(&mut self) {
        tokio::select! {
            biased;
            reason = self.scope.done() => self.fail(ExecError::Cancelled(reason)),
            chunk = self.session.stdout.recv() => match chunk {
                Some(data) => self.emit(data, StreamKind::Stdout),
                None => self.fail(ExecError::EndOfStream),
            },
            chunk = self.session.stderr.recv() => match chunk {
                Some(data) => self.on_stderr(data).await,
                None => self.fail(ExecError::EndOfStream),
            },
        }
    }

    async fn on_stderr(&mut self, data: Vec<u8>) {
        let prompts = prompt::find_prompts(&data);
        let Some(first) = prompts.first() else {
            self.emit(data, StreamKind::Stderr);
            return;
        };

        if !self.confirmation_sent {
            self.confirmation_sent = true;
            let residue = prompt::strip_prompts(&data, &prompts);
            self.emit(residue, StreamKind::Stderr);
            trace!("prompt seen, sending confirmation newline");
            if let Err(error) = self.session.write_input(b"\n").await {
                self.fail(ExecError::Io(error));
            }
            return;
        }

        let status = match prompt::parse_status(&data, first) {
            Ok(status) => status,
            Err(error) => {
                self.fail(error);
                return;
            }
        };
        while let Ok(queued) = self.session.stdout.try_recv() {
            self.emit(queued, StreamKind::Stdout);
        }
        let residue = prompt::strip_prompts(&data, &prompts);
        self.emit(residue, StreamKind::Stderr);
        debug!(command = self.command, status, "command finished");
        if status != 0 {
            self.pending
                .push_back(ExecStreamResult::Error(CommandError { code: status }.into()));
        }
        self.finished = true;
    }

    fn emit(&mut self, data: Vec<u8>, kind: StreamKind) {
        if !data.is_empty() {
            self.pending.push_back(ExecStreamResult::Data { data, kind });
        }
    }

    fn fail(&mut self, error: ExecError) {
        debug!(command = self.command, %error, "session failed");
        self.session.poisoned = true;
        self.pending.push_back(ExecStreamResult::Error(error));
        self.finished = true;
    }
}

impl Drop for CommandRun<'_> {
    fn drop(&mut self) {
        if self.started && !self.finished {
            debug!(command = self.command, "command abandoned before its prompt");
            self.session.poisoned = true;
        }
    }
}

async fn pump<R>(mut reader: R, sender: mpsc::Sender<Vec<u8>>, kind: StreamKind)
where
    R: AsyncRead + Unpin,
{
    let mut buffer = vec![0_u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => break,
            Ok(read) => {
                let chunk = buffer.get(..read).map(<[u8]>::to_vec).unwrap_or_default();
                if sender.send(chunk).await.is_err() {
                    break;
                }
            }
            Err(error) => {
                debug!(?kind, %error, "shell output reader stopped");
                break;
            }
        }
    }
}
