//! Streaming execution contract implemented by shell sessions.

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;

use futures::Stream;
use thiserror::Error;

use crate::compute::scope::{ExecScope, ScopeError};

/// Exit status the POSIX shell reports when a command cannot be found.
pub const COMMAND_NOT_FOUND_CODE: i32 = 127;

/// Pipe a chunk of command output was read from.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StreamKind {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// A command completed with a non-zero exit status.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CommandError {
    /// Exit status reported by the shell.
    pub code: i32,
}

impl CommandError {
    /// Returns `true` when the shell could not find the command.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        self.code == COMMAND_NOT_FOUND_CODE
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_not_found() {
            formatter.write_str("command not found")
        } else {
            write!(formatter, "command failed with return code {}", self.code)
        }
    }
}

impl std::error::Error for CommandError {}

/// Failures surfaced while running a command through a shell session.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The command ran and exited non-zero. The session stays usable.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// The shell produced output that does not follow the prompt protocol.
    #[error("shell protocol error: {0}")]
    Protocol(String),
    /// The shell's output ended before the command finished.
    #[error("shell output ended before the command completed")]
    EndOfStream,
    /// The governing scope was cancelled or timed out.
    #[error(transparent)]
    Cancelled(#[from] ScopeError),
    /// Writing to the shell's input failed.
    #[error("failed to write to shell input: {0}")]
    Io(#[from] io::Error),
}

impl ExecError {
    /// Returns the command failure carried by this error, if any.
    #[must_use]
    pub const fn as_command_error(&self) -> Option<&CommandError> {
        match self {
            Self::Command(error) => Some(error),
            _ => None,
        }
    }
}

/// A single item produced while a command runs.
#[derive(Debug)]
pub enum ExecStreamResult {
    /// A chunk of output read from one of the command's pipes.
    Data {
        /// Raw bytes, with shell prompts removed.
        data: Vec<u8>,
        /// Pipe the bytes were read from.
        kind: StreamKind,
    },
    /// Terminal failure. No item follows an error.
    Error(ExecError),
}

/// Ordered results for one command. The stream borrows the executor
/// mutably, so a second command cannot start until this one is dropped.
pub type ExecStream<'a> = Pin<Box<dyn Stream<Item = ExecStreamResult> + Send + 'a>>;

/// Future returned when closing an executor.
pub type CloseFuture<'a> = Pin<Box<dyn Future<Output = io::Result<()>> + Send + 'a>>;

/// Smallest capability a provider must supply to run shell commands.
pub trait MinimalCommandExecutor: Send {
    /// Starts `command` and streams its output until the exit status is known.
    ///
    /// A successful run ends the stream without an error item. A non-zero exit
    /// ends it with [`ExecError::Command`].
    fn exec_stream<'a>(&'a mut self, scope: &'a ExecScope, command: &'a str) -> ExecStream<'a>;

    /// Releases the shell's input so the remote shell can exit.
    fn close(&mut self) -> CloseFuture<'_>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(127, "command not found", true)]
    #[case(1, "command failed with return code 1", false)]
    #[case(2, "command failed with return code 2", false)]
    fn command_error_describes_status(
        #[case] code: i32,
        #[case] expected: &str,
        #[case] not_found: bool,
    ) {
        let error = CommandError { code };
        assert_eq!(error.to_string(), expected);
        assert_eq!(error.is_not_found(), not_found);
    }

    #[rstest]
    fn exec_error_exposes_command_error() {
        let error = ExecError::from(CommandError { code: 3 });
        assert_eq!(error.as_command_error(), Some(&CommandError { code: 3 }));
        assert_eq!(ExecError::EndOfStream.as_command_error(), None);
    }
}
