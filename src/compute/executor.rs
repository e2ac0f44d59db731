//! Convenience wrapper that turns a streaming executor into buffered calls.

use std::fmt;
use std::io;

use futures::StreamExt;
use thiserror::Error;
use tracing::debug;

use crate::compute::exec::{
    CommandError, ExecError, ExecStream, ExecStreamResult, MinimalCommandExecutor,
};
use crate::compute::scope::ExecScope;

/// A command failed; carries whatever output it produced before failing.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ExecFailure {
    /// Combined stdout and stderr bytes in arrival order.
    pub output: Vec<u8>,
    /// Why the command failed.
    #[source]
    pub error: ExecError,
}

impl ExecFailure {
    /// Output decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    /// Returns the non-zero exit status, if the command ran to completion.
    #[must_use]
    pub const fn command_error(&self) -> Option<&CommandError> {
        self.error.as_command_error()
    }

    /// Returns `true` when the shell could not find the command.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.command_error().is_some_and(CommandError::is_not_found)
    }
}

/// Runs commands on one shell, either streaming or buffering their output.
pub struct CommandExecutor {
    inner: Box<dyn MinimalCommandExecutor>,
}

impl fmt::Debug for CommandExecutor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CommandExecutor")
            .finish_non_exhaustive()
    }
}

impl CommandExecutor {
    /// Wraps a provider supplied executor.
    #[must_use]
    pub fn new(inner: impl MinimalCommandExecutor + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }

    /// Streams the output of `command`; see [`MinimalCommandExecutor::exec_stream`].
    pub fn exec_stream<'a>(&'a mut self, scope: &'a ExecScope, command: &'a str) -> ExecStream<'a> {
        self.inner.exec_stream(scope, command)
    }

    /// Runs `command` and collects stdout and stderr into one buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ExecFailure`] holding the output gathered so far when the
    /// stream ends in an error, including a non-zero exit status.
    pub async fn exec(&mut self, scope: &ExecScope, command: &str) -> Result<Vec<u8>, ExecFailure> {
        let mut output = Vec::new();
        let mut failure = None;
        let mut stream = self.inner.exec_stream(scope, command);
        while let Some(item) = stream.next().await {
            match item {
                ExecStreamResult::Data { data, .. } => output.extend_from_slice(&data),
                ExecStreamResult::Error(error) => {
                    debug!(command, %error, "command finished with error");
                    failure = Some(error);
                }
            }
        }
        match failure {
            Some(error) => Err(ExecFailure { output, error }),
            None => Ok(output),
        }
    }

    /// Like [`CommandExecutor::exec`], decoding the output as UTF-8.
    ///
    /// # Errors
    ///
    /// See [`CommandExecutor::exec`].
    pub async fn exec_string(
        &mut self,
        scope: &ExecScope,
        command: &str,
    ) -> Result<String, ExecFailure> {
        let output = self.exec(scope, command).await?;
        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    /// Closes the shell's input.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while shutting down the input pipe.
    pub async fn close(&mut self) -> io::Result<()> {
        self.inner.close().await
    }
}
