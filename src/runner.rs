//! Host command runner abstraction used to drive provider CLIs.

use std::ffi::OsString;
use std::process::Command;

use thiserror::Error;

/// Result of running an external command to completion.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Renders the exit status for error messages.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.code
            .map_or_else(|| String::from("unknown"), |code| code.to_string())
    }
}

/// Errors raised before a command produces any output.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RunnerError {
    /// The program could not be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Operating system error message.
        message: String,
    },
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RunnerError>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RunnerError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| RunnerError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn process_runner_captures_output_and_status() {
        let output = ProcessCommandRunner
            .run(
                "sh",
                &[
                    OsString::from("-c"),
                    OsString::from("echo out; echo err >&2; exit 3"),
                ],
            )
            .unwrap_or_else(|err| panic!("sh should start: {err}"));
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert!(!output.is_success());
        assert_eq!(output.status_text(), "3");
    }

    #[rstest]
    fn process_runner_reports_spawn_failure() {
        let err = ProcessCommandRunner
            .run("ctr2cloud-definitely-missing-binary", &[])
            .expect_err("missing binary should fail to spawn");
        assert!(
            matches!(err, RunnerError::Spawn { ref program, .. } if program == "ctr2cloud-definitely-missing-binary"),
            "unexpected error: {err}"
        );
    }
}
