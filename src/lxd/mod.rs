//! LXD provider driven through the `lxc` command-line client.
//!
//! Instances created here carry `user.ctr2cloud=true` so that `list` only
//! reports what this tool manages; the caller's name is stored alongside in
//! `user.ctr2cloud-name`. Shells are opened with `lxc exec` and framed by a
//! [`ShellSession`].

mod types;

use std::ffi::OsString;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{
    Address, Backend, BackendError, BackendFuture, InstanceSpec, InstanceStatus,
};
use crate::compute::{CommandExecutor, ExecFailure, ExecScope, parse_ip_addr_output};
use crate::config::ProviderConfig;
use crate::runner::{CommandOutput, CommandRunner, ProcessCommandRunner, RunnerError};
use crate::session::{SHELL_ARGV, ShellSession};

use self::types::LxcInstance;

/// Config key marking an instance as managed by this tool.
pub const MANAGED_KEY: &str = "user.ctr2cloud";

/// Config key holding the caller supplied instance name.
pub const NAME_KEY: &str = "user.ctr2cloud-name";

/// Prefix of every instance identifier created by the provider.
pub const ID_PREFIX: &str = "ctr2cloud-";

const SUFFIX_LEN: usize = 8;

/// Errors returned by the LXD provider.
#[derive(Debug, Error)]
pub enum LxdError {
    /// Raised when an instance spec is missing a required field.
    #[error("invalid instance spec: {0}")]
    Validation(String),
    /// Raised when a name cannot form a valid LXD instance name.
    #[error("invalid instance name '{name}': use ASCII letters, digits, and hyphens")]
    InvalidName {
        /// Name as supplied by the caller.
        name: String,
    },
    /// Raised when `lxc` returns a non-zero exit status.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Program that failed (typically `lxc`).
        program: String,
        /// Exit status reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the command.
        stderr: String,
    },
    /// Raised when JSON output from the client cannot be parsed.
    #[error("failed to parse {resource} output: {message}")]
    Parse {
        /// Resource type being parsed.
        resource: String,
        /// Parser error message.
        message: String,
    },
    /// Raised when the shell process for an instance cannot be started.
    #[error("failed to open a shell on {id}: {message}")]
    Executor {
        /// Instance identifier.
        id: String,
        /// Operating system error message.
        message: String,
    },
    /// Raised when a command run inside the instance fails.
    #[error("command on {id} failed: {source}")]
    Exec {
        /// Instance identifier.
        id: String,
        /// Failure with the command's output.
        #[source]
        source: ExecFailure,
    },
    /// Raised when the client cannot be started at all.
    #[error(transparent)]
    Runner(#[from] RunnerError),
}

impl From<BackendError> for LxdError {
    fn from(value: BackendError) -> Self {
        match value {
            BackendError::Validation(field) => Self::Validation(field),
        }
    }
}

/// Manages LXD instances by shelling out to `lxc`.
#[derive(Clone, Debug)]
pub struct LxdProvider<R: CommandRunner> {
    lxc_bin: String,
    handshake_timeout: Duration,
    runner: R,
}

impl LxdProvider<ProcessCommandRunner> {
    /// Creates a provider wired to the real process runner.
    #[must_use]
    pub fn with_process_runner(config: &ProviderConfig) -> Self {
        Self::new(config, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> LxdProvider<R> {
    /// Creates a provider using the configured client binary and `runner`.
    #[must_use]
    pub fn new(config: &ProviderConfig, runner: R) -> Self {
        Self {
            lxc_bin: config.lxc_bin.clone(),
            handshake_timeout: config.handshake_timeout(),
            runner,
        }
    }

    fn check_lxc_output(&self, output: CommandOutput, action: &str) -> Result<CommandOutput, LxdError> {
        if output.is_success() {
            return Ok(output);
        }
        Err(LxdError::CommandFailure {
            program: self.lxc_bin.clone(),
            status: output.code,
            status_text: output.status_text(),
            stderr: format!("{action}: {}", output.stderr.trim_end()),
        })
    }

    fn run_lxc(&self, args: &[OsString], action: &str) -> Result<CommandOutput, LxdError> {
        debug!(program = %self.lxc_bin, action, "running lxc");
        let output = self.runner.run(&self.lxc_bin, args)?;
        self.check_lxc_output(output, action)
    }

    fn list_instances(&self) -> Result<Vec<InstanceStatus>, LxdError> {
        let args = [
            OsString::from("list"),
            OsString::from("--format"),
            OsString::from("json"),
        ];
        let output = self.run_lxc(&args, "list")?;
        let instances: Vec<LxcInstance> =
            serde_json::from_str(&output.stdout).map_err(|err| LxdError::Parse {
                resource: String::from("instances"),
                message: err.to_string(),
            })?;
        Ok(instances
            .into_iter()
            .filter(|instance| {
                instance.config.get(MANAGED_KEY).map(String::as_str) == Some("true")
            })
            .map(|instance| InstanceStatus {
                name: instance.config.get(NAME_KEY).cloned().unwrap_or_default(),
                id: instance.name,
            })
            .collect())
    }

    fn launch(&self, spec: &InstanceSpec) -> Result<InstanceStatus, LxdError> {
        spec.validate()?;
        if !is_valid_name(&spec.name) {
            return Err(LxdError::InvalidName {
                name: spec.name.clone(),
            });
        }
        let id = instance_id(&spec.name);
        let args = [
            OsString::from("launch"),
            OsString::from(&spec.image),
            OsString::from(&id),
            OsString::from("-c"),
            OsString::from(format!("{MANAGED_KEY}=true")),
            OsString::from("-c"),
            OsString::from(format!("{NAME_KEY}={}", spec.name)),
            OsString::from("-c"),
            OsString::from("security.nesting=true"),
        ];
        self.run_lxc(&args, "launch")?;
        info!(%id, name = %spec.name, image = %spec.image, "instance launched");
        Ok(InstanceStatus {
            id,
            name: spec.name.clone(),
        })
    }

    fn remove(&self, id: &str) -> Result<(), LxdError> {
        self.run_lxc(&[OsString::from("stop"), OsString::from(id)], "stop")?;
        self.run_lxc(&[OsString::from("delete"), OsString::from(id)], "delete")?;
        info!(id, "instance deleted");
        Ok(())
    }

    fn open_shell(&self, id: &str) -> Result<CommandExecutor, LxdError> {
        let mut command = Command::new(&self.lxc_bin);
        command.arg("exec").arg(id).arg("--").args(SHELL_ARGV);
        let (session, mut child) = ShellSession::spawn(command).map_err(|err| LxdError::Executor {
            id: id.to_owned(),
            message: err.to_string(),
        })?;
        let instance = id.to_owned();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!(%instance, "shell exited"),
                Ok(status) => warn!(%instance, %status, "shell exited abnormally"),
                Err(err) => warn!(%instance, error = %err, "failed to reap shell"),
            }
        });
        Ok(CommandExecutor::new(
            session.with_handshake_timeout(self.handshake_timeout),
        ))
    }

    async fn collect_addresses(&self, scope: &ExecScope, id: &str) -> Result<Vec<Address>, LxdError> {
        let mut executor = self.open_shell(id)?;
        let output = executor
            .exec_string(scope, "ip addr")
            .await
            .map_err(|source| LxdError::Exec {
                id: id.to_owned(),
                source,
            })?;
        if let Err(err) = executor.close().await {
            debug!(id, error = %err, "failed to close shell input");
        }
        Ok(parse_ip_addr_output(&output))
    }
}

impl<R> Backend for LxdProvider<R>
where
    R: CommandRunner + Send + Sync,
{
    type Error = LxdError;

    fn list(&self) -> BackendFuture<'_, Vec<InstanceStatus>, Self::Error> {
        Box::pin(async move { self.list_instances() })
    }

    fn create<'a>(
        &'a self,
        spec: &'a InstanceSpec,
    ) -> BackendFuture<'a, InstanceStatus, Self::Error> {
        Box::pin(async move { self.launch(spec) })
    }

    fn delete<'a>(&'a self, id: &'a str) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move { self.remove(id) })
    }

    fn ip_addresses<'a>(
        &'a self,
        scope: &'a ExecScope,
        id: &'a str,
    ) -> BackendFuture<'a, Vec<Address>, Self::Error> {
        Box::pin(self.collect_addresses(scope, id))
    }

    fn command_executor(&self, id: &str) -> Result<CommandExecutor, Self::Error> {
        self.open_shell(id)
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.starts_with('-')
        && !name.ends_with('-')
        && name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
}

fn instance_id(name: &str) -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(SUFFIX_LEN)
        .collect();
    format!("{ID_PREFIX}{name}-{suffix}")
}
