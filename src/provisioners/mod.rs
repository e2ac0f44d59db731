//! Idempotent configuration actions executed through a remote shell.
//!
//! Each provisioner borrows a [`CommandExecutor`] and reports whether it
//! changed the instance. The `*_op` constructors wrap the same actions as
//! pipeline [`Operation`](crate::pipeline::Operation)s over a
//! [`SharedExecutor`].

pub mod apt;
pub mod docker;
pub mod file;
pub mod systemd;

use std::borrow::Cow;
use std::sync::Arc;

use shell_escape::unix::escape;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::compute::{CommandExecutor, ExecFailure, ExecScope};

pub use apt::{AptProvisioner, RepositoryArgs};
pub use docker::{ContainerSpec, DockerProvisioner};
pub use file::FileProvisioner;
pub use systemd::SystemdProvisioner;

/// Executor shared between the operations of a pipeline.
pub type SharedExecutor = Arc<Mutex<CommandExecutor>>;

/// Wraps an executor for use by pipeline operations.
#[must_use]
pub fn shared(executor: CommandExecutor) -> SharedExecutor {
    Arc::new(Mutex::new(executor))
}

/// Errors raised by provisioners.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The target file does not exist.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Remote path.
        path: String,
    },
    /// The shell user may not access the target file.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// Remote path.
        path: String,
    },
    /// The package is not installed.
    #[error("package not found: {package}")]
    PackageNotFound {
        /// Package name.
        package: String,
    },
    /// A command succeeded but printed something unexpected.
    #[error("{action}: unexpected output: {output}")]
    UnexpectedOutput {
        /// What was being attempted.
        action: String,
        /// Output as received.
        output: String,
    },
    /// A command failed.
    #[error("{action}: {source}")]
    Exec {
        /// What was being attempted.
        action: String,
        /// Failure with the command's output.
        #[source]
        source: ExecFailure,
    },
    /// Content read back did not match its checksum.
    #[error("checksum mismatch for {path}: expected {expected}, found {actual}")]
    ChecksumMismatch {
        /// Remote path.
        path: String,
        /// Expected SHA-256 digest.
        expected: String,
        /// Digest actually observed.
        actual: String,
    },
    /// Base64 content could not be decoded.
    #[error("failed to decode contents of {path}: {message}")]
    Decode {
        /// Remote path.
        path: String,
        /// Decoder error message.
        message: String,
    },
    /// JSON output could not be parsed.
    #[error("failed to parse {resource} output: {message}")]
    Parse {
        /// What was being parsed.
        resource: String,
        /// Parser error message.
        message: String,
    },
}

impl ProvisionError {
    fn exec(action: impl Into<String>) -> impl FnOnce(ExecFailure) -> Self {
        let description = action.into();
        move |source| Self::Exec {
            action: description,
            source,
        }
    }
}

/// Quotes a value for interpolation into a shell command line.
fn quote(value: &str) -> Cow<'_, str> {
    escape(Cow::Borrowed(value))
}

/// Runs `command`, wrapping failures with `action`.
async fn run(
    executor: &mut CommandExecutor,
    scope: &ExecScope,
    action: &str,
    command: &str,
) -> Result<String, ProvisionError> {
    executor
        .exec_string(scope, command)
        .await
        .map_err(ProvisionError::exec(action))
}
