//! Core library for the ctr2cloud provisioning tool.
//!
//! The crate exposes a provider abstraction for creating container instances,
//! an LXD implementation driving the `lxc` client, and a shell-session
//! protocol that turns one interactive shell into a sequential command
//! channel. Provisioners built on that channel install packages, write files,
//! and manage services and containers idempotently, reporting each change to
//! a pipeline ledger that composes across nested runs.

pub mod backend;
pub mod compute;
pub mod config;
pub mod logging;
pub mod lxd;
pub mod pipeline;
pub mod provisioners;
pub mod runner;
pub mod session;
pub mod test_support;

pub use backend::{
    Address, AddressKind, Backend, BackendError, BackendFuture, InstanceSpec, InstanceSpecBuilder,
    InstanceStatus,
};
pub use compute::{
    CommandError, CommandExecutor, ExecError, ExecFailure, ExecScope, ExecStreamResult,
    MinimalCommandExecutor, ScopeError, StreamKind,
};
pub use config::{ConfigError, ProviderConfig};
pub use logging::init_tracing;
pub use lxd::{LxdError, LxdProvider};
pub use pipeline::{Context, Operation, Pipeline, nested, operation};
pub use provisioners::{
    AptProvisioner, ContainerSpec, DockerProvisioner, FileProvisioner, ProvisionError,
    RepositoryArgs, SharedExecutor, SystemdProvisioner,
};
pub use runner::{CommandOutput, CommandRunner, ProcessCommandRunner, RunnerError};
pub use session::ShellSession;
