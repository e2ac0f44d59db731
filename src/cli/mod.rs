//! Command-line interface definitions for the `ctr2cloud` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI for the `ctr2cloud` binary.
#[derive(Debug, Parser)]
#[command(
    name = "ctr2cloud",
    about = "Provision container instances and configure them over a shell",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Log debug output to stderr (overridden by `CTR2CLOUD_LOG`).
    #[arg(short, long, global = true)]
    pub(crate) verbose: bool,
    /// Subcommand to run.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Subcommands of `ctr2cloud`.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Drive a provider directly.
    #[command(name = "raw", about = "Drive a provider directly")]
    Raw(RawCommand),
}

/// Arguments for the `ctr2cloud raw` subcommand.
#[derive(Debug, Args)]
pub(crate) struct RawCommand {
    /// Provider to use.
    #[arg(short, long, default_value = "lxd", value_name = "PROVIDER")]
    pub(crate) provider: String,
    /// Action to perform.
    #[command(subcommand)]
    pub(crate) action: RawAction,
}

/// Provider actions available under `ctr2cloud raw`.
#[derive(Debug, Subcommand)]
pub(crate) enum RawAction {
    /// List instances created by ctr2cloud.
    List,
    /// Create and start an instance.
    Create {
        /// Name recorded on the instance.
        name: String,
        /// Image to launch instead of the configured default.
        #[arg(long, value_name = "IMAGE")]
        image: Option<String>,
    },
    /// Stop and delete an instance.
    Delete {
        /// Instance identifier as printed by `list`.
        id: String,
    },
    /// Run a command in an instance's shell.
    Exec {
        /// Instance identifier.
        #[arg(short, long, value_name = "ID")]
        instance: String,
        /// Print the output once the command finishes instead of as it arrives.
        #[arg(long)]
        no_stream: bool,
        /// Command to execute (use -- to separate flags).
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Install a Debian package unless it is already present.
    Install {
        /// Instance identifier.
        #[arg(short, long, value_name = "ID")]
        instance: String,
        /// Package name.
        package: String,
    },
}
