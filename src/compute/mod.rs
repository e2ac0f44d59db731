//! Shell-level command execution primitives shared by every provider.
//!
//! A provider hands out a [`CommandExecutor`] bound to one long-lived shell
//! on a remote instance. Commands run one at a time; their output arrives as a
//! stream of [`ExecStreamResult`] items tagged with the originating pipe, and
//! the stream terminates once the shell reports the command's exit status.

pub mod exec;
pub mod executor;
pub mod parsers;
pub mod scope;

pub use exec::{
    COMMAND_NOT_FOUND_CODE, CloseFuture, CommandError, ExecError, ExecStream, ExecStreamResult,
    MinimalCommandExecutor, StreamKind,
};
pub use executor::{CommandExecutor, ExecFailure};
pub use parsers::parse_ip_addr_output;
pub use scope::{CancelHandle, ExecScope, ScopeError};
