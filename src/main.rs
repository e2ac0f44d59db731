//! Binary entry point for the ctr2cloud CLI.

mod cli;

use std::io::{self, Write};
use std::process;

use clap::Parser;
use futures::StreamExt;
use shell_escape::unix::escape;
use thiserror::Error;
use tracing::debug;

use ctr2cloud::{
    AptProvisioner, Backend, CommandExecutor, ExecError, ExecScope, ExecStreamResult,
    InstanceSpec, LxdProvider, ProviderConfig, StreamKind, init_tracing,
};

use crate::cli::{Cli, Command, RawAction, RawCommand};

const LXD_PROVIDER: &str = "lxd";

#[derive(Debug, Error)]
enum CliError {
    #[error("unknown provider '{0}' (available: lxd)")]
    UnknownProvider(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("remote command failed: {0}")]
    Exec(String),
    #[error("provisioning failed: {0}")]
    Provision(String),
    #[error("invalid command argument: {0}")]
    InvalidCommand(String),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli.command {
        Command::Raw(raw) => run_raw(raw).await,
    }
}

async fn run_raw(raw: RawCommand) -> Result<i32, CliError> {
    if raw.provider != LXD_PROVIDER {
        return Err(CliError::UnknownProvider(raw.provider));
    }
    if let RawAction::Exec { command, .. } = &raw.action {
        validate_command_args(command)?;
    }

    let config =
        ProviderConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    config
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let provider = LxdProvider::with_process_runner(&config);
    let scope = ExecScope::background().with_timeout(config.command_timeout());

    match raw.action {
        RawAction::List => list_instances(&provider, io::stdout()).await,
        RawAction::Create { name, image } => {
            let image_ref = image.unwrap_or_else(|| config.default_image.clone());
            create_instance(&provider, &name, &image_ref, io::stdout()).await
        }
        RawAction::Delete { id } => {
            provider
                .delete(&id)
                .await
                .map_err(|err| CliError::Backend(err.to_string()))?;
            Ok(0)
        }
        RawAction::Exec {
            instance,
            no_stream,
            command,
        } => {
            let mut executor = open_executor(&provider, &instance)?;
            let line = render_remote_command(&command);
            let code = if no_stream {
                run_buffered(&mut executor, &scope, &line, io::stdout()).await
            } else {
                run_streaming(&mut executor, &scope, &line, io::stdout(), io::stderr()).await
            };
            close_executor(&mut executor).await;
            code
        }
        RawAction::Install { instance, package } => {
            let mut executor = open_executor(&provider, &instance)?;
            let changed = AptProvisioner::new(&mut executor)
                .ensure_package_installed(&scope, &package)
                .await
                .map_err(|err| CliError::Provision(err.to_string()));
            close_executor(&mut executor).await;
            let state = if changed? { "installed" } else { "already installed" };
            writeln!(io::stdout(), "{package}: {state}")?;
            Ok(0)
        }
    }
}

async fn list_instances<B: Backend>(backend: &B, mut out: impl Write) -> Result<i32, CliError> {
    let instances = backend
        .list()
        .await
        .map_err(|err| CliError::Backend(err.to_string()))?;
    for instance in instances {
        writeln!(out, "{}\t{}", instance.id, instance.name)?;
    }
    Ok(0)
}

async fn create_instance<B: Backend>(
    backend: &B,
    name: &str,
    image: &str,
    mut out: impl Write,
) -> Result<i32, CliError> {
    let spec = InstanceSpec::builder()
        .name(name)
        .image(image)
        .build()
        .map_err(|err| CliError::Backend(err.to_string()))?;
    let status = backend
        .create(&spec)
        .await
        .map_err(|err| CliError::Backend(err.to_string()))?;
    writeln!(out, "{}", status.id)?;
    Ok(0)
}

fn open_executor<B: Backend>(backend: &B, id: &str) -> Result<CommandExecutor, CliError> {
    backend
        .command_executor(id)
        .map_err(|err| CliError::Backend(err.to_string()))
}

async fn close_executor(executor: &mut CommandExecutor) {
    if let Err(err) = executor.close().await {
        debug!(error = %err, "failed to close remote shell");
    }
}

/// Copies output as it arrives and returns the remote exit status.
async fn run_streaming(
    executor: &mut CommandExecutor,
    scope: &ExecScope,
    command: &str,
    mut out: impl Write,
    mut err_out: impl Write,
) -> Result<i32, CliError> {
    let mut stream = executor.exec_stream(scope, command);
    let mut code = 0;
    while let Some(item) = stream.next().await {
        match item {
            ExecStreamResult::Data {
                data,
                kind: StreamKind::Stdout,
            } => {
                out.write_all(&data)?;
                out.flush()?;
            }
            ExecStreamResult::Data {
                data,
                kind: StreamKind::Stderr,
            } => {
                err_out.write_all(&data)?;
                err_out.flush()?;
            }
            ExecStreamResult::Error(ExecError::Command(failure)) => code = failure.code,
            ExecStreamResult::Error(error) => return Err(CliError::Exec(error.to_string())),
        }
    }
    Ok(code)
}

/// Prints the combined output once the command finishes.
async fn run_buffered(
    executor: &mut CommandExecutor,
    scope: &ExecScope,
    command: &str,
    mut out: impl Write,
) -> Result<i32, CliError> {
    match executor.exec(scope, command).await {
        Ok(output) => {
            out.write_all(&output)?;
            Ok(0)
        }
        Err(failure) => {
            out.write_all(&failure.output)?;
            failure
                .command_error()
                .map(|error| error.code)
                .ok_or_else(|| CliError::Exec(failure.to_string()))
        }
    }
}

fn render_remote_command(args: &[String]) -> String {
    args.iter()
        .map(|arg| escape(arg.as_str().into()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn validate_command_args(args: &[String]) -> Result<(), CliError> {
    for arg in args {
        if arg
            .chars()
            .any(|ch| matches!(ch, '\u{0000}'..='\u{001F}' | '\u{007F}'))
        {
            return Err(CliError::InvalidCommand(String::from(concat!(
                "command arguments must not contain control characters (ASCII ",
                "0x00-0x1F or 0x7F, e.g. newline, carriage return, tab, NUL)"
            ))));
        }
    }
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
