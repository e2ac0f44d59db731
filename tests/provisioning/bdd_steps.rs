//! BDD step definitions for provisioning pipelines.

use std::sync::Arc;

use ctr2cloud::pipeline::Pipeline;
use ctr2cloud::provisioners::apt::ensure_package_installed_op;
use ctr2cloud::provisioners::shared;
use ctr2cloud::provisioners::systemd::ensure_service_enabled_now_op;
use ctr2cloud::test_support::{FakeResponse, FakeShell};
use ctr2cloud::{CommandExecutor, ExecScope};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{
    Counters, PIPELINE_TIMEOUT, PipelineRun, ProvisioningContext, apt_install, dpkg_query,
    service_check,
};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn script(
    mut provisioning_context: ProvisioningContext,
    command: String,
    response: FakeResponse,
) -> ProvisioningContext {
    let shell = provisioning_context
        .shell
        .take()
        .unwrap_or_else(|| panic!("test setup requires a remote shell"));
    provisioning_context.shell = Some(shell.respond(command, response));
    provisioning_context
}

fn finished_run(provisioning_context: &ProvisioningContext) -> Result<&PipelineRun, StepError> {
    provisioning_context
        .run
        .as_ref()
        .ok_or_else(|| StepError::Assertion(String::from("pipeline has not run")))
}

#[given("a remote shell")]
fn remote_shell(mut provisioning_context: ProvisioningContext) -> ProvisioningContext {
    provisioning_context.shell = Some(
        FakeShell::new().banner("/bin/sh: 0: can't access tty; job control turned off\n"),
    );
    provisioning_context
}

#[given("package \"{package}\" is not installed")]
fn package_missing(provisioning_context: ProvisioningContext, package: String) -> ProvisioningContext {
    let name = package.trim();
    script(
        provisioning_context,
        dpkg_query(name),
        FakeResponse::status(1)
            .with_stderr(format!("dpkg-query: no packages found matching {name}\n")),
    )
}

#[given("package \"{package}\" is installed at version \"{version}\"")]
fn package_installed(
    provisioning_context: ProvisioningContext,
    package: String,
    version: String,
) -> ProvisioningContext {
    let name = package.trim();
    script(
        provisioning_context,
        dpkg_query(name),
        FakeResponse::stdout(format!("{name}\t{}\n", version.trim())),
    )
}

#[given("apt installs \"{package}\"")]
fn apt_installs(provisioning_context: ProvisioningContext, package: String) -> ProvisioningContext {
    let updated = script(
        provisioning_context,
        String::from("apt update"),
        FakeResponse::stdout("Reading package lists... Done\n"),
    );
    script(
        updated,
        apt_install(package.trim()),
        FakeResponse::stdout("Setting up package ...\n"),
    )
}

#[given("apt fails to install \"{package}\" with status {status}")]
fn apt_install_fails(
    provisioning_context: ProvisioningContext,
    package: String,
    status: i64,
) -> ProvisioningContext {
    let updated = script(
        provisioning_context,
        String::from("apt update"),
        FakeResponse::status(0),
    );
    script(
        updated,
        apt_install(package.trim()),
        FakeResponse::status(status).with_stderr("E: Unable to fetch some archives\n"),
    )
}

#[given("service \"{service}\" is active and enabled")]
fn service_running(provisioning_context: ProvisioningContext, service: String) -> ProvisioningContext {
    script(
        provisioning_context,
        service_check(service.trim()),
        FakeResponse::stdout("active\nenabled\n"),
    )
}

#[given("systemctl can start \"{service}\"")]
fn systemctl_starts(provisioning_context: ProvisioningContext, service: String) -> ProvisioningContext {
    let unit = service.trim();
    let restartable = script(
        provisioning_context,
        format!("systemctl daemon-reload; systemctl restart {unit}"),
        FakeResponse::status(0),
    );
    script(
        restartable,
        format!(
            "systemctl daemon-reload; systemctl reset-failed {unit}; systemctl enable --now {unit}"
        ),
        FakeResponse::status(0),
    )
}

#[when("I run the package and service pipeline for \"{package}\"")]
fn run_pipeline(
    mut provisioning_context: ProvisioningContext,
    package: String,
) -> Result<ProvisioningContext, StepError> {
    let shell = provisioning_context
        .shell
        .clone()
        .ok_or_else(|| StepError::Assertion(String::from("test setup requires a remote shell")))?;
    let name = package.trim().to_owned();
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;

    let run = runtime.block_on(async move {
        let (session, handle) = shell.start();
        let executor = shared(CommandExecutor::new(session));
        let pipeline = Pipeline::new(
            ExecScope::background().with_timeout(PIPELINE_TIMEOUT),
            vec![
                ensure_package_installed_op(Arc::clone(&executor), name.clone()),
                ensure_service_enabled_now_op(executor, name, true),
            ],
        );
        let outcome = pipeline.run().await;
        PipelineRun {
            error: outcome.err().map(|err| err.to_string()),
            counters: Counters::read(pipeline.context()),
            transcript: handle.transcript(),
        }
    });

    provisioning_context.run = Some(run);
    Ok(provisioning_context)
}

#[then("the pipeline succeeds")]
fn pipeline_succeeds(provisioning_context: &ProvisioningContext) -> Result<(), StepError> {
    match &finished_run(provisioning_context)?.error {
        None => Ok(()),
        Some(message) => Err(StepError::Assertion(format!(
            "expected success, got failure: {message}"
        ))),
    }
}

#[then("the pipeline fails mentioning \"{text}\"")]
fn pipeline_fails(provisioning_context: &ProvisioningContext, text: String) -> Result<(), StepError> {
    match &finished_run(provisioning_context)?.error {
        Some(message) if message.contains(text.trim()) => Ok(()),
        Some(message) => Err(StepError::Assertion(format!(
            "expected failure mentioning {text:?}, got: {message}"
        ))),
        None => Err(StepError::Assertion(String::from(
            "expected failure, got success",
        ))),
    }
}

#[then("the pipeline counts {steps:u32} steps and {updates:u32} updates")]
fn pipeline_counts(
    provisioning_context: &ProvisioningContext,
    steps: u32,
    updates: u32,
) -> Result<(), StepError> {
    let counters = &finished_run(provisioning_context)?.counters;
    let expected = Counters { steps, updates };
    if *counters == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected:?}, got {counters:?}"
        )))
    }
}

#[then("the shell ran \"{command}\"")]
fn shell_ran(provisioning_context: &ProvisioningContext, command: String) -> Result<(), StepError> {
    let transcript = &finished_run(provisioning_context)?.transcript;
    if transcript.iter().any(|line| line == command.trim()) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "{command:?} missing from transcript {transcript:?}"
        )))
    }
}

#[then("the shell did not run \"{command}\"")]
fn shell_skipped(
    provisioning_context: &ProvisioningContext,
    command: String,
) -> Result<(), StepError> {
    let transcript = &finished_run(provisioning_context)?.transcript;
    if transcript.iter().any(|line| line == command.trim()) {
        Err(StepError::Assertion(format!(
            "{command:?} unexpectedly in transcript {transcript:?}"
        )))
    } else {
        Ok(())
    }
}
