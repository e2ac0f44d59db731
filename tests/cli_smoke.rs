//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn cli_without_arguments_prints_usage() {
    let mut cmd = cargo_bin_cmd!("ctr2cloud");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn unknown_provider_is_rejected() {
    let mut cmd = cargo_bin_cmd!("ctr2cloud");
    cmd.args(["raw", "--provider", "gce", "list"])
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains("unknown provider 'gce'"));
}

#[test]
fn exec_rejects_control_characters_before_connecting() {
    let mut cmd = cargo_bin_cmd!("ctr2cloud");
    cmd.env("CTR2CLOUD_LXC_BIN", "/nonexistent/lxc")
        .args(["raw", "exec", "-i", "ctr2cloud-web-00000000", "--", "echo", "a\nb"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("control characters"));
}

#[test]
fn exec_requires_a_command() {
    let mut cmd = cargo_bin_cmd!("ctr2cloud");
    cmd.args(["raw", "exec", "-i", "ctr2cloud-web-00000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}
