//! Shared fixtures and helpers for provisioning BDD scenarios.

use std::time::Duration;

use ctr2cloud::pipeline::Context;
use ctr2cloud::test_support::FakeShell;
use rstest::fixture;

/// Upper bound for a scenario's whole pipeline.
pub const PIPELINE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Counters {
    pub steps: u32,
    pub updates: u32,
}

impl Counters {
    pub fn read(ctx: &Context) -> Self {
        Self {
            steps: ctx.step_ctr(false),
            updates: ctx.update_ctr(false),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineRun {
    pub error: Option<String>,
    pub counters: Counters,
    pub transcript: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ProvisioningContext {
    pub shell: Option<FakeShell>,
    pub run: Option<PipelineRun>,
}

#[fixture]
pub fn provisioning_context() -> ProvisioningContext {
    ProvisioningContext::default()
}

pub fn dpkg_query(package: &str) -> String {
    format!("dpkg-query -W {package}")
}

pub fn apt_install(package: &str) -> String {
    format!("apt install -qy {package}")
}

pub fn service_check(service: &str) -> String {
    format!("systemctl is-active {service} && systemctl is-enabled {service}")
}
