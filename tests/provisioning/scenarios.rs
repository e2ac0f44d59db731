//! BDD scenarios for provisioning pipelines.

use rstest_bdd_macros::scenario;

use super::test_helpers::{ProvisioningContext, provisioning_context};

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "Install a missing package and restart its service"
)]
fn scenario_install_and_restart(provisioning_context: ProvisioningContext) {
    drop(provisioning_context);
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "Leave an installed package and running service alone"
)]
fn scenario_nothing_to_do(provisioning_context: ProvisioningContext) {
    drop(provisioning_context);
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "Enable a stopped service without installing anything"
)]
fn scenario_enable_stopped_service(provisioning_context: ProvisioningContext) {
    drop(provisioning_context);
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "Stop at the first failing step"
)]
fn scenario_first_failure_stops(provisioning_context: ProvisioningContext) {
    drop(provisioning_context);
}
