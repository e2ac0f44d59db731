//! Docker daemon and container lifecycle.
//!
//! Containers are compared against `docker inspect` and recreated whenever
//! their inspected state drifts from the requested [`ContainerSpec`].

mod types;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::compute::{CommandExecutor, ExecScope};
use crate::pipeline::{Operation, operation};
use crate::provisioners::apt::AptProvisioner;
use crate::provisioners::systemd::SystemdProvisioner;
use crate::provisioners::{ProvisionError, SharedExecutor, quote, run};

use self::types::DockerInspect;

const DOCKER_PACKAGE: &str = "docker.io";
const DOCKER_SOCKET: &str = "docker.socket";

/// Desired state of one container.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ContainerSpec {
    /// Image reference passed to `docker run`.
    pub image: String,
    /// Container name.
    pub name: String,
    /// Bind mounts keyed by host path, valued by container path.
    pub mounts: BTreeMap<String, String>,
    /// Restart the container automatically.
    pub restart: bool,
    /// Command appended after the image, if any.
    pub command: Option<String>,
}

impl ContainerSpec {
    /// Renders the `docker run` invocation creating this container.
    #[must_use]
    pub fn run_command(&self) -> String {
        let mut command = format!("docker run -d --name {}", self.name);
        for (host, container) in &self.mounts {
            command.push_str(&format!(" -v \"{host}:{container}\""));
        }
        if self.restart {
            command.push_str(" --restart always");
        }
        command.push(' ');
        command.push_str(&self.image);
        if let Some(extra) = self.command.as_deref().filter(|cmd| !cmd.is_empty()) {
            command.push(' ');
            command.push_str(extra);
        }
        command
    }

    fn matches_inspect(&self, inspect: &DockerInspect) -> bool {
        if inspect.config.image != self.image || inspect.name != format!("/{}", self.name) {
            return false;
        }

        let wanted: BTreeSet<(&str, &str)> = self
            .mounts
            .iter()
            .map(|(host, container)| (host.as_str(), container.as_str()))
            .collect();
        let actual: BTreeSet<(&str, &str)> = inspect
            .mounts
            .iter()
            .map(|mount| (mount.source.as_str(), mount.destination.as_str()))
            .collect();
        if wanted != actual {
            return false;
        }

        if self.restart && inspect.host_config.restart_policy.name != "always" {
            return false;
        }
        match self.command.as_deref() {
            Some(command) if !command.is_empty() => command == inspect.config.cmd.join(" "),
            _ => true,
        }
    }
}

/// Installs Docker and manages containers.
#[derive(Debug)]
pub struct DockerProvisioner<'a> {
    executor: &'a mut CommandExecutor,
}

impl<'a> DockerProvisioner<'a> {
    /// Borrows `executor` for Docker actions.
    #[must_use]
    pub const fn new(executor: &'a mut CommandExecutor) -> Self {
        Self { executor }
    }

    /// Installs `docker.io`, enables its socket, and checks the daemon
    /// answers `docker ps`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] from the package or service step, or when
    /// `docker ps` fails.
    pub async fn ensure_docker_daemon(&mut self, scope: &ExecScope) -> Result<bool, ProvisionError> {
        let installed = AptProvisioner::new(&mut *self.executor)
            .ensure_package_installed(scope, DOCKER_PACKAGE)
            .await?;
        let enabled = SystemdProvisioner::new(&mut *self.executor)
            .ensure_service_enabled_now(scope, DOCKER_SOCKET, false)
            .await?;
        run(self.executor, scope, "docker ps", "docker ps").await?;
        Ok(installed || enabled)
    }

    async fn inspect_container(
        &mut self,
        scope: &ExecScope,
        name: &str,
    ) -> Result<DockerInspect, ProvisionError> {
        let command = format!("docker inspect -f \"{{{{ json . }}}}\" {}", quote(name));
        let output = run(self.executor, scope, "docker inspect", &command).await?;
        serde_json::from_str(&output).map_err(|err| ProvisionError::Parse {
            resource: String::from("docker inspect"),
            message: err.to_string(),
        })
    }

    /// Makes a container matching `spec` exist, recreating it on drift.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Exec`] when removing or creating the
    /// container fails.
    pub async fn ensure_container(
        &mut self,
        scope: &ExecScope,
        spec: &ContainerSpec,
    ) -> Result<bool, ProvisionError> {
        match self.inspect_container(scope, &spec.name).await {
            Ok(inspect) if spec.matches_inspect(&inspect) => {
                debug!(name = %spec.name, "container already matches");
                return Ok(false);
            }
            Ok(_) => {
                debug!(name = %spec.name, "container drifted, removing");
                let command = format!("docker rm -f {}", quote(&spec.name));
                run(self.executor, scope, "docker rm", &command).await?;
            }
            Err(error) => debug!(name = %spec.name, %error, "container not inspectable"),
        }

        let command = spec.run_command();
        debug!(%command, "creating container");
        run(self.executor, scope, "docker run", &command).await?;
        info!(name = %spec.name, image = %spec.image, "container created");
        Ok(true)
    }
}

/// Pipeline operation ensuring the Docker daemon is available.
#[must_use]
pub fn ensure_docker_daemon_op(executor: SharedExecutor) -> Operation<ProvisionError> {
    operation(move |ctx| {
        let handle = Arc::clone(&executor);
        Box::pin(async move {
            let mut guard = handle.lock().await;
            let changed = DockerProvisioner::new(&mut guard)
                .ensure_docker_daemon(ctx.scope())
                .await?;
            ctx.set_result(changed);
            Ok(())
        })
    })
}

/// Pipeline operation ensuring a container matches `spec`.
#[must_use]
pub fn ensure_container_op(executor: SharedExecutor, spec: ContainerSpec) -> Operation<ProvisionError> {
    operation(move |ctx| {
        let handle = Arc::clone(&executor);
        let wanted = spec.clone();
        Box::pin(async move {
            let mut guard = handle.lock().await;
            let changed = DockerProvisioner::new(&mut guard)
                .ensure_container(ctx.scope(), &wanted)
                .await?;
            ctx.set_result(changed);
            Ok(())
        })
    })
}
