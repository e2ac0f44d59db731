//! Service state through `systemctl`, plus `/etc/os-release` inspection.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::compute::{CommandExecutor, ExecScope};
use crate::pipeline::{Operation, operation};
use crate::provisioners::{ProvisionError, SharedExecutor, quote, run};

/// Manages systemd units.
#[derive(Debug)]
pub struct SystemdProvisioner<'a> {
    executor: &'a mut CommandExecutor,
}

impl<'a> SystemdProvisioner<'a> {
    /// Borrows `executor` for service actions.
    #[must_use]
    pub const fn new(executor: &'a mut CommandExecutor) -> Self {
        Self { executor }
    }

    /// Makes `service` enabled and running.
    ///
    /// A service that is already active and enabled is left alone unless
    /// `force_restart` is set, which restarts it (use this when its
    /// dependencies changed). Returns `true` whenever systemctl was asked to
    /// act.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Exec`] when enabling or restarting fails.
    pub async fn ensure_service_enabled_now(
        &mut self,
        scope: &ExecScope,
        service: &str,
        force_restart: bool,
    ) -> Result<bool, ProvisionError> {
        let unit = quote(service);
        let check = format!("systemctl is-active {unit} && systemctl is-enabled {unit}");
        let running = match self.executor.exec_string(scope, &check).await {
            Ok(_) => true,
            Err(failure) => {
                debug!(service, output = %failure.output_text(), "service not enabled or running");
                false
            }
        };
        if running && !force_restart {
            debug!(service, "service already enabled and running");
            return Ok(false);
        }

        let command = if running {
            format!("systemctl daemon-reload; systemctl restart {unit}")
        } else {
            format!(
                "systemctl daemon-reload; systemctl reset-failed {unit}; systemctl enable --now {unit}"
            )
        };
        run(self.executor, scope, "enable service", &command).await?;
        info!(service, restarted = running, "service enabled");
        Ok(true)
    }

    /// Reads `/etc/os-release` as key/value pairs with quotes removed.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Exec`] when the file cannot be read.
    pub async fn os_release(
        &mut self,
        scope: &ExecScope,
    ) -> Result<BTreeMap<String, String>, ProvisionError> {
        let raw = run(self.executor, scope, "read os-release", "cat /etc/os-release").await?;
        Ok(parse_os_release(&raw))
    }
}

/// Pipeline operation ensuring `service` is enabled and running.
///
/// With `restart_on_change`, the service is restarted when an earlier
/// operation in the run reported a change.
#[must_use]
pub fn ensure_service_enabled_now_op(
    executor: SharedExecutor,
    service: impl Into<String>,
    restart_on_change: bool,
) -> Operation<ProvisionError> {
    let unit: String = service.into();
    operation(move |ctx| {
        let handle = Arc::clone(&executor);
        let name = unit.clone();
        Box::pin(async move {
            let force_restart = restart_on_change && ctx.previous_has_changes();
            let mut guard = handle.lock().await;
            let changed = SystemdProvisioner::new(&mut guard)
                .ensure_service_enabled_now(ctx.scope(), &name, force_restart)
                .await?;
            ctx.set_result(changed);
            Ok(())
        })
    })
}

fn parse_os_release(raw: &str) -> BTreeMap<String, String> {
    raw.trim_matches('\n')
        .lines()
        .filter_map(|line| {
            let Some((key, value)) = line.split_once('=') else {
                warn!(line, "invalid os-release line");
                return None;
            };
            Some((key.to_owned(), value.trim_matches('"').to_owned()))
        })
        .collect()
}
