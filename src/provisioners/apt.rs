//! Debian package management through `apt` and `dpkg-query`.

use std::sync::Arc;

use tracing::{debug, info};

use crate::compute::{CommandExecutor, ExecScope};
use crate::pipeline::{Operation, operation};
use crate::provisioners::file::FileProvisioner;
use crate::provisioners::{ProvisionError, SharedExecutor, quote, run};

const TRUSTED_KEY_DIR: &str = "/etc/apt/trusted.gpg.d";
const SOURCES_DIR: &str = "/etc/apt/sources.list.d";

/// Third-party apt repository to register.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RepositoryArgs {
    /// Base name of the key and list files.
    pub name: String,
    /// ASCII armoured signing key.
    pub key: String,
    /// `sources.list` line(s) for the repository.
    pub specification: String,
    /// Refresh the package index when either file changed.
    pub update: bool,
}

/// Installs packages and repositories.
#[derive(Debug)]
pub struct AptProvisioner<'a> {
    executor: &'a mut CommandExecutor,
}

impl<'a> AptProvisioner<'a> {
    /// Borrows `executor` for package actions.
    #[must_use]
    pub const fn new(executor: &'a mut CommandExecutor) -> Self {
        Self { executor }
    }

    /// Refreshes the package index.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Exec`] when `apt update` fails.
    pub async fn update(&mut self, scope: &ExecScope) -> Result<(), ProvisionError> {
        let output = run(self.executor, scope, "apt update", "apt update").await?;
        debug!(bytes = output.len(), "package index refreshed");
        Ok(())
    }

    /// Returns the installed version of `package`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::PackageNotFound`] when dpkg does not list the
    /// package as installed.
    pub async fn package_version(
        &mut self,
        scope: &ExecScope,
        package: &str,
    ) -> Result<String, ProvisionError> {
        let command = format!("dpkg-query -W {}", quote(package));
        match self.executor.exec_string(scope, &command).await {
            Ok(output) => parse_dpkg_query(&output, package),
            Err(failure)
                if failure.command_error().is_some()
                    && failure.output_text().contains("no packages found") =>
            {
                Err(ProvisionError::PackageNotFound {
                    package: package.to_owned(),
                })
            }
            Err(failure) => Err(ProvisionError::Exec {
                action: String::from("dpkg-query"),
                source: failure,
            }),
        }
    }

    /// Installs `package` unless some version is already present.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Exec`] when refreshing the index or the
    /// installation fails.
    pub async fn ensure_package_installed(
        &mut self,
        scope: &ExecScope,
        package: &str,
    ) -> Result<bool, ProvisionError> {
        match self.package_version(scope, package).await {
            Ok(version) => {
                debug!(package, %version, "package already installed");
                return Ok(false);
            }
            Err(error) => debug!(package, %error, "package not installed"),
        }
        self.update(scope).await?;
        let command = format!("apt install -qy {}", quote(package));
        run(self.executor, scope, "apt install", &command).await?;
        info!(package, "package installed");
        Ok(true)
    }

    /// Writes the repository key and source list, refreshing the index when
    /// requested and anything changed.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when writing either file or refreshing the
    /// index fails.
    pub async fn ensure_repository(
        &mut self,
        scope: &ExecScope,
        args: &RepositoryArgs,
    ) -> Result<bool, ProvisionError> {
        let key_path = format!("{TRUSTED_KEY_DIR}/{}.asc", args.name);
        let list_path = format!("{SOURCES_DIR}/{}.list", args.name);
        let mut files = FileProvisioner::new(&mut *self.executor);
        let key_changed = files
            .ensure_file_contents_string(scope, &key_path, &args.key)
            .await?;
        let list_changed = files
            .ensure_file_contents_string(scope, &list_path, &args.specification)
            .await?;
        let changed = key_changed || list_changed;
        if args.update && changed {
            self.update(scope).await?;
        }
        Ok(changed)
    }
}

/// Pipeline operation ensuring `package` is installed.
#[must_use]
pub fn ensure_package_installed_op(
    executor: SharedExecutor,
    package: impl Into<String>,
) -> Operation<ProvisionError> {
    let package_name: String = package.into();
    operation(move |ctx| {
        let handle = Arc::clone(&executor);
        let name = package_name.clone();
        Box::pin(async move {
            let mut guard = handle.lock().await;
            let changed = AptProvisioner::new(&mut guard)
                .ensure_package_installed(ctx.scope(), &name)
                .await?;
            ctx.set_result(changed);
            Ok(())
        })
    })
}

/// Pipeline operation ensuring a repository is registered.
#[must_use]
pub fn ensure_repository_op(
    executor: SharedExecutor,
    args: RepositoryArgs,
) -> Operation<ProvisionError> {
    operation(move |ctx| {
        let handle = Arc::clone(&executor);
        let repository = args.clone();
        Box::pin(async move {
            let mut guard = handle.lock().await;
            let changed = AptProvisioner::new(&mut guard)
                .ensure_repository(ctx.scope(), &repository)
                .await?;
            ctx.set_result(changed);
            Ok(())
        })
    })
}

/// Extracts the version from `dpkg-query -W` output.
///
/// A listed but uninstalled package prints its name without a tab.
fn parse_dpkg_query(output: &str, package: &str) -> Result<String, ProvisionError> {
    let trimmed = output.trim_end_matches('\n');
    let mut lines = trimmed.lines();
    let (Some(line), None) = (lines.next(), lines.next()) else {
        return Err(ProvisionError::UnexpectedOutput {
            action: String::from("dpkg-query"),
            output: output.to_owned(),
        });
    };
    match line.split_once('\t') {
        Some((_, version)) if !version.is_empty() => Ok(version.to_owned()),
        _ => Err(ProvisionError::PackageNotFound {
            package: package.to_owned(),
        }),
    }
}
