//! Remote file contents, transferred as base64 and verified by SHA-256.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::compute::{CommandExecutor, ExecFailure, ExecScope};
use crate::pipeline::{Operation, operation};
use crate::provisioners::{ProvisionError, SharedExecutor, quote};

/// Reads and writes files on the instance.
#[derive(Debug)]
pub struct FileProvisioner<'a> {
    executor: &'a mut CommandExecutor,
}

impl<'a> FileProvisioner<'a> {
    /// Borrows `executor` for file actions.
    #[must_use]
    pub const fn new(executor: &'a mut CommandExecutor) -> Self {
        Self { executor }
    }

    /// Returns the hex SHA-256 digest of the file at `path`.
    ///
    /// # Errors
    ///
    /// [`ProvisionError::FileNotFound`] or [`ProvisionError::PermissionDenied`]
    /// when `sha256sum` says so; other failures as [`ProvisionError::Exec`].
    pub async fn checksum(&mut self, scope: &ExecScope, path: &str) -> Result<String, ProvisionError> {
        let command = format!("sha256sum {}", quote(path));
        match self.executor.exec_string(scope, &command).await {
            Ok(output) => parse_checksum(&output, path),
            Err(failure) => Err(classify(failure, path, "checksum")),
        }
    }

    /// Makes the file at `path` hold exactly `contents`.
    ///
    /// Returns `false` without writing when the digests already match.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when the write fails or the written file
    /// does not hash to the expected digest.
    pub async fn ensure_file_contents(
        &mut self,
        scope: &ExecScope,
        path: &str,
        contents: &[u8],
    ) -> Result<bool, ProvisionError> {
        let expected = digest(contents);
        match self.checksum(scope, path).await {
            Ok(current) if current == expected => {
                debug!(path, "file already has the expected contents");
                return Ok(false);
            }
            Ok(current) => debug!(path, %current, %expected, "file contents differ"),
            Err(error) => debug!(path, %error, "file checksum unavailable"),
        }

        let command = format!(
            "echo {} | base64 -d > {}",
            STANDARD.encode(contents),
            quote(path)
        );
        self.executor
            .exec(scope, &command)
            .await
            .map_err(ProvisionError::exec(format!("write {path}")))?;

        let written = self.checksum(scope, path).await?;
        if written != expected {
            return Err(ProvisionError::ChecksumMismatch {
                path: path.to_owned(),
                expected,
                actual: written,
            });
        }
        info!(path, "file contents updated");
        Ok(true)
    }

    /// Text variant of [`FileProvisioner::ensure_file_contents`].
    ///
    /// # Errors
    ///
    /// See [`FileProvisioner::ensure_file_contents`].
    pub async fn ensure_file_contents_string(
        &mut self,
        scope: &ExecScope,
        path: &str,
        contents: &str,
    ) -> Result<bool, ProvisionError> {
        self.ensure_file_contents(scope, path, contents.as_bytes())
            .await
    }

    /// Reads the file at `path`, verifying the transfer against its digest.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when the file cannot be read, decoded, or
    /// the decoded bytes do not match the remote digest.
    pub async fn file_contents(
        &mut self,
        scope: &ExecScope,
        path: &str,
    ) -> Result<Vec<u8>, ProvisionError> {
        let expected = self.checksum(scope, path).await?;
        let command = format!("cat {} | base64 -w 0", quote(path));
        let encoded = self
            .executor
            .exec_string(scope, &command)
            .await
            .map_err(|failure| classify(failure, path, "read"))?;
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|err| ProvisionError::Decode {
                path: path.to_owned(),
                message: err.to_string(),
            })?;
        let actual = digest(&decoded);
        if actual != expected {
            return Err(ProvisionError::ChecksumMismatch {
                path: path.to_owned(),
                expected,
                actual,
            });
        }
        Ok(decoded)
    }
}

/// Pipeline operation ensuring the file at `path` holds `contents`.
#[must_use]
pub fn ensure_file_contents_op(
    executor: SharedExecutor,
    path: impl Into<String>,
    contents: impl Into<Vec<u8>>,
) -> Operation<ProvisionError> {
    let target: String = path.into();
    let wanted: Vec<u8> = contents.into();
    operation(move |ctx| {
        let handle = Arc::clone(&executor);
        let file_path = target.clone();
        let bytes = wanted.clone();
        Box::pin(async move {
            let mut guard = handle.lock().await;
            let changed = FileProvisioner::new(&mut guard)
                .ensure_file_contents(ctx.scope(), &file_path, &bytes)
                .await?;
            ctx.set_result(changed);
            Ok(())
        })
    })
}

fn digest(contents: &[u8]) -> String {
    format!("{:x}", Sha256::digest(contents))
}

fn parse_checksum(output: &str, path: &str) -> Result<String, ProvisionError> {
    let unexpected = || ProvisionError::UnexpectedOutput {
        action: format!("checksum {path}"),
        output: output.to_owned(),
    };
    let mut lines = output.lines();
    let (Some(line), None) = (lines.next(), lines.next()) else {
        return Err(unexpected());
    };
    line.split_whitespace()
        .next()
        .map(str::to_owned)
        .ok_or_else(unexpected)
}

fn classify(failure: ExecFailure, path: &str, action: &str) -> ProvisionError {
    if failure.command_error().is_some() {
        let text = failure.output_text();
        if text.contains("No such file or directory") {
            return ProvisionError::FileNotFound {
                path: path.to_owned(),
            };
        }
        if text.contains("Permission denied") {
            return ProvisionError::PermissionDenied {
                path: path.to_owned(),
            };
        }
    }
    ProvisionError::Exec {
        action: format!("{action} {path}"),
        source: failure,
    }
}
