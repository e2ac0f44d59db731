//! Configuration loading via `ortho-config`.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Provider settings layered from defaults, `ctr2cloud.toml`, environment
/// variables, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "CTR2CLOUD",
    discovery(
        app_name = "ctr2cloud",
        env_var = "CTR2CLOUD_CONFIG_PATH",
        config_file_name = "ctr2cloud.toml",
        dotfile_name = ".ctr2cloud.toml",
        project_file_name = "ctr2cloud.toml"
    )
)]
pub struct ProviderConfig {
    /// Path or name of the LXD client binary.
    #[ortho_config(default = "lxc".to_owned())]
    pub lxc_bin: String,
    /// Image launched when `create` is not given one.
    #[ortho_config(default = "ubuntu:22.04".to_owned())]
    pub default_image: String,
    /// Upper bound for a single remote command, in seconds.
    #[ortho_config(default = 600)]
    pub command_timeout_secs: u64,
    /// Upper bound for a fresh shell to print its first prompt, in
    /// milliseconds.
    #[ortho_config(default = 2000)]
    pub handshake_timeout_ms: u64,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn guidance(&self) -> String {
        format!(
            "set {} or add {} to ctr2cloud.toml",
            self.env_var, self.toml_key
        )
    }
}

impl ProviderConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: {}",
                metadata.description,
                metadata.guidance()
            )));
        }
        Ok(())
    }

    fn require_positive(value: u64, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "{} must be greater than zero: {}",
                metadata.description,
                metadata.guidance()
            )));
        }
        Ok(())
    }

    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("ctr2cloud")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Rejects blank names and zero timeouts. Error messages say which
    /// environment variable or file key supplies the value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for blank strings and
    /// [`ConfigError::InvalidValue`] for zero timeouts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.lxc_bin,
            &FieldMetadata::new("LXD client binary", "CTR2CLOUD_LXC_BIN", "lxc_bin"),
        )?;
        Self::require_field(
            &self.default_image,
            &FieldMetadata::new("default image", "CTR2CLOUD_DEFAULT_IMAGE", "default_image"),
        )?;
        Self::require_positive(
            self.command_timeout_secs,
            &FieldMetadata::new(
                "command timeout",
                "CTR2CLOUD_COMMAND_TIMEOUT_SECS",
                "command_timeout_secs",
            ),
        )?;
        Self::require_positive(
            self.handshake_timeout_ms,
            &FieldMetadata::new(
                "handshake timeout",
                "CTR2CLOUD_HANDSHAKE_TIMEOUT_MS",
                "handshake_timeout_ms",
            ),
        )
    }

    /// Returns the per-command timeout.
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Returns the shell handshake timeout.
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds a value outside its accepted range.
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
