//! Tests for layered provider configuration.

#[path = "common/test_constants.rs"]
mod test_constants;

use std::fs;

use ctr2cloud::{ProviderConfig, config::ConfigError, test_support::EnvGuard};
use rstest::{fixture, rstest};
use tempfile::TempDir;

use test_constants::{DEFAULT_IMAGE, DEFAULT_LXC_BIN};

#[fixture]
fn valid_config() -> ProviderConfig {
    ProviderConfig {
        lxc_bin: String::from(DEFAULT_LXC_BIN),
        default_image: String::from(DEFAULT_IMAGE),
        command_timeout_secs: 600,
        handshake_timeout_ms: 2000,
    }
}

#[rstest]
#[case::binary(|cfg: &mut ProviderConfig| cfg.lxc_bin.clear(), "CTR2CLOUD_LXC_BIN", "lxc_bin")]
#[case::image(|cfg: &mut ProviderConfig| cfg.default_image.clear(), "CTR2CLOUD_DEFAULT_IMAGE", "default_image")]
#[case::command_timeout(|cfg: &mut ProviderConfig| cfg.command_timeout_secs = 0, "CTR2CLOUD_COMMAND_TIMEOUT_SECS", "command_timeout_secs")]
#[case::handshake_timeout(|cfg: &mut ProviderConfig| cfg.handshake_timeout_ms = 0, "CTR2CLOUD_HANDSHAKE_TIMEOUT_MS", "handshake_timeout_ms")]
fn validation_errors_are_actionable(
    mut valid_config: ProviderConfig,
    #[case] mutate: fn(&mut ProviderConfig),
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    mutate(&mut valid_config);
    let message = valid_config
        .validate()
        .expect_err("validation should fail")
        .to_string();
    assert!(
        message.contains(env_var),
        "error should mention env var {env_var}: {message}"
    );
    assert!(
        message.contains("ctr2cloud.toml"),
        "error should mention config file: {message}"
    );
    assert!(
        message.contains(toml_key),
        "error should mention TOML key {toml_key}: {message}"
    );
}

#[rstest]
fn blank_strings_are_missing_fields(mut valid_config: ProviderConfig) {
    valid_config.default_image = String::from("  ");
    assert!(matches!(
        valid_config.validate(),
        Err(ConfigError::MissingField(_))
    ));
}

#[tokio::test]
async fn environment_overrides_defaults() {
    let _guard = EnvGuard::set_vars(&[
        ("CTR2CLOUD_LXC_BIN", "/snap/bin/lxc"),
        ("CTR2CLOUD_HANDSHAKE_TIMEOUT_MS", "5000"),
    ])
    .await;

    let config = ProviderConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("config should load: {err}"));

    assert_eq!(config.lxc_bin, "/snap/bin/lxc");
    assert_eq!(config.handshake_timeout_ms, 5000);
    assert_eq!(config.default_image, DEFAULT_IMAGE);
    assert_eq!(config.command_timeout_secs, 600);
}

#[tokio::test]
async fn explicit_config_file_is_loaded() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let path = tmp.path().join("ctr2cloud.toml");
    fs::write(&path, "default_image = \"debian:12\"\ncommand_timeout_secs = 30\n")
        .unwrap_or_else(|err| panic!("write config: {err}"));
    let path_text = path.to_string_lossy().into_owned();
    let _guard = EnvGuard::set_vars(&[("CTR2CLOUD_CONFIG_PATH", path_text.as_str())]).await;

    let config = ProviderConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("config should load: {err}"));

    assert_eq!(config.default_image, "debian:12");
    assert_eq!(config.command_timeout_secs, 30);
    assert_eq!(config.lxc_bin, DEFAULT_LXC_BIN);
}
