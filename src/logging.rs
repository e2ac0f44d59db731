//! Diagnostic logging for the command-line tool.

use tracing_subscriber::EnvFilter;

/// Environment variable holding an `EnvFilter` directive such as
/// `ctr2cloud=trace`.
pub const LOG_ENV: &str = "CTR2CLOUD_LOG";

/// Installs a stderr subscriber filtered by [`LOG_ENV`].
///
/// Without the variable, only warnings are shown, or debug output when
/// `verbose` is set. Calling this twice keeps the first subscriber.
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}
