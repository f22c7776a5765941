use tracing_subscriber::EnvFilter;

use crate::args::LogLevel;

/// Environment variable that overrides `--log-level` with a full filter
pub const LOG_ENV: &str = "TRACESTITCH_LOG";

/// Install the stderr subscriber; stdout stays reserved for command output.
pub fn init(level: LogLevel) {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    // a second init (tests calling `run` twice) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
