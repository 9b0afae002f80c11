//! Process-wide tracing subscriber.

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber on stdout at the configured level.
///
/// `RUST_LOG`, when set, takes precedence over `logging.level`. Calling this
/// more than once is harmless; only the first subscriber is kept.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(config.src)
        .with_line_number(config.src)
        .try_init();
}
