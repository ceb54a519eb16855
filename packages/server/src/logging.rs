use std::str::FromStr;

use tracing::Level;

use crate::config::LogConfig;

/// Install the global fmt subscriber. Unknown levels fall back to `info`.
/// Later calls are no-ops, so tests may call it freely.
pub fn init_tracing(config: &LogConfig) {
    let level = Level::from_str(&config.level).unwrap_or(Level::INFO);

    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .try_init();
}
