//! `tracing` initialization driven by [`Config`](crate::config::Config):
//! `LOG_LEVEL` feeds an `EnvFilter` directive, `LOG_FORMAT` picks between a
//! human-readable text formatter and structured JSON for log aggregators.

use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Installs the global default subscriber. Call once, at process start.
pub fn init(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::fmt().with_env_filter(filter);

    match config.log_format.as_str() {
        "json" => registry.json().with_target(true).init(),
        _ => registry.with_target(false).init(),
    }
}
