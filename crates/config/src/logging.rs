//! Tracing subscriber setup for host binaries.
//!
//! The engine crates only emit events; whoever embeds them calls
//! [`init_tracing`] once at startup.

use tracing_subscriber::EnvFilter;

use crate::LoggingConfig;

/// Install a global fmt subscriber. `RUST_LOG` wins over `config.level`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.is_ok()
}
