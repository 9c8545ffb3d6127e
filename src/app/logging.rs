use tracing_subscriber::EnvFilter;

use crate::app::config::LoggingSettings;

fn build_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(settings.log_level.trim().to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. `RUST_LOG` overrides the configured level; later calls are
/// no-ops.
pub fn init_logging(settings: &LoggingSettings) {
    let env_filter = build_filter(settings);

    if cfg!(debug_assertions) && !settings.json {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }
}
