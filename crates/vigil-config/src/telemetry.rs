use tracing_subscriber::EnvFilter;
use vigil_core::VigilError;

use crate::schema::LoggingConfig;

/// Install a global `tracing` subscriber for the host process.
///
/// `RUST_LOG` wins over the configured level. Fails if a subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> vigil_core::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let installed = match config.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_target(true)
            .try_init(),
        "compact" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .with_target(false)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init(),
    };

    installed.map_err(|e| VigilError::Config(format!("failed to install tracing subscriber: {e}")))
}
