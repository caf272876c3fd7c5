use tailor_core::config::{AppConfig, LoadOptions, LogFormat};
use tracing::Level;

/// Installs the global subscriber. Events go to stderr so stdout stays one JSON payload.
///
/// A config that fails to load still gets the default subscriber; the command itself
/// reports the config error.
pub fn init() {
    let config = AppConfig::load(LoadOptions::default()).unwrap_or_default();
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    // Ignored when a subscriber is already installed.
    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
