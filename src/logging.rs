use anyhow::Result;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Initialize the logging system
/// Logs are written to the configured directory only (no console output)
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.dir)?;

    // File appender - daily rotation
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &config.dir, &config.file_name);

    // RUST_LOG wins over the configured level
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        LogFormat::Text => {
            let file_layer = fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true);
            registry.with(file_layer).try_init()?;
        }
        LogFormat::Json => {
            let file_layer = fmt::layer()
                .json()
                .with_writer(file_appender)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true);
            registry.with(file_layer).try_init()?;
        }
    }

    tracing::info!("Logging system initialized");
    tracing::info!(
        "Log files location: {}",
        config.dir.join(&config.file_name).display()
    );

    Ok(())
}

/// Check if the configured log directory exists
pub fn logs_dir_exists(config: &LoggingConfig) -> bool {
    config.dir.exists()
}
