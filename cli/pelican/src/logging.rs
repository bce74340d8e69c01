//! Logging initialization.

use anyhow::Context;
use pl_types::config::LogConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global subscriber from the logging configuration.
///
/// Console output goes to stderr so stdout stays clean. When file logging
/// is enabled the returned guard must be held for the process lifetime;
/// dropping it stops the background writer and loses buffered lines.
pub fn init(config: &LogConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(config.level.to_lowercase())
        .with_context(|| format!("invalid log level '{}'", config.level))?;

    let console_layer = config
        .console_logging
        .then(|| fmt::layer().with_writer(std::io::stderr));

    let (file_layer, guard) = if config.file_logging {
        std::fs::create_dir_all(&config.directory)
            .with_context(|| format!("failed to create log directory '{}'", config.directory))?;
        let appender = tracing_appender::rolling::daily(&config.directory, &config.filename);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer().with_ansi(false).with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}
