use std::fs;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;
use crate::error::{LabError, Result};

/// Keeps the file writer flushing until dropped; hold it for the lifetime of `main`
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize the global tracing subscriber
///
/// Console output is always enabled. When `logging.file` is set, events are also
/// appended to that file through a non-blocking writer.
pub fn init_tracing(logging: &LoggingConfig) -> Result<LogGuard> {
    // RUST_LOG overrides the configured level
    let env_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    let console = tracing_subscriber::fmt::layer()
        .with_target(logging.show_target)
        .with_filter(env_filter());

    let (file_layer, guard) = match &logging.file {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)?;
            }
            let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(logging.show_target)
                .with_writer(writer)
                .with_filter(env_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = Registry::default().with(console).with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LabError::Config(format!("Failed to set global tracing subscriber: {e}")))?;

    Ok(LogGuard { _file: guard })
}
