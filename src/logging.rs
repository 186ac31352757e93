use std::path::PathBuf;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{EnvFilter, filter_fn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};

use crate::config::LoggingConfig;
use crate::error::Result;

/// Events with this target go to the request log only.
pub const REQUEST_LOG_TARGET: &str = "hook_request";

const MESSAGE_LOG_PREFIX: &str = "relay.log";
const REQUEST_LOG_PREFIX: &str = "hook-request.log";

pub struct FileLogger {
    log_directory: PathBuf,
    rotation: Rotation,
}

impl FileLogger {
    pub fn new(log_directory: PathBuf) -> Self {
        Self {
            log_directory,
            rotation: Rotation::DAILY,
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Non-blocking writer for a rolling file named after `prefix`. Keep the
    /// guard alive or buffered lines are lost.
    pub fn setup_file_logging(&self, prefix: &str) -> Result<(NonBlocking, WorkerGuard)> {
        std::fs::create_dir_all(&self.log_directory)?;

        let file_appender =
            RollingFileAppender::new(self.rotation.clone(), &self.log_directory, prefix);

        Ok(tracing_appender::non_blocking(file_appender))
    }
}

/// `RUST_LOG` wins; otherwise info, or debug when verbose.
pub fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }))
}

/// Install the global subscriber: console output plus, when a log
/// directory is configured, a message log and a separate request log.
pub fn setup_logging(config: &LoggingConfig) -> Result<Vec<WorkerGuard>> {
    let mut guards = Vec::new();

    let (message_layer, request_layer) = match &config.log_dir {
        Some(dir) => {
            let file_logger = FileLogger::new(dir.clone());

            let (message_writer, guard) = file_logger.setup_file_logging(MESSAGE_LOG_PREFIX)?;
            guards.push(guard);
            let (request_writer, guard) = file_logger.setup_file_logging(REQUEST_LOG_PREFIX)?;
            guards.push(guard);

            let message_layer = fmt::layer()
                .with_writer(message_writer)
                .with_ansi(false)
                .with_filter(filter_fn(|metadata| {
                    metadata.target() != REQUEST_LOG_TARGET
                }));
            let request_layer = fmt::layer()
                .with_writer(request_writer)
                .with_ansi(false)
                .with_target(false)
                .with_filter(filter_fn(|metadata| {
                    metadata.target() == REQUEST_LOG_TARGET
                }));
            (Some(message_layer), Some(request_layer))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(default_filter(config.verbose))
        .with(fmt::layer())
        .with(message_layer)
        .with(request_layer)
        .init();

    Ok(guards)
}
