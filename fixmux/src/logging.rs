/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Tracing setup for the binary.
//!
//! Two layers are installed:
//!
//! - stdout, filtered by `RUST_LOG` (INFO and above by default)
//! - a human-readable diagnostic file rolled daily under
//!   `{log_dir}/human_readable_logs/`, named `{YYYY-MM-DD}.fix.log`. It holds
//!   session lifecycle lines and a ` | `-joined rendering of every message
//!   sent or received.
//!
//! The durable message log is separate and does not depend on this one.

use std::path::Path;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Directory, under the log directory, of the diagnostic file.
pub const HUMAN_LOG_DIR: &str = "human_readable_logs";

/// File name suffix of the diagnostic file.
pub const HUMAN_LOG_SUFFIX: &str = "fix.log";

/// Filter of the diagnostic file: lifecycle at INFO, message renderings at
/// DEBUG from the pipeline.
const HUMAN_LOG_FILTER: &str = "info,fixmux_engine::pipeline=debug";

/// Errors raised while installing the tracing layers.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The diagnostic file could not be created.
    #[error("cannot create diagnostic log: {0}")]
    Appender(#[from] InitError),

    /// A global subscriber is already installed.
    #[error("cannot install tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

/// Creates the daily diagnostic file appender under `dir`.
///
/// # Errors
/// Returns `InitError` if the directory or file cannot be created.
pub fn human_log_appender(dir: &Path) -> Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_suffix(HUMAN_LOG_SUFFIX)
        .build(dir)
}

/// Installs the stdout and diagnostic file layers.
///
/// The returned guard flushes the file writer when dropped; keep it alive for
/// the life of the process.
///
/// # Errors
/// - `LoggingError::Appender` if the diagnostic file cannot be created
/// - `LoggingError::Subscriber` if a subscriber is already installed
pub fn init(log_dir: &Path) -> Result<WorkerGuard, LoggingError> {
    let appender = human_log_appender(&log_dir.join(HUMAN_LOG_DIR))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let stdout = fmt::layer().with_filter(
        EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
    );
    let file = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(writer)
        .with_filter(EnvFilter::new(HUMAN_LOG_FILTER));

    tracing_subscriber::registry()
        .with(stdout)
        .with(file)
        .try_init()?;
    Ok(guard)
}
