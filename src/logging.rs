//! Tracing subscriber setup for the `sarjo` binary.
//!
//! Logs go to stderr (stdout carries the studio transcript). When file
//! logging is enabled, a daily rolling file under the logs directory
//! receives the same records.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;
use crate::error::{Result, StudioError};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "sarjo=info,tungstenite=warn,reqwest=warn";

/// File name prefix for rolling log files.
const LOG_FILE_PREFIX: &str = "sarjo.log";

/// Install the global subscriber.
///
/// Returns the appender guard when file logging is on; keep it alive for the
/// lifetime of the process or buffered records are lost.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or a global
/// subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    if !config.file_logging {
        tracing_subscriber::registry()
            .with(filter())
            .with(stderr_layer)
            .try_init()
            .map_err(|e| StudioError::Config(format!("tracing init failed: {e}")))?;
        return Ok(None);
    }

    let dir = config
        .directory
        .clone()
        .unwrap_or_else(crate::studio_dirs::logs_dir);
    std::fs::create_dir_all(&dir)?;

    let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter())
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| StudioError::Config(format!("tracing init failed: {e}")))?;

    tracing::info!(dir = %dir.display(), "file logging enabled");
    Ok(Some(guard))
}
