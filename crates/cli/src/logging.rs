//! Logging setup for the vidarchive binary
//!
//! Always logs to stderr. When a log directory is configured, each run also
//! writes a plain-text log named after its start time, e.g.
//! `20240305_14.07_log.log`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// strftime pattern for per-run log files
const LOG_FILE_PATTERN: &str = "%Y%m%d_%H.%M_log.log";

/// File name of the log for a run starting now.
pub fn run_log_file_name() -> String {
    chrono::Local::now().format(LOG_FILE_PATTERN).to_string()
}

/// Install the global subscriber.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. The returned guard
/// must be held until exit so buffered file output is flushed.
pub fn init_logging(log_dir: Option<&Path>) -> Result<(Option<WorkerGuard>, Option<PathBuf>)> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let (file_layer, guard, log_path) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

            let file_name = run_log_file_name();
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::NEVER)
                .filename_prefix(&file_name)
                .build(dir)
                .with_context(|| format!("Failed to open log file in {}", dir.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard), Some(dir.join(file_name)))
        }
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok((guard, log_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_log_file_name_shape() {
        let name = run_log_file_name();
        // YYYYmmdd_HH.MM_log.log
        assert_eq!(name.len(), "20240305_14.07_log.log".len());
        assert!(name.ends_with("_log.log"));
        assert!(name[..8].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(&name[8..9], "_");
        assert_eq!(&name[11..12], ".");
    }
}
