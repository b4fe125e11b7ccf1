use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use time::format_description::well_known::Rfc3339;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, fmt, fmt::time::OffsetTime, layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Per-user directory for rotated log files.
pub fn default_log_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("apkbridge").join("logs"))
}

/// Filter for stderr output: `debug` with `-v`, otherwise `RUST_LOG` or `warn`.
pub fn stderr_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    let directives = match (verbose, rust_log) {
        (true, _) => "debug",
        (false, Some(env)) if !env.trim().is_empty() => env,
        _ => "warn",
    };
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Installs the global subscriber: compact events on stderr and, when `log_dir` is given,
/// daily-rotated debug logs in that directory.
///
/// The returned guard flushes the file writer when dropped.
pub fn setup_logging(verbose: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let timer = OffsetTime::local_rfc_3339()
        .unwrap_or_else(|_| OffsetTime::new(time::UtcOffset::UTC, Rfc3339));

    let stderr_layer = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_timer(timer.clone())
        .with_filter(stderr_filter(verbose, rust_log.as_deref()));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            fs_err::create_dir_all(dir).context("Failed to create logs directory")?;
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(10)
                .filename_prefix("apkbridge")
                .filename_suffix("log")
                .build(dir)
                .context("Failed to initialize file appender")?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_ansi(false) // Disable ANSI colors
                .with_timer(timer)
                .with_writer(non_blocking)
                .with_filter(LevelFilter::DEBUG);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to set global subscriber")?;
    Ok(guard)
}
