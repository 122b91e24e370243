//! Logging setup.
//!
//! One session log file (truncated at start-up) plus console output on
//! stderr, so command output on stdout stays clean. The filter defaults to
//! `info` and honours `RUST_LOG`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Keeps the background log writer alive; dropping it flushes the file.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
    path: PathBuf,
}

impl LoggingGuard {
    /// The session log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Create `dir` if needed and empty `dir/file`, returning its path.
pub fn prepare_log_file(dir: &Path, file: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(file);
    fs::write(&path, "")?;
    Ok(path)
}

/// Install the global subscriber. Fails if the log file cannot be created
/// or a subscriber is already installed.
pub fn init_logging(dir: &Path, file: &str) -> io::Result<LoggingGuard> {
    let path = prepare_log_file(dir, file)?;

    let appender = tracing_appender::rolling::never(dir, file);
    let (writer, file_guard) = tracing_appender::non_blocking(appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .compact();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(io::Error::other)?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
        path,
    })
}
