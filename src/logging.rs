//! Console + per-run file logging.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// File name for a run started now, e.g. `mail_agent_20250101_093000.log`.
pub fn log_file_name() -> String {
    format!("mail_agent_{}.log", Local::now().format("%Y%m%d_%H%M%S"))
}

/// Install the global subscriber.
///
/// Events go to stderr and to a fresh file under `log_dir` (created if
/// missing). Keep the returned guard alive until exit or buffered file
/// output is lost.
pub fn init(log_dir: &Path) -> io::Result<(WorkerGuard, PathBuf)> {
    std::fs::create_dir_all(log_dir)?;
    let file_name = log_file_name();
    let path = log_dir.join(&file_name);

    let appender = tracing_appender::rolling::never(log_dir, &file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(io::stderr);
    let file = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(console)
        .with(file)
        .try_init()
        .map_err(io::Error::other)?;

    Ok((guard, path))
}
