//! Shared tracing file-appender setup for the CLI binary (feature `tracing-init`).
//!
//! Resolves the daily-rolling log file under `~/.<app>/logs/` and hands back a
//! non-blocking writer plus its flush guard. Callers compose their own layers
//! (custom formatter, stderr echo) on top; [`init`] is the one-call variant for
//! binaries that just want file + stderr logging with an `RUST_LOG` filter.

use std::path::PathBuf;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// `~/.<app>/logs`, creating it if missing.
pub fn log_dir(app_name: &str) -> std::io::Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no home directory"))?;
    let dir = home.join(format!(".{app_name}")).join("logs");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// A daily-rolling non-blocking writer at `~/.<app>/logs/<app>.YYYY-MM-DD.log`.
/// Keep the returned guard alive for the process lifetime or buffered lines
/// are lost on exit.
pub fn file_writer(app_name: &str) -> std::io::Result<(NonBlocking, WorkerGuard)> {
    let dir = log_dir(app_name)?;
    let appender = RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix(app_name)
        .filename_suffix("log")
        .build(dir)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Installs a global subscriber writing to both the daily log file and stderr,
/// filtered by `RUST_LOG` (default `info`). Returns the file guard.
pub fn init(app_name: &str) -> std::io::Result<WorkerGuard> {
    let (writer, guard) = file_writer(app_name)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_writer_creates_the_log_directory() {
        let home = tempfile::tempdir().unwrap();
        let prev = std::env::var("HOME").ok();
        std::env::set_var("HOME", home.path());

        let result = file_writer("goclaw-test");
        match prev {
            Some(v) => std::env::set_var("HOME", v),
            None => std::env::remove_var("HOME"),
        }

        let (_writer, _guard) = result.unwrap();
        assert!(home.path().join(".goclaw-test/logs").is_dir());
    }
}
