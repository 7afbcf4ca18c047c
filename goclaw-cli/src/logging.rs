//! Tracing setup for the binary: daily-rolling file under `~/.goclaw/logs/`
//! plus a plain stderr echo, filtered by `RUST_LOG` (default `info`).

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::log_format::SpanIdFormat;

/// Initializes the global subscriber. Returns the file-appender guard (keep it
/// alive for the process lifetime) or `None` when the log directory is
/// unavailable, in which case only stderr logging is installed.
pub fn init() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match goclaw_config::tracing_init::file_writer("goclaw") {
        Ok((writer, guard)) => {
            let installed = tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .event_format(SpanIdFormat::new())
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init()
                .is_ok();
            installed.then_some(guard)
        }
        Err(e) => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init();
            tracing::warn!(error = %e, "log directory unavailable, logging to stderr only");
            None
        }
    }
}
