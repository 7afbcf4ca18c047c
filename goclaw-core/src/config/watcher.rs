//! Config file watcher: watches the config file's
//! directory, debounces write/create events for the specific path, and
//! triggers `ConfigRuntime::reload`.
//!
//! Mirrors `memory::watcher::spawn_workspace_watcher`'s shutdown idiom.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::history::TriggerSource;
use super::ConfigRuntime;

pub const DEBOUNCE: Duration = Duration::from_millis(500);

/// Spawns the watcher task; returns its join handle. Callers hold `cancel`
/// to stop it cooperatively.
pub fn spawn_config_watcher(
    runtime: Arc<ConfigRuntime>,
    config_path: PathBuf,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let Some(watch_dir) = config_path.parent().map(|p| p.to_path_buf()) else {
            warn!(path = %config_path.display(), "config path has no parent directory, watcher disabled");
            return;
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let target = config_path.clone();
        let _watcher_guard = tokio::task::spawn_blocking(move || -> Option<RecommendedWatcher> {
            let mut watcher = match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                let Ok(event) = res else { return };
                let is_relevant = matches!(
                    event.kind,
                    notify::EventKind::Create(_) | notify::EventKind::Modify(_)
                ) && event.paths.iter().any(|p| p == &target);
                if is_relevant {
                    let _ = tx.send(());
                }
            }) {
                Ok(w) => w,
                Err(e) => {
                    warn!(error = %e, "failed to start config watcher");
                    return None;
                }
            };
            if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
                warn!(error = %e, path = %watch_dir.display(), "failed to watch config directory");
                return None;
            }
            Some(watcher)
        });

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                maybe = rx.recv() => {
                    if maybe.is_none() {
                        return;
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(DEBOUNCE) => {}
                    }
                    while rx.try_recv().is_ok() {}
                    if let Err(e) = runtime.reload(TriggerSource::Auto).await {
                        warn!(error = %e, "config reload failed");
                    }
                }
            }
        }
    })
}
