//! Filesystem watch provider.
//!
//! Prefers the platform's native event mechanism and falls back to polling
//! when it cannot start; network filesystems and some containers have no
//! working native watch. An environment flag forces polling outright. Both
//! backends deliver the same `notify` events through one handler.

use std::path::Path;
use std::time::Duration;

use notify::{Config, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::warn;

use crate::error::{GraphError, Result};

/// Set to anything but `0`/`false`/`no` to skip the native watcher.
pub const FORCE_POLLING_ENV: &str = "PROJECT_GRAPH_FORCE_POLLING";

const POLL_INTERVAL: Duration = Duration::from_secs(2);

enum WatchBackend {
    Native(#[allow(dead_code)] RecommendedWatcher),
    Polling(#[allow(dead_code)] PollWatcher),
}

/// A running recursive watch. Dropping it stops event delivery.
pub struct WatchProvider {
    backend: WatchBackend,
}

impl WatchProvider {
    /// Starts watching `root` recursively. Native first, then polling;
    /// when both fail the error names the last underlying failure.
    pub fn start<F>(root: &Path, handler: F) -> Result<Self>
    where
        F: Fn(notify::Result<notify::Event>) + Send + Clone + 'static,
    {
        if force_polling() {
            return Self::polling(root, handler)
                .map_err(|err| GraphError::Watcher(format!("polling watcher: {}", err)));
        }

        match Self::native(root, handler.clone()) {
            Ok(provider) => Ok(provider),
            Err(native_err) => {
                warn!(
                    "native watcher unavailable ({}), falling back to polling",
                    native_err
                );
                Self::polling(root, handler).map_err(|poll_err| {
                    GraphError::Watcher(format!(
                        "native watcher: {}; polling watcher: {}",
                        native_err, poll_err
                    ))
                })
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self.backend {
            WatchBackend::Native(_) => "native",
            WatchBackend::Polling(_) => "polling",
        }
    }

    fn native<F>(root: &Path, handler: F) -> notify::Result<Self>
    where
        F: Fn(notify::Result<notify::Event>) + Send + 'static,
    {
        let mut watcher = RecommendedWatcher::new(handler, Config::default())?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        Ok(Self {
            backend: WatchBackend::Native(watcher),
        })
    }

    fn polling<F>(root: &Path, handler: F) -> notify::Result<Self>
    where
        F: Fn(notify::Result<notify::Event>) + Send + 'static,
    {
        let config = Config::default().with_poll_interval(POLL_INTERVAL);
        let mut watcher = PollWatcher::new(handler, config)?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        Ok(Self {
            backend: WatchBackend::Polling(watcher),
        })
    }
}

fn force_polling() -> bool {
    match std::env::var(FORCE_POLLING_ENV) {
        Ok(value) => !matches!(value.to_lowercase().as_str(), "" | "0" | "false" | "no"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use tempfile::TempDir;

    #[test]
    fn test_start_on_real_directory() {
        let temp_dir = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::channel::<()>();
        let provider = WatchProvider::start(temp_dir.path(), move |_event| {
            let _ = tx.send(());
        })
        .unwrap();
        assert!(matches!(provider.kind(), "native" | "polling"));
    }

    #[test]
    fn test_missing_root_fails_with_watcher_error() {
        let result = WatchProvider::start(Path::new("/no/such/watch/root"), |_event| {});
        assert!(matches!(result, Err(GraphError::Watcher(_))));
    }
}
