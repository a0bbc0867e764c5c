//! Event filtering, coalescing and debounce batching.
//!
//! Raw watch events are filtered against a deny-list and a watchable
//! extension set, then coalesced per path (latest event wins) on a
//! dedicated batcher thread. The debounce window restarts on every
//! accepted event; when a quiet period elapses the whole pending batch is
//! handed to the processor on a short-lived worker thread, so a slow
//! re-analysis never blocks the clock. The channel serializes the watcher
//! callback against the batcher, so no half-cleared map is ever observable.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use notify::event::{EventKind, ModifyKind, RenameMode};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

/// Names never watched, wherever they appear in a path.
pub const WATCH_IGNORED_NAMES: &[&str] = &[
    ".git",
    ".DS_Store",
    "__pycache__",
    "node_modules",
    ".next",
    ".nuxt",
    "dist",
    "build",
    ".vscode",
];

/// Temp-file suffixes never watched.
pub const WATCH_IGNORED_SUFFIXES: &[&str] = &[".log", ".tmp", ".temp", ".cache"];

/// Broader than the analyzable set: config and doc formats still matter to
/// the project context even though they carry no entities.
pub const WATCHABLE_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "tsx", "jsx", "vue", "java", "cpp", "c", "h", "hpp", "cs", "go", "rs",
    "php", "rb", "swift", "kt", "scala", "md", "json", "yaml", "yml", "xml", "css", "scss",
    "less", "html", "htm",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone)]
pub struct FsChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Whether a path is worth watching at all.
pub fn accepts(path: &Path) -> bool {
    for component in path.components() {
        if let Some(name) = component.as_os_str().to_str() {
            if WATCH_IGNORED_NAMES.contains(&name) {
                return false;
            }
        }
    }

    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if WATCH_IGNORED_SUFFIXES
        .iter()
        .any(|suffix| file_name.ends_with(suffix))
    {
        return false;
    }

    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| WATCHABLE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Maps one raw watch event onto accepted changes. A move is a delete of
/// the source plus a create of the destination.
pub fn classify(event: &notify::Event) -> Vec<FsChange> {
    let mut changes = Vec::new();
    let mut push = |path: &PathBuf, kind: ChangeKind| {
        if accepts(path) {
            changes.push(FsChange {
                path: path.clone(),
                kind,
            });
        }
    };

    match &event.kind {
        EventKind::Create(_) => {
            for path in &event.paths {
                push(path, ChangeKind::Created);
            }
        }
        EventKind::Remove(_) => {
            for path in &event.paths {
                push(path, ChangeKind::Deleted);
            }
        }
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::Both if event.paths.len() >= 2 => {
                push(&event.paths[0], ChangeKind::Deleted);
                push(&event.paths[1], ChangeKind::Created);
            }
            RenameMode::From => {
                for path in &event.paths {
                    push(path, ChangeKind::Deleted);
                }
            }
            RenameMode::To => {
                for path in &event.paths {
                    push(path, ChangeKind::Created);
                }
            }
            // Ambiguous rename: decide per path by what is still on disk.
            _ => {
                for path in &event.paths {
                    if path.exists() {
                        push(path, ChangeKind::Created);
                    } else {
                        push(path, ChangeKind::Deleted);
                    }
                }
            }
        },
        EventKind::Modify(_) => {
            for path in &event.paths {
                push(path, ChangeKind::Modified);
            }
        }
        EventKind::Access(_) => {}
        _ => {
            for path in &event.paths {
                if path.exists() {
                    push(path, ChangeKind::Modified);
                } else {
                    push(path, ChangeKind::Deleted);
                }
            }
        }
    }
    changes
}

/// Owns the pending-change map on its own thread.
pub struct Batcher {
    handle: Option<JoinHandle<()>>,
}

impl Batcher {
    /// Spawns the batcher loop. Each batch is processed on a fresh worker
    /// thread; on channel disconnect the final batch is flushed inline and
    /// the loop exits.
    pub fn spawn<F>(rx: Receiver<FsChange>, window: Duration, processor: F) -> Self
    where
        F: Fn(HashMap<PathBuf, ChangeKind>) + Send + Sync + 'static,
    {
        let processor = Arc::new(processor);
        let handle = std::thread::spawn(move || {
            let mut pending: HashMap<PathBuf, ChangeKind> = HashMap::new();
            loop {
                match rx.recv_timeout(window) {
                    Ok(change) => {
                        pending.insert(change.path, change.kind);
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        if !pending.is_empty() {
                            let batch = std::mem::take(&mut pending);
                            let processor = Arc::clone(&processor);
                            std::thread::spawn(move || processor(batch));
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        if !pending.is_empty() {
                            processor(std::mem::take(&mut pending));
                        }
                        break;
                    }
                }
            }
        });
        Self {
            handle: Some(handle),
        }
    }

    /// Waits for the batcher thread to exit. Callers drop every sender
    /// first; the disconnect is what ends the loop.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
