//! Incremental graph maintenance under live filesystem edits.
//!
//! One boolean state: idle or monitoring. While monitoring, watch events
//! flow through the debounce batcher into `apply_changes`, which mutates
//! the persisted graph file by file and re-persists it. Import edges are
//! refreshed only for files touched in a batch; an importer that was not
//! itself touched keeps its stale outgoing edges until it changes or a
//! full re-analysis runs. That trade favors update latency and is part of
//! the contract, not an accident.

pub mod debounce;
pub mod watcher;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::builder::{GraphBuilder, KnowledgeGraph};
use crate::error::Result;
use crate::git::GitRepo;
use crate::memory::MemoryManager;
use debounce::{Batcher, ChangeKind};
use watcher::WatchProvider;

#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    pub debounce: std::time::Duration,
    pub max_files: usize,
    /// Line-delta thresholds for the change-size warning.
    pub medium_change_lines: usize,
    pub high_change_lines: usize,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            debounce: debounce::DEFAULT_DEBOUNCE,
            max_files: 1000,
            medium_change_lines: 20,
            high_change_lines: 100,
        }
    }
}

/// What one batch application did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateReport {
    pub full_rebuild: bool,
    pub updated: usize,
    pub removed: usize,
    pub persisted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForceUpdateReport {
    pub total_files: usize,
    pub monitoring_restarted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterStatus {
    pub monitoring: bool,
    pub project_root: String,
    pub last_analysis: Option<i64>,
    pub total_files: usize,
    pub total_entities: usize,
}

/// State shared with batch workers.
struct UpdaterCore {
    root: PathBuf,
    memory: Arc<MemoryManager>,
    git: GitRepo,
    config: UpdaterConfig,
}

impl UpdaterCore {
    fn full_reanalysis(&self) -> Result<KnowledgeGraph> {
        GraphBuilder::new(&self.root).analyze(self.config.max_files)
    }

    /// Applies one debounced batch to the persisted graph.
    ///
    /// No prior graph means a full self-healing re-analysis. A failed save
    /// at the end is logged but does not roll the in-memory mutation back;
    /// the caller can force-update to reconverge.
    fn apply_changes(&self, changes: &HashMap<PathBuf, ChangeKind>) -> Result<UpdateReport> {
        let root = self.root.display().to_string();
        let Some(mut graph) = self.memory.load(&root, true)? else {
            warn!("no persisted graph for {}, running full analysis", root);
            let graph = self.full_reanalysis()?;
            self.memory.save(&graph)?;
            return Ok(UpdateReport {
                full_rebuild: true,
                updated: graph.files.len(),
                removed: 0,
                persisted: true,
            });
        };

        let builder = GraphBuilder::new(&self.root);
        let mut updated = 0usize;
        let mut removed = 0usize;
        let mut touched: Vec<String> = Vec::new();

        for (path, kind) in changes {
            let path_str = path.display().to_string();
            match kind {
                ChangeKind::Deleted => {
                    if graph.remove_file(&path_str) {
                        removed += 1;
                        info!("removed {} from graph", path_str);
                    }
                }
                ChangeKind::Created | ChangeKind::Modified => {
                    // The path may be gone again by the time the batch runs.
                    if !path.exists() {
                        continue;
                    }
                    let previous = graph.files.get(&path_str);
                    let old_hash = previous.map(|node| node.content_hash.clone());
                    let change_frequency =
                        previous.map(|node| node.change_frequency + 1).unwrap_or(1);

                    let Some(mut node) = builder.analyze_single_file(path) else {
                        continue;
                    };
                    node.change_frequency = change_frequency;

                    if old_hash.as_deref() != Some(node.content_hash.as_str()) {
                        self.warn_on_large_delta(&path_str);
                        if let Some(commit_time) = self.git.file_last_commit_time(&path_str) {
                            debug!("{} last committed at {}", path_str, commit_time);
                        }
                    }

                    graph.insert_file(node);
                    touched.push(path_str);
                    updated += 1;
                }
            }
        }

        // Only edges of files in this batch are refreshed.
        for path in &touched {
            graph.refresh_import_edges(path);
        }
        graph.rebuild_statistics();

        let persisted = match self.memory.save(&graph) {
            Ok(()) => true,
            Err(err) => {
                error!("persisting updated graph for {} failed: {}", root, err);
                false
            }
        };

        Ok(UpdateReport {
            full_rebuild: false,
            updated,
            removed,
            persisted,
        })
    }

    /// Emits a risk warning for materially changed files, sized by the
    /// external diff when one is available. Never blocks the update.
    fn warn_on_large_delta(&self, path: &str) {
        let Some(lines) = self.git.diff_line_count(path) else {
            return;
        };
        if lines > self.config.high_change_lines {
            warn!("{} changed by {} lines, high churn risk", path, lines);
        } else if lines > self.config.medium_change_lines {
            warn!("{} changed by {} lines, moderate churn risk", path, lines);
        }
    }
}

pub struct IncrementalUpdater {
    core: Arc<UpdaterCore>,
    monitoring: bool,
    watcher: Option<WatchProvider>,
    batcher: Option<Batcher>,
}

impl IncrementalUpdater {
    pub fn new(root: impl Into<PathBuf>, memory: Arc<MemoryManager>) -> Self {
        Self::with_config(root, memory, UpdaterConfig::default())
    }

    pub fn with_config(
        root: impl Into<PathBuf>,
        memory: Arc<MemoryManager>,
        config: UpdaterConfig,
    ) -> Self {
        let root = root.into();
        let git = GitRepo::new(&root);
        Self {
            core: Arc::new(UpdaterCore {
                root,
                memory,
                git,
                config,
            }),
            monitoring: false,
            watcher: None,
            batcher: None,
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring
    }

    /// idle -> monitoring. Starting twice is a warning no-op. A failed
    /// start leaves the updater idle and recoverable.
    pub fn start_monitoring(&mut self) -> Result<()> {
        if self.monitoring {
            warn!("already monitoring {}", self.core.root.display());
            return Ok(());
        }

        let (tx, rx) = mpsc::channel();
        let handler = move |result: notify::Result<notify::Event>| match result {
            Ok(event) => {
                for change in debounce::classify(&event) {
                    let _ = tx.send(change);
                }
            }
            Err(err) => warn!("watch event error: {}", err),
        };

        let provider = WatchProvider::start(&self.core.root, handler)?;
        let core = Arc::clone(&self.core);
        let batcher = Batcher::spawn(rx, self.core.config.debounce, move |batch| {
            if let Err(err) = core.apply_changes(&batch) {
                error!("batch update failed: {}", err);
            }
        });

        info!(
            "monitoring {} with {} watcher",
            self.core.root.display(),
            provider.kind()
        );
        self.watcher = Some(provider);
        self.batcher = Some(batcher);
        self.monitoring = true;
        Ok(())
    }

    /// monitoring -> idle. Stopping while idle is a no-op. Dropping the
    /// watcher closes the event channel, which ends the batcher loop.
    pub fn stop_monitoring(&mut self) {
        if !self.monitoring {
            return;
        }
        self.watcher = None;
        if let Some(batcher) = self.batcher.take() {
            batcher.join();
        }
        self.monitoring = false;
        info!("stopped monitoring {}", self.core.root.display());
    }

    /// Applies a batch of changes directly, outside the watch pipeline.
    pub fn apply_changes(&self, changes: &HashMap<PathBuf, ChangeKind>) -> Result<UpdateReport> {
        self.core.apply_changes(changes)
    }

    /// Discards incremental state: full re-analysis and re-persist, with
    /// monitoring suspended around it and restarted when it was active.
    pub fn force_update(&mut self) -> Result<ForceUpdateReport> {
        let was_monitoring = self.monitoring;
        if was_monitoring {
            self.stop_monitoring();
        }

        let graph = self.core.full_reanalysis()?;
        self.core.memory.save(&graph)?;

        let mut monitoring_restarted = false;
        if was_monitoring {
            self.start_monitoring()?;
            monitoring_restarted = true;
        }

        Ok(ForceUpdateReport {
            total_files: graph.files.len(),
            monitoring_restarted,
        })
    }

    pub fn status(&self) -> Result<UpdaterStatus> {
        let root = self.core.root.display().to_string();
        let graph = self.core.memory.load(&root, true)?;
        let (last_analysis, total_files, total_entities) = match &graph {
            Some(graph) => (
                graph.context.as_ref().map(|ctx| ctx.last_analysis),
                graph.files.len(),
                graph.entities.len(),
            ),
            None => (None, 0, 0),
        };
        Ok(UpdaterStatus {
            monitoring: self.monitoring,
            project_root: root,
            last_analysis,
            total_files,
            total_entities,
        })
    }
}
