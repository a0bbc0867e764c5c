//! Serialized full-graph snapshots for O(1) restore.
//!
//! One versioned JSON blob per project identity. A snapshot is only trusted
//! when its envelope version matches and no recorded file has been modified
//! on disk since it was written; anything else falls through to the
//! relational store. Snapshots are read only from this crate's own storage
//! directory, never from an untrusted source.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::builder::KnowledgeGraph;
use crate::error::Result;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct SnapshotEnvelope {
    version: u32,
    saved_at: i64,
    graph: KnowledgeGraph,
}

pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    pub fn save(&self, id: &str, graph: &KnowledgeGraph) -> Result<()> {
        let envelope = SnapshotEnvelope {
            version: SNAPSHOT_VERSION,
            saved_at: crate::model::now_epoch(),
            graph: graph.clone(),
        };
        let json = serde_json::to_string(&envelope)?;
        std::fs::write(self.path_for(id), json)?;
        Ok(())
    }

    /// Loads a snapshot if it is present, parseable, version-compatible and
    /// still fresh against the filesystem.
    pub fn load(&self, id: &str) -> Option<KnowledgeGraph> {
        let path = self.path_for(id);
        let content = std::fs::read_to_string(&path).ok()?;

        let envelope: SnapshotEnvelope = match serde_json::from_str(&content) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!("corrupt snapshot {}: {}", path.display(), err);
                return None;
            }
        };
        if envelope.version != SNAPSHOT_VERSION {
            warn!(
                "snapshot {} has version {}, expected {}",
                path.display(),
                envelope.version,
                SNAPSHOT_VERSION
            );
            return None;
        }

        if let Some(stale) = first_stale_file(&envelope.graph) {
            debug!("snapshot {} is stale: {} changed on disk", id, stale);
            return None;
        }
        Some(envelope.graph)
    }

    pub fn delete(&self, id: &str) {
        let _ = std::fs::remove_file(self.path_for(id));
    }

    /// Total bytes across all snapshot blobs.
    pub fn total_size(&self) -> u64 {
        std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .flatten()
                    .filter_map(|e| e.metadata().ok())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0)
    }
}

/// A recorded file modified on disk after the snapshot's view of it makes
/// the whole snapshot untrustworthy. Files deleted since are left for the
/// incremental updater to reconcile.
fn first_stale_file(graph: &KnowledgeGraph) -> Option<&str> {
    for (path, node) in &graph.files {
        let Ok(metadata) = std::fs::metadata(Path::new(path)) else {
            continue;
        };
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        if mtime > node.last_modified {
            return Some(path);
        }
    }
    None
}
