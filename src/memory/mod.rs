//! Durable storage for knowledge graphs.
//!
//! Three representations per project identity: normalized relational rows
//! (queryable), one serialized snapshot blob (fast full restore) and a
//! process-local TTL cache. `MemoryManager` owns the consistency between
//! them: relational rows commit first, the snapshot is written only after
//! the commit succeeds, the cache is updated last.

pub mod cache;
pub mod snapshot;
pub mod store;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::builder::{GraphBuilder, KnowledgeGraph};
use crate::error::{GraphError, Result};
use cache::GraphCache;
use snapshot::SnapshotStore;
use store::{ProjectRow, RelationalStore, StoreCounts};

pub const STORAGE_DIR_NAME: &str = ".project-graph";
/// Pre-rename storage directory, migrated once on open.
pub const LEGACY_DIR_NAME: &str = ".projectgraph";

/// Stable identity partitioning the persisted stores.
///
/// Plain project identity hashes the absolute root; branch-scoped identity
/// hashes `root#branch`, so distinct branches never collide with each other
/// or with the unpartitioned identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn for_root(project_root: &str) -> Self {
        Self(format!("{:016x}", xxh3_64(project_root.as_bytes())))
    }

    pub fn for_branch(project_root: &str, branch: &str) -> Self {
        let scoped = format!("{}#{}", project_root, branch);
        Self(format!("{:016x}", xxh3_64(scoped.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Aggregate storage statistics for maintenance callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStats {
    pub counts: StoreCounts,
    pub database_bytes: u64,
    pub snapshot_bytes: u64,
    pub storage_dir: String,
}

pub struct MemoryManager {
    storage_dir: PathBuf,
    store: RelationalStore,
    snapshots: SnapshotStore,
    cache: GraphCache,
}

impl MemoryManager {
    /// Opens the per-user storage directory, migrating the legacy layout
    /// when present.
    pub fn open() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| GraphError::Storage("home directory not resolvable".into()))?;
        let current = home.join(STORAGE_DIR_NAME);
        let legacy = home.join(LEGACY_DIR_NAME);
        if legacy.is_dir() && !current.exists() {
            info!(
                "migrating storage from {} to {}",
                legacy.display(),
                current.display()
            );
            std::fs::rename(&legacy, &current)?;
        }
        Self::with_storage_dir(current)
    }

    /// Opens (and creates if needed) an explicit storage directory. Tests
    /// and embedders use this to avoid touching the home directory.
    pub fn with_storage_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let storage_dir = dir.into();
        std::fs::create_dir_all(&storage_dir)?;
        let store = RelationalStore::new(storage_dir.join("graphs.db"))?;
        let snapshots = SnapshotStore::new(storage_dir.join("snapshots"))?;
        Ok(Self {
            storage_dir,
            store,
            snapshots,
            cache: GraphCache::default(),
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Persists under the identity derived from the graph's own root.
    pub fn save(&self, graph: &KnowledgeGraph) -> Result<()> {
        self.save_with_identity(&ProjectId::for_root(&graph.project_root), graph)
    }

    /// Persists under an explicit identity. The relational transaction is
    /// the atomicity unit; on its failure neither snapshot nor cache are
    /// touched.
    pub fn save_with_identity(&self, id: &ProjectId, graph: &KnowledgeGraph) -> Result<()> {
        self.store.save_graph(id.as_str(), graph)?;
        self.snapshots.save(id.as_str(), graph)?;
        self.cache.insert(id.as_str(), graph.clone());
        Ok(())
    }

    pub fn load(&self, project_root: &str, use_cache: bool) -> Result<Option<KnowledgeGraph>> {
        self.load_with_identity(&ProjectId::for_root(project_root), use_cache)
    }

    /// Cache, then snapshot (mtime-validated), then relational rows.
    /// Total absence is `Ok(None)`.
    pub fn load_with_identity(
        &self,
        id: &ProjectId,
        use_cache: bool,
    ) -> Result<Option<KnowledgeGraph>> {
        if use_cache {
            if let Some(graph) = self.cache.get(id.as_str()) {
                return Ok(Some(graph));
            }
        }

        if let Some(graph) = self.snapshots.load(id.as_str()) {
            self.cache.insert(id.as_str(), graph.clone());
            return Ok(Some(graph));
        }

        match self.store.load_graph(id.as_str())? {
            Some(graph) => {
                self.cache.insert(id.as_str(), graph.clone());
                Ok(Some(graph))
            }
            None => Ok(None),
        }
    }

    /// Re-analyzes files whose on-disk mtime is newer than the recorded
    /// value, then re-persists. Returns how many files were refreshed.
    pub fn refresh_stale(&self, project_root: &str) -> Result<usize> {
        let Some(mut graph) = self.load(project_root, false)? else {
            return Ok(0);
        };

        let stale: Vec<PathBuf> = graph
            .files
            .iter()
            .filter(|(path, node)| {
                on_disk_mtime(Path::new(path))
                    .map(|mtime| mtime > node.last_modified)
                    .unwrap_or(false)
            })
            .map(|(path, _)| PathBuf::from(path))
            .collect();

        if stale.is_empty() {
            return Ok(0);
        }

        let builder = GraphBuilder::new(project_root);
        let refreshed = builder.analyze_changed(&mut graph, &stale);
        self.save(&graph)?;
        Ok(refreshed)
    }

    pub fn storage_stats(&self) -> Result<StorageStats> {
        let database_bytes = std::fs::metadata(self.storage_dir.join("graphs.db"))
            .map(|m| m.len())
            .unwrap_or(0);
        Ok(StorageStats {
            counts: self.store.counts()?,
            database_bytes,
            snapshot_bytes: self.snapshots.total_size(),
            storage_dir: self.storage_dir.display().to_string(),
        })
    }

    /// Marks projects unaccessed beyond the retention window as inactive
    /// and deletes their snapshot blobs. Relational rows are kept.
    pub fn cleanup(&self, retention_days: u64) -> Result<usize> {
        let cutoff = crate::model::now_epoch() - (retention_days as i64) * 86_400;
        let ids = self.store.mark_inactive_before(cutoff)?;
        for id in &ids {
            self.snapshots.delete(id);
            self.cache.remove(id);
            warn!("retired inactive project {}", id);
        }
        Ok(ids.len())
    }

    pub fn list_projects(&self) -> Result<Vec<ProjectRow>> {
        self.store.list_projects()
    }

    pub fn set_config(&self, id: &ProjectId, key: &str, value: &str) -> Result<()> {
        self.store.set_config(id.as_str(), key, value)
    }

    pub fn get_config(&self, id: &ProjectId, key: &str) -> Result<Option<String>> {
        self.store.get_config(id.as_str(), key)
    }
}

fn on_disk_mtime(path: &Path) -> Option<i64> {
    std::fs::metadata(path)
        .ok()?
        .modified()
        .ok()?
        .duration_since(std::time::UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs() as i64)
}
