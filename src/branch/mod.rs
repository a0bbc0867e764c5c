//! Branch-aware graph management.
//!
//! Wraps the single-project memory model with `(project, branch)` identities
//! so every branch keeps its own persisted graph. Staleness is decided by a
//! version fingerprint `branch#commit8` stamped into the analyzed context;
//! any mismatch against the current HEAD forces re-analysis.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::builder::GraphBuilder;
use crate::error::{GraphError, Result};
use crate::git::{CommitInfo, GitRepo};
use crate::memory::{MemoryManager, ProjectId};

const BRANCHES_FILE: &str = "branches.json";

/// Branch role inferred from its name. Exact names win over prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchType {
    Main,
    Develop,
    Feature,
    Hotfix,
    Release,
    Other,
}

impl BranchType {
    pub fn infer(name: &str) -> Self {
        match name {
            "main" | "master" => return BranchType::Main,
            "develop" | "dev" => return BranchType::Develop,
            _ => {}
        }
        if name.starts_with("feature/") {
            BranchType::Feature
        } else if name.starts_with("hotfix/") {
            BranchType::Hotfix
        } else if name.starts_with("release/") {
            BranchType::Release
        } else {
            BranchType::Other
        }
    }

    /// Conventional base branch for this branch role.
    pub fn parent(&self) -> Option<&'static str> {
        match self {
            BranchType::Feature => Some("develop"),
            BranchType::Hotfix => Some("main"),
            _ => None,
        }
    }
}

/// Per-branch metadata, persisted in the branches side-file and
/// merge-updated on every analysis. Never pruned automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchContext {
    pub branch_name: String,
    pub commit_hash: String,
    pub commit_time: i64,
    pub author: String,
    pub branch_type: BranchType,
    pub parent_branch: Option<String>,
    pub merge_status: String,
}

impl BranchContext {
    fn from_head(branch: &str, head: &CommitInfo) -> Self {
        let branch_type = BranchType::infer(branch);
        Self {
            branch_name: branch.to_string(),
            commit_hash: head.hash.clone(),
            commit_time: head.time,
            author: head.author.clone(),
            branch_type,
            parent_branch: branch_type.parent().map(String::from),
            merge_status: "active".to_string(),
        }
    }
}

/// Outcome of `analyze_branch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BranchAnalysis {
    UpToDate {
        branch: String,
        version: String,
    },
    Analyzed {
        branch: String,
        version: String,
        total_files: usize,
        total_entities: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchOutcome {
    pub previous: String,
    pub switched_to: String,
    pub analysis: BranchAnalysis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchComparison {
    pub branch1: String,
    pub branch2: String,
    /// Files present only in `branch2`.
    pub added_files: Vec<String>,
    /// Files present only in `branch1`.
    pub removed_files: Vec<String>,
    pub common_files: usize,
    pub added_entities: Vec<String>,
    pub removed_entities: Vec<String>,
}

/// One branch as listed for callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchInfo {
    pub branch_name: String,
    pub branch_type: BranchType,
    pub last_commit: String,
    pub commit_time: i64,
    pub author: String,
    pub is_current: bool,
}

pub struct BranchGraphManager {
    project_root: String,
    memory: Arc<MemoryManager>,
    git: GitRepo,
    current_branch: String,
}

impl BranchGraphManager {
    pub fn new(project_root: impl AsRef<Path>, memory: Arc<MemoryManager>) -> Self {
        let root = project_root.as_ref();
        let git = GitRepo::new(root);
        let current_branch = git.current_branch();
        Self {
            project_root: root.display().to_string(),
            memory,
            git,
            current_branch,
        }
    }

    pub fn current_branch(&self) -> &str {
        &self.current_branch
    }

    pub fn branch_identity(&self, branch: &str) -> ProjectId {
        ProjectId::for_branch(&self.project_root, branch)
    }

    fn fingerprint(branch: &str, head: &CommitInfo) -> String {
        format!("{}#{}", branch, head.short_hash())
    }

    /// Analyzes the working tree for `branch` (current branch when `None`)
    /// unless the persisted graph already matches the HEAD fingerprint.
    pub fn analyze_branch(&self, branch: Option<&str>, force: bool) -> Result<BranchAnalysis> {
        let branch = branch.unwrap_or(&self.current_branch).to_string();
        let head = self.git.head_commit();
        let version = Self::fingerprint(&branch, &head);
        let id = self.branch_identity(&branch);

        if !force {
            if let Some(existing) = self.memory.load_with_identity(&id, true)? {
                let stored = existing
                    .context
                    .as_ref()
                    .map(|ctx| ctx.version.clone())
                    .unwrap_or_default();
                if stored == version {
                    return Ok(BranchAnalysis::UpToDate { branch, version });
                }
                info!(
                    "branch {} is stale (stored {}, head {})",
                    branch, stored, version
                );
            }
        }

        let builder = GraphBuilder::new(&self.project_root);
        let mut graph = builder.analyze(crate::builder::BuilderConfig::default().max_files)?;
        if let Some(context) = graph.context.as_mut() {
            context.version = version.clone();
        }
        self.memory.save_with_identity(&id, &graph)?;
        self.record_branch(&BranchContext::from_head(&branch, &head))?;

        Ok(BranchAnalysis::Analyzed {
            branch,
            version,
            total_files: graph.files.len(),
            total_entities: graph.entities.len(),
        })
    }

    /// Checks out `target` externally, then forces analysis of it. A failed
    /// ref check or checkout is an error result; the manager state is only
    /// updated after the checkout succeeded.
    pub fn switch_branch(&mut self, target: &str) -> Result<SwitchOutcome> {
        if !self.git.ref_exists(target) {
            return Err(GraphError::BranchNotFound(target.to_string()));
        }
        self.git.checkout(target)?;

        let previous = std::mem::replace(&mut self.current_branch, target.to_string());
        let analysis = self.analyze_branch(Some(target), true)?;
        Ok(SwitchOutcome {
            previous,
            switched_to: target.to_string(),
            analysis,
        })
    }

    /// Set algebra over the two persisted graphs' file paths and entity
    /// keys. Contents are not diffed line by line.
    pub fn compare(&self, branch1: &str, branch2: &str) -> Result<BranchComparison> {
        let first = self
            .memory
            .load_with_identity(&self.branch_identity(branch1), true)?
            .ok_or_else(|| {
                GraphError::BranchNotFound(format!("no stored analysis for '{}'", branch1))
            })?;
        let second = self
            .memory
            .load_with_identity(&self.branch_identity(branch2), true)?
            .ok_or_else(|| {
                GraphError::BranchNotFound(format!("no stored analysis for '{}'", branch2))
            })?;

        let files1: HashSet<&String> = first.files.keys().collect();
        let files2: HashSet<&String> = second.files.keys().collect();
        let mut added_files: Vec<String> =
            files2.difference(&files1).map(|s| (*s).clone()).collect();
        let mut removed_files: Vec<String> =
            files1.difference(&files2).map(|s| (*s).clone()).collect();
        added_files.sort();
        removed_files.sort();

        let entities1: HashSet<&String> = first.entities.keys().collect();
        let entities2: HashSet<&String> = second.entities.keys().collect();
        let mut added_entities: Vec<String> = entities2
            .difference(&entities1)
            .map(|s| (*s).clone())
            .collect();
        let mut removed_entities: Vec<String> = entities1
            .difference(&entities2)
            .map(|s| (*s).clone())
            .collect();
        added_entities.sort();
        removed_entities.sort();

        Ok(BranchComparison {
            branch1: branch1.to_string(),
            branch2: branch2.to_string(),
            common_files: files1.intersection(&files2).count(),
            added_files,
            removed_files,
            added_entities,
            removed_entities,
        })
    }

    /// All recorded branches for this project, newest commit first.
    pub fn list_branches(&self) -> Result<Vec<BranchInfo>> {
        let map = self.load_branch_map()?;
        let mut branches: Vec<BranchInfo> = map
            .get(&self.project_root)
            .map(|entries| {
                entries
                    .values()
                    .map(|ctx| BranchInfo {
                        branch_name: ctx.branch_name.clone(),
                        branch_type: ctx.branch_type,
                        last_commit: ctx.commit_hash[..ctx.commit_hash.len().min(8)].to_string(),
                        commit_time: ctx.commit_time,
                        author: ctx.author.clone(),
                        is_current: ctx.branch_name == self.current_branch,
                    })
                    .collect()
            })
            .unwrap_or_default();
        branches.sort_by_key(|b| std::cmp::Reverse(b.commit_time));
        Ok(branches)
    }

    /// Read-modify-write of the whole per-project branch map.
    fn record_branch(&self, context: &BranchContext) -> Result<()> {
        let mut map = self.load_branch_map()?;
        map.entry(self.project_root.clone())
            .or_default()
            .insert(context.branch_name.clone(), context.clone());

        let path = self.memory.storage_dir().join(BRANCHES_FILE);
        std::fs::write(path, serde_json::to_string_pretty(&map)?)?;
        Ok(())
    }

    fn load_branch_map(&self) -> Result<BTreeMap<String, BTreeMap<String, BranchContext>>> {
        let path = self.memory.storage_dir().join(BRANCHES_FILE);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&path)?;
        match serde_json::from_str(&content) {
            Ok(map) => Ok(map),
            Err(err) => {
                warn!("unreadable {}: {}; starting fresh", path.display(), err);
                Ok(BTreeMap::new())
            }
        }
    }
}
