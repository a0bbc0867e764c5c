//! Read-only version-control queries, plus checkout.
//!
//! Every query shells out to `git` with a bounded timeout and degrades to a
//! sentinel value ("unknown" / empty) when the tool is absent, the root is
//! not a repository, the call exits non-zero or the timeout expires. Only
//! `checkout` surfaces an error, because its failure changes what the
//! caller must do next.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GraphError, Result};

pub const UNKNOWN: &str = "unknown";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// HEAD commit identity. All fields fall back to sentinels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitInfo {
    pub hash: String,
    pub time: i64,
    pub author: String,
}

impl CommitInfo {
    pub fn unknown() -> Self {
        Self {
            hash: UNKNOWN.to_string(),
            time: 0,
            author: UNKNOWN.to_string(),
        }
    }

    /// First eight characters of the hash (or the whole sentinel).
    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(8)]
    }
}

pub struct GitRepo {
    root: PathBuf,
    timeout: Duration,
}

impl GitRepo {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[allow(dead_code)]
    pub fn with_timeout(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            timeout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Current branch name, `"unknown"` outside a repository or on error.
    pub fn current_branch(&self) -> String {
        self.run(&["rev-parse", "--abbrev-ref", "HEAD"])
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    /// HEAD hash, commit time and author, sentinel-filled on failure.
    pub fn head_commit(&self) -> CommitInfo {
        let Some(line) = self.run(&["log", "-1", "--format=%H|%ct|%an"]) else {
            return CommitInfo::unknown();
        };
        let mut parts = line.splitn(3, '|');
        let hash = parts.next().unwrap_or(UNKNOWN).to_string();
        let time = parts.next().and_then(|t| t.parse().ok()).unwrap_or(0);
        let author = parts.next().unwrap_or(UNKNOWN).to_string();
        if hash.is_empty() {
            return CommitInfo::unknown();
        }
        CommitInfo { hash, time, author }
    }

    pub fn ref_exists(&self, name: &str) -> bool {
        self.run(&["rev-parse", "--verify", "--quiet", name]).is_some()
    }

    /// Checks out a branch. The only mutating call in this module.
    pub fn checkout(&self, branch: &str) -> Result<()> {
        match self.run(&["checkout", branch]) {
            Some(_) => Ok(()),
            None => Err(GraphError::Git(format!(
                "checkout of '{}' failed in {}",
                branch,
                self.root.display()
            ))),
        }
    }

    /// Total lines changed (added + deleted) for `path` against HEAD, from
    /// `git diff --numstat`. `None` when unavailable.
    pub fn diff_line_count(&self, path: &str) -> Option<usize> {
        let output = self.run(&["diff", "--numstat", "HEAD", "--", path])?;
        let line = output.lines().next()?;
        let mut fields = line.split_whitespace();
        let added: usize = fields.next()?.parse().ok()?;
        let deleted: usize = fields.next()?.parse().ok()?;
        Some(added + deleted)
    }

    /// Commit time of the last commit touching `path`.
    pub fn file_last_commit_time(&self, path: &str) -> Option<i64> {
        self.run(&["log", "-1", "--format=%ct", "--", path])?
            .parse()
            .ok()
    }

    /// Runs git with a bounded timeout. The child is killed on expiry.
    /// Outputs here are small (a ref name, one log line, one numstat row),
    /// so reading after exit cannot deadlock on a full pipe.
    fn run(&self, args: &[&str]) -> Option<String> {
        let mut child = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .stdin(Stdio::null())
            .spawn()
            .ok()?;

        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    if !status.success() {
                        return None;
                    }
                    let mut output = String::new();
                    child.stdout.take()?.read_to_string(&mut output).ok()?;
                    return Some(output.trim().to_string());
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        debug!("git {:?} timed out after {:?}", args, self.timeout);
                        let _ = child.kill();
                        let _ = child.wait();
                        return None;
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(_) => return None,
            }
        }
    }
}
