//! Intra-project import resolution.
//!
//! Only imports that can be mapped onto a file discovered in the same
//! analysis pass produce a dependency edge. Absolute and multi-segment
//! package imports are never resolved; that is a scope limitation of the
//! graph, not a defect.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use crate::builder::walker::RESOLVE_EXTENSIONS;

/// Resolves one raw import target written in `importer` to a discovered
/// project file. `known` holds the path strings of every file found in the
/// current pass.
pub fn resolve(importer: &Path, raw: &str, known: &HashSet<String>) -> Option<String> {
    let dir = importer.parent()?;
    let base = candidate_base(dir, raw)?;

    // Targets written with an extension (`#include "util.h"`) are checked
    // directly; everything else tries each supported extension in turn.
    if base
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| RESOLVE_EXTENSIONS.contains(&ext))
    {
        return check_candidate(&base, known);
    }

    for ext in RESOLVE_EXTENSIONS {
        let mut candidate = base.clone().into_os_string();
        candidate.push(".");
        candidate.push(ext);
        if let Some(found) = check_candidate(Path::new(&candidate), known) {
            return Some(found);
        }
    }
    None
}

/// Maps a raw import string onto an extensionless candidate path, or `None`
/// when the target is out of resolution scope.
fn candidate_base(dir: &Path, raw: &str) -> Option<PathBuf> {
    if raw.is_empty() {
        return None;
    }

    // Explicit relative path, JS style: `./sibling`, `../lib/util`.
    if raw.starts_with("./") || raw.starts_with("../") {
        return Some(normalize(&dir.join(raw)));
    }

    // Python relative import: `.sibling`, `..pkg.mod`.
    if raw.starts_with('.') {
        let dots = raw.chars().take_while(|&c| c == '.').count();
        let rest = &raw[dots..];
        let mut base = dir.to_path_buf();
        for _ in 1..dots {
            base = base.parent()?.to_path_buf();
        }
        if rest.is_empty() {
            return None;
        }
        for segment in rest.split('.') {
            base.push(segment);
        }
        return Some(normalize(&base));
    }

    // Bare single-segment module name (`from a import foo`, `"util.h"`):
    // tried against the importing file's directory. Dotted or slashed
    // package paths stay unresolved.
    let has_extension = raw
        .rsplit_once('.')
        .is_some_and(|(_, ext)| RESOLVE_EXTENSIONS.contains(&ext));
    if !raw.contains('/') && (has_extension || !raw.contains('.')) {
        return Some(normalize(&dir.join(raw)));
    }

    None
}

fn check_candidate(candidate: &Path, known: &HashSet<String>) -> Option<String> {
    if !candidate.exists() {
        return None;
    }
    let candidate_str = candidate.display().to_string();
    known.contains(&candidate_str).then_some(candidate_str)
}

/// Collapses `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    result.push(component.as_os_str());
                }
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
}
