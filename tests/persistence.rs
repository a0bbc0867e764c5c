//! Persistence round-trips across the storage triad.

use std::collections::BTreeSet;
use std::fs;

use tempfile::TempDir;

use project_graph::{GraphBuilder, KnowledgeGraph, MemoryManager, ProjectId};

fn sample_project(temp_dir: &TempDir) -> KnowledgeGraph {
    let root = temp_dir.path().join("proj");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("a.py"), "def foo(): pass\n\nclass Widget: pass\n").unwrap();
    fs::write(root.join("b.py"), "from a import foo\n").unwrap();
    fs::write(root.join("util.js"), "export function util() {}\n").unwrap();
    GraphBuilder::new(&root).analyze(100).unwrap()
}

fn key_sets(graph: &KnowledgeGraph) -> (BTreeSet<String>, BTreeSet<String>, usize) {
    (
        graph.files.keys().cloned().collect(),
        graph.entities.keys().cloned().collect(),
        graph.graph.edge_count(),
    )
}

#[test]
fn save_then_load_preserves_identity_sets() {
    let temp_dir = TempDir::new().unwrap();
    let storage = temp_dir.path().join("storage");
    let manager = MemoryManager::with_storage_dir(&storage).unwrap();

    let graph = sample_project(&temp_dir);
    manager.save(&graph).unwrap();

    let loaded = manager.load(&graph.project_root, true).unwrap().unwrap();
    assert_eq!(key_sets(&graph), key_sets(&loaded));
}

#[test]
fn load_survives_process_restart() {
    let temp_dir = TempDir::new().unwrap();
    let storage = temp_dir.path().join("storage");

    let graph = sample_project(&temp_dir);
    {
        let manager = MemoryManager::with_storage_dir(&storage).unwrap();
        manager.save(&graph).unwrap();
    }

    // A fresh manager has an empty process cache: this exercises the
    // snapshot path.
    let manager = MemoryManager::with_storage_dir(&storage).unwrap();
    let loaded = manager.load(&graph.project_root, true).unwrap().unwrap();
    assert_eq!(key_sets(&graph), key_sets(&loaded));
}

#[test]
fn corrupt_snapshot_falls_back_to_relational_rows() {
    let temp_dir = TempDir::new().unwrap();
    let storage = temp_dir.path().join("storage");

    let graph = sample_project(&temp_dir);
    {
        let manager = MemoryManager::with_storage_dir(&storage).unwrap();
        manager.save(&graph).unwrap();
    }

    let id = ProjectId::for_root(&graph.project_root);
    let blob = storage.join("snapshots").join(format!("{}.json", id.as_str()));
    fs::write(&blob, "{ truncated").unwrap();

    let manager = MemoryManager::with_storage_dir(&storage).unwrap();
    let loaded = manager.load(&graph.project_root, true).unwrap().unwrap();
    assert_eq!(key_sets(&graph), key_sets(&loaded));
}

#[test]
fn snapshot_stale_after_disk_edit_still_loads_from_rows() {
    let temp_dir = TempDir::new().unwrap();
    let storage = temp_dir.path().join("storage");

    let graph = sample_project(&temp_dir);
    {
        let manager = MemoryManager::with_storage_dir(&storage).unwrap();
        let mut aged = graph.clone();
        // Pretend the analysis predates the files on disk.
        for node in aged.files.values_mut() {
            node.last_modified -= 3600;
        }
        manager.save(&aged).unwrap();
    }

    // Snapshot fails mtime validation, relational reconstruction answers.
    let manager = MemoryManager::with_storage_dir(&storage).unwrap();
    let loaded = manager.load(&graph.project_root, true).unwrap().unwrap();
    assert_eq!(loaded.files.len(), graph.files.len());
}

#[test]
fn absence_is_none_not_error() {
    let temp_dir = TempDir::new().unwrap();
    let manager = MemoryManager::with_storage_dir(temp_dir.path().join("storage")).unwrap();
    assert!(manager.load("/never/analyzed", true).unwrap().is_none());
}

#[test]
fn branch_identities_partition_storage() {
    let temp_dir = TempDir::new().unwrap();
    let manager = MemoryManager::with_storage_dir(temp_dir.path().join("storage")).unwrap();

    let graph = sample_project(&temp_dir);
    let root = graph.project_root.clone();

    manager
        .save_with_identity(&ProjectId::for_branch(&root, "main"), &graph)
        .unwrap();

    let mut trimmed = graph.clone();
    let doomed: Vec<String> = trimmed
        .files
        .keys()
        .filter(|p| p.ends_with("util.js"))
        .cloned()
        .collect();
    for path in doomed {
        trimmed.remove_file(&path);
    }
    manager
        .save_with_identity(&ProjectId::for_branch(&root, "feature/slim"), &trimmed)
        .unwrap();

    let main = manager
        .load_with_identity(&ProjectId::for_branch(&root, "main"), true)
        .unwrap()
        .unwrap();
    let slim = manager
        .load_with_identity(&ProjectId::for_branch(&root, "feature/slim"), true)
        .unwrap()
        .unwrap();

    assert_eq!(main.files.len(), 3);
    assert_eq!(slim.files.len(), 2);
    assert!(manager.load(&root, true).unwrap().is_none());
}

#[test]
fn storage_stats_and_cleanup() {
    let temp_dir = TempDir::new().unwrap();
    let manager = MemoryManager::with_storage_dir(temp_dir.path().join("storage")).unwrap();

    let graph = sample_project(&temp_dir);
    manager.save(&graph).unwrap();

    let stats = manager.storage_stats().unwrap();
    assert_eq!(stats.counts.projects, 1);
    assert_eq!(stats.counts.files, 3);
    assert!(stats.counts.entities >= 3);
    assert!(stats.snapshot_bytes > 0);

    assert_eq!(manager.list_projects().unwrap().len(), 1);

    // Nothing is old enough to retire yet.
    assert_eq!(manager.cleanup(30).unwrap(), 0);
    assert_eq!(manager.list_projects().unwrap().len(), 1);
}
