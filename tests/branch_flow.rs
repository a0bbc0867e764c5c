//! Branch-aware analysis against real git repositories.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use tempfile::TempDir;

use project_graph::{BranchAnalysis, BranchGraphManager, GraphError, MemoryManager};

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .unwrap();
    assert!(status.success(), "git {:?} failed", args);
}

fn setup_repo() -> (TempDir, Arc<MemoryManager>, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let memory =
        Arc::new(MemoryManager::with_storage_dir(temp_dir.path().join("storage")).unwrap());

    let root = temp_dir.path().join("repo");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("a.py"), "def foo(): pass\n").unwrap();

    git(&root, &["init", "--initial-branch=main"]);
    git(&root, &["config", "user.email", "dev@example.com"]);
    git(&root, &["config", "user.name", "Dev"]);
    git(&root, &["add", "."]);
    git(&root, &["commit", "-m", "initial"]);

    (temp_dir, memory, root)
}

#[test]
fn analyze_branch_is_idempotent_until_a_commit_lands() {
    let (_temp_dir, memory, root) = setup_repo();
    let manager = BranchGraphManager::new(&root, memory);
    assert_eq!(manager.current_branch(), "main");

    let first = manager.analyze_branch(None, false).unwrap();
    let version = match &first {
        BranchAnalysis::Analyzed { version, .. } => version.clone(),
        other => panic!("expected fresh analysis, got {:?}", other),
    };
    assert!(version.starts_with("main#"));

    match manager.analyze_branch(None, false).unwrap() {
        BranchAnalysis::UpToDate {
            version: cached, ..
        } => assert_eq!(cached, version),
        other => panic!("expected up_to_date, got {:?}", other),
    }

    fs::write(root.join("b.py"), "from a import foo\n").unwrap();
    git(&root, &["add", "."]);
    git(&root, &["commit", "-m", "add b"]);

    match manager.analyze_branch(None, false).unwrap() {
        BranchAnalysis::Analyzed {
            version: fresh,
            total_files,
            ..
        } => {
            assert_ne!(fresh, version);
            assert_eq!(total_files, 2);
        }
        other => panic!("expected re-analysis after commit, got {:?}", other),
    }
}

#[test]
fn switch_analyzes_target_and_compare_reports_set_difference() {
    let (_temp_dir, memory, root) = setup_repo();
    let mut manager = BranchGraphManager::new(&root, Arc::clone(&memory));

    manager.analyze_branch(None, true).unwrap();

    // feature/x adds new.py on top of main.
    git(&root, &["checkout", "-b", "feature/x"]);
    fs::write(root.join("new.py"), "def fresh(): pass\n").unwrap();
    git(&root, &["add", "."]);
    git(&root, &["commit", "-m", "add new.py"]);
    git(&root, &["checkout", "main"]);

    let outcome = manager.switch_branch("feature/x").unwrap();
    assert_eq!(outcome.previous, "main");
    assert_eq!(outcome.switched_to, "feature/x");
    assert!(matches!(outcome.analysis, BranchAnalysis::Analyzed { .. }));

    let comparison = manager.compare("main", "feature/x").unwrap();
    let new_path = root.join("new.py").display().to_string();
    assert_eq!(comparison.added_files, vec![new_path.clone()]);
    assert!(comparison.removed_files.is_empty());
    assert_eq!(comparison.common_files, 1);
    assert_eq!(
        comparison.added_entities,
        vec![format!("{}:fresh", new_path)]
    );
    assert!(comparison.removed_entities.is_empty());
}

#[test]
fn switch_to_missing_ref_is_an_error_result() {
    let (_temp_dir, memory, root) = setup_repo();
    let mut manager = BranchGraphManager::new(&root, memory);

    let err = manager.switch_branch("no-such-branch").unwrap_err();
    assert!(matches!(err, GraphError::BranchNotFound(_)));
    // The failed switch left the current branch untouched.
    assert_eq!(manager.current_branch(), "main");
}

#[test]
fn compare_names_the_missing_side() {
    let (_temp_dir, memory, root) = setup_repo();
    let manager = BranchGraphManager::new(&root, memory);

    manager.analyze_branch(Some("main"), true).unwrap();
    let err = manager.compare("main", "feature/ghost").unwrap_err();
    match err {
        GraphError::BranchNotFound(message) => assert!(message.contains("feature/ghost")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn branch_listing_accumulates_metadata() {
    let (_temp_dir, memory, root) = setup_repo();
    let mut manager = BranchGraphManager::new(&root, memory);

    manager.analyze_branch(None, true).unwrap();
    git(&root, &["branch", "feature/x"]);
    manager.switch_branch("feature/x").unwrap();

    let branches = manager.list_branches().unwrap();
    assert_eq!(branches.len(), 2);

    let current: Vec<&str> = branches
        .iter()
        .filter(|b| b.is_current)
        .map(|b| b.branch_name.as_str())
        .collect();
    assert_eq!(current, vec!["feature/x"]);

    for branch in &branches {
        assert_eq!(branch.last_commit.len(), 8);
        assert_eq!(branch.author, "Dev");
    }
}
