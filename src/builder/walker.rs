//! Project file discovery.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Directory names never descended into during discovery.
pub const IGNORED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".pytest_cache",
    "dist",
    "build",
    "target",
    ".idea",
    ".vscode",
    "coverage",
];

/// Maps a file extension to the language analyzed for it. Files outside
/// this set are not part of the knowledge graph.
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "py" => Some("python"),
        "js" | "jsx" => Some("javascript"),
        "ts" | "tsx" => Some("typescript"),
        "java" => Some("java"),
        "go" => Some("go"),
        "rs" => Some("rust"),
        "c" | "h" => Some("c"),
        "cpp" | "hpp" => Some("cpp"),
        _ => None,
    }
}

pub fn language_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?;
    language_for_extension(ext)
}

/// Extensions tried, in order, when resolving an extensionless import target.
pub const RESOLVE_EXTENSIONS: &[&str] = &[
    "py", "js", "jsx", "ts", "tsx", "java", "go", "rs", "c", "cpp", "h", "hpp",
];

fn is_ignored_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| IGNORED_DIRS.contains(&name))
        .unwrap_or(false)
}

/// Walks `root` recursively and returns every supported source file, in
/// discovery order, capped at `max_files`.
pub fn discover(root: &Path, max_files: usize) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !(entry.file_type().is_dir() && is_ignored_dir(entry.path())));

    for entry in walker.flatten() {
        if files.len() >= max_files {
            break;
        }
        let path = entry.path();
        if entry.file_type().is_file() && language_for_path(path).is_some() {
            files.push(path.to_path_buf());
        }
    }

    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_discover_supported_files() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "main.py", "print('hi')");
        create_file(temp_dir.path(), "app.ts", "const x = 1;");
        create_file(temp_dir.path(), "notes.txt", "not code");

        let files = discover(temp_dir.path(), 100);
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_discover_skips_ignored_dirs() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "src/lib.rs", "pub fn a() {}");
        create_file(temp_dir.path(), "node_modules/pkg/index.js", "x");
        create_file(temp_dir.path(), "target/debug/gen.rs", "x");
        create_file(temp_dir.path(), "__pycache__/mod.py", "x");

        let files = discover(temp_dir.path(), 100);
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("src/lib.rs"));
    }

    #[test]
    fn test_discover_respects_max_files() {
        let temp_dir = TempDir::new().unwrap();
        for i in 0..10 {
            create_file(temp_dir.path(), &format!("m{}.py", i), "pass");
        }

        let files = discover(temp_dir.path(), 3);
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn test_language_for_extension() {
        assert_eq!(language_for_extension("py"), Some("python"));
        assert_eq!(language_for_extension("tsx"), Some("typescript"));
        assert_eq!(language_for_extension("jsx"), Some("javascript"));
        assert_eq!(language_for_extension("hpp"), Some("cpp"));
        assert_eq!(language_for_extension("txt"), None);
    }
}
