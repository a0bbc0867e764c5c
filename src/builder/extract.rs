//! Per-file analysis: content hash, line count and entity extraction.
//!
//! Python goes through tree-sitter and gets real declarations; every other
//! supported language is pattern-matched with regexes. The regex side is
//! deliberately approximate (it will miss and over-match some forms) and is
//! treated as heuristic enrichment, not ground truth.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;
use xxhash_rust::xxh3::xxh3_64;

use crate::model::{CodeEntity, EntityKind, FileNode};

// JavaScript / TypeScript
static JS_FUNCTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s+([A-Za-z_$][\w$]*)")
        .unwrap()
});
static JS_ARROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s*)?\(")
        .unwrap()
});
static JS_CLASS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)")
        .unwrap()
});
static TS_INTERFACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:export\s+)?interface\s+([A-Za-z_$][\w$]*)").unwrap());
static JS_IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^\s*import\s+(?:[^'"]+\s+from\s+)?['"]([^'"]+)['"]"#).unwrap()
});
static JS_REQUIRE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"require\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());
static JS_EXPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*export\s+(?:default\s+)?(?:async\s+)?(?:function|class|const|let|var|interface)\s+([A-Za-z_$][\w$]*)")
        .unwrap()
});

// Rust
static RUST_FN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?fn\s+(\w+)").unwrap());
static RUST_TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait)\s+(\w+)").unwrap()
});
static RUST_USE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*use\s+([\w:]+)").unwrap());

// Go
static GO_FUNC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^func\s+(?:\([^)]*\)\s*)?(\w+)\s*\(").unwrap());
static GO_TYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^type\s+(\w+)\s+(?:struct|interface)").unwrap());
static GO_IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*(?:import\s+)?"([^"]+)""#).unwrap());

// Java
static JAVA_TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:public\s+|private\s+|protected\s+)?(?:abstract\s+|final\s+)?(class|interface)\s+(\w+)")
        .unwrap()
});
static JAVA_IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*import\s+(?:static\s+)?([\w.]+)\s*;").unwrap());

// C / C++
static C_INCLUDE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*#include\s+"([^"]+)""#).unwrap());
static C_CLASS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:class|struct)\s+(\w+)\s*[:{]").unwrap());

/// Analyzes one source file into a `FileNode`.
///
/// Never panics: an unreadable or undecodable file returns `None` with a
/// warning; a file that parses badly is still recorded, just with zero
/// entities. Risk scoring is left to the caller.
pub fn analyze_file(path: &Path, language: &str) -> Option<FileNode> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!("skipping unreadable file {}: {}", path.display(), err);
            return None;
        }
    };

    let path_str = path.display().to_string();
    let mut node = FileNode::new(path_str.clone(), language);
    node.size_bytes = content.len() as u64;
    node.line_count = content.lines().filter(|l| !l.trim().is_empty()).count();
    node.content_hash = format!("{:016x}", xxh3_64(content.as_bytes()));
    node.last_modified = file_mtime(path).unwrap_or_else(crate::model::now_epoch);

    match language {
        "python" => extract_python(&mut node, &content),
        "javascript" | "typescript" => extract_javascript(&mut node, &content, language),
        "rust" => extract_rust(&mut node, &content),
        "go" => extract_go(&mut node, &content),
        "java" => extract_java(&mut node, &content),
        "c" | "cpp" => extract_c(&mut node, &content),
        _ => {}
    }

    Some(node)
}

fn file_mtime(path: &Path) -> Option<i64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    modified
        .duration_since(std::time::UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs() as i64)
}

/// Structured extraction through tree-sitter. A syntax error aborts only the
/// entity extraction for this file; the file itself stays in the graph.
fn extract_python(node: &mut FileNode, content: &str) {
    let mut parser = tree_sitter::Parser::new();
    if parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .is_err()
    {
        warn!("python grammar unavailable, recording {} without entities", node.path);
        return;
    }

    let Some(tree) = parser.parse(content, None) else {
        warn!("failed to parse {}, recording without entities", node.path);
        return;
    };

    let source = content.as_bytes();
    collect_python_entities(tree.root_node(), source, node);

    // Top-level public declarations double as the file's exports.
    for entity in &node.entities {
        if !entity.name.starts_with('_') && !node.exports.contains(&entity.name) {
            node.exports.push(entity.name.clone());
        }
    }
}

fn collect_python_entities(ts_node: tree_sitter::Node, source: &[u8], node: &mut FileNode) {
    let mut cursor = ts_node.walk();
    for child in ts_node.named_children(&mut cursor) {
        match child.kind() {
            "function_definition" | "class_definition" => {
                if let Some(entity) = python_entity(child, source, &node.path) {
                    node.entities.push(entity);
                }
                // Methods and nested definitions are entities in their own
                // right, keyed by name only, so redefinitions shadow.
                collect_python_entities(child, source, node);
            }
            "import_statement" => {
                for target in python_import_targets(child, source) {
                    node.imports.push(target);
                }
            }
            "import_from_statement" => {
                if let Some(module) = child.child_by_field_name("module_name") {
                    if let Ok(text) = module.utf8_text(source) {
                        node.imports.push(text.to_string());
                    }
                }
            }
            _ => collect_python_entities(child, source, node),
        }
    }
}

fn python_entity(ts_node: tree_sitter::Node, source: &[u8], file_path: &str) -> Option<CodeEntity> {
    let name = ts_node
        .child_by_field_name("name")?
        .utf8_text(source)
        .ok()?
        .to_string();
    let kind = if ts_node.kind() == "class_definition" {
        EntityKind::Class
    } else {
        EntityKind::Function
    };
    let line = ts_node.start_position().row + 1;

    let mut entity = CodeEntity::new(name.clone(), kind, file_path, line);
    entity.signature = Some(match kind {
        EntityKind::Class => format!("class {}", name),
        _ => {
            let params = ts_node
                .child_by_field_name("parameters")
                .and_then(|p| p.utf8_text(source).ok())
                .unwrap_or("()");
            format!("def {}{}", name, params)
        }
    });
    entity.docstring = python_docstring(ts_node, source);
    entity.complexity_score = python_complexity(ts_node);
    Some(entity)
}

/// First string expression in the body, quotes stripped.
fn python_docstring(ts_node: tree_sitter::Node, source: &[u8]) -> Option<String> {
    let body = ts_node.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.named_child(0)?;
    if string.kind() != "string" {
        return None;
    }
    let text = string.utf8_text(source).ok()?;
    Some(
        text.trim_matches(|c| c == '"' || c == '\'')
            .trim()
            .to_string(),
    )
}

/// 1 + number of branching constructs in the subtree.
fn python_complexity(ts_node: tree_sitter::Node) -> f64 {
    const BRANCH_KINDS: &[&str] = &[
        "if_statement",
        "elif_clause",
        "for_statement",
        "while_statement",
        "except_clause",
        "conditional_expression",
        "boolean_operator",
    ];

    let mut count = 0usize;
    let mut stack = vec![ts_node];
    while let Some(current) = stack.pop() {
        if BRANCH_KINDS.contains(&current.kind()) {
            count += 1;
        }
        let mut cursor = current.walk();
        for child in current.named_children(&mut cursor) {
            stack.push(child);
        }
    }
    1.0 + count as f64
}

fn python_import_targets(ts_node: tree_sitter::Node, source: &[u8]) -> Vec<String> {
    let mut targets = Vec::new();
    let mut cursor = ts_node.walk();
    for child in ts_node.named_children(&mut cursor) {
        match child.kind() {
            "dotted_name" => {
                if let Ok(text) = child.utf8_text(source) {
                    targets.push(text.to_string());
                }
            }
            "aliased_import" => {
                if let Some(name) = child.child_by_field_name("name") {
                    if let Ok(text) = name.utf8_text(source) {
                        targets.push(text.to_string());
                    }
                }
            }
            _ => {}
        }
    }
    targets
}

fn extract_javascript(node: &mut FileNode, content: &str, language: &str) {
    for caps in JS_FUNCTION_RE.captures_iter(content) {
        push_match(node, content, &caps, EntityKind::Function);
    }
    for caps in JS_ARROW_RE.captures_iter(content) {
        push_match(node, content, &caps, EntityKind::Function);
    }
    for caps in JS_CLASS_RE.captures_iter(content) {
        push_match(node, content, &caps, EntityKind::Class);
    }
    if language == "typescript" {
        for caps in TS_INTERFACE_RE.captures_iter(content) {
            push_match(node, content, &caps, EntityKind::Interface);
        }
    }
    for caps in JS_IMPORT_RE.captures_iter(content) {
        node.imports.push(caps[1].to_string());
    }
    for caps in JS_REQUIRE_RE.captures_iter(content) {
        node.imports.push(caps[1].to_string());
    }
    for caps in JS_EXPORT_RE.captures_iter(content) {
        let name = caps[1].to_string();
        if !node.exports.contains(&name) {
            node.exports.push(name);
        }
    }
}

fn extract_rust(node: &mut FileNode, content: &str) {
    for caps in RUST_FN_RE.captures_iter(content) {
        push_match(node, content, &caps, EntityKind::Function);
    }
    for caps in RUST_TYPE_RE.captures_iter(content) {
        push_match(node, content, &caps, EntityKind::Class);
    }
    for caps in RUST_USE_RE.captures_iter(content) {
        node.imports.push(caps[1].to_string());
    }
}

fn extract_go(node: &mut FileNode, content: &str) {
    for caps in GO_FUNC_RE.captures_iter(content) {
        push_match(node, content, &caps, EntityKind::Function);
    }
    for caps in GO_TYPE_RE.captures_iter(content) {
        push_match(node, content, &caps, EntityKind::Class);
    }
    for caps in GO_IMPORT_RE.captures_iter(content) {
        node.imports.push(caps[1].to_string());
    }
}

fn extract_java(node: &mut FileNode, content: &str) {
    for caps in JAVA_TYPE_RE.captures_iter(content) {
        let kind = if &caps[1] == "interface" {
            EntityKind::Interface
        } else {
            EntityKind::Class
        };
        let name = caps[2].to_string();
        let line = line_of_offset(content, caps.get(2).map(|m| m.start()).unwrap_or(0));
        node.entities
            .push(CodeEntity::new(name, kind, node.path.clone(), line));
    }
    for caps in JAVA_IMPORT_RE.captures_iter(content) {
        node.imports.push(caps[1].to_string());
    }
}

fn extract_c(node: &mut FileNode, content: &str) {
    for caps in C_CLASS_RE.captures_iter(content) {
        push_match(node, content, &caps, EntityKind::Class);
    }
    for caps in C_INCLUDE_RE.captures_iter(content) {
        node.imports.push(caps[1].to_string());
    }
}

fn push_match(node: &mut FileNode, content: &str, caps: &regex::Captures, kind: EntityKind) {
    let name = caps[1].to_string();
    if node.entities.iter().any(|e| e.name == name) {
        return;
    }
    let line = line_of_offset(content, caps.get(1).map(|m| m.start()).unwrap_or(0));
    node.entities
        .push(CodeEntity::new(name, kind, node.path.clone(), line));
}

fn line_of_offset(content: &str, offset: usize) -> usize {
    content[..offset.min(content.len())]
        .bytes()
        .filter(|&b| b == b'\n')
        .count()
        + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn analyze(name: &str, language: &str, content: &str) -> FileNode {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(name);
        fs::write(&path, content).unwrap();
        analyze_file(&path, language).unwrap()
    }

    #[test]
    fn test_python_function_and_class() {
        let node = analyze(
            "m.py",
            "python",
            "def foo(a, b):\n    \"\"\"Adds.\"\"\"\n    return a + b\n\nclass Widget:\n    def render(self):\n        pass\n",
        );

        let names: Vec<&str> = node.entities.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"foo"));
        assert!(names.contains(&"Widget"));
        assert!(names.contains(&"render"));

        let foo = node.entities.iter().find(|e| e.name == "foo").unwrap();
        assert_eq!(foo.kind, EntityKind::Function);
        assert_eq!(foo.line, 1);
        assert_eq!(foo.docstring.as_deref(), Some("Adds."));
        assert_eq!(foo.signature.as_deref(), Some("def foo(a, b)"));
    }

    #[test]
    fn test_python_imports() {
        let node = analyze(
            "m.py",
            "python",
            "import os\nimport json as j\nfrom a import foo\nfrom .sibling import bar\n",
        );
        assert!(node.imports.contains(&"os".to_string()));
        assert!(node.imports.contains(&"json".to_string()));
        assert!(node.imports.contains(&"a".to_string()));
        assert!(node.imports.contains(&".sibling".to_string()));
    }

    #[test]
    fn test_python_syntax_error_keeps_file() {
        // tree-sitter is error tolerant; even a broken file never panics and
        // the node itself survives.
        let node = analyze("bad.py", "python", "def broken(:\n  ???\n");
        assert_eq!(node.path.ends_with("bad.py"), true);
        assert!(node.line_count > 0);
    }

    #[test]
    fn test_python_complexity_counts_branches() {
        let node = analyze(
            "m.py",
            "python",
            "def branchy(x):\n    if x:\n        for i in x:\n            while i:\n                pass\n",
        );
        let entity = &node.entities[0];
        assert!(entity.complexity_score >= 4.0);
    }

    #[test]
    fn test_javascript_entities_and_imports() {
        let node = analyze(
            "app.js",
            "javascript",
            "import React from 'react';\nimport util from './util';\nconst helper = require('./helper');\n\nexport function render() {}\nconst load = async () => {};\nclass Store {}\n",
        );

        let names: Vec<&str> = node.entities.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"render"));
        assert!(names.contains(&"load"));
        assert!(names.contains(&"Store"));
        assert!(node.imports.contains(&"./util".to_string()));
        assert!(node.imports.contains(&"./helper".to_string()));
        assert!(node.exports.contains(&"render".to_string()));
    }

    #[test]
    fn test_typescript_interface() {
        let node = analyze("t.ts", "typescript", "export interface Props { id: number }\n");
        assert_eq!(node.entities[0].kind, EntityKind::Interface);
        assert_eq!(node.entities[0].name, "Props");
    }

    #[test]
    fn test_rust_heuristics() {
        let node = analyze(
            "lib.rs",
            "rust",
            "use std::io;\n\npub struct Config;\n\npub fn run() {}\n",
        );
        let names: Vec<&str> = node.entities.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"Config"));
        assert!(names.contains(&"run"));
        assert!(node.imports.contains(&"std::io".to_string()));
    }

    #[test]
    fn test_c_include() {
        let node = analyze("main.c", "c", "#include \"util.h\"\n#include <stdio.h>\n");
        assert_eq!(node.imports, vec!["util.h".to_string()]);
    }

    #[test]
    fn test_hash_and_line_count() {
        let node = analyze("m.py", "python", "a = 1\n\nb = 2\n");
        assert_eq!(node.line_count, 2);
        assert_eq!(node.content_hash.len(), 16);

        let same = analyze("m.py", "python", "a = 1\n\nb = 2\n");
        assert_eq!(node.content_hash, same.content_hash);
    }

    #[test]
    fn test_unreadable_file_returns_none() {
        let missing = Path::new("/nonexistent/definitely/not/here.py");
        assert!(analyze_file(missing, "python").is_none());
    }
}
