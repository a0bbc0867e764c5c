//! Project context detection heuristics.
//!
//! Everything here is best-effort pattern inspection of well-known manifest
//! files and directory names; none of it parses a manifest beyond what a
//! field lookup or a regex can answer.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::builder::walker;
use crate::model::ProjectContext;

static TOML_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"version\s*=\s*["']([^"']+)["']"#).unwrap());

/// Detects framework, language, architecture, build system, package manager
/// and version for the project at `root`.
pub fn detect(root: &Path) -> ProjectContext {
    let project_name = root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();

    let mut context = ProjectContext::new(root.display().to_string(), project_name);
    context.framework = detect_framework(root);
    context.main_language = detect_main_language(root);
    context.architecture = detect_architecture(root);
    context.build_system = detect_build_system(root);
    context.package_manager = detect_package_manager(root);
    context.version = detect_version(root);
    context
}

fn detect_framework(root: &Path) -> String {
    // package.json dependency scan first: the npm ecosystem hides the
    // framework in dependencies rather than marker files.
    if let Ok(content) = std::fs::read_to_string(root.join("package.json")) {
        if let Ok(manifest) = serde_json::from_str::<serde_json::Value>(&content) {
            let mut deps: Vec<String> = Vec::new();
            for section in ["dependencies", "devDependencies"] {
                if let Some(map) = manifest.get(section).and_then(|v| v.as_object()) {
                    deps.extend(map.keys().cloned());
                }
            }
            let has = |name: &str| deps.iter().any(|d| d == name);
            if has("next") {
                return "next".into();
            }
            if has("react") {
                return "react".into();
            }
            if has("vue") || has("@vue/core") {
                return "vue".into();
            }
            if has("@angular/core") {
                return "angular".into();
            }
            if has("express") {
                return "express".into();
            }
            return "node".into();
        }
    }

    if root.join("requirements.txt").exists() || root.join("pyproject.toml").exists() {
        return "python".into();
    }
    if root.join("pom.xml").exists() {
        return "spring".into();
    }
    if root.join("go.mod").exists() {
        return "go".into();
    }
    if root.join("Cargo.toml").exists() {
        return "rust".into();
    }

    "unknown".into()
}

/// Majority vote over supported file extensions.
fn detect_main_language(root: &Path) -> String {
    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    for path in walker::discover(root, 10_000) {
        if let Some(language) = walker::language_for_path(&path) {
            *counts.entry(language).or_insert(0) += 1;
        }
    }

    counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(language, _)| language.to_string())
        .unwrap_or_else(|| "unknown".into())
}

fn detect_architecture(root: &Path) -> String {
    let dirs: Vec<String> = std::fs::read_dir(root)
        .map(|entries| {
            entries
                .flatten()
                .filter(|e| e.path().is_dir())
                .filter_map(|e| e.file_name().to_str().map(|s| s.to_lowercase()))
                .collect()
        })
        .unwrap_or_default();
    let has = |name: &str| dirs.iter().any(|d| d == name);

    if has("packages") || has("apps") {
        "monorepo".into()
    } else if has("src") && (has("components") || has("views")) {
        "spa".into()
    } else if has("controllers") && has("models") && has("views") {
        "mvc".into()
    } else if has("services") && has("repositories") {
        "layered".into()
    } else {
        "unknown".into()
    }
}

fn detect_build_system(root: &Path) -> String {
    if root.join("webpack.config.js").exists() {
        "webpack".into()
    } else if root.join("vite.config.js").exists() || root.join("vite.config.ts").exists() {
        "vite".into()
    } else if root.join("pom.xml").exists() {
        "maven".into()
    } else if root.join("build.gradle").exists() {
        "gradle".into()
    } else if root.join("Cargo.toml").exists() {
        "cargo".into()
    } else if root.join("Makefile").exists() {
        "make".into()
    } else {
        "unknown".into()
    }
}

fn detect_package_manager(root: &Path) -> String {
    if root.join("yarn.lock").exists() {
        "yarn".into()
    } else if root.join("package-lock.json").exists() {
        "npm".into()
    } else if root.join("pnpm-lock.yaml").exists() {
        "pnpm".into()
    } else if root.join("Cargo.lock").exists() {
        "cargo".into()
    } else if root.join("requirements.txt").exists() {
        "pip".into()
    } else if root.join("Pipfile").exists() {
        "pipenv".into()
    } else {
        "unknown".into()
    }
}

fn detect_version(root: &Path) -> String {
    if let Ok(content) = std::fs::read_to_string(root.join("package.json")) {
        if let Ok(manifest) = serde_json::from_str::<serde_json::Value>(&content) {
            if let Some(version) = manifest.get("version").and_then(|v| v.as_str()) {
                return version.to_string();
            }
        }
    }

    for manifest in ["pyproject.toml", "Cargo.toml"] {
        if let Ok(content) = std::fs::read_to_string(root.join(manifest)) {
            if let Some(captures) = TOML_VERSION_RE.captures(&content) {
                return captures[1].to_string();
            }
        }
    }

    "0.0.0".into()
}
