//! Plain records describing a project's knowledge graph: files, code
//! entities, dependency relations and per-project context.

pub mod graph;

use serde::{Deserialize, Serialize};

pub use graph::DependencyGraph;

/// Kind of code construct extracted from a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Function,
    Class,
    Variable,
    Import,
    Interface,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Function => "function",
            EntityKind::Class => "class",
            EntityKind::Variable => "variable",
            EntityKind::Import => "import",
            EntityKind::Interface => "interface",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "function" => Some(EntityKind::Function),
            "class" => Some(EntityKind::Class),
            "variable" => Some(EntityKind::Variable),
            "import" => Some(EntityKind::Import),
            "interface" => Some(EntityKind::Interface),
            _ => None,
        }
    }
}

/// A named code construct (function, class, ...) owned by a file.
///
/// Identity key is `(file_path, name)`; entities are replaced wholesale
/// whenever their owning file is re-analyzed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeEntity {
    pub name: String,
    pub kind: EntityKind,
    pub file_path: String,
    pub line: usize,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub complexity_score: f64,
    pub usage_count: u32,
    /// Epoch seconds of the last observed modification.
    pub last_modified: i64,
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
}

impl CodeEntity {
    pub fn new(
        name: impl Into<String>,
        kind: EntityKind,
        file_path: impl Into<String>,
        line: usize,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            file_path: file_path.into(),
            line,
            signature: None,
            docstring: None,
            complexity_score: 0.0,
            usage_count: 0,
            last_modified: now_epoch(),
            dependencies: Vec::new(),
            dependents: Vec::new(),
        }
    }

    /// Stable identity key: `<file_path>:<name>`.
    pub fn key(&self) -> String {
        entity_key(&self.file_path, &self.name)
    }
}

/// Builds the identity key used for entity graph nodes and lookups.
pub fn entity_key(file_path: &str, name: &str) -> String {
    format!("{}:{}", file_path, name)
}

/// One analyzed source file. Owns the entities extracted from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileNode {
    pub path: String,
    pub language: String,
    pub size_bytes: u64,
    /// Non-blank lines.
    pub line_count: usize,
    pub last_modified: i64,
    /// xxh3 hex digest of the file content. Changes iff content changes.
    pub content_hash: String,
    /// Raw import targets as written in the source, unresolved.
    pub imports: Vec<String>,
    pub exports: Vec<String>,
    pub entities: Vec<CodeEntity>,
    /// Heuristic maintenance-hazard estimate in [0, 1].
    pub risk_score: f64,
    pub change_frequency: u32,
}

impl FileNode {
    pub fn new(path: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            language: language.into(),
            size_bytes: 0,
            line_count: 0,
            last_modified: now_epoch(),
            content_hash: String::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            entities: Vec::new(),
            risk_score: 0.0,
            change_frequency: 0,
        }
    }
}

/// Counts of files per risk bucket. Thresholds: < 0.3 low, < 0.6 medium,
/// < 0.8 high, else extreme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityDistribution {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub extreme: usize,
}

impl ComplexityDistribution {
    pub fn record(&mut self, risk_score: f64) {
        if risk_score < 0.3 {
            self.low += 1;
        } else if risk_score < 0.6 {
            self.medium += 1;
        } else if risk_score < 0.8 {
            self.high += 1;
        } else {
            self.extreme += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.low + self.medium + self.high + self.extreme
    }
}

/// Detected high-level facts about one project analysis.
///
/// `version` carries `branch#commit8` when the analysis was made through the
/// branch layer and drives its staleness checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectContext {
    pub project_root: String,
    pub project_name: String,
    pub framework: String,
    pub main_language: String,
    pub architecture: String,
    pub build_system: String,
    pub package_manager: String,
    pub version: String,
    pub last_analysis: i64,
    pub total_files: usize,
    pub total_lines: usize,
    pub complexity_distribution: ComplexityDistribution,
}

impl ProjectContext {
    pub fn new(project_root: impl Into<String>, project_name: impl Into<String>) -> Self {
        Self {
            project_root: project_root.into(),
            project_name: project_name.into(),
            framework: "unknown".into(),
            main_language: "unknown".into(),
            architecture: "unknown".into(),
            build_system: "unknown".into(),
            package_manager: "unknown".into(),
            version: "0.0.0".into(),
            last_analysis: now_epoch(),
            total_files: 0,
            total_lines: 0,
            complexity_distribution: ComplexityDistribution::default(),
        }
    }
}

/// Kind of dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Imports,
    Contains,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Imports => "imports",
            RelationKind::Contains => "contains",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "imports" => Some(RelationKind::Imports),
            "contains" => Some(RelationKind::Contains),
            _ => None,
        }
    }
}

/// One directed dependency edge between two graph nodes (file paths or
/// entity keys), with a strength weight in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyRelation {
    pub from: String,
    pub to: String,
    pub kind: RelationKind,
    pub strength: f64,
}

/// Current time as epoch seconds.
pub fn now_epoch() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_key() {
        let entity = CodeEntity::new("foo", EntityKind::Function, "/p/a.py", 3);
        assert_eq!(entity.key(), "/p/a.py:foo");
    }

    #[test]
    fn test_entity_kind_roundtrip() {
        for kind in [
            EntityKind::Function,
            EntityKind::Class,
            EntityKind::Variable,
            EntityKind::Import,
            EntityKind::Interface,
        ] {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::parse("module"), None);
    }

    #[test]
    fn test_complexity_distribution_buckets() {
        let mut dist = ComplexityDistribution::default();
        dist.record(0.0);
        dist.record(0.29);
        dist.record(0.3);
        dist.record(0.59);
        dist.record(0.6);
        dist.record(0.79);
        dist.record(0.8);
        dist.record(1.0);

        assert_eq!(dist.low, 2);
        assert_eq!(dist.medium, 2);
        assert_eq!(dist.high, 2);
        assert_eq!(dist.extreme, 2);
        assert_eq!(dist.total(), 8);
    }

    #[test]
    fn test_relation_kind_roundtrip() {
        assert_eq!(RelationKind::parse("imports"), Some(RelationKind::Imports));
        assert_eq!(RelationKind::parse("contains"), Some(RelationKind::Contains));
        assert_eq!(RelationKind::parse("calls"), None);
    }

    #[test]
    fn test_project_context_serialization() {
        let ctx = ProjectContext::new("/tmp/demo", "demo");
        let json = serde_json::to_string(&ctx).unwrap();
        let parsed: ProjectContext = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.project_name, "demo");
        assert_eq!(parsed.framework, "unknown");
    }
}
