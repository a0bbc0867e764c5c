//! Knowledge graph construction.
//!
//! `GraphBuilder` walks a project tree, analyzes every supported file,
//! resolves intra-project imports into dependency edges and scores each file
//! for maintenance risk. The populated [`KnowledgeGraph`] owns all files,
//! entities and edges for one project+branch fingerprint.

pub mod context;
pub mod extract;
pub mod imports;
pub mod walker;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{GraphError, Result};
use crate::model::{
    CodeEntity, ComplexityDistribution, DependencyGraph, FileNode, ProjectContext, RelationKind,
};

/// Edge weight for a resolved import.
pub const IMPORTS_STRENGTH: f64 = 0.8;
/// Edge weight for file-owns-entity containment.
pub const CONTAINS_STRENGTH: f64 = 1.0;

/// Per-file risk contributions. Additive and saturating; every threshold is
/// exclusive (`>`, not `>=`). The defaults are configurable rather than
/// derived, there is no documented basis for other values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub large_size_bytes: u64,
    pub long_line_count: usize,
    pub many_entities: usize,
    pub many_imports: usize,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            large_size_bytes: 10_000,
            long_line_count: 500,
            many_entities: 20,
            many_imports: 15,
        }
    }
}

impl RiskThresholds {
    /// Sums the independent contributions and clamps to [0, 1].
    pub fn score(&self, node: &FileNode) -> f64 {
        let mut risk: f64 = 0.0;
        if node.size_bytes > self.large_size_bytes {
            risk += 0.3;
        }
        if node.line_count > self.long_line_count {
            risk += 0.4;
        }
        if node.entities.len() > self.many_entities {
            risk += 0.3;
        }
        if node.imports.len() > self.many_imports {
            risk += 0.2;
        }
        risk.min(1.0)
    }
}

#[derive(Debug, Clone)]
pub struct BuilderConfig {
    pub max_files: usize,
    pub risk: RiskThresholds,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            max_files: 1000,
            risk: RiskThresholds::default(),
        }
    }
}

/// In-memory knowledge graph for one project snapshot. Exclusive owner of
/// its files, entities and dependency edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub project_root: String,
    pub files: HashMap<String, FileNode>,
    /// Entity key -> entity, mirroring the per-file ownership for direct
    /// lookup. Kept in sync by `insert_file` / `remove_file`.
    pub entities: HashMap<String, CodeEntity>,
    pub graph: DependencyGraph,
    pub context: Option<ProjectContext>,
}

impl KnowledgeGraph {
    pub fn new(project_root: impl Into<String>) -> Self {
        Self {
            project_root: project_root.into(),
            files: HashMap::new(),
            entities: HashMap::new(),
            graph: DependencyGraph::new(),
            context: None,
        }
    }

    /// Inserts or replaces a file. Prior entities for the path are
    /// invalidated first, then the new ones are registered and wired with
    /// `contains` edges. Import edges are refreshed separately.
    pub fn insert_file(&mut self, node: FileNode) {
        self.drop_file_entities(&node.path);
        self.graph.add_node(node.path.clone());

        for entity in &node.entities {
            let key = entity.key();
            self.graph
                .add_edge(node.path.clone(), key.clone(), RelationKind::Contains, CONTAINS_STRENGTH);
            self.entities.insert(key, entity.clone());
        }
        self.files.insert(node.path.clone(), node);
    }

    /// Removes a file together with its entities and every incident edge.
    pub fn remove_file(&mut self, path: &str) -> bool {
        if self.files.remove(path).is_none() {
            return false;
        }
        self.drop_file_entities(path);
        self.graph.remove_node(path);
        true
    }

    fn drop_file_entities(&mut self, path: &str) {
        let stale: Vec<String> = self
            .entities
            .iter()
            .filter(|(_, e)| e.file_path == path)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            self.entities.remove(&key);
            self.graph.remove_node(&key);
        }
    }

    /// Re-resolves the file's raw imports against the current file set and
    /// replaces its outgoing `imports` edges.
    pub fn refresh_import_edges(&mut self, path: &str) {
        let known: HashSet<String> = self.files.keys().cloned().collect();
        let Some(node) = self.files.get(path) else {
            return;
        };

        let importer = Path::new(path);
        let targets: Vec<String> = node
            .imports
            .iter()
            .filter_map(|raw| imports::resolve(importer, raw, &known))
            .filter(|target| target != path)
            .collect();

        self.graph.clear_outgoing(path, RelationKind::Imports);
        for target in targets {
            self.graph
                .add_edge(path.to_string(), target, RelationKind::Imports, IMPORTS_STRENGTH);
        }
    }

    /// Files this file imports.
    pub fn dependencies_of(&self, path: &str) -> Vec<String> {
        self.graph
            .successors(path)
            .into_iter()
            .filter(|node| self.files.contains_key(node))
            .collect()
    }

    /// Files that import this file.
    pub fn dependents_of(&self, path: &str) -> Vec<String> {
        self.graph
            .predecessors(path)
            .into_iter()
            .filter(|node| self.files.contains_key(node))
            .collect()
    }

    /// Entities whose name contains `query`.
    pub fn find_entities(&self, query: &str) -> Vec<CodeEntity> {
        self.entities
            .values()
            .filter(|e| e.name.contains(query))
            .cloned()
            .collect()
    }

    /// Blast radius of changing one file: direct importers plus their
    /// importers (two degrees).
    pub fn predict_change_impact(&self, path: &str) -> Result<ImpactAnalysis> {
        if !self.graph.contains_node(path) {
            return Err(GraphError::FileNotFound(path.to_string()));
        }

        let direct = self.dependents_of(path);
        let mut indirect: HashSet<String> = HashSet::new();
        for dependent in &direct {
            for second in self.dependents_of(dependent) {
                if second != path && !direct.contains(&second) {
                    indirect.insert(second);
                }
            }
        }

        let total = direct.len() + indirect.len();
        let risk_level = ImpactLevel::for_count(total);
        let mut indirect: Vec<String> = indirect.into_iter().collect();
        indirect.sort();

        Ok(ImpactAnalysis {
            target_file: path.to_string(),
            direct_impact: direct,
            indirect_impact: indirect,
            total_impact_files: total,
            recommendations: risk_level.recommendations(),
            risk_level,
        })
    }

    /// Recomputes context totals, the complexity histogram and entity usage
    /// counts from the current file set.
    pub fn rebuild_statistics(&mut self) {
        let Self {
            files,
            entities,
            graph,
            context,
            ..
        } = self;

        let mut distribution = ComplexityDistribution::default();
        let mut total_lines = 0usize;
        for (path, node) in files.iter_mut() {
            distribution.record(node.risk_score);
            total_lines += node.line_count;

            // An entity is used as often as its owning file is imported.
            let usage = graph.predecessors(path).len() as u32;
            for entity in &mut node.entities {
                entity.usage_count = usage;
                if let Some(stored) = entities.get_mut(&entity.key()) {
                    stored.usage_count = usage;
                }
            }
        }

        if let Some(ctx) = context {
            ctx.total_files = files.len();
            ctx.total_lines = total_lines;
            ctx.complexity_distribution = distribution;
            ctx.last_analysis = crate::model::now_epoch();
        }
    }

    /// Project summary: context, aggregate statistics, riskiest files and
    /// the entities with the widest fan-in.
    pub fn summary(&self) -> Result<ProjectSummary> {
        let context = self
            .context
            .clone()
            .ok_or_else(|| GraphError::ProjectNotFound(self.project_root.clone()))?;

        let high_risk_files = self.files.values().filter(|f| f.risk_score > 0.7).count();

        let mut ranked: Vec<(&String, &FileNode)> = self.files.iter().collect();
        ranked.sort_by(|a, b| {
            b.1.risk_score
                .partial_cmp(&a.1.risk_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let most_complex_files: Vec<FileRisk> = ranked
            .into_iter()
            .take(10)
            .map(|(path, node)| FileRisk {
                path: path.clone(),
                risk_score: node.risk_score,
            })
            .collect();

        let mut core_entities: Vec<String> = self
            .entities
            .values()
            .filter(|e| e.usage_count > 5)
            .map(|e| e.key())
            .collect();
        core_entities.sort();

        Ok(ProjectSummary {
            statistics: SummaryStatistics {
                total_files: self.files.len(),
                total_entities: self.entities.len(),
                dependency_relationships: self.graph.edge_count(),
                high_risk_files,
            },
            context,
            most_complex_files,
            core_entities,
        })
    }
}

/// Blast-radius severity by affected-file count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
    Extreme,
}

impl ImpactLevel {
    pub fn for_count(impact_files: usize) -> Self {
        if impact_files > 20 {
            ImpactLevel::Extreme
        } else if impact_files > 10 {
            ImpactLevel::High
        } else if impact_files > 5 {
            ImpactLevel::Medium
        } else {
            ImpactLevel::Low
        }
    }

    fn recommendations(self) -> Vec<String> {
        let lines: &[&str] = match self {
            ImpactLevel::Extreme => &[
                "Change touches more than 20 files; stage the rollout",
                "Run the full test suite before merging",
                "Consider a feature flag for release control",
            ],
            ImpactLevel::High => &[
                "Change reaches 10-20 files; add integration coverage",
                "Notify owners of the dependent modules",
            ],
            ImpactLevel::Medium => &["Change reaches 5-10 files; run regression tests for dependents"],
            ImpactLevel::Low => &["Low-risk change; direct review is enough"],
        };
        lines.iter().map(|s| s.to_string()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactAnalysis {
    pub target_file: String,
    pub direct_impact: Vec<String>,
    pub indirect_impact: Vec<String>,
    pub total_impact_files: usize,
    pub risk_level: ImpactLevel,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRisk {
    pub path: String,
    pub risk_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryStatistics {
    pub total_files: usize,
    pub total_entities: usize,
    pub dependency_relationships: usize,
    pub high_risk_files: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub context: ProjectContext,
    pub statistics: SummaryStatistics,
    pub most_complex_files: Vec<FileRisk>,
    pub core_entities: Vec<String>,
}

/// Drives the full and partial analysis passes for one project root.
pub struct GraphBuilder {
    root: PathBuf,
    config: BuilderConfig,
}

impl GraphBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config: BuilderConfig::default(),
        }
    }

    pub fn with_config(root: impl Into<PathBuf>, config: BuilderConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full analysis: context detection, discovery, per-file analysis,
    /// import resolution and statistics rollup.
    pub fn analyze(&self, max_files: usize) -> Result<KnowledgeGraph> {
        if !self.root.is_dir() {
            return Err(GraphError::ProjectNotFound(self.root.display().to_string()));
        }

        let mut graph = KnowledgeGraph::new(self.root.display().to_string());
        graph.context = Some(context::detect(&self.root));

        let discovered = walker::discover(&self.root, max_files);
        info!(
            "analyzing {} files under {}",
            discovered.len(),
            self.root.display()
        );

        for path in &discovered {
            if let Some(node) = self.analyze_single_file(path) {
                graph.insert_file(node);
            }
        }

        let paths: Vec<String> = graph.files.keys().cloned().collect();
        for path in &paths {
            graph.refresh_import_edges(path);
        }

        graph.rebuild_statistics();
        Ok(graph)
    }

    /// Analyzes one file, including its risk score. Unsupported or
    /// unreadable files yield `None`; this never fails the caller.
    pub fn analyze_single_file(&self, path: &Path) -> Option<FileNode> {
        let language = walker::language_for_path(path)?;
        let mut node = extract::analyze_file(path, language)?;
        node.risk_score = self.config.risk.score(&node);
        debug!(
            "analyzed {} ({} entities, risk {:.2})",
            node.path,
            node.entities.len(),
            node.risk_score
        );
        Some(node)
    }

    /// Partial re-analysis restricted to `paths` (absolute or relative to
    /// the project root). The existing context is reused; only touched files
    /// get fresh import edges.
    pub fn analyze_changed(&self, graph: &mut KnowledgeGraph, paths: &[PathBuf]) -> usize {
        let mut touched = Vec::new();
        for path in paths {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                self.root.join(path)
            };
            if let Some(node) = self.analyze_single_file(&path) {
                let key = node.path.clone();
                graph.insert_file(node);
                touched.push(key);
            }
        }

        for path in &touched {
            graph.refresh_import_edges(path);
        }

        if graph.context.is_none() {
            graph.context = Some(context::detect(&self.root));
        }
        graph.rebuild_statistics();
        touched.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn file_node_with(size: u64, lines: usize, entity_count: usize, import_count: usize) -> FileNode {
        let mut node = FileNode::new("/p/big.py", "python");
        node.size_bytes = size;
        node.line_count = lines;
        for i in 0..entity_count {
            node.entities.push(CodeEntity::new(
                format!("e{}", i),
                crate::model::EntityKind::Function,
                "/p/big.py",
                i + 1,
            ));
        }
        node.imports = (0..import_count).map(|i| format!("m{}", i)).collect();
        node
    }

    #[test]
    fn test_risk_score_saturates() {
        let thresholds = RiskThresholds::default();
        // All four contributions: 0.3 + 0.4 + 0.3 + 0.2, clamped.
        let node = file_node_with(10_500, 520, 21, 16);
        assert_eq!(thresholds.score(&node), 1.0);
    }

    #[test]
    fn test_risk_thresholds_are_exclusive() {
        let thresholds = RiskThresholds::default();
        // Exactly at every threshold contributes nothing.
        let node = file_node_with(10_000, 500, 20, 15);
        assert_eq!(thresholds.score(&node), 0.0);
    }

    #[test]
    fn test_risk_partial_contributions() {
        let thresholds = RiskThresholds::default();
        let node = file_node_with(10_001, 501, 0, 0);
        assert!((thresholds.score(&node) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_analyze_two_file_project() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.py"), "def foo(): pass\n").unwrap();
        fs::write(temp_dir.path().join("b.py"), "from a import foo\n").unwrap();

        let builder = GraphBuilder::new(temp_dir.path());
        let graph = builder.analyze(100).unwrap();

        assert_eq!(graph.files.len(), 2);
        let a_path = temp_dir.path().join("a.py").display().to_string();
        let b_path = temp_dir.path().join("b.py").display().to_string();
        assert!(graph.entities.contains_key(&format!("{}:foo", a_path)));

        let relations = graph.graph.relations();
        let import_edges: Vec<_> = relations
            .iter()
            .filter(|r| r.kind == RelationKind::Imports)
            .collect();
        assert_eq!(import_edges.len(), 1);
        assert_eq!(import_edges[0].from, b_path);
        assert_eq!(import_edges[0].to, a_path);
        assert_eq!(import_edges[0].strength, IMPORTS_STRENGTH);
    }

    #[test]
    fn test_histogram_sums_to_total_files() {
        let temp_dir = TempDir::new().unwrap();
        for i in 0..5 {
            fs::write(
                temp_dir.path().join(format!("m{}.py", i)),
                "def f(): pass\n",
            )
            .unwrap();
        }

        let builder = GraphBuilder::new(temp_dir.path());
        let graph = builder.analyze(100).unwrap();
        let context = graph.context.as_ref().unwrap();

        assert_eq!(context.total_files, 5);
        assert_eq!(context.complexity_distribution.total(), context.total_files);
    }

    #[test]
    fn test_remove_file_drops_entities_and_edges() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.py"), "def foo(): pass\n").unwrap();
        fs::write(temp_dir.path().join("b.py"), "from a import foo\n").unwrap();

        let builder = GraphBuilder::new(temp_dir.path());
        let mut graph = builder.analyze(100).unwrap();
        let a_path = temp_dir.path().join("a.py").display().to_string();

        assert!(graph.remove_file(&a_path));
        assert!(!graph.files.contains_key(&a_path));
        assert!(!graph.entities.contains_key(&format!("{}:foo", a_path)));
        assert!(!graph.graph.contains_node(&a_path));
        // Second removal is a no-op.
        assert!(!graph.remove_file(&a_path));
    }

    #[test]
    fn test_insert_file_replaces_prior_entities() {
        let mut graph = KnowledgeGraph::new("/p");

        let mut first = FileNode::new("/p/a.py", "python");
        first
            .entities
            .push(CodeEntity::new("old", crate::model::EntityKind::Function, "/p/a.py", 1));
        graph.insert_file(first);
        assert!(graph.entities.contains_key("/p/a.py:old"));

        let mut second = FileNode::new("/p/a.py", "python");
        second
            .entities
            .push(CodeEntity::new("new", crate::model::EntityKind::Function, "/p/a.py", 1));
        graph.insert_file(second);

        assert!(!graph.entities.contains_key("/p/a.py:old"));
        assert!(graph.entities.contains_key("/p/a.py:new"));
        assert!(!graph.graph.contains_node("/p/a.py:old"));
    }

    #[test]
    fn test_impact_analysis_levels() {
        assert_eq!(ImpactLevel::for_count(0), ImpactLevel::Low);
        assert_eq!(ImpactLevel::for_count(5), ImpactLevel::Low);
        assert_eq!(ImpactLevel::for_count(6), ImpactLevel::Medium);
        assert_eq!(ImpactLevel::for_count(11), ImpactLevel::High);
        assert_eq!(ImpactLevel::for_count(21), ImpactLevel::Extreme);
    }

    #[test]
    fn test_predict_change_impact() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("core.py"), "def api(): pass\n").unwrap();
        fs::write(temp_dir.path().join("user1.py"), "from core import api\n").unwrap();
        fs::write(temp_dir.path().join("user2.py"), "from core import api\n").unwrap();

        let builder = GraphBuilder::new(temp_dir.path());
        let graph = builder.analyze(100).unwrap();
        let core = temp_dir.path().join("core.py").display().to_string();

        let impact = graph.predict_change_impact(&core).unwrap();
        assert_eq!(impact.direct_impact.len(), 2);
        assert_eq!(impact.total_impact_files, 2);
        assert_eq!(impact.risk_level, ImpactLevel::Low);

        assert!(graph.predict_change_impact("/nope.py").is_err());
    }

    #[test]
    fn test_analyze_changed_updates_single_file() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.py");
        fs::write(&a, "def foo(): pass\n").unwrap();

        let builder = GraphBuilder::new(temp_dir.path());
        let mut graph = builder.analyze(100).unwrap();

        fs::write(&a, "def foo(): pass\n\ndef bar(): pass\n").unwrap();
        let updated = builder.analyze_changed(&mut graph, &[a.clone()]);

        assert_eq!(updated, 1);
        let a_path = a.display().to_string();
        assert!(graph.entities.contains_key(&format!("{}:bar", a_path)));
        assert_eq!(graph.files[&a_path].entities.len(), 2);
    }

    #[test]
    fn test_missing_root_is_error() {
        let builder = GraphBuilder::new("/definitely/not/a/project");
        assert!(builder.analyze(10).is_err());
    }
}
