pub mod branch;
pub mod builder;
pub mod error;
pub mod git;
pub mod memory;
pub mod model;
pub mod update;

pub use branch::{
    BranchAnalysis, BranchComparison, BranchContext, BranchGraphManager, BranchInfo, BranchType,
    SwitchOutcome,
};
pub use builder::{
    BuilderConfig, GraphBuilder, ImpactAnalysis, ImpactLevel, KnowledgeGraph, ProjectSummary,
    RiskThresholds,
};
pub use error::{GraphError, Result};
pub use git::{CommitInfo, GitRepo};
pub use memory::{MemoryManager, ProjectId, StorageStats};
pub use model::{
    CodeEntity, ComplexityDistribution, DependencyGraph, DependencyRelation, EntityKind, FileNode,
    ProjectContext, RelationKind,
};
pub use update::{
    ForceUpdateReport, IncrementalUpdater, UpdateReport, UpdaterConfig, UpdaterStatus,
};
