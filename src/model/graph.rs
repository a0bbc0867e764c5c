//! Directed dependency graph over file paths and entity keys.
//!
//! Adjacency lists with a reverse index, so successor and predecessor
//! queries are plain map lookups. Edges carry a relation kind and a
//! strength weight.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{DependencyRelation, RelationKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Edge {
    to: String,
    kind: RelationKind,
    strength: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
    nodes: HashSet<String>,
    /// node -> outgoing edges
    edges: HashMap<String, Vec<Edge>>,
    /// node -> incoming edge sources
    incoming: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: impl Into<String>) {
        self.nodes.insert(id.into());
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// Adds a directed edge, creating missing endpoint nodes. A second edge
    /// with the same endpoints and kind replaces the stored strength.
    pub fn add_edge(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        kind: RelationKind,
        strength: f64,
    ) {
        let from = from.into();
        let to = to.into();
        self.nodes.insert(from.clone());
        self.nodes.insert(to.clone());

        let out = self.edges.entry(from.clone()).or_default();
        if let Some(existing) = out.iter_mut().find(|e| e.to == to && e.kind == kind) {
            existing.strength = strength;
            return;
        }
        out.push(Edge {
            to: to.clone(),
            kind,
            strength,
        });
        self.incoming.entry(to).or_default().push(from);
    }

    /// Node ids this node points at.
    pub fn successors(&self, id: &str) -> Vec<String> {
        self.edges
            .get(id)
            .map(|out| out.iter().map(|e| e.to.clone()).collect())
            .unwrap_or_default()
    }

    /// Node ids pointing at this node.
    pub fn predecessors(&self, id: &str) -> Vec<String> {
        self.incoming.get(id).cloned().unwrap_or_default()
    }

    /// Removes a node together with all of its incident edges.
    pub fn remove_node(&mut self, id: &str) {
        if !self.nodes.remove(id) {
            return;
        }
        // Outgoing edges: unregister us from each target's incoming list.
        if let Some(out) = self.edges.remove(id) {
            for edge in out {
                if let Some(sources) = self.incoming.get_mut(&edge.to) {
                    sources.retain(|s| s != id);
                }
            }
        }
        // Incoming edges: drop the edge from each source's outgoing list.
        if let Some(sources) = self.incoming.remove(id) {
            for source in sources {
                if let Some(out) = self.edges.get_mut(&source) {
                    out.retain(|e| e.to != id);
                }
            }
        }
    }

    /// Drops every outgoing edge of `id` with the given kind, keeping the
    /// node itself. Used when a file's imports are re-resolved in place.
    pub fn clear_outgoing(&mut self, id: &str, kind: RelationKind) {
        let Some(out) = self.edges.get_mut(id) else {
            return;
        };
        let removed: Vec<String> = out
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.to.clone())
            .collect();
        out.retain(|e| e.kind != kind);
        for to in removed {
            if let Some(sources) = self.incoming.get_mut(&to) {
                // Only one occurrence per (from, to, kind); other kinds from
                // the same source keep their own incoming entry.
                if let Some(pos) = sources.iter().position(|s| s == id) {
                    sources.remove(pos);
                }
            }
        }
    }

    /// All edges as flat relation records.
    pub fn relations(&self) -> Vec<DependencyRelation> {
        let mut relations = Vec::with_capacity(self.edge_count());
        for (from, out) in &self.edges {
            for edge in out {
                relations.push(DependencyRelation {
                    from: from.clone(),
                    to: edge.to.clone(),
                    kind: edge.kind,
                    strength: edge.strength,
                });
            }
        }
        relations
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.incoming.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_edge_creates_nodes() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "b", RelationKind::Imports, 0.8);

        assert!(graph.contains_node("a"));
        assert!(graph.contains_node("b"));
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.successors("a"), vec!["b".to_string()]);
        assert_eq!(graph.predecessors("b"), vec!["a".to_string()]);
    }

    #[test]
    fn test_duplicate_edge_updates_strength() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "b", RelationKind::Imports, 0.5);
        graph.add_edge("a", "b", RelationKind::Imports, 0.8);

        assert_eq!(graph.edge_count(), 1);
        let relations = graph.relations();
        assert_eq!(relations[0].strength, 0.8);
    }

    #[test]
    fn test_remove_node_drops_incident_edges() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "b", RelationKind::Imports, 0.8);
        graph.add_edge("b", "c", RelationKind::Imports, 0.8);
        graph.add_edge("c", "a", RelationKind::Imports, 0.8);

        graph.remove_node("b");

        assert!(!graph.contains_node("b"));
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.successors("a").is_empty());
        assert!(graph.predecessors("c").is_empty());
        assert_eq!(graph.successors("c"), vec!["a".to_string()]);
    }

    #[test]
    fn test_clear_outgoing_keeps_other_kinds() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("f", "g", RelationKind::Imports, 0.8);
        graph.add_edge("f", "f:ent", RelationKind::Contains, 1.0);

        graph.clear_outgoing("f", RelationKind::Imports);

        assert_eq!(graph.edge_count(), 1);
        assert!(graph.predecessors("g").is_empty());
        assert_eq!(graph.predecessors("f:ent"), vec!["f".to_string()]);
    }

    #[test]
    fn test_remove_missing_node_is_noop() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "b", RelationKind::Imports, 0.8);
        graph.remove_node("missing");
        assert_eq!(graph.edge_count(), 1);
    }
}
