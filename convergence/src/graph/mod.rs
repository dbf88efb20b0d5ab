//! Relationship Graph — which processors have become informationally linked.
//!
//! Directed graph over processor names, backed by a petgraph arena of
//! integer-indexed nodes plus an edge list (no pointer cycles, cheap to
//! snapshot for observers). Nodes are created lazily on first participation.
//! Edges are only touched during the current iteration's link formation, and
//! the whole graph lives and dies with one query's run state.

use std::collections::{BTreeSet, HashMap};

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

/// An informational link from a winning processor to a related one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Iteration the link was first formed in. Re-evidencing an existing
    /// link refreshes its weight but keeps this.
    pub formed_at_iteration: u32,
    /// Strength, from the similarity evidence that formed the link.
    pub weight: f64,
}

/// One endpoint-to-endpoint change produced by link formation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkChange {
    pub from: String,
    pub to: String,
    pub weight: f64,
}

/// The explicit `(added, removed)` delta of one iteration's link formation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkDelta {
    pub added: Vec<LinkChange>,
    pub removed: Vec<LinkChange>,
}

impl LinkDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Every processor touched by an added or removed link, sorted.
    /// These are the processors whose context gets fused for next iteration.
    pub fn dirty_processors(&self) -> BTreeSet<String> {
        self.added
            .iter()
            .chain(self.removed.iter())
            .flat_map(|change| [change.from.clone(), change.to.clone()])
            .collect()
    }
}

/// The mutable relationship graph for one run.
#[derive(Debug, Default)]
pub struct RelationshipGraph {
    graph: StableDiGraph<String, Link>,
    index: HashMap<String, NodeIndex>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node for `name`, created lazily on first participation.
    pub fn ensure_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn link_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn has_link(&self, from: &str, to: &str) -> bool {
        self.link(from, to).is_some()
    }

    pub fn link(&self, from: &str, to: &str) -> Option<Link> {
        let a = *self.index.get(from)?;
        let b = *self.index.get(to)?;
        let edge = self.graph.find_edge(a, b)?;
        self.graph.edge_weight(edge).copied()
    }

    /// Add or refresh the link `from → to`. Returns `true` when the link is
    /// newly formed; an existing link keeps its formation iteration and only
    /// has its weight updated.
    pub fn upsert_link(&mut self, from: &str, to: &str, weight: f64, iteration: u32) -> bool {
        let a = self.ensure_node(from);
        let b = self.ensure_node(to);
        if let Some(edge) = self.graph.find_edge(a, b) {
            if let Some(link) = self.graph.edge_weight_mut(edge) {
                link.weight = weight;
            }
            false
        } else {
            self.graph.add_edge(
                a,
                b,
                Link {
                    formed_at_iteration: iteration,
                    weight,
                },
            );
            true
        }
    }

    pub fn remove_link(&mut self, from: &str, to: &str) -> Option<Link> {
        let a = *self.index.get(from)?;
        let b = *self.index.get(to)?;
        let edge = self.graph.find_edge(a, b)?;
        self.graph.remove_edge(edge)
    }

    /// Outgoing links of `name`, sorted by target for reproducible walks.
    pub fn links_from(&self, name: &str) -> Vec<(String, Link)> {
        let Some(&idx) = self.index.get(name) else {
            return Vec::new();
        };
        let mut links: Vec<(String, Link)> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .filter_map(|edge| {
                self.graph
                    .node_weight(edge.target())
                    .map(|target| (target.clone(), *edge.weight()))
            })
            .collect();
        links.sort_by(|a, b| a.0.cmp(&b.0));
        links
    }

    /// Linked peers of `name` regardless of direction, sorted and deduped.
    /// Fusion combines a dirty processor's gist with these.
    pub fn neighbors(&self, name: &str) -> Vec<String> {
        let Some(&idx) = self.index.get(name) else {
            return Vec::new();
        };
        let mut names: Vec<String> = self
            .graph
            .neighbors_undirected(idx)
            .filter_map(|n| self.graph.node_weight(n).cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// All node names, sorted.
    pub fn node_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.index.keys().cloned().collect();
        names.sort();
        names
    }
}
