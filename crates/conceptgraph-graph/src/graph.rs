use crate::{ConceptEdge, EdgeKey};
use conceptgraph_core::{ConceptNode, EdgeId, NodeId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// Outcome of a low-level edge insert. Expected, frequent conditions are
/// values the caller branches on, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeInsert {
    Added(EdgeId),
    /// The unordered pair already has an edge; duplicates are merges.
    Existing(EdgeId),
    /// One or both endpoints are not in the graph.
    MissingEndpoint,
}

/// The canonical in-memory graph: an undirected attributed graph with
/// O(1) node and neighbor lookup.
///
/// The maps are sharded, so concurrent readers may observe a graph
/// mid-mutation. Callers that need a consistent view take a [`snapshot`]
/// first; the analysis layer only ever works on snapshots.
///
/// [`snapshot`]: ConceptGraph::snapshot
#[derive(Debug, Default)]
pub struct ConceptGraph {
    nodes: DashMap<NodeId, ConceptNode>,
    edges: DashMap<EdgeKey, ConceptEdge>,
    adjacency: DashMap<NodeId, HashSet<NodeId>>,
}

impl ConceptGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node. Returns false when the id is already present; nodes
    /// are never overwritten (duplicates go through the merge resolver).
    pub fn add_node(&self, node: ConceptNode) -> bool {
        if self.nodes.contains_key(&node.id) {
            return false;
        }
        self.adjacency.entry(node.id).or_default();
        self.nodes.insert(node.id, node);
        true
    }

    /// Inserts an edge between existing nodes. A missing endpoint is a
    /// rejection value, not an error; an existing pair is reported so the
    /// caller can reinforce instead.
    pub fn add_edge(&self, edge: ConceptEdge) -> EdgeInsert {
        if !self.nodes.contains_key(&edge.source_id) || !self.nodes.contains_key(&edge.target_id) {
            return EdgeInsert::MissingEndpoint;
        }
        let key = edge.key();
        if let Some(existing) = self.edges.get(&key) {
            return EdgeInsert::Existing(existing.id);
        }
        let id = edge.id;
        self.adjacency
            .entry(edge.source_id)
            .or_default()
            .insert(edge.target_id);
        self.adjacency
            .entry(edge.target_id)
            .or_default()
            .insert(edge.source_id);
        self.edges.insert(key, edge);
        EdgeInsert::Added(id)
    }

    pub fn has_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn has_edge(&self, a: NodeId, b: NodeId) -> bool {
        self.edges.contains_key(&EdgeKey::new(a, b))
    }

    pub fn node(&self, id: NodeId) -> Option<ConceptNode> {
        self.nodes.get(&id).map(|n| n.clone())
    }

    pub fn edge_between(&self, a: NodeId, b: NodeId) -> Option<ConceptEdge> {
        self.edges.get(&EdgeKey::new(a, b)).map(|e| e.clone())
    }

    /// Runs a mutation against a node in place. Returns false when the node
    /// is absent.
    pub fn update_node<F: FnOnce(&mut ConceptNode)>(&self, id: NodeId, f: F) -> bool {
        match self.nodes.get_mut(&id) {
            Some(mut node) => {
                f(&mut node);
                true
            }
            None => false,
        }
    }

    /// Runs a mutation against the edge for an unordered pair in place.
    pub fn update_edge<F: FnOnce(&mut ConceptEdge)>(&self, a: NodeId, b: NodeId, f: F) -> bool {
        match self.edges.get_mut(&EdgeKey::new(a, b)) {
            Some(mut edge) => {
                f(&mut edge);
                true
            }
            None => false,
        }
    }

    pub fn neighbors(&self, id: NodeId) -> Vec<NodeId> {
        self.adjacency
            .get(&id)
            .map(|n| n.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn degree(&self, id: NodeId) -> usize {
        self.adjacency.get(&id).map(|n| n.len()).unwrap_or(0)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|entry| *entry.key()).collect()
    }

    pub fn nodes(&self) -> Vec<ConceptNode> {
        self.nodes.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn edges(&self) -> Vec<ConceptEdge> {
        self.edges.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn isolated_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .map(|entry| *entry.key())
            .filter(|id| self.degree(*id) == 0)
            .collect()
    }

    /// Undirected density 2E / (V·(V−1)); 0.0 below two nodes.
    pub fn density(&self) -> f64 {
        let v = self.node_count();
        if v < 2 {
            return 0.0;
        }
        2.0 * self.edge_count() as f64 / (v as f64 * (v as f64 - 1.0))
    }

    /// Loads a persisted graph: nodes first, then edges. Edges whose
    /// endpoints did not load are skipped, not fatal.
    pub fn bulk_load(&self, nodes: Vec<ConceptNode>, edges: Vec<ConceptEdge>) -> (usize, usize) {
        for node in nodes {
            self.add_node(node);
        }
        let mut loaded = 0;
        let mut skipped = 0;
        for edge in edges {
            match self.add_edge(edge) {
                EdgeInsert::Added(_) => loaded += 1,
                EdgeInsert::Existing(_) => skipped += 1,
                EdgeInsert::MissingEndpoint => {
                    skipped += 1;
                }
            }
        }
        if skipped > 0 {
            warn!(skipped, "bulk load skipped edges with missing endpoints or duplicate pairs");
        }
        debug!(
            nodes = self.node_count(),
            edges = self.edge_count(),
            "graph loaded"
        );
        (loaded, skipped)
    }

    /// Copies the current graph into an immutable snapshot so CPU-bound
    /// analysis runs against one consistent view.
    pub fn snapshot(&self) -> GraphSnapshot {
        let nodes: HashMap<NodeId, ConceptNode> = self
            .nodes
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        let edges: Vec<ConceptEdge> =
            self.edges.iter().map(|entry| entry.value().clone()).collect();

        let mut adjacency: HashMap<NodeId, Vec<NodeId>> =
            nodes.keys().map(|id| (*id, Vec::new())).collect();
        for edge in &edges {
            // An edge may race ahead of its endpoints in the shard copy;
            // keep the snapshot internally consistent.
            if !nodes.contains_key(&edge.source_id) || !nodes.contains_key(&edge.target_id) {
                continue;
            }
            adjacency.entry(edge.source_id).or_default().push(edge.target_id);
            adjacency.entry(edge.target_id).or_default().push(edge.source_id);
        }
        GraphSnapshot {
            nodes,
            edges,
            adjacency,
        }
    }

    /// Connected components over current adjacency, BFS per unvisited node.
    pub fn connected_components(&self) -> Vec<Vec<NodeId>> {
        self.snapshot().connected_components()
    }
}

/// An immutable copy of the graph at one instant. All analysis (metrics,
/// clustering, evolution snapshots) reads from this, never the live maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: HashMap<NodeId, ConceptNode>,
    pub edges: Vec<ConceptEdge>,
    pub adjacency: HashMap<NodeId, Vec<NodeId>>,
}

impl GraphSnapshot {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn degree(&self, id: NodeId) -> usize {
        self.adjacency.get(&id).map(|n| n.len()).unwrap_or(0)
    }

    pub fn neighbors(&self, id: NodeId) -> &[NodeId] {
        self.adjacency.get(&id).map(|n| n.as_slice()).unwrap_or(&[])
    }

    pub fn has_edge(&self, a: NodeId, b: NodeId) -> bool {
        self.adjacency
            .get(&a)
            .map(|n| n.contains(&b))
            .unwrap_or(false)
    }

    pub fn density(&self) -> f64 {
        let v = self.node_count();
        if v < 2 {
            return 0.0;
        }
        2.0 * self.edge_count() as f64 / (v as f64 * (v as f64 - 1.0))
    }

    pub fn connected_components(&self) -> Vec<Vec<NodeId>> {
        let mut visited: HashSet<NodeId> = HashSet::with_capacity(self.nodes.len());
        let mut components = Vec::new();

        for &start in self.nodes.keys() {
            if visited.contains(&start) {
                continue;
            }
            let mut component = Vec::new();
            let mut queue = VecDeque::new();
            queue.push_back(start);
            visited.insert(start);

            while let Some(current) = queue.pop_front() {
                component.push(current);
                for &neighbor in self.neighbors(current) {
                    if visited.insert(neighbor) {
                        queue.push_back(neighbor);
                    }
                }
            }
            components.push(component);
        }
        components
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conceptgraph_core::NodeType;

    fn node(label: &str) -> ConceptNode {
        ConceptNode::new(label, NodeType::Concept)
    }

    #[test]
    fn add_edge_rejects_missing_endpoint() {
        let graph = ConceptGraph::new();
        let a = node("a");
        let a_id = a.id;
        graph.add_node(a);

        let ghost = NodeId::new_v4();
        let result = graph.add_edge(ConceptEdge::new(a_id, ghost));
        assert_eq!(result, EdgeInsert::MissingEndpoint);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn one_edge_per_unordered_pair() {
        let graph = ConceptGraph::new();
        let a = node("a");
        let b = node("b");
        let (a_id, b_id) = (a.id, b.id);
        graph.add_node(a);
        graph.add_node(b);

        let first = graph.add_edge(ConceptEdge::new(a_id, b_id));
        assert!(matches!(first, EdgeInsert::Added(_)));
        // Reversed direction maps to the same unordered pair.
        let second = graph.add_edge(ConceptEdge::new(b_id, a_id));
        assert!(matches!(second, EdgeInsert::Existing(_)));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn degree_sum_equals_twice_edge_count() {
        let graph = ConceptGraph::new();
        let ids: Vec<NodeId> = (0..4)
            .map(|i| {
                let n = node(&format!("n{}", i));
                let id = n.id;
                graph.add_node(n);
                id
            })
            .collect();
        graph.add_edge(ConceptEdge::new(ids[0], ids[1]));
        graph.add_edge(ConceptEdge::new(ids[1], ids[2]));
        graph.add_edge(ConceptEdge::new(ids[2], ids[3]));

        let degree_sum: usize = ids.iter().map(|id| graph.degree(*id)).sum();
        assert_eq!(degree_sum, 2 * graph.edge_count());
    }

    #[test]
    fn bulk_load_skips_unloadable_edges() {
        let graph = ConceptGraph::new();
        let a = node("a");
        let b = node("b");
        let (a_id, b_id) = (a.id, b.id);
        let dangling = ConceptEdge::new(a_id, NodeId::new_v4());
        let good = ConceptEdge::new(a_id, b_id);

        let (loaded, skipped) = graph.bulk_load(vec![a, b], vec![good, dangling]);
        assert_eq!(loaded, 1);
        assert_eq!(skipped, 1);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn components_partition_chain_and_isolate() {
        let graph = ConceptGraph::new();
        let a = node("a");
        let b = node("b");
        let c = node("c");
        let lone = node("lone");
        let (a_id, b_id, c_id, lone_id) = (a.id, b.id, c.id, lone.id);
        for n in [a, b, c, lone] {
            graph.add_node(n);
        }
        graph.add_edge(ConceptEdge::new(a_id, b_id));
        graph.add_edge(ConceptEdge::new(b_id, c_id));

        let mut components = graph.connected_components();
        components.sort_by_key(|c| std::cmp::Reverse(c.len()));
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].len(), 3);
        assert_eq!(components[1], vec![lone_id]);

        let all: HashSet<NodeId> = components.into_iter().flatten().collect();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn snapshot_is_detached_from_live_graph() {
        let graph = ConceptGraph::new();
        let a = node("a");
        let b = node("b");
        let (a_id, b_id) = (a.id, b.id);
        graph.add_node(a);
        graph.add_node(b);
        let snap = graph.snapshot();

        graph.add_edge(ConceptEdge::new(a_id, b_id));
        assert_eq!(snap.edge_count(), 0);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn isolated_nodes_reports_degree_zero_only() {
        let graph = ConceptGraph::new();
        let a = node("a");
        let b = node("b");
        let lone = node("lone");
        let (a_id, b_id, lone_id) = (a.id, b.id, lone.id);
        for n in [a, b, lone] {
            graph.add_node(n);
        }
        graph.add_edge(ConceptEdge::new(a_id, b_id));

        assert_eq!(graph.isolated_nodes(), vec![lone_id]);
    }
}
