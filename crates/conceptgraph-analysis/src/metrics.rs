use conceptgraph_graph::GraphSnapshot;
use conceptgraph_core::NodeId;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

const POWER_ITERATION_ROUNDS: usize = 100;
const POWER_ITERATION_EPSILON: f64 = 1e-6;
const TOP_NODE_LIMIT: usize = 5;

/// A high-degree, high-influence node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubNode {
    pub id: NodeId,
    pub degree: usize,
    pub influence: f64,
}

/// A node sitting on many shortest paths. `communities` is the neighbor
/// count, a cheap proxy for how many regions the node touches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgingNode {
    pub id: NodeId,
    pub communities: usize,
    pub betweenness: f64,
}

/// Power-law characterization of the degree distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleFreeness {
    pub power_law_exponent: f64,
    pub fit_quality: f64,
    pub hub_nodes: Vec<HubNode>,
    pub bridging_nodes: Vec<BridgingNode>,
}

impl ScaleFreeness {
    pub fn empty() -> Self {
        Self {
            power_law_exponent: 0.0,
            fit_quality: 0.0,
            hub_nodes: Vec::new(),
            bridging_nodes: Vec::new(),
        }
    }
}

/// Full structural-metrics report over one graph snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMetrics {
    pub betweenness: HashMap<NodeId, f64>,
    pub eigenvector: HashMap<NodeId, f64>,
    pub degree: HashMap<NodeId, usize>,
    pub scale_freeness: ScaleFreeness,
}

impl GraphMetrics {
    pub fn empty() -> Self {
        Self {
            betweenness: HashMap::new(),
            eigenvector: HashMap::new(),
            degree: HashMap::new(),
            scale_freeness: ScaleFreeness::empty(),
        }
    }
}

/// Centrality and scale-free analysis. Every method takes an immutable
/// snapshot; nothing here ever touches the live graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsEngine;

/// Contiguous indexing over a snapshot's node set, shared by the
/// traversal-heavy algorithms.
struct Indexed {
    ids: Vec<NodeId>,
    adjacency: Vec<Vec<usize>>,
}

impl Indexed {
    fn new(snapshot: &GraphSnapshot) -> Self {
        let ids: Vec<NodeId> = snapshot.nodes.keys().copied().collect();
        let index: HashMap<NodeId, usize> =
            ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let adjacency = ids
            .iter()
            .map(|id| {
                snapshot
                    .neighbors(*id)
                    .iter()
                    .filter_map(|n| index.get(n).copied())
                    .collect()
            })
            .collect();
        Self { ids, adjacency }
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

impl MetricsEngine {
    pub fn new() -> Self {
        Self
    }

    /// Assembles the full metrics report. Empty graphs short-circuit to the
    /// all-empty value.
    pub fn compute(&self, snapshot: &GraphSnapshot) -> GraphMetrics {
        if snapshot.node_count() == 0 {
            return GraphMetrics::empty();
        }

        let degree = self.degree_centrality(snapshot);
        let betweenness = self.betweenness_centrality(snapshot);
        let eigenvector = self.eigenvector_centrality(snapshot);
        let (power_law_exponent, fit_quality) = self.scale_free_fit(snapshot);
        let hub_nodes = self.hub_nodes(snapshot, &degree, &eigenvector);
        let bridging_nodes = self.bridging_nodes(snapshot, &betweenness);

        debug!(
            nodes = snapshot.node_count(),
            edges = snapshot.edge_count(),
            exponent = power_law_exponent,
            "computed graph metrics"
        );

        GraphMetrics {
            betweenness,
            eigenvector,
            degree,
            scale_freeness: ScaleFreeness {
                power_law_exponent,
                fit_quality,
                hub_nodes,
                bridging_nodes,
            },
        }
    }

    pub fn degree_centrality(&self, snapshot: &GraphSnapshot) -> HashMap<NodeId, usize> {
        snapshot
            .nodes
            .keys()
            .map(|id| (*id, snapshot.degree(*id)))
            .collect()
    }

    /// Betweenness centrality via Brandes' algorithm: one BFS plus
    /// dependency accumulation per source, O(V·E) overall on unweighted
    /// graphs. Sources are processed in parallel and their contributions
    /// summed.
    pub fn betweenness_centrality(&self, snapshot: &GraphSnapshot) -> HashMap<NodeId, f64> {
        let indexed = Indexed::new(snapshot);
        let n = indexed.len();
        if n == 0 {
            return HashMap::new();
        }

        let totals: Vec<f64> = (0..n)
            .into_par_iter()
            .map(|source| brandes_single_source(&indexed.adjacency, source))
            .reduce(
                || vec![0.0; n],
                |mut acc, partial| {
                    for (a, p) in acc.iter_mut().zip(partial) {
                        *a += p;
                    }
                    acc
                },
            );

        // Each undirected path is discovered from both endpoints.
        let mut scale = 0.5;
        if n > 2 {
            // Standard normalization to [0,1] over possible pairs.
            scale /= ((n - 1) * (n - 2)) as f64 / 2.0;
        }

        indexed
            .ids
            .iter()
            .zip(totals)
            .map(|(id, total)| (*id, total * scale))
            .collect()
    }

    /// Eigenvector centrality via power iteration on the adjacency matrix.
    ///
    /// On a disconnected graph the principal eigenvector is ambiguous, so
    /// the defined fallback is a uniform 0.0 score for every node. This is
    /// deliberate behavior, not an error path.
    pub fn eigenvector_centrality(&self, snapshot: &GraphSnapshot) -> HashMap<NodeId, f64> {
        let indexed = Indexed::new(snapshot);
        let n = indexed.len();
        if n == 0 {
            return HashMap::new();
        }
        if snapshot.connected_components().len() != 1 {
            return indexed.ids.iter().map(|id| (*id, 0.0)).collect();
        }

        let mut scores = vec![1.0 / n as f64; n];
        for _ in 0..POWER_ITERATION_ROUNDS {
            let mut next = vec![0.0; n];
            for (v, neighbors) in indexed.adjacency.iter().enumerate() {
                for &u in neighbors {
                    next[u] += scores[v];
                }
            }
            let norm = next.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm == 0.0 {
                // No edges at all; importance is undefined, settle on zero.
                return indexed.ids.iter().map(|id| (*id, 0.0)).collect();
            }
            for x in next.iter_mut() {
                *x /= norm;
            }
            let delta: f64 = next
                .iter()
                .zip(&scores)
                .map(|(a, b)| (a - b).abs())
                .sum();
            scores = next;
            if delta < POWER_ITERATION_EPSILON {
                break;
            }
        }

        indexed.ids.iter().zip(scores).map(|(id, s)| (*id, s)).collect()
    }

    /// Fits the degree distribution to a power law via ordinary least
    /// squares on log(degree+1) vs log(count). Returns (exponent, R²);
    /// (0.0, 0.0) whenever the graph is too small or too uniform to fit.
    pub fn scale_free_fit(&self, snapshot: &GraphSnapshot) -> (f64, f64) {
        let degrees: Vec<usize> = snapshot
            .nodes
            .keys()
            .map(|id| snapshot.degree(*id))
            .collect();
        if degrees.len() < 3 {
            return (0.0, 0.0);
        }

        let mut histogram: HashMap<usize, usize> = HashMap::new();
        for d in &degrees {
            *histogram.entry(*d).or_insert(0) += 1;
        }
        if histogram.len() < 2 {
            return (0.0, 0.0);
        }

        let points: Vec<(f64, f64)> = histogram
            .iter()
            .map(|(degree, count)| (((degree + 1) as f64).ln(), (*count as f64).ln()))
            .collect();
        let (slope, r_squared) = least_squares(&points);
        let exponent = if slope.is_nan() { 0.0 } else { -slope };
        let quality = if r_squared.is_nan() { 0.0 } else { r_squared };
        (exponent, quality)
    }

    /// Top nodes by degree × eigenvector influence (degree alone when the
    /// eigenvector fell back to all-zero), filtered to above-mean degree.
    pub fn hub_nodes(
        &self,
        snapshot: &GraphSnapshot,
        degree: &HashMap<NodeId, usize>,
        eigenvector: &HashMap<NodeId, f64>,
    ) -> Vec<HubNode> {
        if snapshot.node_count() == 0 {
            return Vec::new();
        }
        let mean_degree =
            degree.values().sum::<usize>() as f64 / degree.len() as f64;
        let eigen_is_zero = eigenvector.values().all(|v| *v == 0.0);

        let mut hubs: Vec<HubNode> = degree
            .iter()
            .filter(|(_, d)| **d as f64 > mean_degree)
            .map(|(id, d)| HubNode {
                id: *id,
                degree: *d,
                influence: eigenvector.get(id).copied().unwrap_or(0.0),
            })
            .collect();

        hubs.sort_by(|a, b| {
            let score_a = rank_score(a.degree, a.influence, eigen_is_zero);
            let score_b = rank_score(b.degree, b.influence, eigen_is_zero);
            score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
        });
        hubs.truncate(TOP_NODE_LIMIT);
        hubs
    }

    /// Top nodes by betweenness, filtered to above-mean betweenness.
    pub fn bridging_nodes(
        &self,
        snapshot: &GraphSnapshot,
        betweenness: &HashMap<NodeId, f64>,
    ) -> Vec<BridgingNode> {
        if betweenness.is_empty() {
            return Vec::new();
        }
        let mean = betweenness.values().sum::<f64>() / betweenness.len() as f64;

        let mut bridges: Vec<BridgingNode> = betweenness
            .iter()
            .filter(|(_, b)| **b > mean)
            .map(|(id, b)| BridgingNode {
                id: *id,
                communities: snapshot.degree(*id),
                betweenness: *b,
            })
            .collect();
        bridges.sort_by(|a, b| {
            b.betweenness
                .partial_cmp(&a.betweenness)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        bridges.truncate(TOP_NODE_LIMIT);
        bridges
    }
}

fn rank_score(degree: usize, influence: f64, eigen_is_zero: bool) -> f64 {
    if eigen_is_zero {
        degree as f64
    } else {
        degree as f64 * influence
    }
}

/// One Brandes source pass: BFS shortest-path counting, then dependency
/// back-propagation in reverse BFS order.
fn brandes_single_source(adjacency: &[Vec<usize>], source: usize) -> Vec<f64> {
    let n = adjacency.len();
    let mut order: Vec<usize> = Vec::with_capacity(n);
    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut sigma = vec![0.0_f64; n];
    let mut distance = vec![-1_i64; n];

    sigma[source] = 1.0;
    distance[source] = 0;
    let mut queue = VecDeque::new();
    queue.push_back(source);

    while let Some(v) = queue.pop_front() {
        order.push(v);
        for &w in &adjacency[v] {
            if distance[w] < 0 {
                distance[w] = distance[v] + 1;
                queue.push_back(w);
            }
            if distance[w] == distance[v] + 1 {
                sigma[w] += sigma[v];
                predecessors[w].push(v);
            }
        }
    }

    let mut dependency = vec![0.0_f64; n];
    let mut contribution = vec![0.0_f64; n];
    for &w in order.iter().rev() {
        for &v in &predecessors[w] {
            dependency[v] += sigma[v] / sigma[w] * (1.0 + dependency[w]);
        }
        if w != source {
            contribution[w] += dependency[w];
        }
    }
    contribution
}

/// Ordinary least squares over (x, y) points; returns (slope, R²). NaN
/// results are possible on degenerate input and are the caller's to clamp.
pub fn least_squares(points: &[(f64, f64)]) -> (f64, f64) {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut ss_xy = 0.0;
    let mut ss_xx = 0.0;
    let mut ss_yy = 0.0;
    for (x, y) in points {
        ss_xy += (x - mean_x) * (y - mean_y);
        ss_xx += (x - mean_x) * (x - mean_x);
        ss_yy += (y - mean_y) * (y - mean_y);
    }
    if ss_xx == 0.0 {
        return (f64::NAN, f64::NAN);
    }
    let slope = ss_xy / ss_xx;
    let r_squared = if ss_yy == 0.0 {
        1.0
    } else {
        (ss_xy * ss_xy) / (ss_xx * ss_yy)
    };
    (slope, r_squared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conceptgraph_core::{ConceptNode, NodeType};
    use conceptgraph_graph::{ConceptEdge, ConceptGraph};

    fn chain_graph() -> (ConceptGraph, Vec<NodeId>) {
        let graph = ConceptGraph::new();
        let ids: Vec<NodeId> = ["a", "b", "c"]
            .iter()
            .map(|label| {
                let n = ConceptNode::new(*label, NodeType::Concept);
                let id = n.id;
                graph.add_node(n);
                id
            })
            .collect();
        graph.add_edge(ConceptEdge::new(ids[0], ids[1]));
        graph.add_edge(ConceptEdge::new(ids[1], ids[2]));
        (graph, ids)
    }

    #[test]
    fn empty_graph_yields_empty_metrics() {
        let graph = ConceptGraph::new();
        let metrics = MetricsEngine::new().compute(&graph.snapshot());
        assert!(metrics.betweenness.is_empty());
        assert!(metrics.eigenvector.is_empty());
        assert!(metrics.degree.is_empty());
        assert_eq!(metrics.scale_freeness.power_law_exponent, 0.0);
        assert!(metrics.scale_freeness.hub_nodes.is_empty());
    }

    #[test]
    fn chain_degrees_match_expected() {
        let (graph, ids) = chain_graph();
        let degree = MetricsEngine::new().degree_centrality(&graph.snapshot());
        assert_eq!(degree[&ids[0]], 1);
        assert_eq!(degree[&ids[1]], 2);
        assert_eq!(degree[&ids[2]], 1);
    }

    #[test]
    fn chain_middle_node_has_strictly_highest_betweenness() {
        let (graph, ids) = chain_graph();
        let betweenness = MetricsEngine::new().betweenness_centrality(&graph.snapshot());
        assert!(betweenness[&ids[1]] > betweenness[&ids[0]]);
        assert!(betweenness[&ids[1]] > betweenness[&ids[2]]);
    }

    #[test]
    fn centrality_maps_have_one_finite_entry_per_node() {
        let (graph, _) = chain_graph();
        let snapshot = graph.snapshot();
        let engine = MetricsEngine::new();
        let betweenness = engine.betweenness_centrality(&snapshot);
        let eigenvector = engine.eigenvector_centrality(&snapshot);
        assert_eq!(betweenness.len(), 3);
        assert_eq!(eigenvector.len(), 3);
        assert!(betweenness.values().all(|v| v.is_finite()));
        assert!(eigenvector.values().all(|v| v.is_finite()));
    }

    #[test]
    fn eigenvector_on_connected_graph_favors_the_center() {
        let (graph, ids) = chain_graph();
        let eigenvector = MetricsEngine::new().eigenvector_centrality(&graph.snapshot());
        assert!(eigenvector[&ids[1]] > eigenvector[&ids[0]]);
        assert!(eigenvector[&ids[1]] > eigenvector[&ids[2]]);
    }

    #[test]
    fn eigenvector_on_disconnected_graph_is_uniformly_zero() {
        let (graph, _) = chain_graph();
        graph.add_node(ConceptNode::new("isolated", NodeType::Entity));
        let eigenvector = MetricsEngine::new().eigenvector_centrality(&graph.snapshot());
        assert_eq!(eigenvector.len(), 4);
        assert!(eigenvector.values().all(|v| *v == 0.0));
    }

    #[test]
    fn scale_free_fit_guards_small_graphs() {
        let graph = ConceptGraph::new();
        let a = ConceptNode::new("a", NodeType::Concept);
        let b = ConceptNode::new("b", NodeType::Concept);
        let (a_id, b_id) = (a.id, b.id);
        graph.add_node(a);
        graph.add_node(b);
        graph.add_edge(ConceptEdge::new(a_id, b_id));

        assert_eq!(MetricsEngine::new().scale_free_fit(&graph.snapshot()), (0.0, 0.0));
    }

    #[test]
    fn scale_free_fit_guards_uniform_degrees() {
        // A triangle: three nodes, every degree equal to 2.
        let graph = ConceptGraph::new();
        let ids: Vec<NodeId> = (0..3)
            .map(|i| {
                let n = ConceptNode::new(format!("n{}", i), NodeType::Concept);
                let id = n.id;
                graph.add_node(n);
                id
            })
            .collect();
        graph.add_edge(ConceptEdge::new(ids[0], ids[1]));
        graph.add_edge(ConceptEdge::new(ids[1], ids[2]));
        graph.add_edge(ConceptEdge::new(ids[2], ids[0]));

        assert_eq!(MetricsEngine::new().scale_free_fit(&graph.snapshot()), (0.0, 0.0));
    }

    #[test]
    fn scale_free_fit_produces_finite_values_on_a_star() {
        let graph = ConceptGraph::new();
        let hub = ConceptNode::new("hub", NodeType::Concept);
        let hub_id = hub.id;
        graph.add_node(hub);
        for i in 0..5 {
            let leaf = ConceptNode::new(format!("leaf{}", i), NodeType::Concept);
            let leaf_id = leaf.id;
            graph.add_node(leaf);
            graph.add_edge(ConceptEdge::new(hub_id, leaf_id));
        }

        let (exponent, quality) = MetricsEngine::new().scale_free_fit(&graph.snapshot());
        assert!(exponent.is_finite());
        assert!(quality.is_finite());
        assert!(exponent > 0.0);
        assert!((0.0..=1.0).contains(&quality));
    }

    #[test]
    fn hub_nodes_require_above_mean_degree() {
        let graph = ConceptGraph::new();
        let hub = ConceptNode::new("hub", NodeType::Concept);
        let hub_id = hub.id;
        graph.add_node(hub);
        for i in 0..4 {
            let leaf = ConceptNode::new(format!("leaf{}", i), NodeType::Concept);
            let leaf_id = leaf.id;
            graph.add_node(leaf);
            graph.add_edge(ConceptEdge::new(hub_id, leaf_id));
        }

        let snapshot = graph.snapshot();
        let engine = MetricsEngine::new();
        let degree = engine.degree_centrality(&snapshot);
        let eigenvector = engine.eigenvector_centrality(&snapshot);
        let hubs = engine.hub_nodes(&snapshot, &degree, &eigenvector);

        assert_eq!(hubs.len(), 1);
        assert_eq!(hubs[0].id, hub_id);
        assert_eq!(hubs[0].degree, 4);
    }

    #[test]
    fn bridging_nodes_annotate_neighbor_count() {
        let (graph, ids) = chain_graph();
        let snapshot = graph.snapshot();
        let engine = MetricsEngine::new();
        let betweenness = engine.betweenness_centrality(&snapshot);
        let bridges = engine.bridging_nodes(&snapshot, &betweenness);

        assert_eq!(bridges.len(), 1);
        assert_eq!(bridges[0].id, ids[1]);
        assert_eq!(bridges[0].communities, 2);
    }
}
