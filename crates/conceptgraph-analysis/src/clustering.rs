use conceptgraph_core::{NodeId, NodeType, SimilarityConfig};
use conceptgraph_graph::GraphSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// A coherence-scored partition block of the node set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub id: usize,
    pub members: Vec<NodeId>,
    pub centroid_node_id: Option<NodeId>,
    pub theme: String,
    pub coherence_score: f64,
}

/// Connectivity-based clustering: clusters are the connected components of
/// the snapshot, scored by how semantically tight their members are. This
/// is grouping over the existing topology, not a metric-space clustering.
#[derive(Debug, Clone, Default)]
pub struct ClusteringService {
    similarity: SimilarityConfig,
}

impl ClusteringService {
    pub fn new(similarity: SimilarityConfig) -> Self {
        Self { similarity }
    }

    /// Partitions the full node set into clusters, one per connected
    /// component, sorted descending by size × coherence. Every node lands
    /// in exactly one cluster.
    pub fn cluster(&self, snapshot: &GraphSnapshot) -> Vec<Cluster> {
        let components = snapshot.connected_components();
        debug!(components = components.len(), "clustering connected components");

        let mut clusters: Vec<Cluster> = components
            .into_iter()
            .enumerate()
            .map(|(id, members)| {
                let centroid_node_id = self.centroid(snapshot, &members);
                let theme = self.theme(snapshot, &members);
                let coherence_score = self.coherence(snapshot, &members);
                Cluster {
                    id,
                    members,
                    centroid_node_id,
                    theme,
                    coherence_score,
                }
            })
            .collect();

        clusters.sort_by(|a, b| {
            let score_a = a.members.len() as f64 * a.coherence_score;
            let score_b = b.members.len() as f64 * b.coherence_score;
            score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
        });
        clusters
    }

    /// Pairwise node similarity in [0,1]: type agreement, label affinity,
    /// and direct connection, capped at 1.0.
    pub fn node_similarity(&self, snapshot: &GraphSnapshot, a: NodeId, b: NodeId) -> f64 {
        let (node_a, node_b) = match (snapshot.nodes.get(&a), snapshot.nodes.get(&b)) {
            (Some(x), Some(y)) => (x, y),
            _ => return 0.0,
        };

        let mut similarity = 0.0;
        if node_a.node_type == node_b.node_type {
            similarity += self.similarity.type_match;
        }

        let label_a = node_a.label.to_lowercase();
        let label_b = node_b.label.to_lowercase();
        if label_a == label_b {
            similarity += self.similarity.exact_label;
        } else if (label_a.len() > self.similarity.min_substring_len
            && label_b.len() > self.similarity.min_substring_len)
            && (label_a.contains(&label_b) || label_b.contains(&label_a))
        {
            similarity += self.similarity.label_substring;
        } else if shares_first_word(&label_a, &label_b) {
            similarity += self.similarity.shared_first_word;
        }

        if snapshot.has_edge(a, b) {
            similarity += self.similarity.connected;
        }

        similarity.min(1.0)
    }

    /// Highest-degree member; ties fall wherever iteration lands first.
    fn centroid(&self, snapshot: &GraphSnapshot, members: &[NodeId]) -> Option<NodeId> {
        members
            .iter()
            .max_by_key(|id| snapshot.degree(**id))
            .copied()
    }

    /// Majority node type among members, rendered as "<type> cluster".
    /// Ties collapse to "concept".
    fn theme(&self, snapshot: &GraphSnapshot, members: &[NodeId]) -> String {
        let mut counts: HashMap<NodeType, usize> = HashMap::new();
        for id in members {
            if let Some(node) = snapshot.nodes.get(id) {
                *counts.entry(node.node_type).or_insert(0) += 1;
            }
        }
        let max_count = counts.values().copied().max().unwrap_or(0);
        let dominant: Vec<NodeType> = counts
            .into_iter()
            .filter(|(_, c)| *c == max_count)
            .map(|(t, _)| t)
            .collect();
        let theme_type = match dominant.as_slice() {
            [single] => *single,
            _ => NodeType::Concept,
        };
        format!("{} cluster", theme_type)
    }

    /// Mean pairwise similarity over all member pairs. Quadratic in member
    /// count; fine at expected graph sizes, but callers clustering very
    /// large components should expect O(n²) work here.
    fn coherence(&self, snapshot: &GraphSnapshot, members: &[NodeId]) -> f64 {
        if members.len() < 2 {
            return 1.0;
        }
        let mut total = 0.0;
        let mut pairs = 0usize;
        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                total += self.node_similarity(snapshot, members[i], members[j]);
                pairs += 1;
            }
        }
        if pairs == 0 {
            0.0
        } else {
            total / pairs as f64
        }
    }
}

fn shares_first_word(a: &str, b: &str) -> bool {
    match (a.split_whitespace().next(), b.split_whitespace().next()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}
