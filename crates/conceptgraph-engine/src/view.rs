use conceptgraph_analysis::{Cluster, GraphMetrics};
use conceptgraph_core::ConceptNode;
use conceptgraph_graph::ConceptEdge;
use serde::{Deserialize, Serialize};

/// Everything the presentation collaborator pulls in one call: the full
/// node/edge sets plus the derived clusters and metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphView {
    pub nodes: Vec<ConceptNode>,
    pub edges: Vec<ConceptEdge>,
    pub clusters: Vec<Cluster>,
    pub metrics: GraphMetrics,
}

impl GraphView {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}
