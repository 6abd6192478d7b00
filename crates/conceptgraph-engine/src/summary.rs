use conceptgraph_core::{GraphSummary, NodeDigest};
use conceptgraph_graph::GraphSnapshot;

/// Builds the bounded summary shipped to collaborators: counts plus the
/// most recently created node labels, newest first.
pub fn summarize(snapshot: &GraphSnapshot, sample_size: usize) -> GraphSummary {
    let mut nodes: Vec<_> = snapshot.nodes.values().collect();
    nodes.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    GraphSummary {
        node_count: snapshot.node_count(),
        edge_count: snapshot.edge_count(),
        recent_nodes: nodes
            .into_iter()
            .take(sample_size)
            .map(|n| NodeDigest {
                id: n.id,
                label: n.label.clone(),
                node_type: n.node_type,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conceptgraph_core::{ConceptNode, NodeType};
    use conceptgraph_graph::ConceptGraph;

    #[test]
    fn summary_is_bounded_and_newest_first() {
        let graph = ConceptGraph::new();
        for i in 0..10 {
            graph.add_node(ConceptNode::new(format!("node {}", i), NodeType::Concept));
        }

        let summary = summarize(&graph.snapshot(), 3);
        assert_eq!(summary.node_count, 10);
        assert_eq!(summary.recent_nodes.len(), 3);
    }

    #[test]
    fn empty_graph_summarizes_to_zero() {
        let graph = ConceptGraph::new();
        let summary = summarize(&graph.snapshot(), 5);
        assert_eq!(summary.node_count, 0);
        assert_eq!(summary.edge_count, 0);
        assert!(summary.recent_nodes.is_empty());
    }
}
