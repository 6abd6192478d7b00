use conceptgraph_core::{CandidateEdge, CandidateNode, NodeId, NodeType};
use conceptgraph_graph::{ConceptGraph, ProposedNode, DEFAULT_EDGE_LABEL};
use std::collections::HashMap;
use tracing::warn;

/// Where a validated edge endpoint points: an existing graph node, or a
/// node from the same candidate batch (by position).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRef {
    Existing(NodeId),
    Candidate(usize),
}

#[derive(Debug, Clone)]
pub struct ValidatedNode {
    /// Collaborator-local handle, kept so batch edges can reference it.
    pub handle: Option<String>,
    pub proposed: ProposedNode,
}

#[derive(Debug, Clone)]
pub struct ValidatedEdge {
    pub source: EndpointRef,
    pub target: EndpointRef,
    pub label: String,
    pub weight: f64,
}

/// A candidate batch after validation: well-formed nodes with settled
/// types, and edges whose endpoints resolved. Everything else was dropped
/// and logged.
#[derive(Debug, Clone, Default)]
pub struct ValidatedBatch {
    pub nodes: Vec<ValidatedNode>,
    pub edges: Vec<ValidatedEdge>,
    pub dropped_nodes: usize,
    pub dropped_edges: usize,
}

/// Validates collaborator output against the current graph. Anonymous
/// nodes get ids at merge time; here they only need a non-empty label.
/// Edge endpoints may be node ids, batch handles, or labels; anything
/// that fails to resolve drops the edge, never the iteration.
pub fn validate_batch(
    graph: &ConceptGraph,
    nodes: Vec<CandidateNode>,
    edges: Vec<CandidateEdge>,
) -> ValidatedBatch {
    let mut batch = ValidatedBatch::default();

    // Handles and labels of accepted candidates, for edge resolution.
    let mut by_handle: HashMap<String, usize> = HashMap::new();
    let mut by_label: HashMap<String, usize> = HashMap::new();

    for candidate in nodes {
        let label = candidate.label.trim();
        if label.is_empty() {
            warn!("dropping candidate node with empty label");
            batch.dropped_nodes += 1;
            continue;
        }
        let node_type: NodeType = candidate.node_type.parse().unwrap_or_default();
        let mut proposed = ProposedNode::new(label, node_type);
        if let Some(description) = candidate.description.filter(|d| !d.trim().is_empty()) {
            proposed = proposed.with_description(description);
        }

        let index = batch.nodes.len();
        if let Some(handle) = candidate.id.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
            by_handle.insert(handle.to_lowercase(), index);
        }
        by_label.insert(label.to_lowercase(), index);
        batch.nodes.push(ValidatedNode {
            handle: candidate.id,
            proposed,
        });
    }

    // Labels of existing nodes resolve too; collaborators often name
    // endpoints instead of quoting ids.
    let existing_by_label: HashMap<String, NodeId> = graph
        .nodes()
        .into_iter()
        .map(|n| (n.label.to_lowercase(), n.id))
        .collect();

    for candidate in edges {
        let source = resolve_endpoint(
            graph,
            &candidate.source_id,
            &by_handle,
            &by_label,
            &existing_by_label,
        );
        let target = resolve_endpoint(
            graph,
            &candidate.target_id,
            &by_handle,
            &by_label,
            &existing_by_label,
        );
        match (source, target) {
            (Some(source), Some(target)) if source != target => {
                batch.edges.push(ValidatedEdge {
                    source,
                    target,
                    label: candidate
                        .label
                        .filter(|l| !l.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_EDGE_LABEL.to_string()),
                    weight: candidate.weight.unwrap_or(1.0).clamp(0.0, 1.0),
                });
            }
            (Some(_), Some(_)) => {
                warn!(endpoint = %candidate.source_id, "dropping self-referential candidate edge");
                batch.dropped_edges += 1;
            }
            _ => {
                warn!(
                    source = %candidate.source_id,
                    target = %candidate.target_id,
                    "dropping candidate edge with unresolvable endpoint"
                );
                batch.dropped_edges += 1;
            }
        }
    }
    batch
}

fn resolve_endpoint(
    graph: &ConceptGraph,
    reference: &str,
    by_handle: &HashMap<String, usize>,
    by_label: &HashMap<String, usize>,
    existing_by_label: &HashMap<String, NodeId>,
) -> Option<EndpointRef> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }
    if let Ok(id) = reference.parse::<NodeId>() {
        if graph.has_node(id) {
            return Some(EndpointRef::Existing(id));
        }
    }
    let lowered = reference.to_lowercase();
    if let Some(index) = by_handle.get(&lowered).or_else(|| by_label.get(&lowered)) {
        return Some(EndpointRef::Candidate(*index));
    }
    existing_by_label
        .get(&lowered)
        .map(|id| EndpointRef::Existing(*id))
}
