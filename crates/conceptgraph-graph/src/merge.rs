use crate::{ConceptEdge, ConceptGraph, EdgeInsert};
use conceptgraph_core::{ConceptNode, EdgeId, MergeConfig, Metadata, NodeId, NodeType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// A candidate entity after validation: label and type are settled, the
/// description may be absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedNode {
    pub label: String,
    pub node_type: NodeType,
    pub description: Option<String>,
}

impl ProposedNode {
    pub fn new<S: Into<String>>(label: S, node_type: NodeType) -> Self {
        Self {
            label: label.into(),
            node_type,
            description: None,
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn into_node(self) -> ConceptNode {
        let node = ConceptNode::new(self.label, self.node_type);
        match self.description {
            Some(d) => node.with_description(d),
            None => node,
        }
    }
}

/// Best existing-entity match for a proposed node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMatch {
    pub id: NodeId,
    pub score: f64,
    pub reason: String,
}

/// Outcome of resolving a proposed edge against the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeResolution {
    Created(EdgeId),
    /// The pair already had an edge; it absorbed the proposal.
    Reinforced(EdgeId),
    /// An endpoint is absent. The caller skips the candidate.
    MissingEndpoint,
}

/// Decides whether proposed entities extend existing graph elements or
/// become new ones. All graph mutation funnels through here.
#[derive(Debug, Clone, Default)]
pub struct MergeResolver {
    config: MergeConfig,
}

impl MergeResolver {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    /// Finds the existing node a proposal should merge into, if any.
    ///
    /// Exact case-insensitive label matches win outright. Otherwise every
    /// node is scored fuzzily and the best one is returned when it clears
    /// the merge threshold.
    pub fn find_match(&self, graph: &ConceptGraph, proposed: &ProposedNode) -> Option<NodeMatch> {
        let needle = proposed.label.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }

        let mut best: Option<NodeMatch> = None;
        for node in graph.nodes() {
            let existing = node.label.trim().to_lowercase();
            if existing == needle {
                return Some(NodeMatch {
                    id: node.id,
                    score: 1.0,
                    reason: "exact label match".to_string(),
                });
            }
            if let Some(m) = self.fuzzy_score(&node, &existing, &needle, proposed) {
                if best.as_ref().map(|b| m.score > b.score).unwrap_or(true) {
                    best = Some(m);
                }
            }
        }
        best.filter(|m| m.score >= self.config.merge_threshold)
    }

    fn fuzzy_score(
        &self,
        node: &ConceptNode,
        existing: &str,
        needle: &str,
        proposed: &ProposedNode,
    ) -> Option<NodeMatch> {
        let substring = (existing.len() > self.config.min_substring_len
            && needle.len() > self.config.min_substring_len)
            && (existing.contains(needle) || needle.contains(existing));

        let mut score = 0.0;
        let mut reason = "";
        if substring {
            if node.node_type == proposed.node_type {
                score = self.config.substring_same_type;
                reason = "label containment, same type";
            } else {
                score = self.config.substring_type_mismatch;
                reason = "label containment, type differs";
            }
        }

        if let (Some(a), Some(b)) = (node.description(), proposed.description.as_deref()) {
            let ratio = word_overlap_ratio(a, b);
            if ratio > self.config.overlap_ratio_floor {
                let overlap_score = self.config.description_overlap * ratio;
                if overlap_score > score {
                    score = overlap_score;
                    reason = "description overlap";
                }
            }
        }

        if score > 0.0 {
            Some(NodeMatch {
                id: node.id,
                score,
                reason: reason.to_string(),
            })
        } else {
            None
        }
    }

    /// Applies the merge effect to an existing node: description
    /// concatenation, metadata enrichment, merge-history append. No new
    /// node comes into being.
    pub fn merge_node(&self, graph: &ConceptGraph, m: &NodeMatch, proposed: &ProposedNode) -> bool {
        let merged = graph.update_node(m.id, |node| {
            node.record_merge(&proposed.label, &m.reason, proposed.description.as_deref());
        });
        if merged {
            debug!(
                target_id = %m.id,
                label = %proposed.label,
                score = m.score,
                reason = %m.reason,
                "merged proposed node into existing entity"
            );
        }
        merged
    }

    /// Resolves a proposed edge. Both endpoints must already exist;
    /// upstream node merges in the same batch are expected to have resolved
    /// them. Duplicate pairs reinforce the existing edge instead of adding.
    pub fn resolve_edge(
        &self,
        graph: &ConceptGraph,
        source_id: NodeId,
        target_id: NodeId,
        label: &str,
        weight: f64,
        metadata: &Metadata,
    ) -> EdgeResolution {
        if let Some(existing) = graph.edge_between(source_id, target_id) {
            graph.update_edge(source_id, target_id, |edge| {
                edge.reinforce(label, weight, metadata);
            });
            debug!(edge_id = %existing.id, label, "reinforced existing edge");
            return EdgeResolution::Reinforced(existing.id);
        }

        let mut edge = ConceptEdge::new(source_id, target_id)
            .with_label(label)
            .with_weight(weight);
        edge.metadata = metadata.clone();
        match graph.add_edge(edge) {
            EdgeInsert::Added(id) => EdgeResolution::Created(id),
            EdgeInsert::Existing(id) => EdgeResolution::Reinforced(id),
            EdgeInsert::MissingEndpoint => EdgeResolution::MissingEndpoint,
        }
    }
}

/// Word-overlap ratio of two descriptions: |shared| / |union| over
/// lowercase whitespace-split words.
pub fn word_overlap_ratio(a: &str, b: &str) -> f64 {
    let words_a: HashSet<String> = a.split_whitespace().map(|w| w.to_lowercase()).collect();
    let words_b: HashSet<String> = b.split_whitespace().map(|w| w.to_lowercase()).collect();
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }
    let shared = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    shared as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_graph() -> (ConceptGraph, NodeId) {
        let graph = ConceptGraph::new();
        let node = ConceptNode::new("Artificial Intelligence", NodeType::Concept)
            .with_description("machines that learn and reason");
        let id = node.id;
        graph.add_node(node);
        (graph, id)
    }

    #[test]
    fn exact_label_match_is_case_insensitive() {
        let (graph, id) = seeded_graph();
        let resolver = MergeResolver::default();
        let proposed = ProposedNode::new("artificial intelligence", NodeType::Concept);

        let m = resolver.find_match(&graph, &proposed).unwrap();
        assert_eq!(m.id, id);
        assert_eq!(m.score, 1.0);
    }

    #[test]
    fn substring_match_with_same_type_scores_high() {
        let (graph, id) = seeded_graph();
        let resolver = MergeResolver::default();
        let proposed = ProposedNode::new("Intelligence", NodeType::Concept);

        let m = resolver.find_match(&graph, &proposed).unwrap();
        assert_eq!(m.id, id);
        assert_eq!(m.score, 0.8);
    }

    #[test]
    fn substring_match_with_type_mismatch_sits_at_threshold() {
        let (graph, _) = seeded_graph();
        let resolver = MergeResolver::default();
        let proposed = ProposedNode::new("Intelligence", NodeType::Process);

        let m = resolver.find_match(&graph, &proposed).unwrap();
        assert_eq!(m.score, 0.5);
    }

    #[test]
    fn unrelated_label_creates_no_match() {
        let (graph, _) = seeded_graph();
        let resolver = MergeResolver::default();
        let proposed = ProposedNode::new("Thermodynamics", NodeType::Concept);
        assert!(resolver.find_match(&graph, &proposed).is_none());
    }

    #[test]
    fn short_labels_never_substring_match() {
        let graph = ConceptGraph::new();
        graph.add_node(ConceptNode::new("AI", NodeType::Concept));
        let resolver = MergeResolver::default();
        // "A" is contained in "AI" but both are at or below the length floor.
        let proposed = ProposedNode::new("A", NodeType::Concept);
        assert!(resolver.find_match(&graph, &proposed).is_none());
    }

    #[test]
    fn description_overlap_can_carry_the_match() {
        let (graph, id) = seeded_graph();
        let resolver = MergeResolver::default();
        let proposed = ProposedNode::new("Thinking Machines", NodeType::Concept)
            .with_description("machines that learn and reason");

        let m = resolver.find_match(&graph, &proposed).unwrap();
        assert_eq!(m.id, id);
        assert_eq!(m.reason, "description overlap");
        assert!((m.score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn merge_is_idempotent_on_node_count() {
        let (graph, id) = seeded_graph();
        let resolver = MergeResolver::default();
        let proposed = ProposedNode::new("artificial intelligence", NodeType::Concept)
            .with_description("a second take");

        let before = graph.node_count();
        let m = resolver.find_match(&graph, &proposed).unwrap();
        assert!(resolver.merge_node(&graph, &m, &proposed));
        assert_eq!(graph.node_count(), before);
        assert_eq!(graph.node(id).unwrap().merge_history.len(), 1);
    }

    #[test]
    fn resolve_edge_reinforces_duplicate_pair() {
        let graph = ConceptGraph::new();
        let a = ConceptNode::new("alpha node", NodeType::Concept);
        let b = ConceptNode::new("beta node", NodeType::Concept);
        let (a_id, b_id) = (a.id, b.id);
        graph.add_node(a);
        graph.add_node(b);
        let resolver = MergeResolver::default();

        let first = resolver.resolve_edge(&graph, a_id, b_id, "supports", 0.4, &Metadata::new());
        assert!(matches!(first, EdgeResolution::Created(_)));
        let second = resolver.resolve_edge(&graph, b_id, a_id, "supports", 0.9, &Metadata::new());
        assert!(matches!(second, EdgeResolution::Reinforced(_)));

        let edge = graph.edge_between(a_id, b_id).unwrap();
        assert_eq!(edge.weight, 0.9);
        assert_eq!(edge.merge_history.len(), 1);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn resolve_edge_signals_missing_endpoint() {
        let graph = ConceptGraph::new();
        let a = ConceptNode::new("alpha node", NodeType::Concept);
        let a_id = a.id;
        graph.add_node(a);
        let resolver = MergeResolver::default();

        let out = resolver.resolve_edge(
            &graph,
            a_id,
            NodeId::new_v4(),
            "supports",
            0.5,
            &Metadata::new(),
        );
        assert_eq!(out, EdgeResolution::MissingEndpoint);
    }

    #[test]
    fn word_overlap_ratio_bounds() {
        assert_eq!(word_overlap_ratio("", "anything"), 0.0);
        assert_eq!(word_overlap_ratio("a b c", "a b c"), 1.0);
        let ratio = word_overlap_ratio("graph theory basics", "graph theory advanced");
        assert!((ratio - 0.5).abs() < 1e-9);
    }
}
