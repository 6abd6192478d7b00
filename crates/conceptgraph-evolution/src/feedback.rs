use crate::EvolutionTracker;
use conceptgraph_core::{
    ConceptNode, ExpansionEvaluation, FeedbackSource, EXPANSION_EVALUATION_KIND,
};
use conceptgraph_graph::{ConceptEdge, GraphSnapshot};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

const CONNECTIVITY_FLOOR: f64 = 1.5;
const DIVERSITY_FLOOR: usize = 2;
const FEEDBACK_WINDOW: usize = 5;
const GUIDANCE_LIMIT: usize = 2;

/// The iterative refinement contract: each expansion step is scored, and
/// the score shapes the guidance appended to the next step's prompt.
#[derive(Debug, Default)]
pub struct FeedbackLoop {
    iterations: AtomicUsize,
}

impl FeedbackLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scores one expansion step and persists the result as an
    /// `expansion_evaluation` feedback record.
    pub fn evaluate_expansion(
        &self,
        tracker: &EvolutionTracker,
        after: &GraphSnapshot,
        prior_node_count: usize,
        new_nodes: &[ConceptNode],
        new_edges: &[ConceptEdge],
    ) -> ExpansionEvaluation {
        let nodes_added = new_nodes.len();
        let edges_added = new_edges.len();

        let edges_per_new_node = if nodes_added > 0 {
            edges_added as f64 / nodes_added as f64
        } else {
            0.0
        };

        let current_density = after.density();
        let previous_density = if prior_node_count > 1 {
            let previous_edges = after.edge_count().saturating_sub(edges_added);
            2.0 * previous_edges as f64
                / (prior_node_count as f64 * (prior_node_count as f64 - 1.0))
        } else {
            0.0
        };

        let node_type_diversity = new_nodes
            .iter()
            .map(|n| n.node_type)
            .collect::<HashSet<_>>()
            .len();
        let edge_label_diversity = new_edges
            .iter()
            .map(|e| e.label.as_str())
            .collect::<HashSet<_>>()
            .len();

        let evaluation = ExpansionEvaluation {
            nodes_added,
            edges_added,
            edges_per_new_node,
            density_change: current_density - previous_density,
            node_type_diversity,
            edge_label_diversity,
            iteration: self.iterations.fetch_add(1, Ordering::SeqCst),
        };

        tracker.record_feedback(
            FeedbackSource::System,
            EXPANSION_EVALUATION_KIND,
            serde_json::to_value(&evaluation).unwrap_or_default(),
        );
        debug!(?evaluation, "evaluated expansion step");
        evaluation
    }

    /// Turns an evaluation into guidance for the next iteration. The rules
    /// fire independently; a step with no findings gets the balanced
    /// default.
    pub fn generate_improvement_prompts(&self, evaluation: &ExpansionEvaluation) -> Vec<String> {
        let mut prompts = Vec::new();

        if evaluation.edges_per_new_node < CONNECTIVITY_FLOOR {
            prompts.push(
                "The recent expansion added nodes with relatively few connections. \
                 In the next iteration, focus on increasing connectivity between concepts."
                    .to_string(),
            );
        }
        if evaluation.node_type_diversity < DIVERSITY_FLOOR {
            prompts.push(
                "The recent expansion lacks diversity in node types. \
                 Try to add different types of nodes (concepts, entities, processes, attributes)."
                    .to_string(),
            );
        }
        if evaluation.edge_label_diversity < DIVERSITY_FLOOR {
            prompts.push(
                "The recent expansion uses limited relationship types. \
                 Try to identify more nuanced relationships between concepts."
                    .to_string(),
            );
        }
        if evaluation.density_change < 0.0 {
            prompts.push(
                "The graph density has decreased. \
                 Consider adding more connections between existing nodes."
                    .to_string(),
            );
        }
        if prompts.is_empty() {
            prompts.push(
                "The recent expansion was balanced. \
                 Continue to develop the knowledge graph with a focus on quality and relevance."
                    .to_string(),
            );
        }
        prompts
    }

    /// Appends a numbered guidance block, derived from recent evaluations,
    /// to the base prompt. Reads history; mutates nothing.
    pub fn refine_expansion_strategy(&self, tracker: &EvolutionTracker, base_prompt: &str) -> String {
        let mut improvement_prompts = Vec::new();
        for record in tracker.recent_feedback(FEEDBACK_WINDOW) {
            if record.kind != EXPANSION_EVALUATION_KIND {
                continue;
            }
            if let Ok(evaluation) =
                serde_json::from_value::<ExpansionEvaluation>(record.payload.clone())
            {
                improvement_prompts.extend(self.generate_improvement_prompts(&evaluation));
            }
        }

        let start = improvement_prompts.len().saturating_sub(GUIDANCE_LIMIT);
        let suggestions = &improvement_prompts[start..];
        if suggestions.is_empty() {
            return base_prompt.to_string();
        }

        let mut refined = format!("{}\n\nAdditional guidance based on feedback:\n", base_prompt);
        for (idx, suggestion) in suggestions.iter().enumerate() {
            refined.push_str(&format!("{}. {}\n", idx + 1, suggestion));
        }
        refined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullHistoryStore;
    use conceptgraph_core::NodeType;
    use conceptgraph_graph::ConceptGraph;

    fn tracker() -> EvolutionTracker {
        EvolutionTracker::new(Box::new(NullHistoryStore))
    }

    fn evaluation() -> ExpansionEvaluation {
        ExpansionEvaluation {
            nodes_added: 2,
            edges_added: 4,
            edges_per_new_node: 2.0,
            density_change: 0.01,
            node_type_diversity: 2,
            edge_label_diversity: 2,
            iteration: 0,
        }
    }

    #[test]
    fn balanced_expansion_gets_the_default_prompt() {
        let prompts = FeedbackLoop::new().generate_improvement_prompts(&evaluation());
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("balanced"));
    }

    #[test]
    fn each_weak_signal_fires_its_rule() {
        let mut eval = evaluation();
        eval.edges_per_new_node = 1.0;
        eval.node_type_diversity = 1;
        eval.edge_label_diversity = 1;
        eval.density_change = -0.1;

        let prompts = FeedbackLoop::new().generate_improvement_prompts(&eval);
        assert_eq!(prompts.len(), 4);
        assert!(prompts[0].contains("connectivity"));
        assert!(prompts[1].contains("node types"));
        assert!(prompts[2].contains("relationship types"));
        assert!(prompts[3].contains("density"));
    }

    #[test]
    fn evaluate_expansion_computes_diversity_and_records_feedback() {
        let tracker = tracker();
        let loop_ = FeedbackLoop::new();
        let graph = ConceptGraph::new();

        let a = conceptgraph_core::ConceptNode::new("a node", NodeType::Concept);
        let b = conceptgraph_core::ConceptNode::new("b node", NodeType::Entity);
        let (a_id, b_id) = (a.id, b.id);
        graph.add_node(a.clone());
        graph.add_node(b.clone());
        let edge = conceptgraph_graph::ConceptEdge::new(a_id, b_id).with_label("depends_on");
        graph.add_edge(edge.clone());

        let eval =
            loop_.evaluate_expansion(&tracker, &graph.snapshot(), 0, &[a, b], &[edge]);
        assert_eq!(eval.nodes_added, 2);
        assert_eq!(eval.edges_added, 1);
        assert_eq!(eval.node_type_diversity, 2);
        assert_eq!(eval.edge_label_diversity, 1);
        assert_eq!(eval.iteration, 0);

        let recorded = tracker.recent_feedback(1);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].kind, EXPANSION_EVALUATION_KIND);

        // Iteration index advances per evaluation.
        let eval2 = loop_.evaluate_expansion(&tracker, &graph.snapshot(), 2, &[], &[]);
        assert_eq!(eval2.iteration, 1);
    }

    #[test]
    fn refinement_appends_at_most_two_numbered_suggestions() {
        let tracker = tracker();
        let loop_ = FeedbackLoop::new();
        for _ in 0..4 {
            let mut eval = evaluation();
            eval.edges_per_new_node = 0.5;
            eval.node_type_diversity = 1;
            tracker.record_feedback(
                FeedbackSource::System,
                EXPANSION_EVALUATION_KIND,
                serde_json::to_value(&eval).unwrap(),
            );
        }

        let refined = loop_.refine_expansion_strategy(&tracker, "Explore quantum computing");
        assert!(refined.starts_with("Explore quantum computing"));
        assert!(refined.contains("Additional guidance based on feedback:"));
        assert!(refined.contains("1. "));
        assert!(refined.contains("2. "));
        assert!(!refined.contains("3. "));
    }

    #[test]
    fn refinement_without_history_returns_base_prompt() {
        let tracker = tracker();
        let refined = FeedbackLoop::new().refine_expansion_strategy(&tracker, "Explore entropy");
        assert_eq!(refined, "Explore entropy");
    }

    #[test]
    fn non_evaluation_feedback_is_ignored_by_refinement() {
        let tracker = tracker();
        tracker.record_feedback(
            FeedbackSource::User,
            "quality",
            serde_json::json!({"note": "looks wrong"}),
        );
        let refined = FeedbackLoop::new().refine_expansion_strategy(&tracker, "base");
        assert_eq!(refined, "base");
    }
}
