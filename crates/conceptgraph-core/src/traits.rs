use crate::{NodeId, NodeType, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Compact graph description shipped to collaborators instead of the full
/// node/edge sets. The label sample is bounded by
/// `ExpansionConfig::summary_sample_size`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub node_count: usize,
    pub edge_count: usize,
    #[serde(default)]
    pub recent_nodes: Vec<NodeDigest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDigest {
    pub id: NodeId,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
}

/// A node as proposed by the content-generation collaborator. Everything
/// beyond the label is optional; the validator fills the gaps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateNode {
    /// Collaborator-local handle other candidates may reference. Absent for
    /// anonymous nodes.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// An edge as proposed by the collaborator. Endpoints are free-form
/// references: a known node id, a candidate handle, or a label.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateEdge {
    #[serde(default)]
    pub source_id: String,
    #[serde(default)]
    pub target_id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
}

/// One round of collaborator output. Empty batches are a normal outcome,
/// not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateBatch {
    #[serde(default)]
    pub nodes: Vec<CandidateNode>,
    #[serde(default)]
    pub edges: Vec<CandidateEdge>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub next_question: Option<String>,
}

impl CandidateBatch {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// A relationship proposed by the suggestion collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipSuggestion {
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub label: String,
    pub confidence: f64,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// External generative collaborator producing expansion candidates from a
/// prompt and a graph summary.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn expand(&self, prompt: &str, summary: &GraphSummary) -> Result<CandidateBatch>;
}

/// External collaborator proposing relationships for weakly connected
/// regions of the graph.
#[async_trait]
pub trait RelationshipSuggester: Send + Sync {
    async fn suggest(&self, summary: &GraphSummary) -> Result<Vec<RelationshipSuggestion>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_batch_tolerates_sparse_json() {
        let batch: CandidateBatch = serde_json::from_str(
            r#"{"nodes": [{"label": "Entropy"}], "reasoning": "core concept"}"#,
        )
        .unwrap();
        assert_eq!(batch.nodes.len(), 1);
        assert_eq!(batch.nodes[0].label, "Entropy");
        assert!(batch.nodes[0].id.is_none());
        assert!(batch.edges.is_empty());
        assert!(batch.next_question.is_none());
    }

    #[test]
    fn empty_object_is_an_empty_batch() {
        let batch: CandidateBatch = serde_json::from_str("{}").unwrap();
        assert!(batch.is_empty());
    }
}
