use crate::{Metadata, MergeRecord, NodeId, NodeType};
use serde::{Deserialize, Serialize};

/// A concept-graph node. Nodes are append-only: once created they are only
/// ever merged into or reconnected, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptNode {
    pub id: NodeId,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub metadata: Metadata,
    #[serde(default)]
    pub merge_history: Vec<MergeRecord>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl ConceptNode {
    pub fn new<S: Into<String>>(label: S, node_type: NodeType) -> Self {
        let metadata = Metadata::new();
        let created_at = metadata.created_at;
        Self {
            id: NodeId::new_v4(),
            label: label.into(),
            node_type,
            metadata,
            merge_history: Vec::new(),
            created_at,
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.metadata.set_description(description);
        self
    }

    pub fn with_attribute<K: Into<String>, V: Into<crate::AttributeValue>>(
        mut self,
        key: K,
        value: V,
    ) -> Self {
        self.metadata.attributes.insert(key.into(), value.into());
        self
    }

    pub fn description(&self) -> Option<&str> {
        self.metadata.description()
    }

    /// Folds another proposed entity into this node. Descriptions are
    /// concatenated when both sides have one, metadata is absorbed without
    /// overwriting, and the merge lands in the append-only history.
    pub fn record_merge(&mut self, merged_label: &str, reason: &str, description: Option<&str>) {
        if let Some(incoming) = description {
            match self.metadata.description() {
                Some(existing) if !existing.is_empty() => {
                    let combined = format!("{} {}", existing, incoming);
                    self.metadata.set_description(combined);
                }
                _ => self.metadata.set_description(incoming),
            }
        }
        self.merge_history.push(MergeRecord::new(merged_label, reason));
        self.metadata.updated_at = chrono::Utc::now();
    }
}
