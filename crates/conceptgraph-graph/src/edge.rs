use conceptgraph_core::{EdgeId, Metadata, MergeRecord, NodeId};
use serde::{Deserialize, Serialize};

pub const DEFAULT_EDGE_LABEL: &str = "related_to";

/// Normalized unordered node pair. The graph keys its edge map by this, so
/// "at most one edge per unordered pair" holds structurally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeKey(NodeId, NodeId);

impl EdgeKey {
    pub fn new(a: NodeId, b: NodeId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn endpoints(&self) -> (NodeId, NodeId) {
        (self.0, self.1)
    }
}

/// An undirected, weighted relationship between two nodes. Weight lives in
/// [0,1]; out-of-range input is clamped rather than rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptEdge {
    pub id: EdgeId,
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub label: String,
    pub weight: f64,
    pub metadata: Metadata,
    #[serde(default)]
    pub merge_history: Vec<MergeRecord>,
}

impl ConceptEdge {
    pub fn new(source_id: NodeId, target_id: NodeId) -> Self {
        Self {
            id: EdgeId::new_v4(),
            source_id,
            target_id,
            label: DEFAULT_EDGE_LABEL.to_string(),
            weight: 1.0,
            metadata: Metadata::new(),
            merge_history: Vec::new(),
        }
    }

    pub fn with_label<S: Into<String>>(mut self, label: S) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight.clamp(0.0, 1.0);
        self
    }

    pub fn with_attribute<K: Into<String>, V: Into<conceptgraph_core::AttributeValue>>(
        mut self,
        key: K,
        value: V,
    ) -> Self {
        self.metadata.attributes.insert(key.into(), value.into());
        self
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.source_id, self.target_id)
    }

    /// Folds a duplicate proposal for the same pair into this edge: the
    /// higher weight wins, absent metadata is absorbed, and the proposal
    /// lands in the merge history.
    pub fn reinforce(&mut self, label: &str, weight: f64, metadata: &Metadata) {
        let weight = weight.clamp(0.0, 1.0);
        if weight > self.weight {
            self.weight = weight;
        }
        self.metadata.absorb_absent(metadata);
        self.merge_history
            .push(MergeRecord::new(label, "duplicate relationship"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn edge_key_is_order_insensitive() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(EdgeKey::new(a, b), EdgeKey::new(b, a));
    }

    #[test]
    fn weight_is_clamped_to_unit_interval() {
        let e = ConceptEdge::new(Uuid::new_v4(), Uuid::new_v4()).with_weight(3.5);
        assert_eq!(e.weight, 1.0);
        let e = ConceptEdge::new(Uuid::new_v4(), Uuid::new_v4()).with_weight(-0.1);
        assert_eq!(e.weight, 0.0);
    }

    #[test]
    fn reinforce_keeps_max_weight_and_appends_history() {
        let mut e = ConceptEdge::new(Uuid::new_v4(), Uuid::new_v4()).with_weight(0.8);
        e.reinforce("supports", 0.3, &Metadata::new());
        assert_eq!(e.weight, 0.8);
        e.reinforce("supports", 0.95, &Metadata::new());
        assert_eq!(e.weight, 0.95);
        assert_eq!(e.merge_history.len(), 2);
    }
}
