use crate::{ConceptEdge, EdgeKey};
use async_trait::async_trait;
use conceptgraph_core::{ConceptNode, NodeId, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Full persisted graph payload, as returned by the storage collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedGraph {
    pub nodes: Vec<ConceptNode>,
    pub edges: Vec<ConceptEdge>,
}

/// Storage collaborator interface. `None` returns are rejections the
/// caller skips (missing endpoint, duplicate pair), not errors; `Err` is a
/// storage failure that skips the candidate and gets logged.
#[async_trait]
pub trait GraphPersistence: Send + Sync {
    async fn create_node(&self, node: &ConceptNode) -> Result<Option<ConceptNode>>;
    async fn create_edge(&self, edge: &ConceptEdge) -> Result<Option<ConceptEdge>>;
    async fn load_full_graph(&self) -> Result<PersistedGraph>;
}

/// In-memory persistence used for tests and ephemeral sessions. Mirrors
/// the reference store's contract: edges require both endpoints and one
/// edge per unordered pair.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    nodes: DashMap<NodeId, ConceptNode>,
    edges: DashMap<EdgeKey, ConceptEdge>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

#[async_trait]
impl GraphPersistence for InMemoryPersistence {
    async fn create_node(&self, node: &ConceptNode) -> Result<Option<ConceptNode>> {
        self.nodes.insert(node.id, node.clone());
        debug!(node_id = %node.id, label = %node.label, "persisted node");
        Ok(Some(node.clone()))
    }

    async fn create_edge(&self, edge: &ConceptEdge) -> Result<Option<ConceptEdge>> {
        if !self.nodes.contains_key(&edge.source_id) || !self.nodes.contains_key(&edge.target_id) {
            return Ok(None);
        }
        let key = edge.key();
        if self.edges.contains_key(&key) {
            return Ok(None);
        }
        self.edges.insert(key, edge.clone());
        debug!(edge_id = %edge.id, "persisted edge");
        Ok(Some(edge.clone()))
    }

    async fn load_full_graph(&self) -> Result<PersistedGraph> {
        Ok(PersistedGraph {
            nodes: self.nodes.iter().map(|e| e.value().clone()).collect(),
            edges: self.edges.iter().map(|e| e.value().clone()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conceptgraph_core::NodeType;

    #[tokio::test]
    async fn create_edge_requires_persisted_endpoints() {
        let store = InMemoryPersistence::new();
        let a = ConceptNode::new("a", NodeType::Concept);
        let b = ConceptNode::new("b", NodeType::Concept);
        let edge = ConceptEdge::new(a.id, b.id);

        assert!(store.create_edge(&edge).await.unwrap().is_none());

        store.create_node(&a).await.unwrap();
        store.create_node(&b).await.unwrap();
        assert!(store.create_edge(&edge).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_pair_is_rejected_not_error() {
        let store = InMemoryPersistence::new();
        let a = ConceptNode::new("a", NodeType::Concept);
        let b = ConceptNode::new("b", NodeType::Concept);
        store.create_node(&a).await.unwrap();
        store.create_node(&b).await.unwrap();

        assert!(store
            .create_edge(&ConceptEdge::new(a.id, b.id))
            .await
            .unwrap()
            .is_some());
        assert!(store
            .create_edge(&ConceptEdge::new(b.id, a.id))
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.edge_count(), 1);
    }

    #[tokio::test]
    async fn load_full_graph_round_trips() {
        let store = InMemoryPersistence::new();
        let a = ConceptNode::new("a", NodeType::Concept);
        let b = ConceptNode::new("b", NodeType::Concept);
        store.create_node(&a).await.unwrap();
        store.create_node(&b).await.unwrap();
        store
            .create_edge(&ConceptEdge::new(a.id, b.id))
            .await
            .unwrap();

        let loaded = store.load_full_graph().await.unwrap();
        assert_eq!(loaded.nodes.len(), 2);
        assert_eq!(loaded.edges.len(), 1);
    }
}
