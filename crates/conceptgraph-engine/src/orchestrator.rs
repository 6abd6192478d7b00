use crate::{summarize, validate_batch, EndpointRef, GraphView, ValidatedBatch};
use conceptgraph_analysis::{ClusteringService, MetricsEngine};
use conceptgraph_core::{
    ConceptNode, ContentGenerator, EngineConfig, ExpansionConfig, Metadata, NodeId,
    RelationshipSuggester, Result,
};
use conceptgraph_evolution::{EvolutionTracker, FeedbackLoop, HistoryStore, SnapshotCheckpoint};
use conceptgraph_graph::{
    ConceptEdge, ConceptGraph, GraphPersistence, MergeResolver, DEFAULT_EDGE_LABEL,
};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub type UpdateCallback = Box<dyn Fn(&GraphView) + Send + Sync>;

/// Drives iterative graph growth: request candidates, validate, merge,
/// snapshot, evaluate, and decide whether to keep going.
///
/// The orchestrator owns the shared graph and is the only mutation path
/// into it. One expansion runs at a time; a second `expand` call arriving
/// mid-flight gets the current view instead of racing. Analytics read
/// snapshots, so they never observe a torn graph.
pub struct ExpansionOrchestrator {
    graph: Arc<ConceptGraph>,
    generator: Arc<dyn ContentGenerator>,
    suggester: Arc<dyn RelationshipSuggester>,
    persistence: Arc<dyn GraphPersistence>,
    resolver: MergeResolver,
    clustering: ClusteringService,
    metrics: MetricsEngine,
    tracker: EvolutionTracker,
    feedback: FeedbackLoop,
    config: ExpansionConfig,
    expansion_gate: tokio::sync::Mutex<()>,
    on_update: RwLock<Option<UpdateCallback>>,
}

impl ExpansionOrchestrator {
    pub fn new(
        generator: Arc<dyn ContentGenerator>,
        suggester: Arc<dyn RelationshipSuggester>,
        persistence: Arc<dyn GraphPersistence>,
        history: Box<dyn HistoryStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            graph: Arc::new(ConceptGraph::new()),
            generator,
            suggester,
            persistence,
            resolver: MergeResolver::new(config.merge),
            clustering: ClusteringService::new(config.similarity),
            metrics: MetricsEngine::new(),
            tracker: EvolutionTracker::new(history),
            feedback: FeedbackLoop::new(),
            config: config.expansion,
            expansion_gate: tokio::sync::Mutex::new(()),
            on_update: RwLock::new(None),
        }
    }

    pub fn graph(&self) -> &ConceptGraph {
        &self.graph
    }

    pub fn tracker(&self) -> &EvolutionTracker {
        &self.tracker
    }

    /// Registers the presentation push hook, invoked after every externally
    /// visible mutation.
    pub fn set_update_callback(&self, callback: UpdateCallback) {
        *self.on_update.write() = Some(callback);
    }

    /// Loads the persisted graph into memory and takes the init snapshot.
    /// This is the one place a failure is fatal: without a bootstrapped
    /// graph there is nothing to expand.
    pub async fn initialize(&self) -> Result<()> {
        let persisted = self.persistence.load_full_graph().await?;
        let node_count = persisted.nodes.len();
        let (loaded_edges, skipped_edges) = self.graph.bulk_load(persisted.nodes, persisted.edges);

        for id in self.graph.node_ids() {
            self.tracker.record_node_creation(id);
        }
        for edge in self.graph.edges() {
            self.tracker.record_edge_creation(edge.source_id, edge.target_id);
        }
        self.tracker.create_snapshot(
            &self.graph.snapshot(),
            SnapshotCheckpoint::Init,
            serde_json::json!({ "loaded_edges": loaded_edges, "skipped_edges": skipped_edges }),
        );
        info!(
            nodes = node_count,
            edges = loaded_edges,
            skipped_edges,
            "graph initialized from storage"
        );
        Ok(())
    }

    /// The presentation pull: full node/edge sets plus clusters and
    /// metrics, computed against one snapshot.
    pub fn graph_data(&self) -> GraphView {
        let snapshot = self.graph.snapshot();
        GraphView {
            nodes: snapshot.nodes.values().cloned().collect(),
            edges: snapshot.edges.clone(),
            clusters: self.clustering.cluster(&snapshot),
            metrics: self.metrics.compute(&snapshot),
        }
    }

    /// Runs the analysis checkpoint: computes the view, feeds the metric
    /// time series, and records the post-analysis snapshot.
    pub fn analyze(&self) -> GraphView {
        let snapshot = self.graph.snapshot();
        let view = GraphView {
            nodes: snapshot.nodes.values().cloned().collect(),
            edges: snapshot.edges.clone(),
            clusters: self.clustering.cluster(&snapshot),
            metrics: self.metrics.compute(&snapshot),
        };

        let mut values = HashMap::new();
        values.insert("node_count".to_string(), snapshot.node_count() as f64);
        values.insert("edge_count".to_string(), snapshot.edge_count() as f64);
        values.insert("density".to_string(), snapshot.density());
        values.insert(
            "power_law_exponent".to_string(),
            view.metrics.scale_freeness.power_law_exponent,
        );
        values.insert(
            "fit_quality".to_string(),
            view.metrics.scale_freeness.fit_quality,
        );
        self.tracker.save_metrics(values);
        self.tracker.create_snapshot(
            &snapshot,
            SnapshotCheckpoint::PostAnalysis,
            serde_json::json!({ "clusters": view.clusters.len() }),
        );
        view
    }

    /// Recomputes clustering over the current graph and snapshots the
    /// result.
    pub fn recalculate_clusters(&self) -> GraphView {
        let view = self.graph_data();
        self.tracker.create_snapshot(
            &self.graph.snapshot(),
            SnapshotCheckpoint::PostRecluster,
            serde_json::json!({ "clusters": view.clusters.len() }),
        );
        self.push_update(&view);
        view
    }

    /// Iterative expansion. Bounded by `max_iterations` (defaulting to the
    /// configured cap) and the wall-clock budget; both bounds settle the
    /// call into returning the current state rather than erroring.
    pub async fn expand(&self, prompt: &str, max_iterations: Option<usize>) -> Result<GraphView> {
        let _guard = match self.expansion_gate.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!("expansion already in flight; returning current graph view");
                return Ok(self.graph_data());
            }
        };

        let max_iterations = max_iterations.unwrap_or(self.config.max_iterations);
        let deadline = Instant::now() + self.config.time_budget();
        let mut current_prompt = prompt.to_string();
        info!(prompt, max_iterations, "starting graph expansion");

        for iteration in 0..max_iterations {
            if Instant::now() >= deadline {
                info!(iteration, "expansion time budget exhausted; returning current state");
                break;
            }

            let summary = summarize(&self.graph.snapshot(), self.config.summary_sample_size);
            let prior_node_count = summary.node_count;

            let batch = match self.generator.expand(&current_prompt, &summary).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(iteration, error = %e, "content generation failed; treating as no candidates");
                    break;
                }
            };
            if batch.is_empty() {
                debug!(iteration, "collaborator returned no candidates");
                break;
            }
            let next_question = batch.next_question.clone();
            let reasoning = batch.reasoning.clone();

            let validated = validate_batch(&self.graph, batch.nodes, batch.edges);
            if validated.dropped_nodes > 0 || validated.dropped_edges > 0 {
                debug!(
                    iteration,
                    dropped_nodes = validated.dropped_nodes,
                    dropped_edges = validated.dropped_edges,
                    "validation dropped malformed candidates"
                );
            }

            let (new_nodes, new_edges) = self.apply_batch(validated, deadline).await;
            if new_nodes.is_empty() && new_edges.is_empty() {
                debug!(iteration, "iteration added no entities; stopping");
                break;
            }

            let after = self.graph.snapshot();
            self.tracker.create_snapshot(
                &after,
                SnapshotCheckpoint::PostExpansion,
                serde_json::json!({
                    "iteration": iteration,
                    "nodes_added": new_nodes.len(),
                    "edges_added": new_edges.len(),
                    "reasoning": reasoning,
                }),
            );
            let evaluation = self.feedback.evaluate_expansion(
                &self.tracker,
                &after,
                prior_node_count,
                &new_nodes,
                &new_edges,
            );
            debug!(iteration, ?evaluation, "expansion iteration complete");
            self.notify_update();

            match next_question {
                Some(question) if iteration + 1 < max_iterations => {
                    current_prompt = self.feedback.refine_expansion_strategy(&self.tracker, &question);
                }
                _ => break,
            }
            tokio::time::sleep(self.config.iteration_delay()).await;
        }

        Ok(self.graph_data())
    }

    /// Applies one validated batch: nodes first (merge or persist-then-add),
    /// then edges against the resolved endpoints. Returns the entities that
    /// actually came into being.
    async fn apply_batch(
        &self,
        batch: ValidatedBatch,
        deadline: Instant,
    ) -> (Vec<ConceptNode>, Vec<ConceptEdge>) {
        let mut resolved: Vec<Option<NodeId>> = vec![None; batch.nodes.len()];
        let mut new_nodes = Vec::new();
        let mut new_edges = Vec::new();

        for (index, validated) in batch.nodes.iter().enumerate() {
            if Instant::now() >= deadline {
                warn!("time budget exhausted before all node candidates were applied");
                break;
            }
            if let Some(found) = self.resolver.find_match(&self.graph, &validated.proposed) {
                self.resolver.merge_node(&self.graph, &found, &validated.proposed);
                resolved[index] = Some(found.id);
                continue;
            }
            let node = validated.proposed.clone().into_node();
            match self.persistence.create_node(&node).await {
                Ok(Some(stored)) => {
                    if self.graph.add_node(stored.clone()) {
                        self.tracker.record_node_creation(stored.id);
                        resolved[index] = Some(stored.id);
                        new_nodes.push(stored);
                    }
                }
                Ok(None) => {
                    warn!(label = %node.label, "storage rejected candidate node; skipping");
                }
                Err(e) => {
                    error!(label = %node.label, error = %e, "failed to persist candidate node; skipping");
                }
            }
        }

        for edge in &batch.edges {
            if Instant::now() >= deadline {
                warn!("time budget exhausted before all edge candidates were applied");
                break;
            }
            let (Some(source), Some(target)) = (
                endpoint_id(edge.source, &resolved),
                endpoint_id(edge.target, &resolved),
            ) else {
                warn!(label = %edge.label, "candidate edge endpoint did not survive the batch; skipping");
                continue;
            };
            if let Some(created) = self
                .apply_edge(source, target, &edge.label, edge.weight, Metadata::new())
                .await
            {
                new_edges.push(created);
            }
        }

        (new_nodes, new_edges)
    }

    /// Creates or reinforces one edge, persisting before the in-memory
    /// apply. Returns the edge only when a new one came into being.
    async fn apply_edge(
        &self,
        source: NodeId,
        target: NodeId,
        label: &str,
        weight: f64,
        metadata: Metadata,
    ) -> Option<ConceptEdge> {
        if source == target {
            return None;
        }
        if self.graph.has_edge(source, target) {
            self.resolver
                .resolve_edge(&self.graph, source, target, label, weight, &metadata);
            return None;
        }

        let mut edge = ConceptEdge::new(source, target)
            .with_label(label)
            .with_weight(weight);
        edge.metadata = metadata;

        match self.persistence.create_edge(&edge).await {
            Ok(Some(stored)) => match self.graph.add_edge(stored.clone()) {
                conceptgraph_graph::EdgeInsert::Added(_) => {
                    self.tracker.record_edge_creation(source, target);
                    Some(stored)
                }
                _ => None,
            },
            Ok(None) => {
                warn!(%source, %target, "storage rejected candidate edge; skipping");
                None
            }
            Err(e) => {
                error!(%source, %target, error = %e, "failed to persist candidate edge; skipping");
                None
            }
        }
    }

    /// Best-effort guarantee that every node ends with degree ≥ 1: the
    /// suggestion collaborator goes first, then same-type fallback into the
    /// largest component, then any other node. Unsatisfiable only when the
    /// graph holds fewer than two nodes.
    pub async fn reconnect_disconnected_nodes(&self) -> Result<GraphView> {
        let isolated = self.graph.isolated_nodes();
        if isolated.is_empty() {
            info!("no disconnected nodes found");
            return Ok(self.graph_data());
        }
        info!(count = isolated.len(), "reconnecting disconnected nodes");
        let isolated_set: HashSet<NodeId> = isolated.iter().copied().collect();

        let summary = summarize(&self.graph.snapshot(), self.config.summary_sample_size);
        let suggestions = match self.suggester.suggest(&summary).await {
            Ok(suggestions) => suggestions,
            Err(e) => {
                warn!(error = %e, "suggestion collaborator failed; falling back to type matching");
                Vec::new()
            }
        };

        let mut applied: HashMap<NodeId, usize> = HashMap::new();
        for suggestion in suggestions {
            if suggestion.source_id == suggestion.target_id {
                continue;
            }
            if !self.graph.has_node(suggestion.source_id)
                || !self.graph.has_node(suggestion.target_id)
                || self.graph.has_edge(suggestion.source_id, suggestion.target_id)
            {
                continue;
            }
            let touched: Vec<NodeId> = [suggestion.source_id, suggestion.target_id]
                .into_iter()
                .filter(|id| isolated_set.contains(id))
                .collect();
            if touched.is_empty() {
                continue;
            }
            if touched
                .iter()
                .any(|id| applied.get(id).copied().unwrap_or(0) >= self.config.suggestions_per_node)
            {
                continue;
            }

            let mut metadata = Metadata::new();
            metadata
                .attributes
                .insert("confidence".to_string(), suggestion.confidence.into());
            if let Some(explanation) = suggestion.explanation {
                metadata
                    .attributes
                    .insert("explanation".to_string(), explanation.into());
            }
            if self
                .apply_edge(
                    suggestion.source_id,
                    suggestion.target_id,
                    &suggestion.label,
                    suggestion.confidence,
                    metadata,
                )
                .await
                .is_some()
            {
                for id in touched {
                    *applied.entry(id).or_insert(0) += 1;
                }
            }
        }

        // Fallback for anything the collaborator left isolated.
        let largest_component: Vec<NodeId> = self
            .graph
            .connected_components()
            .into_iter()
            .filter(|component| component.len() > 1)
            .max_by_key(|component| component.len())
            .unwrap_or_default();

        for id in self.graph.isolated_nodes() {
            if self.graph.degree(id) > 0 {
                continue;
            }
            let Some(node) = self.graph.node(id) else {
                continue;
            };
            let same_type = largest_component.iter().copied().find(|candidate| {
                *candidate != id
                    && self
                        .graph
                        .node(*candidate)
                        .map(|n| n.node_type == node.node_type)
                        .unwrap_or(false)
            });
            let target = same_type
                .or_else(|| largest_component.iter().copied().find(|c| *c != id))
                .or_else(|| self.graph.node_ids().into_iter().find(|c| *c != id));
            let Some(target) = target else {
                warn!(node_id = %id, "no reconnect target available");
                continue;
            };
            self.apply_edge(id, target, DEFAULT_EDGE_LABEL, 1.0, Metadata::new())
                .await;
        }

        self.tracker.create_snapshot(
            &self.graph.snapshot(),
            SnapshotCheckpoint::PostReconnect,
            serde_json::json!({ "was_isolated": isolated.len() }),
        );
        let view = self.graph_data();
        self.push_update(&view);
        Ok(view)
    }

    fn notify_update(&self) {
        let guard = self.on_update.read();
        if let Some(callback) = guard.as_ref() {
            callback(&self.graph_data());
        }
    }

    fn push_update(&self, view: &GraphView) {
        let guard = self.on_update.read();
        if let Some(callback) = guard.as_ref() {
            callback(view);
        }
    }
}

fn endpoint_id(endpoint: EndpointRef, resolved: &[Option<NodeId>]) -> Option<NodeId> {
    match endpoint {
        EndpointRef::Existing(id) => Some(id),
        EndpointRef::Candidate(index) => resolved.get(index).copied().flatten(),
    }
}
