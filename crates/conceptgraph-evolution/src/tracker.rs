use chrono::{DateTime, Utc};
use conceptgraph_analysis::least_squares;
use conceptgraph_core::{
    FeedbackRecord, FeedbackSource, NodeId, NodeType, Result, SnapshotId,
};
use conceptgraph_graph::{EdgeKey, GraphSnapshot};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Where in the expansion lifecycle a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotCheckpoint {
    Init,
    PostAnalysis,
    PostExpansion,
    PostReconnect,
    PostRecluster,
}

impl fmt::Display for SnapshotCheckpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SnapshotCheckpoint::Init => "init",
            SnapshotCheckpoint::PostAnalysis => "post_analysis",
            SnapshotCheckpoint::PostExpansion => "post_expansion",
            SnapshotCheckpoint::PostReconnect => "post_reconnect",
            SnapshotCheckpoint::PostRecluster => "post_recluster",
        };
        write!(f, "{}", s)
    }
}

/// Full snapshot record as persisted: counts plus the serialized graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub id: SnapshotId,
    pub timestamp: DateTime<Utc>,
    pub checkpoint: SnapshotCheckpoint,
    pub node_count: usize,
    pub edge_count: usize,
    pub graph: GraphSnapshot,
    pub metadata: serde_json::Value,
}

/// What stays in memory per snapshot: everything except the graph copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub id: SnapshotId,
    pub timestamp: DateTime<Utc>,
    pub checkpoint: SnapshotCheckpoint,
    pub node_count: usize,
    pub edge_count: usize,
    pub metadata: serde_json::Value,
}

/// Sink for evolution history. Failures here are advisory: the in-memory
/// record always lands, and a failed write only logs.
pub trait HistoryStore: Send + Sync {
    fn write_snapshot(&self, record: &SnapshotRecord) -> Result<()>;
    fn append_metrics(&self, line: &serde_json::Value) -> Result<()>;
    fn append_feedback(&self, record: &FeedbackRecord) -> Result<()>;
}

/// History store that keeps nothing. Used in tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct NullHistoryStore;

impl HistoryStore for NullHistoryStore {
    fn write_snapshot(&self, _record: &SnapshotRecord) -> Result<()> {
        Ok(())
    }
    fn append_metrics(&self, _line: &serde_json::Value) -> Result<()> {
        Ok(())
    }
    fn append_feedback(&self, _record: &FeedbackRecord) -> Result<()> {
        Ok(())
    }
}

/// Directory-backed JSON history: one `<snapshot id>.json` per snapshot,
/// `metrics_history.jsonl` and `feedback_history.jsonl` append streams.
#[derive(Debug, Clone)]
pub struct JsonHistoryStore {
    path: PathBuf,
}

impl JsonHistoryStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    fn append_line(&self, file: &str, value: &serde_json::Value) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.join(file))?;
        writeln!(f, "{}", value)?;
        Ok(())
    }
}

impl HistoryStore for JsonHistoryStore {
    fn write_snapshot(&self, record: &SnapshotRecord) -> Result<()> {
        let file = self.path.join(format!("{}.json", record.id));
        fs::write(file, serde_json::to_vec_pretty(record)?)?;
        Ok(())
    }

    fn append_metrics(&self, line: &serde_json::Value) -> Result<()> {
        self.append_line("metrics_history.jsonl", line)
    }

    fn append_feedback(&self, record: &FeedbackRecord) -> Result<()> {
        self.append_line("feedback_history.jsonl", &serde_json::to_value(record)?)
    }
}

/// Growth-rate analysis over the snapshot log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GrowthAnalysis {
    /// Fewer than two snapshots, or no elapsed time between them.
    InsufficientData,
    Analyzed {
        node_growth_per_hour: f64,
        edge_growth_per_hour: f64,
        /// Exponent of N(t) ∝ t^α; requires ≥3 snapshots.
        node_power_law_exponent: Option<f64>,
        edge_power_law_exponent: Option<f64>,
        hours_tracked: f64,
        snapshot_count: usize,
    },
}

/// How one hub accumulated its connections over time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubFormation {
    pub node_id: NodeId,
    pub degree: usize,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub created_at: Option<DateTime<Utc>>,
    pub connections_count: usize,
    pub connection_sample: Vec<EdgeFormation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeFormation {
    pub neighbor: NodeId,
    pub created_at: DateTime<Utc>,
}

const HUB_CONNECTION_SAMPLE: usize = 5;

/// Tracks the temporal evolution of the graph: periodic snapshots, entity
/// creation provenance, metric time series, and the feedback log.
pub struct EvolutionTracker {
    store: Box<dyn HistoryStore>,
    snapshots: RwLock<Vec<SnapshotSummary>>,
    metrics_history: RwLock<HashMap<String, Vec<(DateTime<Utc>, f64)>>>,
    node_created: DashMap<NodeId, DateTime<Utc>>,
    edge_created: DashMap<EdgeKey, DateTime<Utc>>,
    feedback: RwLock<Vec<FeedbackRecord>>,
}

impl EvolutionTracker {
    pub fn new(store: Box<dyn HistoryStore>) -> Self {
        Self {
            store,
            snapshots: RwLock::new(Vec::new()),
            metrics_history: RwLock::new(HashMap::new()),
            node_created: DashMap::new(),
            edge_created: DashMap::new(),
            feedback: RwLock::new(Vec::new()),
        }
    }

    /// Serializes the full graph into a snapshot record, persists it, and
    /// appends a lightweight summary to the in-memory log. A store failure
    /// keeps the summary and logs the miss.
    pub fn create_snapshot(
        &self,
        graph: &GraphSnapshot,
        checkpoint: SnapshotCheckpoint,
        metadata: serde_json::Value,
    ) -> SnapshotId {
        let record = SnapshotRecord {
            id: SnapshotId::new_v4(),
            timestamp: Utc::now(),
            checkpoint,
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
            graph: graph.clone(),
            metadata: metadata.clone(),
        };
        if let Err(e) = self.store.write_snapshot(&record) {
            warn!(snapshot_id = %record.id, error = %e, "failed to persist snapshot");
        }
        let summary = SnapshotSummary {
            id: record.id,
            timestamp: record.timestamp,
            checkpoint,
            node_count: record.node_count,
            edge_count: record.edge_count,
            metadata,
        };
        self.snapshots.write().push(summary);
        info!(snapshot_id = %record.id, %checkpoint, "created graph snapshot");
        record.id
    }

    pub fn snapshot_log(&self) -> Vec<SnapshotSummary> {
        self.snapshots.read().clone()
    }

    pub fn record_node_creation(&self, id: NodeId) {
        self.node_created.entry(id).or_insert_with(Utc::now);
    }

    pub fn record_edge_creation(&self, source: NodeId, target: NodeId) {
        self.edge_created
            .entry(EdgeKey::new(source, target))
            .or_insert_with(Utc::now);
    }

    /// Appends each value into its per-name time series and mirrors the
    /// whole set to the history stream.
    pub fn save_metrics(&self, values: HashMap<String, f64>) {
        let timestamp = Utc::now();
        {
            let mut history = self.metrics_history.write();
            for (name, value) in &values {
                history
                    .entry(name.clone())
                    .or_default()
                    .push((timestamp, *value));
            }
        }
        let mut line = serde_json::Map::new();
        line.insert("timestamp".into(), serde_json::json!(timestamp));
        for (name, value) in &values {
            line.insert(name.clone(), serde_json::json!(value));
        }
        if let Err(e) = self.store.append_metrics(&serde_json::Value::Object(line)) {
            warn!(error = %e, "failed to append metrics history");
        }
        debug!(count = values.len(), "saved metrics snapshot");
    }

    pub fn metric_trend(&self, name: &str, last_n: Option<usize>) -> Vec<(DateTime<Utc>, f64)> {
        let history = self.metrics_history.read();
        let series = history.get(name).cloned().unwrap_or_default();
        match last_n {
            Some(n) if n < series.len() => series[series.len() - n..].to_vec(),
            _ => series,
        }
    }

    /// Growth per elapsed hour across the snapshot log, plus a power-law
    /// fit of counts against normalized elapsed time when at least three
    /// snapshots span a positive interval.
    pub fn analyze_growth_rate(&self) -> GrowthAnalysis {
        let snapshots = self.snapshots.read();
        if snapshots.len() < 2 {
            return GrowthAnalysis::InsufficientData;
        }

        let first = &snapshots[0];
        let last = &snapshots[snapshots.len() - 1];
        let elapsed = (last.timestamp - first.timestamp)
            .num_milliseconds() as f64
            / 3_600_000.0;
        if elapsed <= 0.0 {
            return GrowthAnalysis::InsufficientData;
        }

        let node_growth_per_hour = (last.node_count as f64 - first.node_count as f64) / elapsed;
        let edge_growth_per_hour = (last.edge_count as f64 - first.edge_count as f64) / elapsed;

        let (node_exp, edge_exp) = if snapshots.len() >= 3 {
            let total_secs = (last.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0;
            let points =
                |count: fn(&SnapshotSummary) -> usize| -> Vec<(f64, f64)> {
                    snapshots
                        .iter()
                        .map(|s| {
                            let t = (s.timestamp - first.timestamp).num_milliseconds() as f64
                                / 1000.0
                                / total_secs;
                            (t.max(1e-10).ln(), (count(s).max(1) as f64).ln())
                        })
                        .collect()
                };
            let (node_slope, _) = least_squares(&points(|s| s.node_count));
            let (edge_slope, _) = least_squares(&points(|s| s.edge_count));
            (
                (!node_slope.is_nan()).then_some(node_slope),
                (!edge_slope.is_nan()).then_some(edge_slope),
            )
        } else {
            (None, None)
        };

        GrowthAnalysis::Analyzed {
            node_growth_per_hour,
            edge_growth_per_hour,
            node_power_law_exponent: node_exp,
            edge_power_law_exponent: edge_exp,
            hours_tracked: elapsed,
            snapshot_count: snapshots.len(),
        }
    }

    /// Ranks nodes by degree and explains, per hub, when it was created and
    /// when a sample of its edges arrived.
    pub fn analyze_hub_formation(&self, graph: &GraphSnapshot, top_n: usize) -> Vec<HubFormation> {
        let mut by_degree: Vec<(&NodeId, usize)> = graph
            .nodes
            .keys()
            .map(|id| (id, graph.degree(*id)))
            .collect();
        by_degree.sort_by(|a, b| b.1.cmp(&a.1));

        by_degree
            .into_iter()
            .take(top_n)
            .filter_map(|(id, degree)| {
                let node = graph.nodes.get(id)?;
                let mut connection_sample: Vec<EdgeFormation> = graph
                    .neighbors(*id)
                    .iter()
                    .filter_map(|neighbor| {
                        self.edge_created
                            .get(&EdgeKey::new(*id, *neighbor))
                            .map(|t| EdgeFormation {
                                neighbor: *neighbor,
                                created_at: *t,
                            })
                    })
                    .collect();
                connection_sample.sort_by_key(|e| e.created_at);
                let connections_count = connection_sample.len();
                connection_sample.truncate(HUB_CONNECTION_SAMPLE);
                Some(HubFormation {
                    node_id: *id,
                    degree,
                    label: node.label.clone(),
                    node_type: node.node_type,
                    created_at: self.node_created.get(id).map(|t| *t),
                    connections_count,
                    connection_sample,
                })
            })
            .collect()
    }

    /// Appends to the feedback log and mirrors the entry to history.
    pub fn record_feedback(
        &self,
        source: FeedbackSource,
        kind: &str,
        payload: serde_json::Value,
    ) {
        let record = FeedbackRecord {
            timestamp: Utc::now(),
            source,
            kind: kind.to_string(),
            payload,
        };
        if let Err(e) = self.store.append_feedback(&record) {
            warn!(error = %e, "failed to append feedback history");
        }
        info!(%source, kind, "recorded feedback");
        self.feedback.write().push(record);
    }

    pub fn recent_feedback(&self, limit: usize) -> Vec<FeedbackRecord> {
        let feedback = self.feedback.read();
        let start = feedback.len().saturating_sub(limit);
        feedback[start..].to_vec()
    }
}
