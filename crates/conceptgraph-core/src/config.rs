use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Weights for pairwise node similarity. The defaults are the tuned
/// heuristics the clustering and merge layers share; all of them can be
/// overridden through configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// Bonus when both nodes have the same type.
    #[serde(default = "SimilarityConfig::default_type_match")]
    pub type_match: f64,
    /// Bonus for an exact case-insensitive label match.
    #[serde(default = "SimilarityConfig::default_exact_label")]
    pub exact_label: f64,
    /// Bonus when one label contains the other (labels longer than
    /// `min_substring_len`).
    #[serde(default = "SimilarityConfig::default_label_substring")]
    pub label_substring: f64,
    /// Bonus when labels share their first word.
    #[serde(default = "SimilarityConfig::default_shared_first_word")]
    pub shared_first_word: f64,
    /// Bonus when the two nodes are directly connected.
    #[serde(default = "SimilarityConfig::default_connected")]
    pub connected: f64,
    #[serde(default = "SimilarityConfig::default_min_substring_len")]
    pub min_substring_len: usize,
}

impl SimilarityConfig {
    fn default_type_match() -> f64 {
        0.9
    }
    fn default_exact_label() -> f64 {
        0.4
    }
    fn default_label_substring() -> f64 {
        0.3
    }
    fn default_shared_first_word() -> f64 {
        0.2
    }
    fn default_connected() -> f64 {
        0.4
    }
    fn default_min_substring_len() -> usize {
        3
    }
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            type_match: Self::default_type_match(),
            exact_label: Self::default_exact_label(),
            label_substring: Self::default_label_substring(),
            shared_first_word: Self::default_shared_first_word(),
            connected: Self::default_connected(),
            min_substring_len: Self::default_min_substring_len(),
        }
    }
}

/// Scoring weights and acceptance threshold for entity resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Score for a label-substring match when node types agree.
    #[serde(default = "MergeConfig::default_substring_same_type")]
    pub substring_same_type: f64,
    /// Score for a label-substring match when node types differ.
    #[serde(default = "MergeConfig::default_substring_type_mismatch")]
    pub substring_type_mismatch: f64,
    /// Multiplier applied to the description word-overlap ratio.
    #[serde(default = "MergeConfig::default_description_overlap")]
    pub description_overlap: f64,
    /// Minimum overlap ratio before descriptions count as evidence.
    #[serde(default = "MergeConfig::default_overlap_ratio_floor")]
    pub overlap_ratio_floor: f64,
    /// Candidates scoring below this threshold become new nodes.
    #[serde(default = "MergeConfig::default_merge_threshold")]
    pub merge_threshold: f64,
    /// Labels at or below this length never substring-match.
    #[serde(default = "MergeConfig::default_min_substring_len")]
    pub min_substring_len: usize,
}

impl MergeConfig {
    fn default_substring_same_type() -> f64 {
        0.8
    }
    fn default_substring_type_mismatch() -> f64 {
        0.5
    }
    fn default_description_overlap() -> f64 {
        0.7
    }
    fn default_overlap_ratio_floor() -> f64 {
        0.5
    }
    fn default_merge_threshold() -> f64 {
        0.5
    }
    fn default_min_substring_len() -> usize {
        3
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            substring_same_type: Self::default_substring_same_type(),
            substring_type_mismatch: Self::default_substring_type_mismatch(),
            description_overlap: Self::default_description_overlap(),
            overlap_ratio_floor: Self::default_overlap_ratio_floor(),
            merge_threshold: Self::default_merge_threshold(),
            min_substring_len: Self::default_min_substring_len(),
        }
    }
}

/// Bounds on the iterative expansion loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionConfig {
    #[serde(default = "ExpansionConfig::default_max_iterations")]
    pub max_iterations: usize,
    /// Wall-clock budget for one `expand` call, in milliseconds.
    #[serde(default = "ExpansionConfig::default_time_budget_ms")]
    pub time_budget_ms: u64,
    /// Pause between iterations, in milliseconds.
    #[serde(default = "ExpansionConfig::default_iteration_delay_ms")]
    pub iteration_delay_ms: u64,
    /// How many collaborator suggestions may be applied per isolated node.
    #[serde(default = "ExpansionConfig::default_suggestions_per_node")]
    pub suggestions_per_node: usize,
    /// Upper bound on node labels included in a graph summary.
    #[serde(default = "ExpansionConfig::default_summary_sample_size")]
    pub summary_sample_size: usize,
}

impl ExpansionConfig {
    fn default_max_iterations() -> usize {
        10
    }
    fn default_time_budget_ms() -> u64 {
        8_000
    }
    fn default_iteration_delay_ms() -> u64 {
        100
    }
    fn default_suggestions_per_node() -> usize {
        2
    }
    fn default_summary_sample_size() -> usize {
        50
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }

    pub fn iteration_delay(&self) -> Duration {
        Duration::from_millis(self.iteration_delay_ms)
    }
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            max_iterations: Self::default_max_iterations(),
            time_budget_ms: Self::default_time_budget_ms(),
            iteration_delay_ms: Self::default_iteration_delay_ms(),
            suggestions_per_node: Self::default_suggestions_per_node(),
            summary_sample_size: Self::default_summary_sample_size(),
        }
    }
}

/// Where evolution history (snapshots, metric series, feedback) lands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "HistoryConfig::default_path")]
    pub path: PathBuf,
}

impl HistoryConfig {
    fn default_path() -> PathBuf {
        PathBuf::from("./graph_history")
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub similarity: SimilarityConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub expansion: ExpansionConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}
