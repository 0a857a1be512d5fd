//! Configuration management for the fraud graph analyzer

use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options for one analysis run. Every field can be overridden per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalysisConfig {
    /// Maximum span (ms) of a burst window
    pub time_window: i64,

    /// Number of consecutive transactions in a burst window
    pub min_transactions: usize,

    /// Cosine similarity at which two nodes are density neighbors
    pub eps: f64,

    /// Density neighbors needed for a node to seed or grow a cluster
    pub min_pts: usize,

    /// Smallest cluster kept after expansion
    pub min_cluster_size: usize,

    /// Internal edge density a group must exceed to be surfaced
    pub cluster_density_threshold: f64,

    /// Group risk a group must exceed to be surfaced
    pub group_risk_threshold: f64,

    /// Cycles scoring below this are discarded
    pub cycle_risk_threshold: u8,

    /// Stop the cycle search after this many raw cycles
    pub max_cycles_emitted: usize,

    /// Do not extend a DFS path beyond this many nodes
    pub max_path_length: usize,

    /// Largest graph the all-pairs path analysis accepts
    pub max_path_nodes: usize,

    /// Wall-clock budget for the whole analysis
    pub timeout_ms: Option<u64>,

    /// Worker threads (0 = rayon's global pool)
    pub threads: usize,

    /// How many nodes to report in degree and cluster centrality lists
    pub top_central_nodes: usize,

    /// Run the all-pairs path analysis
    pub analyze_paths: bool,

    /// Smallest dense subgraph reported by the miner
    pub subgraph_min_size: usize,

    /// Density a mined subgraph must keep while growing
    pub subgraph_min_density: f64,

    /// Cap on simple paths returned by a relation-path query
    pub max_relation_paths: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            time_window: 300_000,
            min_transactions: 3,
            eps: 0.3,
            min_pts: 3,
            min_cluster_size: 3,
            cluster_density_threshold: 0.3,
            group_risk_threshold: 60.0,
            cycle_risk_threshold: 50,
            max_cycles_emitted: 10_000,
            max_path_length: 12,
            max_path_nodes: 2_000,
            timeout_ms: None,
            threads: 0,
            top_central_nodes: 5,
            analyze_paths: true,
            subgraph_min_size: 3,
            subgraph_min_density: 0.5,
            max_relation_paths: 1_000,
        }
    }
}

impl AnalysisConfig {
    /// Parse a (possibly partial) JSON configuration; missing fields keep their defaults
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Reject option combinations no analysis can honour
    pub fn validate(&self) -> Result<()> {
        if self.min_transactions == 0 {
            return Err(AnalysisError::InvalidConfig(
                "minTransactions must be at least 1".into(),
            ));
        }
        if self.time_window < 0 {
            return Err(AnalysisError::InvalidConfig(
                "timeWindow must not be negative".into(),
            ));
        }
        if !self.eps.is_finite() {
            return Err(AnalysisError::InvalidConfig("eps must be finite".into()));
        }
        if !self.cluster_density_threshold.is_finite()
            || !self.group_risk_threshold.is_finite()
            || !self.subgraph_min_density.is_finite()
        {
            return Err(AnalysisError::InvalidConfig(
                "group thresholds must be finite".into(),
            ));
        }
        if self.max_path_length == 0 {
            return Err(AnalysisError::InvalidConfig(
                "maxPathLength must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
