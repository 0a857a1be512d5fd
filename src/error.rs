//! Error types for the analytics core

use thiserror::Error;

/// Failures the analytics core reports to callers.
///
/// Data-quality problems in a snapshot (duplicate ids, dangling edges,
/// unreadable timestamps) are not errors: they are dropped and counted in
/// [`crate::graph::BuildDiagnostics`].
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A timestamp string that is neither RFC 3339, a naive datetime nor a date
    #[error("unrecognised timestamp {0:?}")]
    InvalidTimestamp(String),

    /// Options that make an analysis meaningless
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Path analysis is quadratic in the node count and refuses large graphs
    #[error("graph has {nodes} nodes, path analysis is limited to {limit}")]
    GraphTooLarge { nodes: usize, limit: usize },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("malformed snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
