//! Core library functions for the fraud graph analyzer

pub mod analysis;
pub mod cluster;
pub mod config;
pub mod data;
pub mod error;
pub mod graph;
pub mod storage;

pub use analysis::paths::{all_shortest_paths, relation_paths, RelationPaths};
pub use analysis::risk::{analyze, AnalysisResult};
pub use config::AnalysisConfig;
pub use data::snapshot::{RawEdge, RawNode, RecordId, Snapshot};
pub use error::{AnalysisError, Result};
