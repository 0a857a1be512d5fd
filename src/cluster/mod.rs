//! Similarity clustering of nodes into suspected rings

pub mod detection;
pub mod features;
pub mod metrics;

use crate::data::snapshot::RecordId;
use serde::Serialize;
use std::collections::BTreeMap;

pub use detection::find_risk_groups;

/// A validated group of nodes behaving alike and trading with each other
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// Position in the risk-ordered output
    pub id: u32,

    /// Member ids in ascending order
    pub members: Vec<RecordId>,

    pub size: usize,

    /// Internal edges over size * (size - 1) / 2
    pub density: f64,

    /// Sum of the amounts on internal edges
    pub internal_amount: f64,

    /// Group risk in [0, 100]
    pub risk: f64,

    /// Members with the highest internal degree
    pub central_members: Vec<RecordId>,

    pub roles: BTreeMap<RecordId, MemberRole>,

    /// Internal transactions, oldest first, untimestamped last
    pub timeline: Vec<TimelineEvent>,
}

/// Part a member plays in the money flow, from its whole-graph degrees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    /// Mostly sends
    Source,
    /// Mostly receives
    Sink,
    /// Many transactions in both directions
    Hub,
    Regular,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub timestamp: Option<i64>,
    pub source: RecordId,
    pub target: RecordId,
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterReport {
    /// Surfaced groups, highest risk first
    pub groups: Vec<Cluster>,
    /// Density clusters found before validation
    pub candidates: usize,
    /// The deadline expired before every similarity row was computed
    pub partial: bool,
}
