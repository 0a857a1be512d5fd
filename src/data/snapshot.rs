//! Raw snapshot records handed over by the dashboard

use crate::error::{AnalysisError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Identifier of a node or edge record. Snapshots use either integers or strings.
///
/// Ordering puts integers (numerically) before strings (lexicographically),
/// which is the order used for canonical cycle keys and stable output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Str(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(id) => write!(f, "{}", id),
            RecordId::Str(id) => f.write_str(id),
        }
    }
}

/// Integer text becomes `Int`, anything else `Str`
impl FromStr for RecordId {
    type Err = Infallible;

    fn from_str(text: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match text.parse::<i64>() {
            Ok(id) => RecordId::Int(id),
            Err(_) => RecordId::Str(text.to_string()),
        })
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        RecordId::Int(id)
    }
}

impl From<i32> for RecordId {
    fn from(id: i32) -> Self {
        RecordId::Int(i64::from(id))
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        RecordId::Str(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        RecordId::Str(id)
    }
}

/// Kind of entity a node represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    Account,
    Merchant,
    Transaction,
    CreditCard,
    Loan,
    Bank,
    Address,
    Phone,
    /// Anything unrecognised, including a missing type
    #[default]
    #[serde(rename = "default", other)]
    Other,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Account => "account",
            NodeType::Merchant => "merchant",
            NodeType::Transaction => "transaction",
            NodeType::CreditCard => "credit-card",
            NodeType::Loan => "loan",
            NodeType::Bank => "bank",
            NodeType::Address => "address",
            NodeType::Phone => "phone",
            NodeType::Other => "default",
        }
    }
}

/// Timestamp as it appears in a snapshot: epoch millis or ISO-8601 text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Millis(i64),
    Fractional(f64),
    Text(String),
}

impl RawTimestamp {
    /// Resolve to epoch milliseconds (UTC). Values outside the range chrono
    /// can represent are rejected, so differences of two timestamps fit in i64.
    pub fn to_millis(&self) -> Result<i64> {
        let ms = match self {
            RawTimestamp::Millis(ms) => *ms,
            RawTimestamp::Fractional(ms) if ms.is_finite() && ms.abs() < i64::MAX as f64 => {
                ms.round() as i64
            }
            RawTimestamp::Fractional(ms) => {
                return Err(AnalysisError::InvalidTimestamp(ms.to_string()))
            }
            RawTimestamp::Text(text) => parse_timestamp_text(text)?,
        };

        match DateTime::from_timestamp_millis(ms) {
            Some(_) => Ok(ms),
            None => Err(AnalysisError::InvalidTimestamp(ms.to_string())),
        }
    }
}

impl From<i64> for RawTimestamp {
    fn from(ms: i64) -> Self {
        RawTimestamp::Millis(ms)
    }
}

impl From<&str> for RawTimestamp {
    fn from(text: &str) -> Self {
        RawTimestamp::Text(text.to_string())
    }
}

fn parse_timestamp_text(text: &str) -> Result<i64> {
    let text = text.trim();

    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Ok(datetime.timestamp_millis());
    }

    // Zone-less datetimes are read as UTC
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc().timestamp_millis());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc().timestamp_millis());
        }
    }

    text.parse::<i64>()
        .map_err(|_| AnalysisError::InvalidTimestamp(text.to_string()))
}

/// Node record as supplied by the collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNode {
    pub id: RecordId,

    #[serde(rename = "type", default)]
    pub node_type: NodeType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Opaque key/value properties, passed through untouched
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl RawNode {
    pub fn new(id: impl Into<RecordId>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            node_type,
            label: None,
            properties: BTreeMap::new(),
        }
    }
}

/// Edge (transfer) record as supplied by the collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEdge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,

    pub source: RecordId,

    pub target: RecordId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<RawTimestamp>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
}

impl RawEdge {
    pub fn new(source: impl Into<RecordId>, target: impl Into<RecordId>) -> Self {
        Self {
            id: None,
            source: source.into(),
            target: target.into(),
            amount: None,
            timestamp: None,
            edge_type: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<RecordId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Timestamp in epoch milliseconds
    pub fn with_timestamp(mut self, millis: i64) -> Self {
        self.timestamp = Some(RawTimestamp::Millis(millis));
        self
    }

    /// Timestamp as ISO-8601 text
    pub fn with_timestamp_text(mut self, text: &str) -> Self {
        self.timestamp = Some(RawTimestamp::Text(text.to_string()));
        self
    }
}

/// Immutable point-in-time copy of the dashboard graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub nodes: Vec<RawNode>,

    #[serde(default)]
    pub edges: Vec<RawEdge>,
}

impl Snapshot {
    pub fn new(nodes: Vec<RawNode>, edges: Vec<RawEdge>) -> Self {
        Self { nodes, edges }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
