//! Read-only indexed transaction graph

use crate::data::snapshot::{NodeType, RecordId};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

/// A validated node stored in the arena
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: RecordId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
}

/// A validated edge whose endpoints are arena indices
#[derive(Debug, Clone)]
pub struct Edge {
    pub id: Option<RecordId>,
    pub source: usize,
    pub target: usize,
    /// Non-negative amount, `None` when absent or rejected
    pub amount: Option<f64>,
    /// Epoch milliseconds, `None` when absent or unparseable
    pub timestamp: Option<i64>,
    pub edge_type: Option<String>,
}

impl Edge {
    /// Amount used for aggregation: absent counts as zero
    pub fn amount_or_zero(&self) -> f64 {
        self.amount.unwrap_or(0.0)
    }
}

/// Incoming adjacency in the same offset/index layout as the outgoing one
#[derive(Debug)]
struct IncomingIndex {
    offsets: Vec<usize>,
    edges: Vec<usize>,
}

/// Transaction graph: node arena plus a compressed outgoing-edge index.
///
/// Nodes keep first-occurrence order from the snapshot and edges keep input
/// order, so every traversal is reproducible for an identical snapshot.
/// The incoming index is only built when an analyzer first asks for it.
#[derive(Debug)]
pub struct TransactionGraph {
    pub(crate) nodes: Vec<Node>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) id_to_index: HashMap<RecordId, usize>,

    /// offsets[i] to offsets[i+1] is the range of node i's outgoing edges
    pub(crate) out_offsets: Vec<usize>,

    /// Concatenated outgoing edge indices, input order within each node
    pub(crate) out_edges: Vec<usize>,

    incoming: OnceLock<IncomingIndex>,
}

impl TransactionGraph {
    pub(crate) fn from_parts(
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        id_to_index: HashMap<RecordId, usize>,
    ) -> Self {
        let node_count = nodes.len();

        let mut degrees = vec![0usize; node_count];
        for edge in &edges {
            degrees[edge.source] += 1;
        }

        let mut out_offsets = Vec::with_capacity(node_count + 1);
        out_offsets.push(0);
        let mut offset = 0;
        for &degree in &degrees {
            offset += degree;
            out_offsets.push(offset);
        }

        // Second pass: fill the edge array
        let mut cursor = out_offsets[..node_count].to_vec();
        let mut out_edges = vec![0usize; edges.len()];
        for (edge_idx, edge) in edges.iter().enumerate() {
            out_edges[cursor[edge.source]] = edge_idx;
            cursor[edge.source] += 1;
        }

        Self {
            nodes,
            edges,
            id_to_index,
            out_offsets,
            out_edges,
            incoming: OnceLock::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    pub fn edge(&self, idx: usize) -> &Edge {
        &self.edges[idx]
    }

    pub fn node_id(&self, idx: usize) -> &RecordId {
        &self.nodes[idx].id
    }

    pub fn node_type(&self, idx: usize) -> NodeType {
        self.nodes[idx].node_type
    }

    /// O(1) lookup from record id to arena index
    pub fn index_of(&self, id: &RecordId) -> Option<usize> {
        self.id_to_index.get(id).copied()
    }

    /// Indices of the edges leaving a node, in input order
    pub fn outgoing(&self, node: usize) -> &[usize] {
        let start = self.out_offsets[node];
        let end = self.out_offsets[node + 1];
        &self.out_edges[start..end]
    }

    pub fn out_degree(&self, node: usize) -> usize {
        self.out_offsets[node + 1] - self.out_offsets[node]
    }

    /// Indices of the edges entering a node, in input order
    pub fn incoming(&self, node: usize) -> &[usize] {
        let index = self.incoming_index();
        &index.edges[index.offsets[node]..index.offsets[node + 1]]
    }

    pub fn in_degree(&self, node: usize) -> usize {
        let index = self.incoming_index();
        index.offsets[node + 1] - index.offsets[node]
    }

    /// Edges touching a node in either direction, each counted once, in input order
    pub fn incident(&self, node: usize) -> Vec<usize> {
        let mut incident: Vec<usize> = self
            .outgoing(node)
            .iter()
            .chain(self.incoming(node).iter())
            .copied()
            .collect();
        incident.sort_unstable();
        incident.dedup();
        incident
    }

    /// First edge (input order) from `source` to `target`
    pub fn find_edge(&self, source: usize, target: usize) -> Option<&Edge> {
        self.outgoing(source)
            .iter()
            .map(|&edge_idx| &self.edges[edge_idx])
            .find(|edge| edge.target == target)
    }

    /// Whether any analyzer has needed the incoming index yet
    pub fn has_incoming_index(&self) -> bool {
        self.incoming.get().is_some()
    }

    fn incoming_index(&self) -> &IncomingIndex {
        self.incoming.get_or_init(|| {
            log::debug!("Building incoming-edge index for {} nodes", self.nodes.len());

            let node_count = self.nodes.len();
            let mut degrees = vec![0usize; node_count];
            for edge in &self.edges {
                degrees[edge.target] += 1;
            }

            let mut offsets = Vec::with_capacity(node_count + 1);
            offsets.push(0);
            let mut offset = 0;
            for &degree in &degrees {
                offset += degree;
                offsets.push(offset);
            }

            let mut cursor = offsets[..node_count].to_vec();
            let mut edges = vec![0usize; self.edges.len()];
            for (edge_idx, edge) in self.edges.iter().enumerate() {
                edges[cursor[edge.target]] = edge_idx;
                cursor[edge.target] += 1;
            }

            IncomingIndex { offsets, edges }
        })
    }
}
