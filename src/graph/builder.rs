//! Graph construction module

use crate::data::snapshot::{RawEdge, RawNode, RecordId};
use crate::graph::model::{Edge, Node, TransactionGraph};
use serde::Serialize;
use std::collections::HashMap;

/// Data-quality counters collected while building a graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildDiagnostics {
    /// Node records ignored because their id was already taken
    pub duplicate_nodes: usize,

    /// Edge records dropped because an endpoint does not exist
    pub dropped_edges: usize,

    /// Timestamps that could not be parsed (the edge is kept without one)
    pub invalid_timestamps: usize,

    /// Negative, non-finite or overflowing amounts (the edge is kept without one)
    pub invalid_amounts: usize,
}

impl BuildDiagnostics {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Builder for incrementally constructing a TransactionGraph
pub struct GraphBuilder {
    /// Mapping from record ids to node indices
    id_to_index: HashMap<RecordId, usize>,

    nodes: Vec<Node>,

    edges: Vec<Edge>,

    /// Sum of accepted amounts; stays finite so every aggregate over a subset does too
    amount_total: f64,

    diagnostics: BuildDiagnostics,
}

impl GraphBuilder {
    /// Create a new graph builder with the given capacity
    pub fn with_capacity(node_capacity: usize, edge_capacity: usize) -> Self {
        Self {
            id_to_index: HashMap::with_capacity(node_capacity),
            nodes: Vec::with_capacity(node_capacity),
            edges: Vec::with_capacity(edge_capacity),
            amount_total: 0.0,
            diagnostics: BuildDiagnostics::default(),
        }
    }

    /// Add a node; the first occurrence of an id wins. Returns whether it was added.
    pub fn add_node(&mut self, raw: &RawNode) -> bool {
        if self.id_to_index.contains_key(&raw.id) {
            log::warn!("Ignoring duplicate node id {}", raw.id);
            self.diagnostics.duplicate_nodes += 1;
            return false;
        }

        let idx = self.nodes.len();
        self.id_to_index.insert(raw.id.clone(), idx);
        self.nodes.push(Node {
            id: raw.id.clone(),
            node_type: raw.node_type,
            label: raw.label.clone(),
            properties: raw.properties.clone(),
        });
        true
    }

    /// Add an edge between two known nodes. Returns whether it was kept.
    pub fn add_edge(&mut self, raw: &RawEdge) -> bool {
        let (source, target) = match (
            self.id_to_index.get(&raw.source),
            self.id_to_index.get(&raw.target),
        ) {
            (Some(&source), Some(&target)) => (source, target),
            _ => {
                log::warn!(
                    "Dropping edge {} -> {}: unknown endpoint",
                    raw.source,
                    raw.target
                );
                self.diagnostics.dropped_edges += 1;
                return false;
            }
        };

        let amount = match raw.amount {
            Some(amount)
                if amount.is_finite() && amount >= 0.0 && (self.amount_total + amount).is_finite() =>
            {
                self.amount_total += amount;
                Some(amount)
            }
            Some(amount) => {
                log::warn!(
                    "Ignoring invalid amount {} on edge {} -> {}",
                    amount,
                    raw.source,
                    raw.target
                );
                self.diagnostics.invalid_amounts += 1;
                None
            }
            None => None,
        };

        let timestamp = match raw.timestamp.as_ref().map(|ts| ts.to_millis()) {
            Some(Ok(ms)) => Some(ms),
            Some(Err(err)) => {
                log::warn!("Ignoring timestamp on edge {} -> {}: {}", raw.source, raw.target, err);
                self.diagnostics.invalid_timestamps += 1;
                None
            }
            None => None,
        };

        self.edges.push(Edge {
            id: raw.id.clone(),
            source,
            target,
            amount,
            timestamp,
            edge_type: raw.edge_type.clone(),
        });
        true
    }

    /// Build the indexed graph
    pub fn build(self) -> (TransactionGraph, BuildDiagnostics) {
        let graph = TransactionGraph::from_parts(self.nodes, self.edges, self.id_to_index);
        (graph, self.diagnostics)
    }
}

/// Build a graph from raw records: nodes are deduplicated by id and edges
/// with an unknown endpoint are dropped and counted, never fatal.
pub fn build_graph(nodes: &[RawNode], edges: &[RawEdge]) -> (TransactionGraph, BuildDiagnostics) {
    let mut builder = GraphBuilder::with_capacity(nodes.len(), edges.len());

    for node in nodes {
        builder.add_node(node);
    }
    for edge in edges {
        builder.add_edge(edge);
    }

    let (graph, diagnostics) = builder.build();
    log::info!(
        "Built graph with {} nodes and {} edges ({} dropped edges, {} duplicate nodes)",
        graph.node_count(),
        graph.edge_count(),
        diagnostics.dropped_edges,
        diagnostics.duplicate_nodes
    );

    (graph, diagnostics)
}
