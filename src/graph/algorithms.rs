//! Whole-graph algorithms: summary statistics and degree centrality

use crate::data::snapshot::RecordId;
use crate::graph::TransactionGraph;
use petgraph::algo::{connected_components, is_cyclic_directed};
use petgraph::graph::DiGraph;
use serde::Serialize;
use std::collections::BTreeMap;

/// Shape of the graph handed to the analyzers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub node_count: usize,
    pub edge_count: usize,
    /// Edges over n * (n - 1), 0 for graphs with fewer than two nodes
    pub density: f64,
    pub node_types: BTreeMap<String, usize>,
    pub edge_types: BTreeMap<String, usize>,
    pub weakly_connected_components: usize,
    pub acyclic: bool,
}

/// A node ranked by degree centrality
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CentralNode {
    pub id: RecordId,
    pub degree: usize,
    /// Degree over n - 1
    pub centrality: f64,
}

/// Mirror the topology into petgraph for its structural algorithms
pub fn to_petgraph(graph: &TransactionGraph) -> DiGraph<(), ()> {
    let mut mirror = DiGraph::with_capacity(graph.node_count(), graph.edge_count());
    let indices: Vec<_> = (0..graph.node_count()).map(|_| mirror.add_node(())).collect();
    for edge in graph.edges() {
        mirror.add_edge(indices[edge.source], indices[edge.target], ());
    }
    mirror
}

/// Whether the directed graph contains at least one cycle (self-loops included)
pub fn has_cycle(graph: &TransactionGraph) -> bool {
    graph.edge_count() > 0 && is_cyclic_directed(&to_petgraph(graph))
}

/// Summarize the graph structure
pub fn summarize(graph: &TransactionGraph) -> GraphSummary {
    let node_count = graph.node_count();
    let edge_count = graph.edge_count();

    let density = if node_count > 1 {
        edge_count as f64 / (node_count * (node_count - 1)) as f64
    } else {
        0.0
    };

    let mut node_types = BTreeMap::new();
    for node in graph.nodes() {
        *node_types.entry(node.node_type.as_str().to_string()).or_insert(0) += 1;
    }

    let mut edge_types = BTreeMap::new();
    for edge in graph.edges() {
        let key = edge.edge_type.clone().unwrap_or_else(|| "default".to_string());
        *edge_types.entry(key).or_insert(0) += 1;
    }

    let mirror = to_petgraph(graph);

    GraphSummary {
        node_count,
        edge_count,
        density,
        node_types,
        edge_types,
        weakly_connected_components: connected_components(&mirror),
        acyclic: !is_cyclic_directed(&mirror),
    }
}

/// Rank nodes by total degree (in + out); ties go to the smaller id
pub fn degree_centrality(graph: &TransactionGraph, top_n: usize) -> Vec<CentralNode> {
    let node_count = graph.node_count();
    let scale = if node_count > 1 {
        (node_count - 1) as f64
    } else {
        0.0
    };

    let mut ranked: Vec<CentralNode> = (0..node_count)
        .map(|idx| {
            let degree = graph.out_degree(idx) + graph.in_degree(idx);
            CentralNode {
                id: graph.node_id(idx).clone(),
                degree,
                centrality: if scale > 0.0 { degree as f64 / scale } else { 0.0 },
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.degree.cmp(&a.degree).then_with(|| a.id.cmp(&b.id)));
    ranked.truncate(top_n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::snapshot::{NodeType, RawEdge, RawNode};
    use crate::graph::build_graph;

    fn sample() -> TransactionGraph {
        let nodes = vec![
            RawNode::new("a", NodeType::Account),
            RawNode::new("b", NodeType::Account),
            RawNode::new("m", NodeType::Merchant),
            RawNode::new("z", NodeType::Phone),
        ];
        let mut paid = RawEdge::new("b", "m");
        paid.edge_type = Some("payment".into());
        let edges = vec![RawEdge::new("a", "b"), paid, RawEdge::new("a", "m")];
        build_graph(&nodes, &edges).0
    }

    #[test]
    fn summary_counts_types_and_components() {
        let summary = summarize(&sample());

        assert_eq!(summary.node_count, 4);
        assert_eq!(summary.edge_count, 3);
        assert!((summary.density - 3.0 / 12.0).abs() < 1e-12);
        assert_eq!(summary.node_types.get("account"), Some(&2));
        assert_eq!(summary.edge_types.get("payment"), Some(&1));
        assert_eq!(summary.edge_types.get("default"), Some(&2));
        assert_eq!(summary.weakly_connected_components, 2);
        assert!(summary.acyclic);
    }

    #[test]
    fn centrality_ranks_by_degree_then_id() {
        let top = degree_centrality(&sample(), 2);

        assert_eq!(top.len(), 2);
        assert_eq!(top[0].id, RecordId::from("a"));
        assert_eq!(top[0].degree, 2);
        assert_eq!(top[1].id, RecordId::from("b"));
        assert!((top[0].centrality - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn self_loop_counts_as_cycle() {
        let nodes = vec![RawNode::new(1, NodeType::Account)];
        let (graph, _) = build_graph(&nodes, &[RawEdge::new(1, 1)]);
        assert!(has_cycle(&graph));

        let (empty, _) = build_graph(&[], &[]);
        assert!(!has_cycle(&empty));
        assert_eq!(summarize(&empty).density, 0.0);
    }
}
