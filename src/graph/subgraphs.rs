//! Dense subgraph mining by greedy breadth-first expansion

use crate::analysis::Deadline;
use crate::cluster::metrics::{calculate_density, internal_edges};
use crate::data::snapshot::RecordId;
use crate::graph::TransactionGraph;
use serde::Serialize;
use std::collections::VecDeque;

/// A connected node set whose internal edge density stays above the floor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DenseSubgraph {
    /// Members in id order
    pub members: Vec<RecordId>,
    pub size: usize,
    pub edge_count: usize,
    /// Internal edges over n * (n - 1) / 2
    pub density: f64,
    pub internal_amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubgraphReport {
    pub subgraphs: Vec<DenseSubgraph>,
    pub partial: bool,
}

/// Other endpoints of a node's edges, self excluded, in id order
fn neighbors_by_id(graph: &TransactionGraph, node: usize) -> Vec<usize> {
    let mut neighbors: Vec<usize> = graph
        .incident(node)
        .into_iter()
        .map(|edge_idx| {
            let edge = graph.edge(edge_idx);
            if edge.source == node {
                edge.target
            } else {
                edge.source
            }
        })
        .filter(|&other| other != node)
        .collect();
    neighbors.sort_by(|&a, &b| graph.node_id(a).cmp(graph.node_id(b)));
    neighbors.dedup();
    neighbors
}

/// Edges between `node` and the current members
fn links_into(graph: &TransactionGraph, node: usize, in_subgraph: &[bool]) -> usize {
    graph
        .incident(node)
        .into_iter()
        .filter(|&edge_idx| {
            let edge = graph.edge(edge_idx);
            let other = if edge.source == node { edge.target } else { edge.source };
            other != node && in_subgraph[other]
        })
        .count()
}

/// Grow a subgraph from `start`, admitting a neighbour only while the
/// density including it stays at or above `min_density`
fn expand_subgraph(
    graph: &TransactionGraph,
    start: usize,
    visited: &mut [bool],
    min_density: f64,
) -> Vec<usize> {
    let mut in_subgraph = vec![false; graph.node_count()];
    let mut members = vec![start];
    let mut internal = 0;
    let mut queue = VecDeque::from([start]);
    in_subgraph[start] = true;
    visited[start] = true;

    while let Some(current) = queue.pop_front() {
        for neighbor in neighbors_by_id(graph, current) {
            if visited[neighbor] {
                continue;
            }

            let links = links_into(graph, neighbor, &in_subgraph);
            if calculate_density(members.len() + 1, internal + links) < min_density {
                continue;
            }

            internal += links;
            members.push(neighbor);
            in_subgraph[neighbor] = true;
            visited[neighbor] = true;
            queue.push_back(neighbor);
        }
    }

    members
}

/// Mine dense subgraphs with at least `min_size` members.
///
/// Seeds are tried in id order; nodes absorbed by one subgraph are not
/// revisited, rejected neighbours remain available as later seeds.
pub fn mine_subgraphs(
    graph: &TransactionGraph,
    min_size: usize,
    min_density: f64,
    deadline: &Deadline,
) -> SubgraphReport {
    let mut report = SubgraphReport::default();
    let mut visited = vec![false; graph.node_count()];

    let mut seeds: Vec<usize> = (0..graph.node_count()).collect();
    seeds.sort_by(|&a, &b| graph.node_id(a).cmp(graph.node_id(b)));

    for start in seeds {
        if visited[start] {
            continue;
        }
        if deadline.expired() {
            report.partial = true;
            break;
        }

        let mut members = expand_subgraph(graph, start, &mut visited, min_density);
        if members.len() < min_size {
            continue;
        }

        let internal = internal_edges(graph, &members);
        let density = calculate_density(members.len(), internal.len());
        if density < min_density {
            continue;
        }

        members.sort_by(|&a, &b| graph.node_id(a).cmp(graph.node_id(b)));
        report.subgraphs.push(DenseSubgraph {
            size: members.len(),
            members: members.iter().map(|&idx| graph.node_id(idx).clone()).collect(),
            edge_count: internal.len(),
            density,
            internal_amount: internal
                .iter()
                .map(|&edge_idx| graph.edge(edge_idx).amount_or_zero())
                .sum(),
        });
    }

    log::info!("Mined {} dense subgraphs", report.subgraphs.len());
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::snapshot::{NodeType, RawEdge, RawNode};
    use crate::graph::build_graph;

    fn graph_of(ids: &[i64], edges: &[(i64, i64)]) -> TransactionGraph {
        let nodes: Vec<RawNode> = ids
            .iter()
            .map(|&id| RawNode::new(id, NodeType::Account))
            .collect();
        let edges: Vec<RawEdge> = edges
            .iter()
            .map(|&(s, t)| RawEdge::new(s, t).with_amount(10.0))
            .collect();
        build_graph(&nodes, &edges).0
    }

    fn ids(subgraph: &DenseSubgraph) -> Vec<RecordId> {
        subgraph.members.clone()
    }

    #[test]
    fn chain_stops_growing_below_density_floor() {
        // 1 - 2 - 3 - 4 - 5: the fifth node would drop density to 0.4
        let graph = graph_of(&[5, 4, 3, 2, 1], &[(1, 2), (2, 3), (3, 4), (4, 5)]);
        let report = mine_subgraphs(&graph, 3, 0.5, &Deadline::none());

        assert_eq!(report.subgraphs.len(), 1);
        let chain = &report.subgraphs[0];
        assert_eq!(ids(chain), (1..=4i64).map(RecordId::from).collect::<Vec<_>>());
        assert_eq!(chain.edge_count, 3);
        assert_eq!(chain.density, 0.5);
        assert_eq!(chain.internal_amount, 30.0);
    }

    #[test]
    fn separate_triangles_are_mined_separately() {
        let graph = graph_of(
            &[1, 2, 3, 4, 5, 6, 7],
            &[(1, 2), (2, 3), (3, 1), (4, 5), (5, 6), (6, 4)],
        );
        let report = mine_subgraphs(&graph, 3, 0.5, &Deadline::none());

        assert_eq!(report.subgraphs.len(), 2);
        assert_eq!(report.subgraphs[0].density, 1.0);
        assert_eq!(ids(&report.subgraphs[1])[0], RecordId::from(4));
        assert!(!report.partial);
    }

    #[test]
    fn small_components_are_not_reported() {
        let graph = graph_of(&[1, 2, 3], &[(1, 2), (2, 1)]);
        let report = mine_subgraphs(&graph, 3, 0.5, &Deadline::none());
        assert!(report.subgraphs.is_empty());
    }

    #[test]
    fn expired_deadline_marks_partial() {
        let graph = graph_of(&[1, 2, 3], &[(1, 2), (2, 3), (3, 1)]);
        let deadline = Deadline::after(Some(std::time::Duration::ZERO));
        let report = mine_subgraphs(&graph, 3, 0.5, &deadline);
        assert!(report.partial);
        assert!(report.subgraphs.is_empty());
    }
}
